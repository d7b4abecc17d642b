//! Resolve a busy month for a private group using parallel resolution.
//!
//! Run with: cargo run --example group_rankings --features parallel

use std::time::Instant;

use chrono::{Duration, TimeZone, Utc};
use territory_engine::{
    Activity, MemoryStore, Period, Scope, TerritoryConfig, TerritoryService, UserProfile,
};

const RUNNERS: usize = 12;
const LOOPS_PER_RUNNER: usize = 25;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Group Rankings Example\n");

    let mut store = MemoryStore::new();
    for r in 0..RUNNERS {
        let user_id = format!("u{}", r);
        store.add_user(UserProfile::new(&user_id, format!("runner_{:02}", r), "#FF6B35"));
        // Even-numbered runners belong to the club
        if r % 2 == 0 {
            store.add_group_member("club", &user_id);
        }
    }

    let month_start = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
    let mut count = 0;
    for r in 0..RUNNERS {
        for l in 0..LOOPS_PER_RUNNER {
            // Loops drift around a shared neighbourhood so many of them overlap
            let lon = 2.160 + 0.0007 * ((r * 7 + l * 3) % 20) as f64;
            let lat = 41.380 + 0.0005 * ((r * 5 + l * 11) % 20) as f64;
            let ts = month_start + Duration::minutes((l * RUNNERS + r) as i64 * 97);
            store.add_activity(Activity::new(
                format!("act-{}-{}", r, l),
                format!("u{}", r),
                ts,
                Some(octagon(lon, lat, 0.0012)),
            ));
            count += 1;
        }
    }
    println!("Created {} activities for {} runners\n", count, RUNNERS);

    let service = TerritoryService::new(store, TerritoryConfig::default());
    let period = Period::month(2024, 5)?;

    for scope in [Scope::World, Scope::Group("club".to_string())] {
        let start = Instant::now();
        let rankings = service.rankings(&period, &scope).await?;
        println!("{} ({} entries, resolved in {:?}):", scope, rankings.len(), start.elapsed());
        for entry in rankings.iter().take(5) {
            println!(
                "  #{} {} {:.0} m² ({:.4}%)",
                entry.rank, entry.username, entry.total_area_sq_meters, entry.territory_percent
            );
        }
        println!();
    }

    Ok(())
}

/// An eight-sided loop around a centre point.
fn octagon(lon: f64, lat: f64, radius: f64) -> Vec<[f64; 2]> {
    (0..8)
        .map(|i| {
            let angle = i as f64 * std::f64::consts::FRAC_PI_4;
            [lon + radius * angle.cos(), lat + radius * 0.75 * angle.sin()]
        })
        .collect()
}
