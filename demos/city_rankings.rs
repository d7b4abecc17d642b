//! Resolve a month of Barcelona loops and print the ranking.
//!
//! Run with: cargo run --example city_rankings

use chrono::{TimeZone, Utc};
use territory_engine::{
    Activity, MemoryStore, Period, Scope, TerritoryConfig, TerritoryService, UserProfile,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Loops around el Raval, the Eixample and Barceloneta
    let raval = vec![
        [2.1685, 41.3825], [2.1695, 41.3830], [2.1710, 41.3835],
        [2.1730, 41.3828], [2.1745, 41.3815], [2.1740, 41.3800],
        [2.1725, 41.3790], [2.1705, 41.3785], [2.1690, 41.3790],
        [2.1680, 41.3800], [2.1675, 41.3815],
    ];
    let raval_east = vec![
        [2.1715, 41.3830], [2.1760, 41.3830], [2.1760, 41.3790], [2.1715, 41.3790],
    ];
    let eixample = vec![
        [2.1550, 41.3920], [2.1580, 41.3940], [2.1620, 41.3950],
        [2.1660, 41.3945], [2.1690, 41.3930], [2.1680, 41.3910],
        [2.1650, 41.3900], [2.1610, 41.3895], [2.1570, 41.3900],
    ];
    let barceloneta = vec![
        [2.1870, 41.3810], [2.1890, 41.3800], [2.1920, 41.3785],
        [2.1940, 41.3770], [2.1930, 41.3755], [2.1900, 41.3745],
        [2.1870, 41.3750], [2.1850, 41.3765], [2.1845, 41.3785],
        [2.1860, 41.3800],
    ];

    let day = |d: u32, h: u32| Utc.with_ymd_and_hms(2024, 5, d, h, 0, 0).unwrap();

    let store = MemoryStore::new()
        .with_user(UserProfile::new("u1", "runner_bcn", "#FF6B35"))
        .with_user(UserProfile::new("u2", "gracia_runner", "#3B82F6"))
        .with_user(UserProfile::new("u3", "montjuic_mike", "#10B981"))
        .with_user(UserProfile::new("u4", "sofa_sergi", "#A855F7"))
        .with_activity(Activity::new("act-1", "u1", day(2, 7), Some(raval.clone())).in_neighborhood("el Raval"))
        .with_activity(Activity::new("act-2", "u1", day(3, 7), Some(eixample)).in_neighborhood("l'Eixample"))
        .with_activity(Activity::new("act-3", "u2", day(5, 19), Some(raval_east)).in_neighborhood("el Raval"))
        .with_activity(Activity::new("act-4", "u3", day(6, 8), Some(barceloneta)).in_neighborhood("la Barceloneta"))
        // Re-running your own loop never costs you territory
        .with_activity(Activity::new("act-5", "u1", day(9, 7), Some(raval)).in_neighborhood("el Raval"))
        // A straight out-and-back has no loop
        .with_activity(Activity::new("act-6", "u4", day(9, 9), None));

    let service = TerritoryService::new(store, TerritoryConfig::default());
    let period = Period::month(2024, 5)?;

    println!(
        "Territory Rankings for {} (city area {:.0} m²)\n",
        period,
        service.config().world_area_sq_meters
    );
    for entry in service.rankings(&period, &Scope::World).await? {
        println!(
            "  #{} {:<16} {:>10.0} m²  {:>8.4}%  {}",
            entry.rank, entry.username, entry.total_area_sq_meters, entry.territory_percent, entry.paint_color
        );
    }

    println!("\nMap layers:");
    for territory in service.territory_geometries(&period, &Scope::World).await? {
        let vertices: usize = territory.polygons.iter().flatten().map(|ring| ring.len()).sum();
        println!(
            "  {:<16} {} polygon(s), {} vertices",
            territory.username,
            territory.polygons.len(),
            vertices
        );
    }

    println!("\nNeighbourhood leaders:");
    for board in service.neighborhood_rankings(&period, &Scope::World).await? {
        if let Some(leader) = board.entries.first() {
            println!(
                "  {:<16} {} ({:.0} m²)",
                board.neighborhood_name, leader.username, leader.total_area_sq_meters
            );
        }
    }

    println!("\nTitles for {}:", period);
    for title in service.monthly_titles(&period, &Scope::World).await? {
        println!(
            "  {:?} {} -> {}",
            title.title_type,
            title.neighborhood_name.as_deref().unwrap_or("Barcelona"),
            title.user_id
        );
    }

    Ok(())
}
