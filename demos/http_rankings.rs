//! Fetch a month from the storage service and print the ranking.
//!
//! Run with: cargo run --example http_rankings --features http -- 2024-05 [group-id]
//!
//! Reads TERRITORY_API_URL (default http://localhost:5000/api) and TERRITORY_API_KEY.

use std::time::Instant;

use territory_engine::{
    HttpStore, HttpStoreConfig, Period, Scope, TerritoryConfig, TerritoryService,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let period: Period = args.next().as_deref().unwrap_or("all").parse()?;
    let scope = args.next().map_or(Scope::World, Scope::Group);

    let mut config = HttpStoreConfig::default();
    if let Ok(url) = std::env::var("TERRITORY_API_URL") {
        config.base_url = url;
    }
    config.api_key = std::env::var("TERRITORY_API_KEY").ok();

    println!("HTTP Rankings");
    println!("=============");
    println!("Source: {}", config.base_url);
    println!("Period: {}  Scope: {}\n", period, scope);

    let service = TerritoryService::new(HttpStore::new(config)?, TerritoryConfig::default());

    let start = Instant::now();
    let rankings = service.rankings(&period, &scope).await?;
    println!("{} entries in {:?}\n", rankings.len(), start.elapsed());

    for entry in &rankings {
        println!("{}", serde_json::to_string(entry)?);
    }

    Ok(())
}
