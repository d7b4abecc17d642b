//! Ranking of resolved territories.
//!
//! Every user in scope gets exactly one entry, territory or not. Entries are
//! ordered by area (largest first), ties broken by username and then user id,
//! and ranked `1..=N` by position.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize, Serializer};

use crate::resolver::ResolvedTerritory;
use crate::UserProfile;

/// One row of a ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub user_id: String,
    pub username: String,
    pub paint_color: String,
    /// Exact surviving area; serialized rounded to whole square meters
    #[serde(serialize_with = "serialize_whole_meters")]
    pub total_area_sq_meters: f64,
    /// Share of the scope's reference area, 0-100
    pub territory_percent: f64,
    /// 1-based position
    pub rank: u32,
}

/// Leaderboard for one neighbourhood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborhoodRanking {
    pub neighborhood_name: String,
    pub entries: Vec<RankedEntry>,
}

fn serialize_whole_meters<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.max(0.0).round() as u64)
}

/// Rank every user in `users` by their resolved territory.
///
/// Users missing from `territories` rank with zero area. Duplicate profiles
/// are collapsed to the first occurrence; territories of users not in
/// `users` are ignored.
pub fn rank_territories<R>(
    territories: &BTreeMap<String, ResolvedTerritory<R>>,
    users: &[UserProfile],
    world_area_sq_meters: f64,
    percent_decimals: u32,
) -> Vec<RankedEntry> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(users.len());

    let mut entries: Vec<RankedEntry> = users
        .iter()
        .filter(|u| seen.insert(u.user_id.as_str()))
        .map(|u| {
            let area = territories
                .get(&u.user_id)
                .map_or(0.0, |t| t.total_area_sq_meters)
                .max(0.0);
            RankedEntry {
                user_id: u.user_id.clone(),
                username: u.username.clone(),
                paint_color: u.paint_color.clone(),
                total_area_sq_meters: area,
                territory_percent: percent_of(area, world_area_sq_meters, percent_decimals),
                rank: 0,
            }
        })
        .collect();

    entries.sort_by(compare_entries);

    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i as u32 + 1;
    }

    entries
}

/// Area descending, then username ascending, then user id ascending.
fn compare_entries(a: &RankedEntry, b: &RankedEntry) -> Ordering {
    b.total_area_sq_meters
        .total_cmp(&a.total_area_sq_meters)
        .then_with(|| a.username.cmp(&b.username))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// `area / world * 100`, rounded to `decimals` places and clamped to 0-100.
fn percent_of(area: f64, world_area: f64, decimals: u32) -> f64 {
    if !(world_area.is_finite() && world_area > 0.0) {
        return 0.0;
    }
    round_to(area / world_area * 100.0, decimals).clamp(0.0, 100.0)
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
