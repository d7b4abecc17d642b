//! Monthly titles.
//!
//! At the end of a month the leader of the city-wide ranking and the leader of
//! every neighbourhood leaderboard each earn a title. A leader must hold some
//! territory; an all-zero board awards nothing.

use serde::{Deserialize, Serialize};

use crate::ranking::{NeighborhoodRanking, RankedEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleType {
    Global,
    Neighborhood,
}

/// A title earned for one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTitle {
    pub user_id: String,
    /// `YYYY-MM`
    pub month_key: String,
    pub title_type: TitleType,
    /// Set for neighbourhood titles only
    pub neighborhood_name: Option<String>,
    pub rank: u32,
    pub area_sq_meters: f64,
}

/// Titles for `month_key`: the global leader first, then one per
/// neighbourhood in the order given.
pub fn award_titles(
    month_key: &str,
    global: &[RankedEntry],
    neighborhoods: &[NeighborhoodRanking],
) -> Vec<MonthlyTitle> {
    let mut titles: Vec<MonthlyTitle> = leader(global)
        .map(|entry| title(month_key, TitleType::Global, None, entry))
        .into_iter()
        .collect();

    titles.extend(neighborhoods.iter().filter_map(|board| {
        leader(&board.entries).map(|entry| {
            title(
                month_key,
                TitleType::Neighborhood,
                Some(board.neighborhood_name.clone()),
                entry,
            )
        })
    }));

    titles
}

fn leader(entries: &[RankedEntry]) -> Option<&RankedEntry> {
    entries
        .iter()
        .find(|e| e.rank == 1)
        .filter(|e| e.total_area_sq_meters > 0.0)
}

fn title(
    month_key: &str,
    title_type: TitleType,
    neighborhood_name: Option<String>,
    entry: &RankedEntry,
) -> MonthlyTitle {
    MonthlyTitle {
        user_id: entry.user_id.clone(),
        month_key: month_key.to_string(),
        title_type,
        neighborhood_name,
        rank: entry.rank,
        area_sq_meters: entry.total_area_sq_meters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user_id: &str, area: f64, rank: u32) -> RankedEntry {
        RankedEntry {
            user_id: user_id.to_string(),
            username: user_id.to_string(),
            paint_color: "#FF6B35".to_string(),
            total_area_sq_meters: area,
            territory_percent: 0.0,
            rank,
        }
    }

    fn board(name: &str, entries: Vec<RankedEntry>) -> NeighborhoodRanking {
        NeighborhoodRanking {
            neighborhood_name: name.to_string(),
            entries,
        }
    }

    #[test]
    fn test_global_and_neighborhood_leaders() {
        let global = vec![entry("u1", 500.0, 1), entry("u2", 200.0, 2)];
        let boards = vec![
            board("el Raval", vec![entry("u2", 200.0, 1), entry("u1", 100.0, 2)]),
            board("Gràcia", vec![entry("u1", 400.0, 1)]),
        ];

        let titles = award_titles("2024-05", &global, &boards);
        assert_eq!(titles.len(), 3);

        assert_eq!(titles[0].title_type, TitleType::Global);
        assert_eq!(titles[0].user_id, "u1");
        assert_eq!(titles[0].neighborhood_name, None);

        assert_eq!(titles[1].title_type, TitleType::Neighborhood);
        assert_eq!(titles[1].user_id, "u2");
        assert_eq!(titles[1].neighborhood_name.as_deref(), Some("el Raval"));
        assert!(titles.iter().all(|t| t.rank == 1 && t.month_key == "2024-05"));
    }

    #[test]
    fn test_empty_boards_award_nothing() {
        let global = vec![entry("u1", 0.0, 1), entry("u2", 0.0, 2)];
        let boards = vec![board("el Raval", vec![])];
        assert!(award_titles("2024-05", &global, &boards).is_empty());
    }

    #[test]
    fn test_title_json_shape() {
        let titles = award_titles("2024-05", &[], &[board("el Raval", vec![entry("u1", 1.5, 1)])]);
        let json = serde_json::to_value(&titles[0]).unwrap();
        assert_eq!(json["titleType"], "neighborhood");
        assert_eq!(json["neighborhoodName"], "el Raval");
        assert_eq!(json["monthKey"], "2024-05");
        assert_eq!(json["userId"], "u1");
    }
}
