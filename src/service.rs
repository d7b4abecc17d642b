//! Query facade consumed by the HTTP layer.
//!
//! Every query fetches a fresh snapshot from the [`TerritoryStore`] (activities
//! and users concurrently, once, up front), resolves it synchronously in
//! memory, and returns. Nothing derived is cached or persisted, so concurrent
//! queries share no mutable state and an abandoned query leaves nothing behind.
//!
//! Neighbourhood leaderboards run the same resolution on the activities tagged
//! with one neighbourhood, independently of every other neighbourhood.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::geometry::{GeoEngine, GeometryEngine, PolygonCoordinates};
use crate::ranking::{rank_territories, NeighborhoodRanking, RankedEntry};
use crate::resolver::{resolve_territories, Resolution};
use crate::titles::{award_titles, MonthlyTitle};
use crate::{Activity, Period, Scope, TerritoryConfig, TerritoryError, UserProfile};

/// Data access the facade depends on.
///
/// Implementations return an immutable snapshot per call. Errors mean the
/// source itself is unreachable or broken; they fail the whole query.
pub trait TerritoryStore {
    /// Activities of users in `scope` that belong to `period`.
    fn activities_for_period(
        &self,
        period: &Period,
        scope: &Scope,
    ) -> impl Future<Output = Result<Vec<Activity>, TerritoryError>> + Send;

    /// Every user in `scope`.
    fn users_in_scope(
        &self,
        scope: &Scope,
    ) -> impl Future<Output = Result<Vec<UserProfile>, TerritoryError>> + Send;
}

/// One user's territory, ready for map rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerritoryEntry {
    pub user_id: String,
    pub username: String,
    pub paint_color: String,
    /// One entry per disjoint polygon: exterior ring, then holes
    pub polygons: Vec<PolygonCoordinates>,
}

/// Users and their in-scope activities for one period.
struct Snapshot {
    users: Vec<UserProfile>,
    activities: Vec<Activity>,
}

/// Rankings and territory geometry over a [`TerritoryStore`].
pub struct TerritoryService<S, E = GeoEngine> {
    store: S,
    engine: E,
    config: TerritoryConfig,
}

impl<S: TerritoryStore> TerritoryService<S, GeoEngine> {
    /// Create a service using the `geo`-backed engine.
    pub fn new(store: S, config: TerritoryConfig) -> Self {
        Self::with_engine(store, GeoEngine, config)
    }
}

impl<S: TerritoryStore, E: GeometryEngine> TerritoryService<S, E> {
    /// Create a service with a custom geometry engine.
    pub fn with_engine(store: S, engine: E, config: TerritoryConfig) -> Self {
        Self { store, engine, config }
    }

    pub fn config(&self) -> &TerritoryConfig {
        &self.config
    }

    /// Full ranking of every user in `scope`, including users without territory.
    pub async fn rankings(
        &self,
        period: &Period,
        scope: &Scope,
    ) -> Result<Vec<RankedEntry>, TerritoryError> {
        let snapshot = self.snapshot(period, scope).await?;
        let resolution = self.resolve(&snapshot.activities);
        Ok(self.rank(&snapshot.users, &resolution, self.config.world_area_for(scope)))
    }

    /// Territory geometry of users in `scope` who hold any, in ranking order.
    pub async fn territory_geometries(
        &self,
        period: &Period,
        scope: &Scope,
    ) -> Result<Vec<TerritoryEntry>, TerritoryError> {
        let snapshot = self.snapshot(period, scope).await?;
        let resolution = self.resolve(&snapshot.activities);

        let entries = self
            .rank(&snapshot.users, &resolution, self.config.world_area_for(scope))
            .into_iter()
            .filter_map(|entry| {
                let territory = resolution.territories.get(&entry.user_id)?;
                if territory.regions.is_empty() {
                    return None;
                }
                let polygons = territory
                    .regions
                    .iter()
                    .flat_map(|r| self.engine.coordinates(r))
                    .collect();
                Some(TerritoryEntry {
                    user_id: entry.user_id,
                    username: entry.username,
                    paint_color: entry.paint_color,
                    polygons,
                })
            })
            .collect();

        Ok(entries)
    }

    /// A single user's ranked entry, or `None` if they are not in `scope`.
    pub async fn user_standing(
        &self,
        period: &Period,
        scope: &Scope,
        user_id: &str,
    ) -> Result<Option<RankedEntry>, TerritoryError> {
        let rankings = self.rankings(period, scope).await?;
        Ok(rankings.into_iter().find(|e| e.user_id == user_id))
    }

    /// One leaderboard per neighbourhood with activity in the period, by name.
    ///
    /// A leaderboard lists the users in `scope` with at least one activity in
    /// that neighbourhood. Untagged activities appear on no leaderboard.
    pub async fn neighborhood_rankings(
        &self,
        period: &Period,
        scope: &Scope,
    ) -> Result<Vec<NeighborhoodRanking>, TerritoryError> {
        let snapshot = self.snapshot(period, scope).await?;
        Ok(self.neighborhood_boards(&snapshot, scope))
    }

    /// Leaderboard for one neighbourhood; empty if nobody ran there.
    pub async fn neighborhood_leaderboard(
        &self,
        period: &Period,
        scope: &Scope,
        neighborhood: &str,
    ) -> Result<Vec<RankedEntry>, TerritoryError> {
        let snapshot = self.snapshot(period, scope).await?;
        let activities: Vec<Activity> = snapshot
            .activities
            .iter()
            .filter(|a| a.neighborhood_name.as_deref() == Some(neighborhood))
            .cloned()
            .collect();
        Ok(self.neighborhood_board(&snapshot.users, neighborhood, &activities, scope))
    }

    /// Titles earned in a month: the global leader and each neighbourhood leader.
    ///
    /// # Errors
    ///
    /// [`TerritoryError::InvalidPeriod`] for [`Period::AllTime`].
    pub async fn monthly_titles(
        &self,
        period: &Period,
        scope: &Scope,
    ) -> Result<Vec<MonthlyTitle>, TerritoryError> {
        let month_key = period
            .key()
            .ok_or_else(|| TerritoryError::InvalidPeriod("titles are awarded per month".to_string()))?;

        let snapshot = self.snapshot(period, scope).await?;
        let resolution = self.resolve(&snapshot.activities);
        let global = self.rank(&snapshot.users, &resolution, self.config.world_area_for(scope));
        let boards = self.neighborhood_boards(&snapshot, scope);

        Ok(award_titles(&month_key, &global, &boards))
    }

    /// Titles `user_id` earned across `months`, in the order given.
    pub async fn user_titles(
        &self,
        user_id: &str,
        months: &[Period],
        scope: &Scope,
    ) -> Result<Vec<MonthlyTitle>, TerritoryError> {
        let mut titles = Vec::new();
        for month in months {
            titles.extend(
                self.monthly_titles(month, scope)
                    .await?
                    .into_iter()
                    .filter(|t| t.user_id == user_id),
            );
        }
        Ok(titles)
    }

    /// Fetch users and activities for `period` and `scope`.
    ///
    /// Activities of users outside the scope are dropped before resolution:
    /// they neither claim nor cut.
    async fn snapshot(&self, period: &Period, scope: &Scope) -> Result<Snapshot, TerritoryError> {
        let (activities, users) = futures::try_join!(
            self.store.activities_for_period(period, scope),
            self.store.users_in_scope(scope),
        )?;

        let members: HashSet<&str> = users.iter().map(|u| u.user_id.as_str()).collect();
        let fetched = activities.len();
        let activities: Vec<Activity> = activities
            .into_iter()
            .filter(|a| members.contains(a.user_id.as_str()) && period.contains(a))
            .collect();

        debug!(
            "[TerritoryService] period={} scope={}: {} users, {}/{} activities in scope",
            period,
            scope,
            users.len(),
            activities.len(),
            fetched
        );

        Ok(Snapshot { users, activities })
    }

    fn resolve(&self, activities: &[Activity]) -> Resolution<E::Region> {
        resolve_territories(&self.engine, activities, &self.config)
    }

    fn rank(
        &self,
        users: &[UserProfile],
        resolution: &Resolution<E::Region>,
        world_area_sq_meters: f64,
    ) -> Vec<RankedEntry> {
        rank_territories(
            &resolution.territories,
            users,
            world_area_sq_meters,
            self.config.percent_decimals,
        )
    }

    fn neighborhood_boards(&self, snapshot: &Snapshot, scope: &Scope) -> Vec<NeighborhoodRanking> {
        let mut grouped: BTreeMap<&str, Vec<Activity>> = BTreeMap::new();
        for activity in &snapshot.activities {
            if let Some(name) = activity.neighborhood_name.as_deref() {
                grouped.entry(name).or_default().push(activity.clone());
            }
        }

        grouped
            .into_iter()
            .map(|(name, activities)| NeighborhoodRanking {
                neighborhood_name: name.to_string(),
                entries: self.neighborhood_board(&snapshot.users, name, &activities, scope),
            })
            .collect()
    }

    fn neighborhood_board(
        &self,
        users: &[UserProfile],
        neighborhood: &str,
        activities: &[Activity],
        scope: &Scope,
    ) -> Vec<RankedEntry> {
        let runners: HashSet<&str> = activities.iter().map(|a| a.user_id.as_str()).collect();
        let local: Vec<UserProfile> = users
            .iter()
            .filter(|u| runners.contains(u.user_id.as_str()))
            .cloned()
            .collect();

        let resolution = self.resolve(activities);
        self.rank(
            &local,
            &resolution,
            self.config.neighborhood_area_for(scope, neighborhood),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, TitleType};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap()
    }

    fn square(lon: f64, lat: f64, size: f64) -> Option<Vec<[f64; 2]>> {
        Some(vec![
            [lon, lat],
            [lon + size, lat],
            [lon + size, lat + size],
            [lon, lat + size],
        ])
    }

    fn may() -> Period {
        Period::month(2024, 5).unwrap()
    }

    fn city() -> MemoryStore {
        MemoryStore::new()
            .with_user(UserProfile::new("u1", "anna", "#FF6B35"))
            .with_user(UserProfile::new("u2", "marc", "#3B82F6"))
            .with_user(UserProfile::new("u3", "laia", "#10B981"))
            .with_group_member("crew", "u1")
            .with_group_member("crew", "u3")
    }

    struct UnreachableStore;

    impl TerritoryStore for UnreachableStore {
        async fn activities_for_period(
            &self,
            _period: &Period,
            _scope: &Scope,
        ) -> Result<Vec<Activity>, TerritoryError> {
            Err(TerritoryError::SourceUnavailable("connection refused".into()))
        }

        async fn users_in_scope(&self, _scope: &Scope) -> Result<Vec<UserProfile>, TerritoryError> {
            Ok(vec![UserProfile::new("u1", "anna", "#FF6B35")])
        }
    }

    #[tokio::test]
    async fn test_later_claim_ranks_above() {
        let store = city()
            .with_activity(Activity::new("a1", "u1", at(1), square(2.17, 41.38, 0.001)))
            .with_activity(Activity::new("a2", "u2", at(2), square(2.17, 41.38, 0.001)));
        let service = TerritoryService::new(store, TerritoryConfig::default());

        let rankings = service.rankings(&may(), &Scope::World).await.unwrap();
        assert_eq!(rankings.len(), 3);
        assert_eq!(rankings[0].user_id, "u2");
        assert!(rankings[0].total_area_sq_meters > 9_000.0);
        assert!(rankings[0].territory_percent > 0.0);
        // anna and laia both hold nothing; anna sorts first by name
        assert_eq!(rankings[1].username, "anna");
        assert_eq!(rankings[1].total_area_sq_meters, 0.0);
        assert_eq!(rankings[2].username, "laia");
    }

    #[tokio::test]
    async fn test_partial_cut_keeps_remainder() {
        let rect = Some(vec![[2.170, 41.380], [2.172, 41.380], [2.172, 41.381], [2.170, 41.381]]);
        let store = city()
            .with_activity(Activity::new("a1", "u1", at(1), rect))
            .with_activity(Activity::new("a2", "u2", at(2), square(2.170, 41.380, 0.001)));
        let service = TerritoryService::new(store, TerritoryConfig::default());

        let rankings = service.rankings(&may(), &Scope::World).await.unwrap();
        let anna = rankings.iter().find(|e| e.user_id == "u1").unwrap();
        let marc = rankings.iter().find(|e| e.user_id == "u2").unwrap();

        // Each holds one half of the rectangle
        assert!(marc.total_area_sq_meters > 9_000.0 && marc.total_area_sq_meters < 9_500.0);
        assert!((anna.total_area_sq_meters - marc.total_area_sq_meters).abs() < 100.0);
        assert!(anna.territory_percent > 0.0 && anna.territory_percent < 0.01);
    }

    #[tokio::test]
    async fn test_rankings_are_deterministic() {
        let store = city()
            .with_activity(Activity::new("a1", "u1", at(1), square(2.170, 41.380, 0.002)))
            .with_activity(Activity::new("a2", "u2", at(2), square(2.171, 41.381, 0.002)))
            .with_activity(Activity::new("a3", "u3", at(3), square(2.169, 41.3815, 0.002)));
        let service = TerritoryService::new(store, TerritoryConfig::default());

        let first = service.rankings(&may(), &Scope::World).await.unwrap();
        let second = service.rankings(&may(), &Scope::World).await.unwrap();
        assert_eq!(first, second);

        let geo_first = service.territory_geometries(&may(), &Scope::World).await.unwrap();
        let geo_second = service.territory_geometries(&may(), &Scope::World).await.unwrap();
        assert_eq!(geo_first, geo_second);

        for entry in &first {
            assert!(entry.total_area_sq_meters >= 0.0);
            assert!((0.0..=100.0).contains(&entry.territory_percent));
        }
    }

    #[tokio::test]
    async fn test_geometries_exclude_empty_territories() {
        let store = city()
            .with_activity(Activity::new("a1", "u1", at(1), square(2.17, 41.38, 0.001)))
            .with_activity(Activity::new("a2", "u2", at(2), square(2.17, 41.38, 0.001)))
            .with_activity(Activity::new("a3", "u3", at(3), None));
        let service = TerritoryService::new(store, TerritoryConfig::default());

        let geometries = service.territory_geometries(&may(), &Scope::World).await.unwrap();
        assert_eq!(geometries.len(), 1);
        assert_eq!(geometries[0].user_id, "u2");
        assert_eq!(geometries[0].paint_color, "#3B82F6");
        assert_eq!(geometries[0].polygons.len(), 1);

        let json = serde_json::to_value(&geometries[0]).unwrap();
        let ring = &json["polygons"][0][0];
        assert_eq!(ring[0], ring[ring.as_array().unwrap().len() - 1]);
        assert_eq!(ring[0].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_group_scope_ignores_outsiders() {
        // marc (u2) isn't in the crew, so his later loop doesn't cut anna's
        let store = city()
            .with_activity(Activity::new("a1", "u1", at(1), square(2.17, 41.38, 0.001)))
            .with_activity(Activity::new("a2", "u2", at(2), square(2.17, 41.38, 0.001)));
        let service = TerritoryService::new(store, TerritoryConfig::default());

        let crew = Scope::Group("crew".into());
        let rankings = service.rankings(&may(), &crew).await.unwrap();
        assert_eq!(rankings.len(), 2);
        assert_eq!(rankings[0].user_id, "u1");
        assert!(rankings[0].total_area_sq_meters > 9_000.0);
        assert!(rankings.iter().all(|e| e.user_id != "u2"));
    }

    #[tokio::test]
    async fn test_group_area_override() {
        let store = city()
            .with_activity(Activity::new("a1", "u1", at(1), square(2.17, 41.38, 0.001)));
        let mut config = TerritoryConfig::default();
        config.scope_area_sq_meters.insert("crew".into(), 1_000_000.0);
        let service = TerritoryService::new(store, config);

        let world = service.rankings(&may(), &Scope::World).await.unwrap();
        let crew = service.rankings(&may(), &Scope::Group("crew".into())).await.unwrap();
        assert!(crew[0].territory_percent > world[0].territory_percent);
    }

    #[tokio::test]
    async fn test_other_periods_ignored() {
        let june = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let store = city()
            .with_activity(Activity::new("a1", "u1", at(1), square(2.17, 41.38, 0.001)))
            .with_activity(Activity::new("a2", "u2", june, square(2.17, 41.38, 0.001)));
        let service = TerritoryService::new(store, TerritoryConfig::default());

        let rankings = service.rankings(&may(), &Scope::World).await.unwrap();
        assert_eq!(rankings[0].user_id, "u1");

        let all_time = service.rankings(&Period::AllTime, &Scope::World).await.unwrap();
        assert_eq!(all_time[0].user_id, "u2");
    }

    #[tokio::test]
    async fn test_user_standing() {
        let store = city()
            .with_activity(Activity::new("a1", "u3", at(1), square(2.17, 41.38, 0.001)));
        let service = TerritoryService::new(store, TerritoryConfig::default());

        let laia = service.user_standing(&may(), &Scope::World, "u3").await.unwrap().unwrap();
        assert_eq!(laia.rank, 1);
        let marc = service.user_standing(&may(), &Scope::World, "u2").await.unwrap().unwrap();
        assert_eq!(marc.total_area_sq_meters, 0.0);
        assert!(service.user_standing(&may(), &Scope::World, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_period_ranks_everyone_at_zero() {
        let service = TerritoryService::new(city(), TerritoryConfig::default());
        let rankings = service.rankings(&may(), &Scope::World).await.unwrap();
        assert_eq!(rankings.len(), 3);
        assert!(rankings.iter().all(|e| e.total_area_sq_meters == 0.0));
        assert!(service.territory_geometries(&may(), &Scope::World).await.unwrap().is_empty());
    }

    fn neighborhoods() -> MemoryStore {
        city()
            .with_activity(Activity::new("r1", "u1", at(1), square(2.170, 41.380, 0.001)).in_neighborhood("el Raval"))
            .with_activity(Activity::new("r2", "u2", at(2), square(2.170, 41.380, 0.001)).in_neighborhood("el Raval"))
            .with_activity(Activity::new("g1", "u3", at(3), square(2.160, 41.400, 0.001)).in_neighborhood("Gràcia"))
            .with_activity(Activity::new("g2", "u1", at(4), square(2.150, 41.400, 0.002)).in_neighborhood("Gràcia"))
            // Untagged, so it only competes in the city-wide ranking
            .with_activity(Activity::new("x1", "u2", at(5), square(2.160, 41.400, 0.001)))
    }

    #[tokio::test]
    async fn test_neighborhood_rankings() {
        let service = TerritoryService::new(neighborhoods(), TerritoryConfig::default());
        let boards = service.neighborhood_rankings(&may(), &Scope::World).await.unwrap();

        let names: Vec<&str> = boards.iter().map(|b| b.neighborhood_name.as_str()).collect();
        assert_eq!(names, vec!["Gràcia", "el Raval"]);

        let gracia = &boards[0].entries;
        assert_eq!(gracia.len(), 2);
        assert_eq!(gracia[0].user_id, "u1");
        // marc's untagged loop doesn't cut laia here
        assert_eq!(gracia[1].user_id, "u3");
        assert!(gracia[1].total_area_sq_meters > 9_000.0);

        let raval = &boards[1].entries;
        assert_eq!(raval[0].user_id, "u2");
        assert_eq!(raval[1].user_id, "u1");
        assert_eq!(raval[1].total_area_sq_meters, 0.0);

        let world = service.user_standing(&may(), &Scope::World, "u3").await.unwrap().unwrap();
        assert_eq!(world.total_area_sq_meters, 0.0);
    }

    #[tokio::test]
    async fn test_neighborhood_leaderboard() {
        let service = TerritoryService::new(neighborhoods(), TerritoryConfig::default());

        let raval = service
            .neighborhood_leaderboard(&may(), &Scope::World, "el Raval")
            .await
            .unwrap();
        assert_eq!(raval.len(), 2);
        assert_eq!(raval[0].username, "marc");
        assert_eq!(raval[0].rank, 1);

        let nowhere = service
            .neighborhood_leaderboard(&may(), &Scope::World, "Sants")
            .await
            .unwrap();
        assert!(nowhere.is_empty());
    }

    #[tokio::test]
    async fn test_monthly_titles() {
        let service = TerritoryService::new(neighborhoods(), TerritoryConfig::default());
        let titles = service.monthly_titles(&may(), &Scope::World).await.unwrap();

        let awarded: Vec<(TitleType, Option<&str>, &str)> = titles
            .iter()
            .map(|t| (t.title_type, t.neighborhood_name.as_deref(), t.user_id.as_str()))
            .collect();
        assert_eq!(
            awarded,
            vec![
                (TitleType::Global, None, "u1"),
                (TitleType::Neighborhood, Some("Gràcia"), "u1"),
                (TitleType::Neighborhood, Some("el Raval"), "u2"),
            ]
        );
        assert!(titles.iter().all(|t| t.month_key == "2024-05"));

        let err = service.monthly_titles(&Period::AllTime, &Scope::World).await.unwrap_err();
        assert!(matches!(err, TerritoryError::InvalidPeriod(_)));
    }

    #[tokio::test]
    async fn test_user_titles() {
        let service = TerritoryService::new(neighborhoods(), TerritoryConfig::default());
        let june = Period::month(2024, 6).unwrap();

        let anna = service.user_titles("u1", &[may(), june], &Scope::World).await.unwrap();
        assert_eq!(anna.len(), 2);
        assert!(service.user_titles("u3", &[may()], &Scope::World).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_source_failure_propagates() {
        let service = TerritoryService::new(UnreachableStore, TerritoryConfig::default());
        let err = service.rankings(&may(), &Scope::World).await.unwrap_err();
        assert!(matches!(err, TerritoryError::SourceUnavailable(_)));
        assert!(service.territory_geometries(&may(), &Scope::World).await.is_err());
    }
}
