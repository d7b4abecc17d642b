//! In-memory [`TerritoryStore`].
//!
//! Holds users, activities and group memberships in plain collections. Used by
//! tests and demos, and by callers that already have a period's data loaded.

use std::collections::{BTreeMap, BTreeSet};

use crate::service::TerritoryStore;
use crate::{Activity, Period, Scope, TerritoryError, UserProfile};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    users: Vec<UserProfile>,
    activities: Vec<Activity>,
    /// group id -> member user ids
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: UserProfile) -> Self {
        self.add_user(user);
        self
    }

    pub fn with_activity(mut self, activity: Activity) -> Self {
        self.add_activity(activity);
        self
    }

    pub fn with_group_member(mut self, group_id: &str, user_id: &str) -> Self {
        self.add_group_member(group_id, user_id);
        self
    }

    pub fn add_user(&mut self, user: UserProfile) {
        self.users.push(user);
    }

    pub fn add_activity(&mut self, activity: Activity) {
        self.activities.push(activity);
    }

    pub fn add_group_member(&mut self, group_id: &str, user_id: &str) {
        self.groups
            .entry(group_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    fn in_scope(&self, scope: &Scope, user_id: &str) -> bool {
        match scope {
            Scope::World => true,
            Scope::Group(id) => self.groups.get(id).is_some_and(|m| m.contains(user_id)),
        }
    }
}

impl TerritoryStore for MemoryStore {
    async fn activities_for_period(
        &self,
        period: &Period,
        scope: &Scope,
    ) -> Result<Vec<Activity>, TerritoryError> {
        Ok(self
            .activities
            .iter()
            .filter(|a| period.contains(a) && self.in_scope(scope, &a.user_id))
            .cloned()
            .collect())
    }

    /// Unknown groups have no members.
    async fn users_in_scope(&self, scope: &Scope) -> Result<Vec<UserProfile>, TerritoryError> {
        Ok(self
            .users
            .iter()
            .filter(|u| self.in_scope(scope, &u.user_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn store() -> MemoryStore {
        let may = Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap();
        let june = Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap();
        MemoryStore::new()
            .with_user(UserProfile::new("u1", "anna", "#FF6B35"))
            .with_user(UserProfile::new("u2", "marc", "#3B82F6"))
            .with_group_member("crew", "u2")
            .with_activity(Activity::new("a1", "u1", may, None))
            .with_activity(Activity::new("a2", "u2", may, None))
            .with_activity(Activity::new("a3", "u2", june, None))
    }

    #[tokio::test]
    async fn test_users_in_scope() {
        let store = store();
        assert_eq!(store.users_in_scope(&Scope::World).await.unwrap().len(), 2);

        let crew = store.users_in_scope(&Scope::Group("crew".into())).await.unwrap();
        assert_eq!(crew.len(), 1);
        assert_eq!(crew[0].user_id, "u2");

        assert!(store.users_in_scope(&Scope::Group("nope".into())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activities_for_period() {
        let store = store();
        let may = Period::month(2024, 5).unwrap();

        let world = store.activities_for_period(&may, &Scope::World).await.unwrap();
        assert_eq!(world.len(), 2);

        let crew = store
            .activities_for_period(&may, &Scope::Group("crew".into()))
            .await
            .unwrap();
        assert_eq!(crew.len(), 1);
        assert_eq!(crew[0].id, "a2");

        let all = store.activities_for_period(&Period::AllTime, &Scope::World).await.unwrap();
        assert_eq!(all.len(), 3);
    }
}
