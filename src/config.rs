//! Engine configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Scope, TerritoryError};

/// Configuration for territory resolution and ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerritoryConfig {
    /// Denominator for percent-of-city figures, in square meters.
    /// Default: 101,400,000 (the municipal area of Barcelona)
    pub world_area_sq_meters: f64,

    /// Per-group denominator overrides, keyed by group id.
    /// Groups without an entry use `world_area_sq_meters`.
    pub scope_area_sq_meters: BTreeMap<String, f64>,

    /// Per-neighbourhood denominators for neighbourhood leaderboards.
    /// Neighbourhoods without an entry use the scope's denominator.
    pub neighborhood_area_sq_meters: BTreeMap<String, f64>,

    /// Surviving pieces smaller than this are discarded as slivers.
    /// Default: 1.0 m² (0 keeps every piece)
    pub sliver_area_sq_meters: f64,

    /// Decimal places kept in `territory_percent`.
    /// Default: 4
    pub percent_decimals: u32,
}

impl Default for TerritoryConfig {
    fn default() -> Self {
        Self {
            world_area_sq_meters: 101_400_000.0,
            scope_area_sq_meters: BTreeMap::new(),
            neighborhood_area_sq_meters: BTreeMap::new(),
            sliver_area_sq_meters: 1.0,
            percent_decimals: 4,
        }
    }
}

impl TerritoryConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, TerritoryError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| TerritoryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject denominators and thresholds that would make rankings meaningless.
    pub fn validate(&self) -> Result<(), TerritoryError> {
        if !(self.world_area_sq_meters.is_finite() && self.world_area_sq_meters > 0.0) {
            return Err(TerritoryError::Config(format!(
                "world_area_sq_meters must be positive, got {}",
                self.world_area_sq_meters
            )));
        }
        for (group, area) in &self.scope_area_sq_meters {
            if !(area.is_finite() && *area > 0.0) {
                return Err(TerritoryError::Config(format!(
                    "area for group {group} must be positive, got {area}"
                )));
            }
        }
        for (name, area) in &self.neighborhood_area_sq_meters {
            if !(area.is_finite() && *area > 0.0) {
                return Err(TerritoryError::Config(format!(
                    "area for neighbourhood {name} must be positive, got {area}"
                )));
            }
        }
        if !(self.sliver_area_sq_meters.is_finite() && self.sliver_area_sq_meters >= 0.0) {
            return Err(TerritoryError::Config(format!(
                "sliver_area_sq_meters must be non-negative, got {}",
                self.sliver_area_sq_meters
            )));
        }
        if self.percent_decimals > 10 {
            return Err(TerritoryError::Config(format!(
                "percent_decimals must be at most 10, got {}",
                self.percent_decimals
            )));
        }
        Ok(())
    }

    /// Denominator used for percent-of-area in `scope`.
    pub fn world_area_for(&self, scope: &Scope) -> f64 {
        scope
            .group_id()
            .and_then(|id| self.scope_area_sq_meters.get(id).copied())
            .unwrap_or(self.world_area_sq_meters)
    }

    /// Denominator used for a neighbourhood leaderboard within `scope`.
    pub fn neighborhood_area_for(&self, scope: &Scope, neighborhood: &str) -> f64 {
        self.neighborhood_area_sq_meters
            .get(neighborhood)
            .copied()
            .unwrap_or_else(|| self.world_area_for(scope))
    }
}
