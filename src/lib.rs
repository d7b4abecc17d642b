//! # Territory Engine
//!
//! Territory resolution and live rankings for a GPS "territory painting" game.
//!
//! Runners upload closed-loop activities; each loop becomes a polygon claim.
//! This library decides who currently owns which patch of the city:
//! - Claims are ordered chronologically and a later claim by a *different*
//!   user cuts away the overlapping part of every earlier claim
//! - A user's own later loops never erode their earlier ones
//! - Surviving regions are measured geodesically and turned into a
//!   deterministic ranking with percent-of-city figures
//!
//! ## Features
//!
//! - **`parallel`** - Resolve claims in parallel with rayon
//! - **`http`** - Enable the HTTP-backed [`TerritoryStore`]
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use territory_engine::{
//!     Activity, MemoryStore, Period, Scope, TerritoryConfig, TerritoryService, UserProfile,
//! };
//! use chrono::{TimeZone, Utc};
//!
//! let square = vec![
//!     [2.1700, 41.3800],
//!     [2.1710, 41.3800],
//!     [2.1710, 41.3810],
//!     [2.1700, 41.3810],
//! ];
//!
//! let store = MemoryStore::new()
//!     .with_user(UserProfile::new("u1", "anna", "#FF6B35"))
//!     .with_user(UserProfile::new("u2", "marc", "#3B82F6"))
//!     .with_activity(Activity::new("a1", "u1", Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(), Some(square.clone())))
//!     .with_activity(Activity::new("a2", "u2", Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap(), Some(square)));
//!
//! let service = TerritoryService::new(store, TerritoryConfig::default());
//! let period = Period::month(2024, 5).unwrap();
//!
//! let rankings = futures::executor::block_on(service.rankings(&period, &Scope::World)).unwrap();
//! assert_eq!(rankings[0].username, "marc");
//! assert_eq!(rankings[1].total_area_sq_meters, 0.0);
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use rstar::{RTreeObject, AABB};
use serde::{Deserialize, Serialize};

pub mod config;
pub use config::TerritoryConfig;

pub mod error;
pub use error::TerritoryError;

// Geometry primitives and the engine seam the resolver is generic over
pub mod geometry;
pub use geometry::{GeoEngine, GeometryEngine, GeometryError, PolygonCoordinates};

pub mod difference;
pub use difference::subtract;

pub mod resolver;
pub use resolver::{resolve_territories, Resolution, ResolutionStats, ResolvedTerritory};

pub mod ranking;
pub use ranking::{rank_territories, NeighborhoodRanking, RankedEntry};

pub mod titles;
pub use titles::{award_titles, MonthlyTitle, TitleType};

pub mod service;
pub use service::{TerritoryEntry, TerritoryService, TerritoryStore};

pub mod store;
pub use store::MemoryStore;

// HTTP-backed store
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{HttpStore, HttpStoreConfig};

/// Paint colour assigned to profiles that don't carry one.
pub const DEFAULT_PAINT_COLOR: &str = "#FF6B35";

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// Activity rings travel as `[lon, lat]` pairs; this type is the validated view
/// of one vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Create a point from a GeoJSON-ordered `[lon, lat]` pair.
    pub fn from_lon_lat(pair: [f64; 2]) -> Self {
        Self::new(pair[1], pair[0])
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box of a claim region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// The bounds as an R-tree envelope (x = longitude, y = latitude).
    pub fn envelope(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min_lng, self.min_lat], [self.max_lng, self.max_lat])
    }
}

/// Bounding box of one claim, indexed by its chronological position.
#[derive(Debug, Clone)]
pub(crate) struct ClaimBounds {
    pub index: usize,
    pub bounds: Bounds,
}

impl RTreeObject for ClaimBounds {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.bounds.envelope()
    }
}

/// An uploaded activity, as delivered by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// Unique activity identifier (secondary sort key for equal timestamps)
    pub id: String,
    /// Owner of the activity
    pub user_id: String,
    /// When the activity was recorded (UTC)
    pub timestamp: DateTime<Utc>,
    /// Closed-loop ring as `[lon, lat]` pairs, if a loop was detected
    #[serde(default)]
    pub polygon: Option<Vec<[f64; 2]>>,
    /// Raw loop area recorded at upload time (informational)
    #[serde(default)]
    pub area_sq_meters: f64,
    /// Month key (`YYYY-MM`) assigned at upload time, if any
    #[serde(default)]
    pub month_key: Option<String>,
    /// Neighbourhood the loop was detected in at upload time, if any
    #[serde(default)]
    pub neighborhood_name: Option<String>,
}

impl Activity {
    /// Create an activity with no stored area, month key or neighbourhood.
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        polygon: Option<Vec<[f64; 2]>>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            timestamp,
            polygon,
            area_sq_meters: 0.0,
            month_key: None,
            neighborhood_name: None,
        }
    }

    /// Tag the activity with the neighbourhood it was recorded in.
    pub fn in_neighborhood(mut self, name: impl Into<String>) -> Self {
        self.neighborhood_name = Some(name.into());
        self
    }
}

/// A user as seen by the ranking: identity plus display attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    #[serde(default = "default_paint_color")]
    pub paint_color: String,
}

impl UserProfile {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        paint_color: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            paint_color: paint_color.into(),
        }
    }
}

fn default_paint_color() -> String {
    DEFAULT_PAINT_COLOR.to_string()
}

/// Time window over which claims are resolved independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    /// Every activity ever uploaded
    AllTime,
    /// One UTC calendar month
    Month { year: i32, month: u32 },
}

impl Period {
    /// Create a monthly period. Fails if `month` is not in `1..=12`.
    pub fn month(year: i32, month: u32) -> Result<Self, TerritoryError> {
        if !(1..=12).contains(&month) {
            return Err(TerritoryError::InvalidPeriod(format!("{year}-{month:02}")));
        }
        Ok(Period::Month { year, month })
    }

    /// The monthly period containing `timestamp`.
    pub fn containing(timestamp: DateTime<Utc>) -> Self {
        Period::Month {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }

    /// The `YYYY-MM` key, or `None` for [`Period::AllTime`].
    pub fn key(&self) -> Option<String> {
        match self {
            Period::AllTime => None,
            Period::Month { year, month } => Some(format!("{year:04}-{month:02}")),
        }
    }

    /// Whether an activity falls in this period.
    ///
    /// A month key stamped on the activity at upload time takes precedence
    /// over its timestamp.
    pub fn contains(&self, activity: &Activity) -> bool {
        match self {
            Period::AllTime => true,
            Period::Month { .. } => match &activity.month_key {
                Some(key) => self.key().as_deref() == Some(key.as_str()),
                None => Period::containing(activity.timestamp) == *self,
            },
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key() {
            Some(key) => f.write_str(&key),
            None => f.write_str("all"),
        }
    }
}

impl FromStr for Period {
    type Err = TerritoryError;

    /// Parse `YYYY-MM` or `all`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Period::AllTime);
        }
        let invalid = || TerritoryError::InvalidPeriod(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Period::month(year, month)
    }
}

/// Population of users a query considers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// All registered users
    World,
    /// Members of one private group
    Group(String),
}

impl Scope {
    /// The group id, if this is a group scope.
    pub fn group_id(&self) -> Option<&str> {
        match self {
            Scope::World => None,
            Scope::Group(id) => Some(id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::World => f.write_str("world"),
            Scope::Group(id) => write!(f, "group:{id}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
