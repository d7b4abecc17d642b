//! # Territory Resolution
//!
//! Decides which part of every claim polygon survives as exclusive territory.
//!
//! ## Algorithm
//! 1. Build a claim region for every activity with a usable polygon; skip the rest
//! 2. Order claims by timestamp, then activity id (a total order)
//! 3. For each claim, subtract every *later* claim by a *different* user
//!    whose bounding box touches it (R-tree lookup), in chronological order
//! 4. Whatever survives is credited to the claim's owner
//!
//! A user's own later loops never cut their earlier ones. Each claim's
//! survival depends only on the immutable claim list, so with the `parallel`
//! feature the per-claim work is spread across threads; crediting still
//! happens in chronological order, so the output is identical.
//!
//! Cost is O(n²) differences in the worst case (every claim overlapping every
//! other), which is fine for hundreds of activities per period.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, info};
use rstar::RTree;

use crate::geometry::GeometryEngine;
use crate::{Activity, Bounds, ClaimBounds, TerritoryConfig};

/// One user's surviving territory for a period.
#[derive(Debug, Clone)]
pub struct ResolvedTerritory<R> {
    pub user_id: String,
    /// Surviving regions in chronological claim order
    pub regions: Vec<R>,
    /// Sum of region areas in square meters
    pub total_area_sq_meters: f64,
}

/// Counters describing one resolution run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    /// Activities offered to the resolver
    pub activities: usize,
    /// Activities that produced a claim
    pub claims: usize,
    /// Activities with a polygon that was unusable
    pub skipped: usize,
    /// Claims completely cut away by later claims
    pub overwritten: usize,
    /// Claims with some territory left
    pub surviving: usize,
}

/// Output of [`resolve_territories`].
#[derive(Debug, Clone)]
pub struct Resolution<R> {
    /// Keyed by user id; one entry per user with at least one claim
    pub territories: BTreeMap<String, ResolvedTerritory<R>>,
    pub stats: ResolutionStats,
}

impl<R> Resolution<R> {
    /// Total surviving area for `user_id` (0 if the user has no claims).
    pub fn total_area(&self, user_id: &str) -> f64 {
        self.territories
            .get(user_id)
            .map_or(0.0, |t| t.total_area_sq_meters)
    }
}

/// A claim built from one activity for the duration of a run.
struct Claim<'a, R> {
    activity_id: &'a str,
    user_id: &'a str,
    timestamp: DateTime<Utc>,
    region: R,
    bounds: Bounds,
}

/// Resolve every claim in `activities` using later-wins semantics.
///
/// Activities without a polygon contribute nothing. Activities whose polygon
/// is degenerate are skipped and counted in [`ResolutionStats::skipped`]; the
/// run always completes for the remaining claims.
pub fn resolve_territories<E: GeometryEngine>(
    engine: &E,
    activities: &[Activity],
    config: &TerritoryConfig,
) -> Resolution<E::Region> {
    let start = Instant::now();
    let mut stats = ResolutionStats {
        activities: activities.len(),
        ..Default::default()
    };

    let claims = build_claims(engine, activities, &mut stats);
    stats.claims = claims.len();

    let rtree = RTree::bulk_load(
        claims
            .iter()
            .enumerate()
            .map(|(index, c)| ClaimBounds { index, bounds: c.bounds })
            .collect(),
    );

    #[cfg(feature = "parallel")]
    let survivors: Vec<Option<E::Region>> = {
        use rayon::prelude::*;
        (0..claims.len())
            .into_par_iter()
            .map(|i| surviving_region(engine, &claims, &rtree, i))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let survivors: Vec<Option<E::Region>> = (0..claims.len())
        .map(|i| surviving_region(engine, &claims, &rtree, i))
        .collect();

    let mut territories: BTreeMap<String, ResolvedTerritory<E::Region>> = BTreeMap::new();
    for (claim, survivor) in claims.iter().zip(survivors) {
        let territory = territories
            .entry(claim.user_id.to_string())
            .or_insert_with(|| ResolvedTerritory {
                user_id: claim.user_id.to_string(),
                regions: Vec::new(),
                total_area_sq_meters: 0.0,
            });

        match survivor.and_then(|r| engine.drop_slivers(r, config.sliver_area_sq_meters)) {
            Some(region) => {
                territory.total_area_sq_meters += engine.area(&region).max(0.0);
                territory.regions.push(region);
                stats.surviving += 1;
            }
            None => {
                debug!("[TerritoryResolver] Claim {} fully overwritten", claim.activity_id);
                stats.overwritten += 1;
            }
        }
    }

    info!(
        "[TerritoryResolver] {} activities -> {} claims ({} skipped), {} surviving, {} overwritten, {} users in {:?}",
        stats.activities,
        stats.claims,
        stats.skipped,
        stats.surviving,
        stats.overwritten,
        territories.len(),
        start.elapsed()
    );

    Resolution { territories, stats }
}

/// Build claims and sort them into the total chronological order.
fn build_claims<'a, E: GeometryEngine>(
    engine: &E,
    activities: &'a [Activity],
    stats: &mut ResolutionStats,
) -> Vec<Claim<'a, E::Region>> {
    let mut claims: Vec<Claim<'a, E::Region>> = Vec::with_capacity(activities.len());

    for activity in activities {
        let Some(ring) = activity.polygon.as_deref() else {
            continue;
        };

        let region = match engine.claim_region(ring) {
            Ok(region) => region,
            Err(e) => {
                debug!("[TerritoryResolver] Skipping activity {}: {}", activity.id, e);
                stats.skipped += 1;
                continue;
            }
        };

        let Some(bounds) = engine.bounds(&region) else {
            debug!("[TerritoryResolver] Skipping activity {}: empty region", activity.id);
            stats.skipped += 1;
            continue;
        };

        claims.push(Claim {
            activity_id: &activity.id,
            user_id: &activity.user_id,
            timestamp: activity.timestamp,
            region,
            bounds,
        });
    }

    claims.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.activity_id.cmp(b.activity_id))
            .then_with(|| a.user_id.cmp(b.user_id))
    });

    claims
}

/// What remains of claim `i` after every later claim by another user.
fn surviving_region<E: GeometryEngine>(
    engine: &E,
    claims: &[Claim<'_, E::Region>],
    rtree: &RTree<ClaimBounds>,
    i: usize,
) -> Option<E::Region> {
    let claim = &claims[i];

    let mut cutters: Vec<usize> = rtree
        .locate_in_envelope_intersecting(&claim.bounds.envelope())
        .map(|b| b.index)
        .filter(|&j| j > i && claims[j].user_id != claim.user_id)
        .collect();
    cutters.sort_unstable();

    let mut remaining = claim.region.clone();
    for j in cutters {
        remaining = engine.subtract(&remaining, &claims[j].region)?;
    }
    Some(remaining)
}

// =============================================================================
// Unit Tests
// =============================================================================
