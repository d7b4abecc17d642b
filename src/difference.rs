//! Polygon difference with a conservative failure policy.
//!
//! `subtract(base, cutter)` is the only operation the resolver needs from the
//! boolean-ops engine. Any failure (non-finite input, an engine panic,
//! non-finite output) is reported as `None`, the same as "cutter covers base":
//! a geometry failure always favours the later claimant.

use std::panic::{self, AssertUnwindSafe};

use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, CoordsIter, MultiPolygon, Polygon};
use log::warn;

/// Planar set difference `base - cutter`.
///
/// Returns `None` when nothing survives or when the operation could not be
/// computed. Otherwise returns the remaining pieces, which may be disjoint,
/// with exteriors counter-clockwise. Zero-area pieces left by the engine are
/// dropped.
pub fn subtract(base: &MultiPolygon<f64>, cutter: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
    if !is_finite(base) || !is_finite(cutter) {
        warn!("[Difference] Non-finite input, treating claim as overwritten");
        return None;
    }

    let result = match panic::catch_unwind(AssertUnwindSafe(|| base.difference(cutter))) {
        Ok(result) => result,
        Err(_) => {
            warn!("[Difference] Boolean-ops engine failed, treating claim as overwritten");
            return None;
        }
    };

    if !is_finite(&result) {
        warn!("[Difference] Non-finite output, treating claim as overwritten");
        return None;
    }

    let pieces: Vec<Polygon<f64>> = result
        .into_iter()
        .filter(|p| p.unsigned_area() > 0.0)
        .collect();

    if pieces.is_empty() {
        None
    } else {
        Some(MultiPolygon::new(pieces).orient(Direction::Default))
    }
}

fn is_finite(region: &MultiPolygon<f64>) -> bool {
    region.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite())
}
