//! # Geometry Primitives
//!
//! Ring closing, polygon construction, and area measurement for claim polygons.
//!
//! Claims arrive as rings of `[lon, lat]` pairs in WGS84. Set operations run in
//! the planar lon/lat space (adequate at city scale), while areas are always
//! measured geodesically on the WGS84 ellipsoid so figures are comparable
//! across every call in a run.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`close_ring`] | Validate vertices and close an open ring |
//! | [`to_polygon`] | Build a claim region, repairing self-intersections |
//! | [`area`] | Geodesic area of a region in square meters |
//! | [`region_bounds`] | Bounding box of a region |
//! | [`region_coordinates`] | Nested coordinate arrays for rendering |
//!
//! The resolver never calls these directly: it is generic over
//! [`GeometryEngine`], and [`GeoEngine`] is the implementation backed by the
//! `geo` crate.
//!
//! ## Example
//!
//! ```rust
//! use territory_engine::geometry;
//!
//! let ring = geometry::close_ring(&[
//!     [2.1700, 41.3800],
//!     [2.1710, 41.3800],
//!     [2.1710, 41.3810],
//!     [2.1700, 41.3810],
//! ]).unwrap();
//! assert_eq!(ring.0.len(), 5); // first vertex appended
//!
//! let region = geometry::to_polygon(ring).unwrap();
//! let sq_meters = geometry::area(&region);
//! assert!(sq_meters > 9_000.0 && sq_meters < 9_500.0);
//! ```

use std::panic::{self, AssertUnwindSafe};

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, BoundingRect, Coord, GeodesicArea, Line, LineString, MultiPolygon, Polygon};
use log::debug;
use rstar::primitives::{GeomWithData, Line as EdgeLine};
use rstar::{RTree, AABB};
use thiserror::Error;

use crate::{Bounds, GpsPoint};

/// Planar area (degrees²) below which a repaired ring is treated as collapsed.
/// Roughly 0.01 m² at mid latitudes.
const MIN_RING_AREA_DEG2: f64 = 1e-12;

/// Vertices closer than this to the ring's baseline (degrees, ~0.1mm) count as on it.
const COLLINEAR_TOLERANCE_DEG: f64 = 1e-9;

/// Coordinates of one polygon: exterior ring first, then holes, as `[lon, lat]`.
pub type PolygonCoordinates = Vec<Vec<[f64; 2]>>;

/// Why a claim polygon could not be used.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("ring has {0} distinct valid vertices, need at least 3")]
    TooFewPoints(usize),

    #[error("ring encloses no area")]
    ZeroArea,

    #[error("ring self-intersects and could not be repaired")]
    SelfIntersection,
}

// =============================================================================
// Engine Seam
// =============================================================================

/// The geometry operations the territory resolver depends on.
///
/// Implementations must use one area measure consistently; the resolver
/// compares and sums the values it returns.
pub trait GeometryEngine: Send + Sync {
    /// A polygon or multi-polygon region.
    type Region: Clone + Send + Sync;

    /// Build a claim region from a (possibly open) `[lon, lat]` ring.
    fn claim_region(&self, ring: &[[f64; 2]]) -> Result<Self::Region, GeometryError>;

    /// `base - cutter`, or `None` if nothing survives or the operation failed.
    fn subtract(&self, base: &Self::Region, cutter: &Self::Region) -> Option<Self::Region>;

    /// Area in square meters.
    fn area(&self, region: &Self::Region) -> f64;

    /// Bounding box, or `None` for an empty region.
    fn bounds(&self, region: &Self::Region) -> Option<Bounds>;

    /// One entry per disjoint polygon.
    fn coordinates(&self, region: &Self::Region) -> Vec<PolygonCoordinates>;

    /// Remove pieces smaller than `min_area_sq_meters`; `None` if nothing is left.
    ///
    /// The default treats the region as a single piece.
    fn drop_slivers(&self, region: Self::Region, min_area_sq_meters: f64) -> Option<Self::Region> {
        if self.area(&region) < min_area_sq_meters {
            None
        } else {
            Some(region)
        }
    }
}

/// [`GeometryEngine`] backed by the `geo` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoEngine;

impl GeometryEngine for GeoEngine {
    type Region = MultiPolygon<f64>;

    fn claim_region(&self, ring: &[[f64; 2]]) -> Result<Self::Region, GeometryError> {
        to_polygon(close_ring(ring)?)
    }

    fn subtract(&self, base: &Self::Region, cutter: &Self::Region) -> Option<Self::Region> {
        crate::difference::subtract(base, cutter)
    }

    fn area(&self, region: &Self::Region) -> f64 {
        area(region)
    }

    fn bounds(&self, region: &Self::Region) -> Option<Bounds> {
        region_bounds(region)
    }

    fn coordinates(&self, region: &Self::Region) -> Vec<PolygonCoordinates> {
        region_coordinates(region)
    }

    fn drop_slivers(&self, region: Self::Region, min_area_sq_meters: f64) -> Option<Self::Region> {
        let pieces: Vec<Polygon<f64>> = region
            .into_iter()
            .filter(|p| p.orient(Direction::Default).geodesic_area_unsigned() >= min_area_sq_meters)
            .collect();
        if pieces.is_empty() {
            None
        } else {
            Some(MultiPolygon::new(pieces))
        }
    }
}

// =============================================================================
// Ring Construction
// =============================================================================

/// Close an ordered sequence of `[lon, lat]` vertices into a ring.
///
/// Invalid coordinates (non-finite or out of range) and consecutive duplicates
/// are dropped, then the first vertex is appended if the ring is open.
///
/// # Errors
///
/// - [`GeometryError::TooFewPoints`] if fewer than 3 distinct vertices remain
/// - [`GeometryError::ZeroArea`] if all vertices lie on one line
pub fn close_ring(coords: &[[f64; 2]]) -> Result<LineString<f64>, GeometryError> {
    let mut points: Vec<Coord<f64>> = Vec::with_capacity(coords.len() + 1);
    for &pair in coords {
        if !GpsPoint::from_lon_lat(pair).is_valid() {
            continue;
        }
        let c = Coord { x: pair[0], y: pair[1] };
        if points.last() != Some(&c) {
            points.push(c);
        }
    }

    // An already-closed input repeats its first vertex; don't count it twice
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }

    if points.len() < 3 {
        return Err(GeometryError::TooFewPoints(points.len()));
    }

    if is_collinear(&points) {
        return Err(GeometryError::ZeroArea);
    }

    points.push(points[0]);
    Ok(LineString::new(points))
}

/// Whether every vertex lies on the line through the first vertex and the
/// vertex farthest from it.
///
/// Signed area can't be used here: a symmetric figure eight sums to zero but
/// still encloses two valid lobes.
fn is_collinear(points: &[Coord<f64>]) -> bool {
    let a = points[0];
    let b = points
        .iter()
        .copied()
        .max_by(|p, q| {
            let dp = (p.x - a.x).hypot(p.y - a.y);
            let dq = (q.x - a.x).hypot(q.y - a.y);
            dp.total_cmp(&dq)
        })
        .unwrap_or(a);
    let len = (b.x - a.x).hypot(b.y - a.y);
    if len == 0.0 {
        return true;
    }

    points.iter().all(|p| {
        let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
        cross.abs() / len < COLLINEAR_TOLERANCE_DEG
    })
}

/// Build a claim region from a closed ring.
///
/// Simple rings become a single polygon. Self-intersecting rings (figure
/// eights, GPS spikes that double back) are resolved into their valid pieces by
/// the boolean-ops engine; if that yields nothing usable the ring is rejected.
///
/// The result is oriented: exteriors counter-clockwise, holes clockwise.
pub fn to_polygon(ring: LineString<f64>) -> Result<MultiPolygon<f64>, GeometryError> {
    let simple = !has_self_intersection(&ring);
    let polygon = Polygon::new(ring, vec![]);

    if simple {
        return Ok(MultiPolygon::new(vec![polygon]).orient(Direction::Default));
    }

    debug!("[Geometry] Repairing self-intersecting ring");
    let raw = MultiPolygon::new(vec![polygon]);
    let repaired = panic::catch_unwind(AssertUnwindSafe(|| {
        MultiPolygon::<f64>::new(vec![]).union(&raw)
    }))
    .map_err(|_| GeometryError::SelfIntersection)?;

    if repaired.0.is_empty() || repaired.unsigned_area() < MIN_RING_AREA_DEG2 {
        return Err(GeometryError::SelfIntersection);
    }
    Ok(repaired.orient(Direction::Default))
}

/// Edge of a ring, tagged with its position.
type IndexedEdge = GeomWithData<EdgeLine<[f64; 2]>, usize>;

/// Whether any two non-adjacent edges of a closed ring touch, or adjacent
/// edges fold back over each other.
///
/// Candidate edge pairs come from an R-tree of edge envelopes, so only edges
/// whose boxes overlap are tested exactly.
fn has_self_intersection(ring: &LineString<f64>) -> bool {
    let lines: Vec<Line<f64>> = ring.lines().collect();
    let n = lines.len();

    for i in 0..n {
        let next = (i + 1) % n;
        if let Some(LineIntersection::Collinear { .. }) = line_intersection(lines[i], lines[next]) {
            return true;
        }
    }

    let edges: RTree<IndexedEdge> = RTree::bulk_load(
        lines
            .iter()
            .enumerate()
            .map(|(i, l)| GeomWithData::new(EdgeLine::new([l.start.x, l.start.y], [l.end.x, l.end.y]), i))
            .collect(),
    );

    lines.iter().enumerate().any(|(i, line)| {
        edges
            .locate_in_envelope_intersecting(&edge_envelope(line))
            .map(|e| e.data)
            // Adjacent edges share a vertex; first and last share the closing one
            .filter(|&j| j >= i + 2 && !(i == 0 && j == n - 1))
            .any(|j| line_intersection(*line, lines[j]).is_some())
    })
}

fn edge_envelope(line: &Line<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([line.start.x, line.start.y], [line.end.x, line.end.y])
}

// =============================================================================
// Measurement
// =============================================================================

/// Geodesic area of a region in square meters (WGS84 ellipsoid).
///
/// Holes are subtracted; the result is never negative. Ring winding doesn't
/// matter: on the ellipsoid a clockwise exterior would otherwise measure the
/// rest of the globe, so the region is oriented first.
pub fn area(region: &MultiPolygon<f64>) -> f64 {
    region.orient(Direction::Default).geodesic_area_unsigned()
}

/// Bounding box of a region, or `None` if it is empty.
pub fn region_bounds(region: &MultiPolygon<f64>) -> Option<Bounds> {
    let rect = region.bounding_rect()?;
    Some(Bounds {
        min_lat: rect.min().y,
        max_lat: rect.max().y,
        min_lng: rect.min().x,
        max_lng: rect.max().x,
    })
}

/// Nested `[lon, lat]` arrays, one entry per disjoint polygon, each holding the
/// exterior ring followed by any holes (GeoJSON polygon nesting).
pub fn region_coordinates(region: &MultiPolygon<f64>) -> Vec<PolygonCoordinates> {
    region
        .iter()
        .map(|polygon| {
            std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
                .collect()
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
