//! Geometry primitives for route navigation.
//!
//! Stateless helpers shared by the waypoint synthesizer and the
//! navigation engine. All coordinates use WGS84 (lat/lon in degrees),
//! all distances are meters, all bearings are degrees clockwise from
//! north.

use serde::{Deserialize, Serialize};

/// A geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Result of projecting a position onto a path.
#[derive(Debug, Clone, Serialize)]
pub struct PathProjection {
    /// Nearest point on the path.
    pub point: Point,
    /// Index of the segment start vertex (0-based).
    pub segment_index: usize,
    /// Distance from the position to the nearest point, in meters.
    pub distance_m: f64,
    /// Distance along the path from its start to the projected point, in meters.
    pub distance_along_m: f64,
}

/// Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude (and of longitude at the equator).
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Haversine distance between two points in meters.
pub fn distance(a: &Point, b: &Point) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Initial bearing from point A to point B in degrees [0, 360).
pub fn bearing(a: &Point, b: &Point) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    let deg = y.atan2(x).to_degrees();
    (deg + 360.0) % 360.0
}

/// Shortest distance from `p` to the line segment A-B, in meters.
///
/// Uses a flat-Earth projection centered on `p` (longitude scaled by
/// the latitude cosine), accurate for segments up to a few kilometers.
/// A zero-length segment degenerates to the distance to its start.
pub fn distance_to_segment(p: &Point, a: &Point, b: &Point) -> f64 {
    let cos_lat = p.lat.to_radians().cos();
    let m_per_deg_lon = METERS_PER_DEGREE * cos_lat;

    let ax = (a.lon - p.lon) * m_per_deg_lon;
    let ay = (a.lat - p.lat) * METERS_PER_DEGREE;
    let bx = (b.lon - p.lon) * m_per_deg_lon;
    let by = (b.lat - p.lat) * METERS_PER_DEGREE;

    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;

    if len_sq < 1e-12 {
        return distance(p, a);
    }

    // Project the origin (= p) onto the segment, clamped to [0, 1]
    let t = (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0);
    let nx = ax + t * dx;
    let ny = ay + t * dy;

    (nx * nx + ny * ny).sqrt()
}

/// Total length of a polyline in meters.
pub fn path_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| distance(&w[0], &w[1])).sum()
}

/// Project a position onto the nearest segment of a path.
///
/// Returns None if the path has fewer than 2 points. Intended for
/// consumers that snap a position marker onto the drawn route.
pub fn nearest_on_path(position: &Point, path: &[Point]) -> Option<PathProjection> {
    if path.len() < 2 {
        return None;
    }

    let mut best: Option<PathProjection> = None;
    let mut cumulative = 0.0;

    for (i, seg) in path.windows(2).enumerate() {
        let a = &seg[0];
        let b = &seg[1];

        let dist = distance_to_segment(position, a, b);
        let projected = project_on_segment(position, a, b);
        let along = cumulative + distance(a, &projected);

        let better = best.as_ref().map_or(true, |prev| dist < prev.distance_m);
        if better {
            best = Some(PathProjection {
                point: projected,
                segment_index: i,
                distance_m: dist,
                distance_along_m: along,
            });
        }

        cumulative += distance(a, b);
    }

    best
}

/// Nearest point on segment A-B to `p`, using the same flat-Earth
/// projection as [`distance_to_segment`].
fn project_on_segment(p: &Point, a: &Point, b: &Point) -> Point {
    let cos_lat = p.lat.to_radians().cos();

    let dx = (b.lon - a.lon) * cos_lat;
    let dy = b.lat - a.lat;
    let px = (p.lon - a.lon) * cos_lat;
    let py = p.lat - a.lat;

    let len_sq = dx * dx + dy * dy;
    if len_sq < 1e-20 {
        return *a;
    }

    let t = ((px * dx + py * dy) / len_sq).clamp(0.0, 1.0);
    Point {
        lat: a.lat + t * (b.lat - a.lat),
        lon: a.lon + t * (b.lon - a.lon),
    }
}
