//! GPX route import.
//!
//! Wraps the `gpx` crate to turn a GPX 1.1 file into a [`Route`] the
//! engine can navigate. Recorded tracks are preferred (their segments
//! are flattened into one point list); planned GPX routes are the
//! fallback. The imported route carries geometry only; maneuver
//! waypoints are synthesized when navigation starts.

use std::io::Read;

use thiserror::Error;

use crate::geo::Point;
use crate::route::Route;

/// GPX import error type.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("gpx parse error: {0}")]
    Parse(String),

    #[error("no track or route with at least 2 points")]
    NoPath,
}

/// Parse a GPX file into a navigable route.
///
/// `average_speed_kmh` feeds the imported route's time estimate.
pub fn route_from_gpx<R: Read>(reader: R, average_speed_kmh: f64) -> Result<Route, ImportError> {
    let data = gpx::read(reader).map_err(|e| ImportError::Parse(e.to_string()))?;

    let track = data
        .tracks
        .iter()
        .find(|t| t.segments.iter().map(|s| s.points.len()).sum::<usize>() >= 2);

    let (name, points): (Option<String>, Vec<Point>) = if let Some(track) = track {
        let points = track
            .segments
            .iter()
            .flat_map(|seg| seg.points.iter())
            .map(|wp| Point::new(wp.point().y(), wp.point().x()))
            .collect();
        (track.name.clone(), points)
    } else if let Some(route) = data.routes.iter().find(|r| r.points.len() >= 2) {
        let points = route
            .points
            .iter()
            .map(|wp| Point::new(wp.point().y(), wp.point().x()))
            .collect();
        (route.name.clone(), points)
    } else {
        return Err(ImportError::NoPath);
    };

    Ok(Route::from_geometry(
        name.as_deref().unwrap_or(""),
        points,
        average_speed_kmh,
    ))
}
