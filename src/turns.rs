//! Turn-by-turn waypoint synthesis.
//!
//! Derives maneuver waypoints from a bare polyline for routes that come
//! without explicit maneuver data. The polyline is scanned at a fixed
//! along-path step; at each scan position the bearing change between a
//! look-back and a look-ahead window classifies the turn.

use log::debug;

use crate::geo::{self, Point};
use crate::route::{ManeuverType, Waypoint};

/// Look-back/look-ahead window for the bearing comparison, in meters.
pub const SEGMENT_DISTANCE_M: f64 = 30.0;

/// Along-path scan step, in meters.
pub const SCAN_STEP_M: f64 = 10.0;

/// Minimum bearing-change magnitude that qualifies as a reportable turn.
pub const TURN_THRESHOLD_DEG: f64 = 25.0;

/// Minimum along-path spacing between emitted waypoints, in meters.
pub const MIN_WAYPOINT_SPACING_M: f64 = 50.0;

/// Synthesize DEPART .. turns .. ARRIVE waypoints from a polyline.
///
/// Returns an empty list for fewer than 2 points; callers validate the
/// geometry before navigating. The emitted `distance_m` values always
/// sum to the polyline's cumulative length.
pub fn synthesize_waypoints(geometry: &[Point], destination: Option<&str>) -> Vec<Waypoint> {
    if geometry.len() < 2 {
        return Vec::new();
    }

    // Cumulative along-path distance at every vertex
    let mut cumulative = Vec::with_capacity(geometry.len());
    let mut total = 0.0;
    cumulative.push(total);
    for w in geometry.windows(2) {
        total += geo::distance(&w[0], &w[1]);
        cumulative.push(total);
    }

    let mut waypoints = vec![Waypoint {
        position: geometry[0],
        instruction: ManeuverType::Depart.instruction(None),
        maneuver: ManeuverType::Depart,
        distance_m: 0.0,
        index: 0,
    }];
    let mut last_emitted_at = 0.0;

    let mut scan = 2.0 * SEGMENT_DISTANCE_M;
    while scan <= total - SEGMENT_DISTANCE_M {
        let behind = vertex_at(&cumulative, scan - SEGMENT_DISTANCE_M);
        let current = vertex_at(&cumulative, scan);
        let ahead = vertex_at(&cumulative, scan + SEGMENT_DISTANCE_M);

        // Sparse stretches collapse the window onto a single vertex;
        // no bearing can be derived there.
        if behind != current && current != ahead {
            let incoming = geo::bearing(&geometry[behind], &geometry[current]);
            let outgoing = geo::bearing(&geometry[current], &geometry[ahead]);
            let angle = normalize_turn_angle(outgoing - incoming);

            if angle.abs() >= TURN_THRESHOLD_DEG
                && scan - last_emitted_at >= MIN_WAYPOINT_SPACING_M
            {
                let maneuver = classify_turn(angle);
                let index = waypoints.len();
                waypoints.push(Waypoint {
                    position: geometry[current],
                    instruction: maneuver.instruction(None),
                    maneuver,
                    distance_m: scan - last_emitted_at,
                    index,
                });
                last_emitted_at = scan;
            }
        }

        scan += SCAN_STEP_M;
    }

    let index = waypoints.len();
    waypoints.push(Waypoint {
        position: geometry[geometry.len() - 1],
        instruction: ManeuverType::Arrive.instruction(destination),
        maneuver: ManeuverType::Arrive,
        distance_m: total - last_emitted_at,
        index,
    });

    debug!(
        "synthesized {} waypoints over {:.0} m of geometry",
        waypoints.len(),
        total
    );

    waypoints
}

/// Index of the last vertex at or before the given along-path distance.
fn vertex_at(cumulative: &[f64], distance: f64) -> usize {
    cumulative
        .partition_point(|&c| c <= distance)
        .saturating_sub(1)
}

/// Normalize a bearing difference into (-180, 180].
fn normalize_turn_angle(mut angle: f64) -> f64 {
    while angle > 180.0 {
        angle -= 360.0;
    }
    while angle <= -180.0 {
        angle += 360.0;
    }
    angle
}

/// Classify a signed turn angle (positive = right) into a maneuver.
fn classify_turn(angle: f64) -> ManeuverType {
    let magnitude = angle.abs();

    if magnitude < 20.0 {
        ManeuverType::Straight
    } else if magnitude < 50.0 {
        if angle > 0.0 { ManeuverType::SlightRight } else { ManeuverType::SlightLeft }
    } else if magnitude < 110.0 {
        if angle > 0.0 { ManeuverType::Right } else { ManeuverType::Left }
    } else if angle > 0.0 {
        ManeuverType::SharpRight
    } else {
        ManeuverType::SharpLeft
    }
}
