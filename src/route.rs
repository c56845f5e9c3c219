//! Route data model.
//!
//! Routes, waypoints and maneuver types as consumed by the navigation
//! engine and persisted by route stores. All structures serialize with
//! serde; the serialized form is the persisted route representation and
//! round-trips every field, including `created_at` as a typed timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{self, Point};

/// The classified kind of turn or action at a waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManeuverType {
    Depart,
    Straight,
    SlightLeft,
    Left,
    SharpLeft,
    SlightRight,
    Right,
    SharpRight,
    UTurn,
    Arrive,
    Merge,
    ForkLeft,
    ForkRight,
    RampLeft,
    RampRight,
    Roundabout,
    RoundaboutExit1,
    RoundaboutExit2,
    RoundaboutExit3,
    RoundaboutExit4,
    RoundaboutExit5,
    RoundaboutExit6,
    RoundaboutExit7,
    RoundaboutExit8,
}

impl ManeuverType {
    /// Instruction text for this maneuver.
    ///
    /// The arrival instruction names the destination when a label is
    /// known.
    pub fn instruction(&self, destination: Option<&str>) -> String {
        use ManeuverType::*;

        match self {
            Depart => "Depart".to_string(),
            Straight => "Continue straight".to_string(),
            SlightLeft => "Keep slightly left".to_string(),
            Left => "Turn left".to_string(),
            SharpLeft => "Turn sharp left".to_string(),
            SlightRight => "Keep slightly right".to_string(),
            Right => "Turn right".to_string(),
            SharpRight => "Turn sharp right".to_string(),
            UTurn => "Make a U-turn".to_string(),
            Arrive => match destination {
                Some(name) if !name.is_empty() => format!("Arrive at {name}"),
                _ => "Arrive".to_string(),
            },
            Merge => "Merge".to_string(),
            ForkLeft => "Keep left at the fork".to_string(),
            ForkRight => "Keep right at the fork".to_string(),
            RampLeft => "Take the ramp on the left".to_string(),
            RampRight => "Take the ramp on the right".to_string(),
            Roundabout => "Enter the roundabout".to_string(),
            RoundaboutExit1 => "Take exit 1 in the roundabout".to_string(),
            RoundaboutExit2 => "Take exit 2 in the roundabout".to_string(),
            RoundaboutExit3 => "Take exit 3 in the roundabout".to_string(),
            RoundaboutExit4 => "Take exit 4 in the roundabout".to_string(),
            RoundaboutExit5 => "Take exit 5 in the roundabout".to_string(),
            RoundaboutExit6 => "Take exit 6 in the roundabout".to_string(),
            RoundaboutExit7 => "Take exit 7 in the roundabout".to_string(),
            RoundaboutExit8 => "Take exit 8 in the roundabout".to_string(),
        }
    }
}

/// A point along a route at which a maneuver instruction applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub position: Point,
    /// Human-readable instruction text.
    pub instruction: String,
    pub maneuver: ManeuverType,
    /// Distance from the previous waypoint in meters.
    pub distance_m: f64,
    /// Position in the route's waypoint sequence.
    pub index: usize,
}

/// A planned route: an ordered polyline plus maneuver waypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    /// Destination label shown on the arrival screen.
    pub destination: String,
    pub created_at: DateTime<Utc>,
    pub start: Point,
    pub end: Point,
    pub waypoints: Vec<Waypoint>,
    /// Raw polyline. May be empty for routes supplied with explicit
    /// waypoints only.
    #[serde(default)]
    pub geometry: Vec<Point>,
    pub total_distance_m: f64,
    pub estimated_time_s: u64,
}

impl Route {
    /// Build a route from bare geometry.
    ///
    /// Waypoints stay empty; the engine synthesizes them when navigation
    /// starts. The id stays empty until a store assigns one.
    pub fn from_geometry(destination: &str, geometry: Vec<Point>, average_speed_kmh: f64) -> Self {
        let total = geo::path_length(&geometry);
        let start = geometry.first().copied().unwrap_or(Point::new(0.0, 0.0));
        let end = geometry.last().copied().unwrap_or(start);
        let estimated = if average_speed_kmh > 0.0 {
            (total / (average_speed_kmh / 3.6)).round() as u64
        } else {
            0
        };

        Self {
            id: String::new(),
            destination: destination.to_string(),
            created_at: Utc::now(),
            start,
            end,
            waypoints: Vec::new(),
            geometry,
            total_distance_m: total,
            estimated_time_s: estimated,
        }
    }

    /// True when the route carries enough explicit waypoints to navigate.
    pub fn has_usable_waypoints(&self) -> bool {
        self.waypoints.len() >= 2
    }

    /// True when the route carries enough geometry to synthesize waypoints.
    pub fn has_usable_geometry(&self) -> bool {
        self.geometry.len() >= 2
    }

    /// Sum of the per-waypoint leg distances.
    pub fn waypoint_distance_sum(&self) -> f64 {
        self.waypoints.iter().map(|w| w.distance_m).sum()
    }
}

/// A single position fix from the GPS source (real or simulated).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ele: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing_deg: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PositionFix {
    /// A bare fix at the given coordinate, timestamped now.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            ele: None,
            speed_mps: None,
            bearing_deg: None,
            timestamp: Utc::now(),
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.lat, self.lon)
    }
}
