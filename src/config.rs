//! Navigation engine configuration.

use serde::Deserialize;

/// Threshold configuration for the navigation engine.
///
/// The appliance deserializes this from its settings file; every field
/// falls back to the documented default when absent.
#[derive(Clone, Debug, Deserialize)]
pub struct NavConfig {
    /// Distance from the route start beyond which the engine reports
    /// off-road, in meters (default: 100)
    #[serde(default = "default_off_road_distance")]
    pub off_road_distance_m: f64,

    /// Radius within which a waypoint counts as reached, in meters
    /// (default: 30)
    #[serde(default = "default_waypoint_reached_distance")]
    pub waypoint_reached_distance_m: f64,

    /// Distance to the next turn at which the display switches to the
    /// turn screen, in meters (default: 200)
    #[serde(default = "default_turn_screen_distance")]
    pub turn_screen_distance_m: f64,

    /// Assumed average travel speed for ETA estimates, in km/h
    /// (default: 50)
    #[serde(default = "default_average_speed")]
    pub average_speed_kmh: f64,
}

fn default_off_road_distance() -> f64 {
    100.0
}

fn default_waypoint_reached_distance() -> f64 {
    30.0
}

fn default_turn_screen_distance() -> f64 {
    200.0
}

fn default_average_speed() -> f64 {
    50.0
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            off_road_distance_m: default_off_road_distance(),
            waypoint_reached_distance_m: default_waypoint_reached_distance(),
            turn_screen_distance_m: default_turn_screen_distance(),
            average_speed_kmh: default_average_speed(),
        }
    }
}
