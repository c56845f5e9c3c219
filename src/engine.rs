//! Navigation engine.
//!
//! Owns the active route, the navigation state machine and the derived
//! progress metrics. An external position source pushes fixes into
//! [`NavigationEngine::update_position`]; the engine classifies the
//! relationship to the route (on-route, approaching a turn, off-road,
//! arrived) and fans out [`NavigationUpdate`] events to subscribers.
//!
//! The engine is single-threaded and reactive: every mutating entry
//! point takes `&mut self` and callers serialize access. There are no
//! background tasks and no suspension points; the drive cadence is
//! owned entirely by the position source.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::NavConfig;
use crate::error::{NavError, Result};
use crate::geo::{self, Point};
use crate::notify::{SubscriptionId, Subscribers};
use crate::route::{PositionFix, Route, Waypoint};
use crate::store::{MemoryRouteStore, RouteStore, RouteSummary, StoreError};
use crate::turns;

/// Latitude/longitude magnitude below which a fix counts as "no fix"
/// while simulation mode is active. A real receiver without a fix
/// reports (0, 0), which must not clobber a simulated position.
const NO_FIX_EPSILON_DEG: f64 = 0.001;

/// Navigation state as seen by consumers.
///
/// `Cancelled` is transient: it appears only in the snapshot delivered
/// when navigation stops and is never readable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationState {
    Idle,
    Navigating,
    OffRoad,
    Arrived,
    Cancelled,
}

/// What the low-refresh display should currently show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Nothing to draw, navigation is idle.
    Blank,
    /// Route overview: distance remaining and ETA.
    Progress,
    /// Turn screen: maneuver arrow for the upcoming waypoint.
    Turn,
    /// Arrow and distance back toward the route.
    OffRoad,
    /// Arrival screen.
    Arrived,
}

/// Why a navigation update fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Status,
    WaypointReached,
    TurnApproaching,
    OffRoad,
    Arrived,
}

/// Complete snapshot of the engine's derived state.
///
/// Recomputed on demand, never persisted. Optional fields are present
/// only in the states where they are meaningful.
#[derive(Debug, Clone, Serialize)]
pub struct NavigationStatus {
    pub state: NavigationState,
    pub display_mode: DisplayMode,
    pub waypoint_index: usize,
    pub distance_to_next_turn_m: f64,
    pub distance_remaining_m: f64,
    pub time_remaining_s: u64,
    /// Share of the total route distance already covered, 0-100.
    pub progress_pct: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_turn: Option<Waypoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing_to_route_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_to_route_m: Option<f64>,
}

/// A navigation lifecycle event. The status is always a complete,
/// self-consistent snapshot regardless of the kind.
#[derive(Debug, Clone, Serialize)]
pub struct NavigationUpdate {
    pub kind: UpdateKind,
    pub status: NavigationStatus,
    pub timestamp: DateTime<Utc>,
}

/// Per-route navigation state, alive from start to stop.
#[derive(Debug)]
struct Session {
    route: Route,
    /// Index of the waypoint currently being approached. Equals the
    /// waypoint count once the final waypoint has been consumed.
    cursor: usize,
    distance_to_next_turn_m: f64,
    distance_remaining_m: f64,
    /// Edge trigger for the turn-approaching event.
    turn_alerted: bool,
}

impl Session {
    fn new(route: Route) -> Self {
        Self {
            route,
            cursor: 0,
            distance_to_next_turn_m: 0.0,
            distance_remaining_m: 0.0,
            turn_alerted: false,
        }
    }

    /// Refresh the distance metrics for the current cursor.
    fn recompute_metrics(&mut self, position: Option<&Point>) {
        if self.cursor >= self.route.waypoints.len() {
            self.distance_to_next_turn_m = 0.0;
            self.distance_remaining_m = 0.0;
            return;
        }

        let target = &self.route.waypoints[self.cursor].position;
        self.distance_to_next_turn_m = match position {
            Some(p) => geo::distance(p, target),
            None => 0.0,
        };

        let after: f64 = self.route.waypoints[self.cursor + 1..]
            .iter()
            .map(|w| w.distance_m)
            .sum();
        self.distance_remaining_m = self.distance_to_next_turn_m + after;
    }
}

/// Engine phase. The session payload exists only in active states, so
/// off-road metrics cannot outlive the route they describe.
#[derive(Debug)]
enum Phase {
    Idle,
    Navigating(Session),
    OffRoad {
        session: Session,
        distance_to_route_m: f64,
        bearing_to_route_deg: f64,
    },
    Arrived(Session),
}

/// The navigation engine.
pub struct NavigationEngine {
    config: NavConfig,
    store: Box<dyn RouteStore>,
    initialized: bool,
    simulation_mode: bool,
    last_fix: Option<PositionFix>,
    phase: Phase,
    nav_subscribers: Subscribers<NavigationUpdate>,
    display_subscribers: Subscribers<()>,
}

impl NavigationEngine {
    /// Engine with the in-memory reference store.
    pub fn new(config: NavConfig) -> Self {
        Self::with_store(config, Box::new(MemoryRouteStore::new()))
    }

    pub fn with_store(config: NavConfig, store: Box<dyn RouteStore>) -> Self {
        Self {
            config,
            store,
            initialized: false,
            simulation_mode: false,
            last_fix: None,
            phase: Phase::Idle,
            nav_subscribers: Subscribers::new(),
            display_subscribers: Subscribers::new(),
        }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    /// Prepare the route store's backing location. Idempotent.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.store.initialize().map_err(NavError::StoreUnavailable)?;
        self.initialized = true;
        debug!("navigation engine initialized");
        Ok(())
    }

    /// True while a route is active, including after arrival. The
    /// display keeps showing the arrival screen until navigation is
    /// stopped explicitly.
    pub fn is_navigating(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// Toggle simulation mode: suppresses off-road detection and
    /// filters out real-GPS "no fix" positions near (0, 0).
    pub fn set_simulation_mode(&mut self, enabled: bool) {
        if self.simulation_mode != enabled {
            info!("simulation mode {}", if enabled { "enabled" } else { "disabled" });
        }
        self.simulation_mode = enabled;
    }

    /// Begin navigating a route.
    ///
    /// Routes without usable explicit waypoints get them synthesized
    /// from the geometry; the total distance is then recomputed from
    /// the geometry for consistency. On failure the engine stays idle.
    pub fn start_navigation(&mut self, route: Route) -> Result<()> {
        self.ensure_initialized()?;
        if self.is_active() {
            return Err(NavError::NavigationAlreadyActive);
        }

        let route = self.normalize_route(route)?;
        info!(
            "navigating to '{}': {:.0} m, {} waypoints",
            route.destination,
            route.total_distance_m,
            route.waypoints.len()
        );

        let visual = self.visual_state();
        let position = self.last_fix.as_ref().map(|f| f.point());
        let mut session = Session::new(route);
        session.recompute_metrics(position.as_ref());

        // Re-evaluate off-road against the last known fix, if any
        let mut off_road = None;
        if let (Some(p), false) = (&position, self.simulation_mode) {
            let to_start = geo::distance(p, &session.route.start);
            if to_start > self.config.off_road_distance_m {
                off_road = Some((to_start, geo::bearing(p, &session.route.start)));
            }
        }

        self.phase = match off_road {
            Some((d, b)) => Phase::OffRoad {
                session,
                distance_to_route_m: d,
                bearing_to_route_deg: b,
            },
            None => Phase::Navigating(session),
        };

        self.emit(UpdateKind::Status);
        self.notify_display_if_changed(visual);
        Ok(())
    }

    /// Load a route from the store and begin navigating it.
    pub fn start_navigation_by_id(&mut self, id: &str) -> Result<()> {
        self.ensure_initialized()?;
        if self.is_active() {
            return Err(NavError::NavigationAlreadyActive);
        }
        let route = self.load_route(id)?;
        self.start_navigation(route)
    }

    /// Stop navigating. Always succeeds; a no-op when already idle.
    ///
    /// Subscribers receive one status event whose snapshot carries the
    /// `Cancelled` state; the engine itself settles to `Idle` within
    /// the same call.
    pub fn stop_navigation(&mut self) {
        if matches!(self.phase, Phase::Idle) {
            return;
        }
        info!("navigation stopped");

        let visual = self.visual_state();
        self.phase = Phase::Idle;

        let mut status = self.navigation_status();
        status.state = NavigationState::Cancelled;
        self.deliver(UpdateKind::Status, status);
        self.notify_display_if_changed(visual);
    }

    /// Feed one position fix into the engine.
    ///
    /// This is the single mutating entry point besides start/stop. All
    /// classification, waypoint advancement and event fan-out happens
    /// synchronously inside this call.
    pub fn update_position(&mut self, fix: PositionFix) {
        if self.simulation_mode
            && fix.lat.abs() < NO_FIX_EPSILON_DEG
            && fix.lon.abs() < NO_FIX_EPSILON_DEG
        {
            debug!("dropped no-fix position ({}, {})", fix.lat, fix.lon);
            return;
        }

        let position = fix.point();
        let visual = self.visual_state();
        self.last_fix = Some(fix);
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => {}
            Phase::Arrived(session) => {
                // Terminal for the session; only the fix is recorded
                self.phase = Phase::Arrived(session);
            }
            Phase::Navigating(session) => {
                self.process_position(session, &position, false, visual);
            }
            Phase::OffRoad { session, .. } => {
                self.process_position(session, &position, true, visual);
            }
        }
    }

    /// Current derived status. Pure read.
    pub fn navigation_status(&self) -> NavigationStatus {
        match &self.phase {
            Phase::Idle => self.idle_status(NavigationState::Idle),
            Phase::Navigating(session) => {
                self.session_status(session, NavigationState::Navigating, None)
            }
            Phase::OffRoad {
                session,
                distance_to_route_m,
                bearing_to_route_deg,
            } => self.session_status(
                session,
                NavigationState::OffRoad,
                Some((*distance_to_route_m, *bearing_to_route_deg)),
            ),
            Phase::Arrived(session) => {
                self.session_status(session, NavigationState::Arrived, None)
            }
        }
    }

    /// Register a navigation-update observer.
    pub fn on_navigation_update<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&NavigationUpdate) + 'static,
    {
        self.nav_subscribers.subscribe(callback)
    }

    /// Register a display-relevant observer, fired only when a redraw
    /// is actually warranted.
    pub fn on_display_update<F>(&mut self, mut callback: F) -> SubscriptionId
    where
        F: FnMut() + 'static,
    {
        self.display_subscribers.subscribe(move |_| callback())
    }

    /// Remove a registration made by either subscribe method.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.nav_subscribers.unsubscribe(id) || self.display_subscribers.unsubscribe(id)
    }

    /// Stop navigation and drop every observer. Idempotent.
    pub fn dispose(&mut self) {
        self.stop_navigation();
        self.nav_subscribers.clear();
        self.display_subscribers.clear();
    }

    // Route lifecycle passthroughs. Storage errors come back wrapped
    // with the operation and route id for context.

    pub fn save_route(&mut self, route: &Route) -> Result<String> {
        self.ensure_initialized()?;
        self.store.save(route).map_err(|e| NavError::SaveFailed {
            id: route.id.clone(),
            source: e,
        })
    }

    pub fn load_route(&self, id: &str) -> Result<Route> {
        self.ensure_initialized()?;
        self.store.load(id).map_err(|e| match e {
            StoreError::NotFound(_) => NavError::RouteNotFound { id: id.to_string() },
            other => NavError::LoadFailed {
                id: id.to_string(),
                source: other,
            },
        })
    }

    pub fn delete_route(&mut self, id: &str) -> Result<()> {
        self.ensure_initialized()?;
        self.store.delete(id).map_err(|e| match e {
            StoreError::NotFound(_) => NavError::RouteNotFound { id: id.to_string() },
            other => NavError::StoreUnavailable(other),
        })
    }

    pub fn list_routes(&self) -> Result<Vec<RouteSummary>> {
        self.ensure_initialized()?;
        self.store.list().map_err(NavError::StoreUnavailable)
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(NavError::ServiceNotInitialized)
        }
    }

    fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Navigating(_) | Phase::OffRoad { .. })
    }

    fn normalize_route(&self, mut route: Route) -> Result<Route> {
        if !route.has_usable_waypoints() {
            if !route.has_usable_geometry() {
                return Err(NavError::InvalidRoute {
                    reason: "fewer than 2 waypoints and fewer than 2 geometry points".into(),
                });
            }
            route.waypoints =
                turns::synthesize_waypoints(&route.geometry, Some(route.destination.as_str()));
            route.total_distance_m = geo::path_length(&route.geometry);
            route.estimated_time_s =
                time_remaining_s(route.total_distance_m, self.config.average_speed_kmh);
        } else if route.total_distance_m == 0.0 {
            route.total_distance_m = route.waypoint_distance_sum();
        }
        Ok(route)
    }

    /// Off-road evaluation and on-road processing for an active session.
    fn process_position(
        &mut self,
        session: Session,
        position: &Point,
        was_off_road: bool,
        visual: (usize, DisplayMode),
    ) {
        if !self.simulation_mode {
            let to_start = geo::distance(position, &session.route.start);
            if to_start > self.config.off_road_distance_m {
                if !was_off_road {
                    warn!("off road: {:.0} m from the route start", to_start);
                }
                let bearing = geo::bearing(position, &session.route.start);
                let kind = if was_off_road {
                    UpdateKind::Status
                } else {
                    UpdateKind::OffRoad
                };
                let status = self.session_status(
                    &session,
                    NavigationState::OffRoad,
                    Some((to_start, bearing)),
                );
                self.phase = Phase::OffRoad {
                    session,
                    distance_to_route_m: to_start,
                    bearing_to_route_deg: bearing,
                };
                self.deliver(kind, status);
                self.notify_display_if_changed(visual);
                return;
            }
            if was_off_road {
                info!("back on route");
            }
        }

        self.process_on_road(session, position, visual);
    }

    /// Waypoint advancement, turn-approach edge trigger and metric
    /// refresh for an on-road fix.
    fn process_on_road(
        &mut self,
        mut session: Session,
        position: &Point,
        visual: (usize, DisplayMode),
    ) {
        let waypoint_count = session.route.waypoints.len();
        let mut pending: Vec<(UpdateKind, NavigationStatus)> = Vec::new();

        // Bounded by the waypoint count even on malformed input
        let mut guard = 0;
        while session.cursor < waypoint_count
            && guard <= waypoint_count
            && geo::distance(position, &session.route.waypoints[session.cursor].position)
                <= self.config.waypoint_reached_distance_m
        {
            guard += 1;
            session.cursor += 1;
            session.turn_alerted = false;

            if session.cursor >= waypoint_count {
                // Final waypoint consumed
                session.distance_to_next_turn_m = 0.0;
                session.distance_remaining_m = 0.0;
                info!("arrived at '{}'", session.route.destination);

                let status =
                    self.session_status(&session, NavigationState::Arrived, None);
                pending.push((UpdateKind::Arrived, status));
                self.phase = Phase::Arrived(session);
                self.flush(pending);
                self.notify_display_if_changed(visual);
                return;
            }

            session.recompute_metrics(Some(position));
            debug!("advanced to waypoint {}", session.cursor);
            let status = self.session_status(&session, NavigationState::Navigating, None);
            pending.push((UpdateKind::WaypointReached, status));
        }

        session.recompute_metrics(Some(position));

        if session.distance_to_next_turn_m <= self.config.turn_screen_distance_m {
            if !session.turn_alerted {
                session.turn_alerted = true;
                let status = self.session_status(&session, NavigationState::Navigating, None);
                pending.push((UpdateKind::TurnApproaching, status));
            }
        } else {
            session.turn_alerted = false;
        }

        let status = self.session_status(&session, NavigationState::Navigating, None);
        pending.push((UpdateKind::Status, status));

        self.phase = Phase::Navigating(session);
        self.flush(pending);
        self.notify_display_if_changed(visual);
    }

    fn session_status(
        &self,
        session: &Session,
        state: NavigationState,
        off_road: Option<(f64, f64)>,
    ) -> NavigationStatus {
        let display_mode = self.display_mode_for(state, session.distance_to_next_turn_m);
        let total = session.route.total_distance_m;
        let progress_pct = if total > 0.0 {
            (100.0 * (total - session.distance_remaining_m) / total)
                .round()
                .clamp(0.0, 100.0) as u8
        } else {
            0
        };

        NavigationStatus {
            state,
            display_mode,
            waypoint_index: session.cursor,
            distance_to_next_turn_m: session.distance_to_next_turn_m,
            distance_remaining_m: session.distance_remaining_m,
            time_remaining_s: time_remaining_s(
                session.distance_remaining_m,
                self.config.average_speed_kmh,
            ),
            progress_pct,
            route: Some(session.route.clone()),
            next_turn: session.route.waypoints.get(session.cursor).cloned(),
            bearing_to_route_deg: off_road.map(|(_, b)| b),
            distance_to_route_m: off_road.map(|(d, _)| d),
        }
    }

    fn idle_status(&self, state: NavigationState) -> NavigationStatus {
        NavigationStatus {
            state,
            display_mode: DisplayMode::Blank,
            waypoint_index: 0,
            distance_to_next_turn_m: 0.0,
            distance_remaining_m: 0.0,
            time_remaining_s: 0,
            progress_pct: 0,
            route: None,
            next_turn: None,
            bearing_to_route_deg: None,
            distance_to_route_m: None,
        }
    }

    fn display_mode_for(&self, state: NavigationState, distance_to_next_turn_m: f64) -> DisplayMode {
        match state {
            NavigationState::Navigating => {
                if self.last_fix.is_some()
                    && distance_to_next_turn_m <= self.config.turn_screen_distance_m
                {
                    DisplayMode::Turn
                } else {
                    DisplayMode::Progress
                }
            }
            NavigationState::OffRoad => DisplayMode::OffRoad,
            NavigationState::Arrived => DisplayMode::Arrived,
            NavigationState::Idle | NavigationState::Cancelled => DisplayMode::Blank,
        }
    }

    /// (waypoint index, display mode) pair used to decide whether a
    /// redraw notification is warranted.
    fn visual_state(&self) -> (usize, DisplayMode) {
        match &self.phase {
            Phase::Idle => (0, DisplayMode::Blank),
            Phase::Navigating(s) => (
                s.cursor,
                self.display_mode_for(NavigationState::Navigating, s.distance_to_next_turn_m),
            ),
            Phase::OffRoad { session, .. } => (session.cursor, DisplayMode::OffRoad),
            Phase::Arrived(s) => (s.cursor, DisplayMode::Arrived),
        }
    }

    fn notify_display_if_changed(&mut self, before: (usize, DisplayMode)) {
        if self.visual_state() != before {
            self.display_subscribers.notify(&());
        }
    }

    fn emit(&mut self, kind: UpdateKind) {
        let status = self.navigation_status();
        self.deliver(kind, status);
    }

    fn deliver(&mut self, kind: UpdateKind, status: NavigationStatus) {
        let update = NavigationUpdate {
            kind,
            status,
            timestamp: Utc::now(),
        };
        self.nav_subscribers.notify(&update);
    }

    fn flush(&mut self, pending: Vec<(UpdateKind, NavigationStatus)>) {
        for (kind, status) in pending {
            self.deliver(kind, status);
        }
    }
}

/// Seconds remaining at the assumed average speed, rounded.
fn time_remaining_s(distance_m: f64, average_speed_kmh: f64) -> u64 {
    if distance_m <= 0.0 || average_speed_kmh <= 0.0 {
        return 0;
    }
    (distance_m / (average_speed_kmh / 3.6)).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::ManeuverType;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn pt(lat: f64, lon: f64) -> Point {
        Point::new(lat, lon)
    }

    fn waypoint(lat: f64, lon: f64, maneuver: ManeuverType, distance_m: f64, index: usize) -> Waypoint {
        Waypoint {
            position: pt(lat, lon),
            instruction: maneuver.instruction(None),
            maneuver,
            distance_m,
            index,
        }
    }

    /// DEPART at (0, 0), ARRIVE at (0, 0.01): ~1.1 km due east.
    fn simple_route() -> Route {
        let leg = geo::distance(&pt(0.0, 0.0), &pt(0.0, 0.01));
        Route {
            id: "r-test".into(),
            destination: "Harbor".into(),
            created_at: Utc::now(),
            start: pt(0.0, 0.0),
            end: pt(0.0, 0.01),
            waypoints: vec![
                waypoint(0.0, 0.0, ManeuverType::Depart, 0.0, 0),
                waypoint(0.0, 0.01, ManeuverType::Arrive, leg, 1),
            ],
            geometry: Vec::new(),
            total_distance_m: leg,
            estimated_time_s: 80,
        }
    }

    fn engine_with(config: NavConfig) -> NavigationEngine {
        let mut engine = NavigationEngine::new(config);
        engine.initialize().unwrap();
        engine
    }

    fn record_updates(engine: &mut NavigationEngine) -> Rc<RefCell<Vec<NavigationUpdate>>> {
        let updates = Rc::new(RefCell::new(Vec::new()));
        let sink = updates.clone();
        engine.on_navigation_update(move |u| sink.borrow_mut().push(u.clone()));
        updates
    }

    fn kinds(updates: &Rc<RefCell<Vec<NavigationUpdate>>>) -> Vec<UpdateKind> {
        updates.borrow().iter().map(|u| u.kind).collect()
    }

    #[test]
    fn time_remaining_at_fifty_kmh() {
        assert_eq!(time_remaining_s(1000.0, 50.0), 72);
        assert_eq!(time_remaining_s(0.0, 50.0), 0);
        assert_eq!(time_remaining_s(1000.0, 0.0), 0);
    }

    #[test]
    fn starts_idle() {
        let engine = engine_with(NavConfig::default());
        let status = engine.navigation_status();
        assert_eq!(status.state, NavigationState::Idle);
        assert_eq!(status.display_mode, DisplayMode::Blank);
        assert!(status.route.is_none());
        assert!(!engine.is_navigating());
    }

    #[test]
    fn start_requires_initialize() {
        let mut engine = NavigationEngine::new(NavConfig::default());
        let err = engine.start_navigation(simple_route()).unwrap_err();
        assert!(matches!(err, NavError::ServiceNotInitialized));
    }

    #[test]
    fn start_rejects_empty_route() {
        let mut engine = engine_with(NavConfig::default());
        let mut route = simple_route();
        route.waypoints.clear();
        route.geometry.clear();

        let err = engine.start_navigation(route).unwrap_err();
        assert!(matches!(err, NavError::InvalidRoute { .. }));
        assert_eq!(engine.navigation_status().state, NavigationState::Idle);
    }

    #[test]
    fn start_emits_status_and_display() {
        let mut engine = engine_with(NavConfig::default());
        let updates = record_updates(&mut engine);
        let redraws = Rc::new(RefCell::new(0));
        let r = redraws.clone();
        engine.on_display_update(move || *r.borrow_mut() += 1);

        engine.start_navigation(simple_route()).unwrap();

        assert_eq!(kinds(&updates), vec![UpdateKind::Status]);
        assert_eq!(*redraws.borrow(), 1);
        let status = &updates.borrow()[0].status;
        assert_eq!(status.state, NavigationState::Navigating);
        assert_eq!(status.waypoint_index, 0);
        assert_eq!(status.progress_pct, 0);
        assert!(engine.is_navigating());
    }

    #[test]
    fn start_while_active_fails_and_keeps_route() {
        let mut engine = engine_with(NavConfig::default());
        engine.start_navigation(simple_route()).unwrap();

        let mut other = simple_route();
        other.id = "r-other".into();
        let err = engine.start_navigation(other).unwrap_err();

        assert!(matches!(err, NavError::NavigationAlreadyActive));
        let active = engine.navigation_status().route.unwrap();
        assert_eq!(active.id, "r-test");
    }

    #[test]
    fn drive_to_arrival_reaches_each_milestone_once() {
        // Off-road threshold above the route length so the drive along
        // the route never counts as leaving it
        let config = NavConfig {
            off_road_distance_m: 5000.0,
            ..NavConfig::default()
        };
        let mut engine = engine_with(config);
        engine.start_navigation(simple_route()).unwrap();
        let updates = record_updates(&mut engine);

        for i in 0..=50 {
            engine.update_position(PositionFix::new(0.0, i as f64 * 0.0002));
        }

        let all = kinds(&updates);
        let reached = all.iter().filter(|k| **k == UpdateKind::WaypointReached).count();
        let approaching = all.iter().filter(|k| **k == UpdateKind::TurnApproaching).count();
        let arrived = all.iter().filter(|k| **k == UpdateKind::Arrived).count();

        assert_eq!(reached, 1, "events: {all:?}");
        assert_eq!(approaching, 1, "events: {all:?}");
        assert_eq!(arrived, 1, "events: {all:?}");

        // The single waypoint_reached snapshot already points at ARRIVE
        let reached_status = updates
            .borrow()
            .iter()
            .find(|u| u.kind == UpdateKind::WaypointReached)
            .unwrap()
            .status
            .clone();
        assert_eq!(
            reached_status.next_turn.unwrap().maneuver,
            ManeuverType::Arrive
        );

        let status = engine.navigation_status();
        assert_eq!(status.state, NavigationState::Arrived);
        assert_eq!(status.display_mode, DisplayMode::Arrived);
        assert_eq!(status.progress_pct, 100);
        assert_eq!(status.distance_remaining_m, 0.0);
        assert_eq!(status.time_remaining_s, 0);
        assert!(engine.is_navigating(), "arrival keeps the session visible");
    }

    #[test]
    fn fixes_after_arrival_change_nothing() {
        let config = NavConfig {
            off_road_distance_m: 5000.0,
            ..NavConfig::default()
        };
        let mut engine = engine_with(config);
        engine.start_navigation(simple_route()).unwrap();
        for i in 0..=50 {
            engine.update_position(PositionFix::new(0.0, i as f64 * 0.0002));
        }
        assert_eq!(engine.navigation_status().state, NavigationState::Arrived);

        let updates = record_updates(&mut engine);
        engine.update_position(PositionFix::new(0.0, 0.02));

        assert!(updates.borrow().is_empty());
        assert_eq!(engine.navigation_status().state, NavigationState::Arrived);
    }

    #[test]
    fn close_waypoints_advance_in_one_fix() {
        let config = NavConfig {
            off_road_distance_m: 5000.0,
            ..NavConfig::default()
        };
        let mut engine = engine_with(config);

        let leg1 = geo::distance(&pt(0.0, 0.0), &pt(0.0, 0.0001));
        let leg2 = geo::distance(&pt(0.0, 0.0001), &pt(0.0, 0.01));
        let route = Route {
            id: "r-close".into(),
            destination: "Pier".into(),
            created_at: Utc::now(),
            start: pt(0.0, 0.0),
            end: pt(0.0, 0.01),
            waypoints: vec![
                waypoint(0.0, 0.0, ManeuverType::Depart, 0.0, 0),
                waypoint(0.0, 0.0001, ManeuverType::Right, leg1, 1),
                waypoint(0.0, 0.01, ManeuverType::Arrive, leg2, 2),
            ],
            geometry: Vec::new(),
            total_distance_m: leg1 + leg2,
            estimated_time_s: 0,
        };
        engine.start_navigation(route).unwrap();
        let updates = record_updates(&mut engine);

        // One fix on top of both DEPART and the ~11 m waypoint
        engine.update_position(PositionFix::new(0.0, 0.0));

        let reached = kinds(&updates)
            .iter()
            .filter(|k| **k == UpdateKind::WaypointReached)
            .count();
        assert_eq!(reached, 2);
        assert_eq!(engine.navigation_status().waypoint_index, 2);
    }

    #[test]
    fn off_road_and_recovery() {
        let mut engine = engine_with(NavConfig::default());
        engine.start_navigation(simple_route()).unwrap();
        let updates = record_updates(&mut engine);

        // ~556 m from the route start
        engine.update_position(PositionFix::new(0.0, 0.005));

        let status = engine.navigation_status();
        assert_eq!(status.state, NavigationState::OffRoad);
        assert_eq!(status.display_mode, DisplayMode::OffRoad);
        let distance = status.distance_to_route_m.unwrap();
        assert!((distance - 556.0).abs() < 10.0, "distance {distance}");
        let back = status.bearing_to_route_deg.unwrap();
        assert!((back - 270.0).abs() < 1.0, "bearing {back}");
        assert_eq!(kinds(&updates), vec![UpdateKind::OffRoad]);

        // Still off road: a plain status refresh
        engine.update_position(PositionFix::new(0.0, 0.006));
        assert_eq!(
            kinds(&updates),
            vec![UpdateKind::OffRoad, UpdateKind::Status]
        );

        // Back within the threshold
        engine.update_position(PositionFix::new(0.0, 0.0005));
        let status = engine.navigation_status();
        assert_eq!(status.state, NavigationState::Navigating);
        assert!(status.distance_to_route_m.is_none());
        assert!(status.bearing_to_route_deg.is_none());
    }

    #[test]
    fn start_with_far_fix_begins_off_road() {
        let mut engine = engine_with(NavConfig::default());
        engine.update_position(PositionFix::new(1.0, 1.0));

        engine.start_navigation(simple_route()).unwrap();

        let status = engine.navigation_status();
        assert_eq!(status.state, NavigationState::OffRoad);
        assert!(status.distance_to_route_m.unwrap() > 100_000.0);
    }

    #[test]
    fn simulation_mode_drops_no_fix_positions() {
        let mut engine = engine_with(NavConfig::default());
        engine.set_simulation_mode(true);
        engine.start_navigation(simple_route()).unwrap();
        let updates = record_updates(&mut engine);
        let before = engine.navigation_status();

        engine.update_position(PositionFix::new(0.0001, -0.0002));

        assert!(updates.borrow().is_empty(), "no event for a dropped fix");
        let after = engine.navigation_status();
        assert_eq!(after.state, before.state);
        assert_eq!(after.waypoint_index, before.waypoint_index);
        assert_eq!(after.distance_remaining_m, before.distance_remaining_m);
    }

    #[test]
    fn simulation_mode_suppresses_off_road() {
        let mut engine = engine_with(NavConfig::default());
        engine.set_simulation_mode(true);
        engine.start_navigation(simple_route()).unwrap();

        // Far beyond the 100 m threshold, but simulation keeps it on-road
        engine.update_position(PositionFix::new(0.0, 0.005));
        assert_eq!(engine.navigation_status().state, NavigationState::Navigating);
    }

    #[test]
    fn stop_emits_cancelled_then_settles_idle() {
        let mut engine = engine_with(NavConfig::default());
        engine.start_navigation(simple_route()).unwrap();
        let updates = record_updates(&mut engine);

        engine.stop_navigation();

        let recorded = updates.borrow();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].kind, UpdateKind::Status);
        assert_eq!(recorded[0].status.state, NavigationState::Cancelled);
        assert!(recorded[0].status.route.is_none());
        drop(recorded);

        assert_eq!(engine.navigation_status().state, NavigationState::Idle);
        assert!(!engine.is_navigating());

        // Second stop is a silent no-op
        engine.stop_navigation();
        assert_eq!(updates.borrow().len(), 1);
        assert_eq!(engine.navigation_status().state, NavigationState::Idle);
    }

    #[test]
    fn geometry_only_route_gets_synthesized_waypoints() {
        let mut engine = engine_with(NavConfig::default());

        let step = 0.0002;
        let mut geometry: Vec<Point> = (0..10).map(|i| pt(0.0, i as f64 * step)).collect();
        geometry.extend((1..10).map(|j| pt(-(j as f64) * step, 9.0 * step)));

        let mut route = Route::from_geometry("Depot", geometry.clone(), 50.0);
        route.total_distance_m = 0.0; // engine recomputes from geometry

        engine.start_navigation(route).unwrap();

        let active = engine.navigation_status().route.unwrap();
        assert!(active.waypoints.len() >= 3, "synthesized: {:?}", active.waypoints);
        assert_eq!(active.waypoints[0].maneuver, ManeuverType::Depart);
        assert_eq!(active.waypoints.last().unwrap().maneuver, ManeuverType::Arrive);
        assert_eq!(
            active.waypoints.last().unwrap().instruction,
            "Arrive at Depot"
        );

        let expected = geo::path_length(&geometry);
        assert!((active.total_distance_m - expected).abs() < 1.0);
    }

    #[test]
    fn restart_is_allowed_after_arrival() {
        let config = NavConfig {
            off_road_distance_m: 5000.0,
            ..NavConfig::default()
        };
        let mut engine = engine_with(config);
        engine.start_navigation(simple_route()).unwrap();
        for i in 0..=50 {
            engine.update_position(PositionFix::new(0.0, i as f64 * 0.0002));
        }
        assert_eq!(engine.navigation_status().state, NavigationState::Arrived);

        let mut next = simple_route();
        next.id = "r-next".into();
        // The last fix sits at the far end, ~1.1 km from this route's
        // start; keep the check quiet for the restart
        engine.set_simulation_mode(true);
        engine.start_navigation(next).unwrap();
        assert_eq!(engine.navigation_status().state, NavigationState::Navigating);
        assert_eq!(engine.navigation_status().waypoint_index, 0);
    }

    #[test]
    fn display_fires_only_on_visual_change() {
        let config = NavConfig {
            off_road_distance_m: 5000.0,
            ..NavConfig::default()
        };
        let mut engine = engine_with(config);
        let redraws = Rc::new(RefCell::new(0));
        let r = redraws.clone();
        engine.on_display_update(move || *r.borrow_mut() += 1);

        engine.start_navigation(simple_route()).unwrap();
        assert_eq!(*redraws.borrow(), 1, "blank -> progress");

        // Consumes DEPART: waypoint index changes
        engine.update_position(PositionFix::new(0.0, 0.0002));
        assert_eq!(*redraws.borrow(), 2);

        // Mid-route: same index, same mode, no redraw
        engine.update_position(PositionFix::new(0.0, 0.004));
        engine.update_position(PositionFix::new(0.0, 0.005));
        assert_eq!(*redraws.borrow(), 2);

        // Within the turn screen distance: mode flips to Turn
        engine.update_position(PositionFix::new(0.0, 0.0085));
        assert_eq!(*redraws.borrow(), 3);

        engine.stop_navigation();
        assert_eq!(*redraws.borrow(), 4, "back to blank");
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut engine = engine_with(NavConfig::default());
        let updates = Rc::new(RefCell::new(0));
        let sink = updates.clone();
        let id = engine.on_navigation_update(move |_| *sink.borrow_mut() += 1);

        engine.start_navigation(simple_route()).unwrap();
        assert_eq!(*updates.borrow(), 1);

        assert!(engine.unsubscribe(id));
        assert!(!engine.unsubscribe(id));

        engine.stop_navigation();
        assert_eq!(*updates.borrow(), 1);
    }

    #[test]
    fn dispose_is_idempotent_and_clears_observers() {
        let mut engine = engine_with(NavConfig::default());
        let updates = record_updates(&mut engine);
        engine.start_navigation(simple_route()).unwrap();

        engine.dispose();
        assert_eq!(engine.navigation_status().state, NavigationState::Idle);
        let after_dispose = updates.borrow().len();

        engine.dispose();
        engine.start_navigation(simple_route()).unwrap();
        // Observers are gone: nothing new is delivered
        assert_eq!(updates.borrow().len(), after_dispose);
    }

    #[test]
    fn idle_engine_records_fix_without_events() {
        let mut engine = engine_with(NavConfig::default());
        let updates = record_updates(&mut engine);

        engine.update_position(PositionFix::new(0.0, 0.0003));
        assert!(updates.borrow().is_empty());
        assert_eq!(engine.navigation_status().state, NavigationState::Idle);

        // The recorded fix seeds the initial turn distance
        engine.start_navigation(simple_route()).unwrap();
        let status = engine.navigation_status();
        assert!(status.distance_to_next_turn_m > 0.0);
    }

    #[test]
    fn save_load_round_trip_through_engine() {
        let mut engine = engine_with(NavConfig::default());
        let route = simple_route();

        let id = engine.save_route(&route).unwrap();
        assert_eq!(id, "r-test");

        let loaded = engine.load_route(&id).unwrap();
        assert_eq!(loaded, route);

        engine.start_navigation_by_id(&id).unwrap();
        assert_eq!(engine.navigation_status().state, NavigationState::Navigating);
    }

    #[test]
    fn missing_route_id_is_reported() {
        let mut engine = engine_with(NavConfig::default());
        let err = engine.start_navigation_by_id("nope").unwrap_err();
        assert!(matches!(err, NavError::RouteNotFound { id } if id == "nope"));
    }
}
