//! Auto-traversal.
//!
//! Follows a [`RoutePlan`] by emitting a stick-style movement intent each
//! tick, and recovers when the observer stops making progress.
//!
//! ```text
//!            start                 stuck, far from goal
//!  Idle ───────────────► Traversing ─────────────────────► ObstacleAvoidance
//!   ▲                     │   ▲                                  │
//!   │ arrival / stop /    │   └────── detour reached/timeout ────┘
//!   │ abandon             │
//!   └─────────────────────┘
//! ```
//!
//! Waypoints are consumed by skip-ahead: every waypoint inside the reach
//! radius is dropped in the same tick. When the route is replaced (periodic
//! replan, resume after a pause) the continuation point is found by
//! projecting the observer onto the new route's segments, never by index.

use beacon_common::{flatten, horizontal_distance, project_onto_segment, ObserverPose, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::planner::RoutePlan;
use crate::world::{RouteStatus, WalkableSurface};

/// Traversal settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraverseConfig {
    /// Waypoints closer than this are consumed.
    pub reach_radius: f32,
    /// Closer than this to the destination counts as arrival.
    pub arrival_radius: f32,
    /// Seconds between progress checks.
    pub stuck_interval: f32,
    /// Less movement than this between checks means stuck.
    pub stuck_threshold: f32,
    /// Stuck within this distance of the destination counts as arrival.
    pub stuck_arrival_radius: f32,
    /// Seconds before an unreached detour is given up.
    pub detour_timeout: f32,
    /// Candidate detour distances, tried in order.
    pub detour_distances: Vec<f32>,
    /// Failed avoidance attempts without progress before giving up.
    pub max_failed_avoidance: u32,
    /// Snap radius used to validate detour candidates.
    pub snap_radius: f32,
}

impl Default for TraverseConfig {
    fn default() -> Self {
        Self {
            reach_radius: 1.0,
            arrival_radius: 1.5,
            stuck_interval: 1.0,
            stuck_threshold: 0.3,
            stuck_arrival_radius: 3.0,
            detour_timeout: 10.0,
            detour_distances: vec![2.0, 4.0, 6.0],
            max_failed_avoidance: 5,
            snap_radius: 1.5,
        }
    }
}

impl TraverseConfig {
    /// Clamps values to sensible ranges.
    pub fn validate(&mut self) {
        self.reach_radius = self.reach_radius.clamp(0.1, 10.0);
        self.arrival_radius = self.arrival_radius.clamp(0.1, 20.0);
        self.stuck_interval = self.stuck_interval.clamp(0.1, 10.0);
        self.stuck_threshold = self.stuck_threshold.clamp(0.01, 5.0);
        self.stuck_arrival_radius = self.stuck_arrival_radius.max(self.arrival_radius);
        self.detour_timeout = self.detour_timeout.clamp(0.5, 120.0);
        self.detour_distances.retain(|d| d.is_finite() && *d > 0.0);
        if self.detour_distances.is_empty() {
            self.detour_distances = Self::default().detour_distances;
        }
        self.detour_distances.sort_by(f32::total_cmp);
        self.max_failed_avoidance = self.max_failed_avoidance.clamp(1, 100);
        self.snap_radius = self.snap_radius.clamp(0.1, 20.0);
    }
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraverseState {
    /// Not moving.
    Idle,
    /// Following the route.
    Traversing,
    /// Heading for a detour point.
    ObstacleAvoidance,
}

/// Lateral side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Observer's left.
    Left,
    /// Observer's right.
    Right,
}

impl Side {
    /// The other side.
    #[must_use]
    pub const fn flip(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    const fn sign(self) -> f32 {
        match self {
            Self::Left => -1.0,
            Self::Right => 1.0,
        }
    }
}

/// Something that happened during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TraverseEvent {
    /// Traversal started.
    Started {
        /// Waypoints in the route.
        waypoints: usize,
    },
    /// Traversal resumed after a pause.
    Resumed {
        /// Continuation waypoint.
        waypoint: usize,
    },
    /// Waypoints were consumed; `index` is the new current waypoint.
    WaypointReached {
        /// New current waypoint.
        index: usize,
    },
    /// A detour was found.
    AvoidanceStarted {
        /// Detour point.
        detour: Vec3,
        /// Side of the first candidate tried.
        side: Side,
    },
    /// No detour candidate validated.
    AvoidanceFailed {
        /// Failed attempts without progress so far.
        attempts: u32,
    },
    /// The detour ended; the route should be replanned.
    DetourFinished {
        /// Whether the detour point was reached before the timeout.
        reached: bool,
    },
    /// The destination was reached.
    Arrived,
    /// Traversal was given up after repeated failed avoidance.
    Abandoned {
        /// Failed attempts.
        attempts: u32,
    },
    /// Traversal was stopped from outside.
    Stopped,
}

/// Output of one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraverseTick {
    /// Movement intent, each axis in `[-1, 1]`.
    pub intent: Vec2,
    /// Events raised this tick.
    pub events: Vec<TraverseEvent>,
}

#[derive(Debug, Clone, Copy)]
struct StuckDetector {
    anchor: Vec3,
    elapsed: f32,
}

impl StuckDetector {
    const fn new(anchor: Vec3) -> Self {
        Self {
            anchor,
            elapsed: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Detour {
    target: Vec3,
    remaining: f32,
}

/// Drives the observer along a route.
#[derive(Debug, Clone)]
pub struct AutoTraverseController {
    config: TraverseConfig,
    state: TraverseState,
    route: Vec<Vec3>,
    destination: Vec3,
    waypoint: usize,
    stuck: StuckDetector,
    detour: Option<Detour>,
    bias: Side,
    failed_attempts: u32,
    paused: bool,
    intent: Vec2,
}

impl AutoTraverseController {
    /// Creates an idle controller.
    #[must_use]
    pub fn new(mut config: TraverseConfig) -> Self {
        config.validate();
        Self {
            config,
            state: TraverseState::Idle,
            route: Vec::new(),
            destination: Vec3::ZERO,
            waypoint: 0,
            stuck: StuckDetector::new(Vec3::ZERO),
            detour: None,
            bias: Side::Right,
            failed_attempts: 0,
            paused: false,
            intent: Vec2::ZERO,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TraverseState {
        self.state
    }

    /// Whether a traversal is in progress (possibly paused).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state != TraverseState::Idle
    }

    /// Whether the traversal is paused.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Intent from the last tick.
    #[must_use]
    pub const fn intent(&self) -> Vec2 {
        self.intent
    }

    /// Route being followed.
    #[must_use]
    pub fn route(&self) -> &[Vec3] {
        &self.route
    }

    /// Index of the waypoint being steered to.
    #[must_use]
    pub const fn current_waypoint(&self) -> usize {
        self.waypoint
    }

    /// Final destination.
    #[must_use]
    pub const fn destination(&self) -> Vec3 {
        self.destination
    }

    /// Active detour point.
    #[must_use]
    pub fn detour_target(&self) -> Option<Vec3> {
        self.detour.map(|d| d.target)
    }

    /// Side tried first on the next avoidance.
    #[must_use]
    pub const fn bias(&self) -> Side {
        self.bias
    }

    /// Failed avoidance attempts since the last progress.
    #[must_use]
    pub const fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Starts following a plan. Returns `None` when the plan has no route.
    pub fn start(&mut self, plan: &RoutePlan, observer: Vec3) -> Option<TraverseEvent> {
        if !plan.is_routable() {
            debug!("Not starting traversal: plan has no route");
            return None;
        }
        self.adopt(plan, observer);
        self.stuck = StuckDetector::new(observer);
        self.detour = None;
        self.failed_attempts = 0;
        self.paused = false;
        self.state = TraverseState::Traversing;
        info!(
            "Traversal started: {} waypoints, {:.1} m",
            self.route.len(),
            plan.length()
        );
        Some(TraverseEvent::Started {
            waypoints: self.route.len(),
        })
    }

    fn adopt(&mut self, plan: &RoutePlan, observer: Vec3) {
        self.route = plan.waypoints().to_vec();
        self.destination = plan.destination().unwrap_or_else(|| plan.end());
        self.waypoint = anchor_index(&self.route, observer);
    }

    /// Swaps in a replanned route, re-anchoring on it by projection. Plans
    /// without a route are ignored and the old route kept.
    pub fn on_route_updated(&mut self, plan: &RoutePlan, observer: Vec3) {
        if self.state == TraverseState::Idle || !plan.is_routable() {
            return;
        }
        self.adopt(plan, observer);
    }

    /// Suspends output; state is kept.
    pub fn pause(&mut self) {
        if self.is_active() && !self.paused {
            debug!("Traversal paused");
            self.paused = true;
            self.intent = Vec2::ZERO;
        }
    }

    /// Resumes with a fresh plan, continuing from the nearest route segment.
    pub fn resume(&mut self, plan: &RoutePlan, observer: Vec3) -> Option<TraverseEvent> {
        if !self.is_active() {
            return None;
        }
        if plan.is_routable() {
            self.adopt(plan, observer);
        }
        self.paused = false;
        self.detour = None;
        self.state = TraverseState::Traversing;
        self.stuck = StuckDetector::new(observer);
        debug!("Traversal resumed at waypoint {}", self.waypoint);
        Some(TraverseEvent::Resumed {
            waypoint: self.waypoint,
        })
    }

    /// Stops immediately.
    pub fn stop(&mut self) -> Option<TraverseEvent> {
        if !self.is_active() {
            return None;
        }
        self.reset();
        info!("Traversal stopped");
        Some(TraverseEvent::Stopped)
    }

    fn reset(&mut self) {
        self.state = TraverseState::Idle;
        self.route.clear();
        self.detour = None;
        self.paused = false;
        self.intent = Vec2::ZERO;
    }

    /// Advances by `dt` seconds with the observer's current pose.
    pub fn tick(
        &mut self,
        dt: f32,
        observer: &ObserverPose,
        surface: &dyn WalkableSurface,
    ) -> TraverseTick {
        let mut out = TraverseTick::default();
        if !self.is_active() || self.paused {
            self.intent = Vec2::ZERO;
            return out;
        }

        let pos = observer.position;
        if horizontal_distance(pos, self.destination) <= self.config.arrival_radius {
            self.finish_arrived(&mut out);
            return out;
        }

        match self.state {
            TraverseState::Traversing => {
                self.advance(pos, &mut out);
                let target = self.steer_target();
                self.intent = steer(observer, target);
                self.check_progress(dt, observer, surface, &mut out);
            },
            TraverseState::ObstacleAvoidance => self.tick_detour(dt, observer, &mut out),
            TraverseState::Idle => {},
        }

        if !self.is_active() {
            self.intent = Vec2::ZERO;
        }
        out.intent = self.intent;
        out
    }

    fn finish_arrived(&mut self, out: &mut TraverseTick) {
        info!("Traversal arrived");
        self.reset();
        out.events.push(TraverseEvent::Arrived);
    }

    fn advance(&mut self, pos: Vec3, out: &mut TraverseTick) {
        let before = self.waypoint;
        while self.waypoint < self.route.len()
            && horizontal_distance(pos, self.route[self.waypoint]) <= self.config.reach_radius
        {
            self.waypoint += 1;
        }
        if self.waypoint != before {
            out.events.push(TraverseEvent::WaypointReached {
                index: self.waypoint,
            });
        }
    }

    fn steer_target(&self) -> Vec3 {
        self.route
            .get(self.waypoint)
            .copied()
            .unwrap_or(self.destination)
    }

    fn check_progress(
        &mut self,
        dt: f32,
        observer: &ObserverPose,
        surface: &dyn WalkableSurface,
        out: &mut TraverseTick,
    ) {
        self.stuck.elapsed += dt;
        if self.stuck.elapsed < self.config.stuck_interval {
            return;
        }
        let pos = observer.position;
        let moved = horizontal_distance(pos, self.stuck.anchor);
        self.stuck = StuckDetector::new(pos);

        if moved >= self.config.stuck_threshold {
            self.failed_attempts = 0;
            return;
        }
        if horizontal_distance(pos, self.destination) <= self.config.stuck_arrival_radius {
            debug!("Stuck next to the destination, treating as arrival");
            self.finish_arrived(out);
            return;
        }
        self.begin_avoidance(observer, surface, out);
    }

    fn heading(&self, observer: &ObserverPose) -> Vec3 {
        let toward = flatten(self.steer_target() - observer.position).normalize_or_zero();
        if toward != Vec3::ZERO {
            return toward;
        }
        let facing = flatten(observer.forward).normalize_or_zero();
        if facing == Vec3::ZERO {
            Vec3::Z
        } else {
            facing
        }
    }

    /// Detour candidates around `pos`, nearest distances first. At each
    /// distance: the bias side, the other side, the two backward diagonals
    /// in the same order, then straight back.
    fn candidates(&self, pos: Vec3, heading: Vec3, bias: Side) -> Vec<Vec3> {
        let right = Vec3::Y.cross(heading).normalize_or_zero();
        let first = right * bias.sign();
        let second = -first;
        let directions = [
            first,
            second,
            (first - heading).normalize_or_zero(),
            (second - heading).normalize_or_zero(),
            -heading,
        ];
        self.config
            .detour_distances
            .iter()
            .flat_map(|d| directions.iter().map(move |dir| pos + *dir * *d))
            .collect()
    }

    fn begin_avoidance(
        &mut self,
        observer: &ObserverPose,
        surface: &dyn WalkableSurface,
        out: &mut TraverseTick,
    ) {
        let pos = observer.position;
        let side = self.bias;
        self.bias = side.flip();

        let candidates = self.candidates(pos, self.heading(observer), side);
        let found = candidates.into_iter().find_map(|candidate| {
            let snapped = surface.snap(candidate, self.config.snap_radius)?;
            if horizontal_distance(snapped, pos) <= self.config.reach_radius {
                return None;
            }
            (surface.route(snapped, self.destination).status != RouteStatus::Failed)
                .then_some(snapped)
        });

        match found {
            Some(target) => {
                info!("Stuck, detouring via {target}");
                self.detour = Some(Detour {
                    target,
                    remaining: self.config.detour_timeout,
                });
                self.state = TraverseState::ObstacleAvoidance;
                self.intent = steer(observer, target);
                out.events.push(TraverseEvent::AvoidanceStarted {
                    detour: target,
                    side,
                });
            },
            None => self.record_failure(out),
        }
    }

    fn record_failure(&mut self, out: &mut TraverseTick) {
        self.failed_attempts += 1;
        let attempts = self.failed_attempts;
        if attempts >= self.config.max_failed_avoidance {
            warn!("Giving up traversal after {attempts} failed avoidance attempts");
            self.reset();
            out.events.push(TraverseEvent::Abandoned { attempts });
        } else {
            debug!("No detour found (attempt {attempts})");
            out.events.push(TraverseEvent::AvoidanceFailed { attempts });
        }
    }

    fn tick_detour(&mut self, dt: f32, observer: &ObserverPose, out: &mut TraverseTick) {
        let pos = observer.position;
        let Some(mut detour) = self.detour else {
            self.state = TraverseState::Traversing;
            return;
        };
        detour.remaining -= dt;
        let reached = horizontal_distance(pos, detour.target) <= self.config.reach_radius;

        if reached || detour.remaining <= 0.0 {
            debug!("Detour finished (reached: {reached})");
            self.detour = None;
            self.state = TraverseState::Traversing;
            self.waypoint = anchor_index(&self.route, pos);
            self.stuck = StuckDetector::new(pos);
            self.intent = steer(observer, self.steer_target());
            out.events.push(TraverseEvent::DetourFinished { reached });
            if !reached {
                self.record_failure(out);
            }
            return;
        }

        self.detour = Some(detour);
        self.intent = steer(observer, detour.target);
    }
}

/// Stick-style intent toward `target`, in the observer's input axes.
#[must_use]
pub fn steer(observer: &ObserverPose, target: Vec3) -> Vec2 {
    let direction = flatten(target - observer.position).normalize_or_zero();
    if direction == Vec3::ZERO {
        return Vec2::ZERO;
    }
    let (right, forward) = observer.input_axes();
    Vec2::new(direction.dot(right), direction.dot(forward)).clamp(Vec2::splat(-1.0), Vec2::splat(1.0))
}

/// Continuation waypoint for an observer at `pos`: the end of the route
/// segment whose projection is closest.
#[must_use]
pub fn anchor_index(route: &[Vec3], pos: Vec3) -> usize {
    if route.len() < 2 {
        return 0;
    }
    let p = flatten(pos);
    let mut best = (f32::INFINITY, 1);
    for (i, segment) in route.windows(2).enumerate() {
        let (closest, _) = project_onto_segment(p, flatten(segment[0]), flatten(segment[1]));
        let d = closest.distance_squared(p);
        if d < best.0 {
            best = (d, i + 1);
        }
    }
    best.1
}
