//! Route planning against the walkable-surface oracle.
//!
//! A [`RoutePlan`] is produced wholesale by one query and never edited; the
//! planner swaps in a new one on every replan.

use beacon_common::{horizontal_distance, polyline_length, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::world::{RouteStatus, WalkableSurface};

/// Waypoints closer than this to the observer are merged with it.
const SAME_POINT: f32 = 0.05;

/// Route classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Completeness {
    /// The route reaches the target.
    Complete,
    /// The route ends as close as is currently walkable.
    Partial,
    /// No route; only the straight-line distance is known.
    Unreachable,
}

/// Planner settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Search radius when snapping the target to the walkable surface.
    pub snap_radius: f32,
    /// Seconds between replans.
    pub replan_interval: f32,
    /// A route ending farther than this from the snapped target is partial.
    pub partial_tolerance: f32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            snap_radius: 4.0,
            replan_interval: 0.5,
            partial_tolerance: 1.0,
        }
    }
}

impl PlannerConfig {
    /// Clamps values to sensible ranges.
    pub fn validate(&mut self) {
        self.snap_radius = self.snap_radius.clamp(0.1, 50.0);
        self.replan_interval = self.replan_interval.clamp(0.05, 10.0);
        self.partial_tolerance = self.partial_tolerance.clamp(0.05, 10.0);
    }
}

/// Result of one planning query.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePlan {
    waypoints: Vec<Vec3>,
    completeness: Completeness,
    length: f32,
    straight_line: f32,
    target: Vec3,
    destination: Option<Vec3>,
}

impl RoutePlan {
    fn unreachable(from: Vec3, target: Vec3) -> Self {
        Self {
            waypoints: Vec::new(),
            completeness: Completeness::Unreachable,
            length: 0.0,
            straight_line: from.distance(target),
            target,
            destination: None,
        }
    }

    /// Waypoints; the first is the observer position at planning time.
    #[must_use]
    pub fn waypoints(&self) -> &[Vec3] {
        &self.waypoints
    }

    /// Classification.
    #[must_use]
    pub const fn completeness(&self) -> Completeness {
        self.completeness
    }

    /// Sum of consecutive waypoint distances.
    #[must_use]
    pub const fn length(&self) -> f32 {
        self.length
    }

    /// Straight-line distance from observer to the raw target.
    #[must_use]
    pub const fn straight_line(&self) -> f32 {
        self.straight_line
    }

    /// Raw target position.
    #[must_use]
    pub const fn target(&self) -> Vec3 {
        self.target
    }

    /// Target snapped onto the walkable surface.
    #[must_use]
    pub const fn destination(&self) -> Option<Vec3> {
        self.destination
    }

    /// Last waypoint, or the raw target without a route.
    #[must_use]
    pub fn end(&self) -> Vec3 {
        self.waypoints.last().copied().unwrap_or(self.target)
    }

    /// Whether there is a route to follow.
    #[must_use]
    pub fn is_routable(&self) -> bool {
        self.completeness != Completeness::Unreachable && self.waypoints.len() >= 2
    }

    /// Distance to communicate: route length, or straight line when
    /// unreachable.
    #[must_use]
    pub fn reported_distance(&self) -> f32 {
        match self.completeness {
            Completeness::Unreachable => self.straight_line,
            _ => self.length,
        }
    }
}

/// Runs one planning query.
pub fn plan_route(
    surface: &dyn WalkableSurface,
    from: Vec3,
    target: Vec3,
    config: &PlannerConfig,
) -> RoutePlan {
    let Some(destination) = surface.snap(target, config.snap_radius) else {
        trace!("Target {target} not within {} m of walkable surface", config.snap_radius);
        return RoutePlan::unreachable(from, target);
    };

    let query = surface.route(from, destination);
    if query.status == RouteStatus::Failed || query.waypoints.is_empty() {
        return RoutePlan {
            destination: Some(destination),
            ..RoutePlan::unreachable(from, target)
        };
    }

    let mut waypoints = query.waypoints;
    if waypoints[0].distance(from) <= SAME_POINT {
        waypoints[0] = from;
    } else {
        waypoints.insert(0, from);
    }

    let end = waypoints.last().copied().unwrap_or(from);
    let completeness = if query.status == RouteStatus::Partial
        || horizontal_distance(end, destination) > config.partial_tolerance
    {
        Completeness::Partial
    } else {
        Completeness::Complete
    };
    let length = polyline_length(&waypoints);

    RoutePlan {
        waypoints,
        completeness,
        length,
        straight_line: from.distance(target),
        target,
        destination: Some(destination),
    }
}

/// Holds the current plan and replans on an interval.
#[derive(Debug, Clone)]
pub struct PathPlanner {
    config: PlannerConfig,
    current: Option<RoutePlan>,
    since_plan: f32,
    plans: u64,
}

impl PathPlanner {
    /// Creates a planner with no plan.
    #[must_use]
    pub const fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            current: None,
            since_plan: 0.0,
            plans: 0,
        }
    }

    /// Settings.
    #[must_use]
    pub const fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plans from `from` to `target`, replacing the current plan.
    pub fn plan(&mut self, surface: &dyn WalkableSurface, from: Vec3, target: Vec3) -> &RoutePlan {
        let plan = plan_route(surface, from, target, &self.config);
        debug!(
            "Planned {:?} route, {:.1} m over {} waypoints",
            plan.completeness(),
            plan.reported_distance(),
            plan.waypoints().len()
        );
        self.since_plan = 0.0;
        self.plans += 1;
        self.current.insert(plan)
    }

    /// Replans toward the current plan's target.
    pub fn replan(&mut self, surface: &dyn WalkableSurface, from: Vec3) -> Option<&RoutePlan> {
        let target = self.current.as_ref()?.target();
        Some(self.plan(surface, from, target))
    }

    /// Advances the replan timer. Returns the new plan when one was made.
    ///
    /// `target` is the live target position; a moving target is followed.
    pub fn update(
        &mut self,
        dt: f32,
        surface: &dyn WalkableSurface,
        from: Vec3,
        target: Vec3,
    ) -> Option<&RoutePlan> {
        self.current.as_ref()?;
        self.since_plan += dt;
        if self.since_plan < self.config.replan_interval {
            return None;
        }
        Some(self.plan(surface, from, target))
    }

    /// Current plan.
    #[must_use]
    pub const fn current(&self) -> Option<&RoutePlan> {
        self.current.as_ref()
    }

    /// Number of plans made.
    #[must_use]
    pub const fn plan_count(&self) -> u64 {
        self.plans
    }

    /// Drops the current plan.
    pub fn clear(&mut self) {
        self.current = None;
        self.since_plan = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWorld;
    use proptest::prelude::*;

    fn planner() -> PathPlanner {
        PathPlanner::new(PlannerConfig::default())
    }

    #[test]
    fn test_complete_route_starts_at_observer() {
        let world = MockWorld::new();
        let mut p = planner();
        let from = Vec3::new(1.0, 0.0, 1.0);
        let plan = p.plan(&world, from, Vec3::new(1.0, 0.0, 11.0));
        assert_eq!(plan.completeness(), Completeness::Complete);
        assert_eq!(plan.waypoints()[0], from);
        assert!((plan.length() - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_length_follows_waypoints_not_straight_line() {
        let mut world = MockWorld::new();
        world.add_blocker(Vec3::new(0.0, 0.0, 5.0), 2.0);
        let plan = plan_route(
            &world,
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 10.0),
            &PlannerConfig::default(),
        );
        assert_eq!(plan.completeness(), Completeness::Complete);
        assert!(plan.length() > plan.straight_line() + 0.5);
        assert!((plan.reported_distance() - plan.length()).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unsnappable_target_is_unreachable() {
        let world = MockWorld::new().with_extent(10.0);
        let plan = plan_route(
            &world,
            Vec3::ZERO,
            Vec3::new(40.0, 0.0, 0.0),
            &PlannerConfig::default(),
        );
        assert_eq!(plan.completeness(), Completeness::Unreachable);
        assert!(plan.waypoints().is_empty());
        assert!((plan.reported_distance() - 40.0).abs() < 1e-4);
    }

    #[test]
    fn test_partial_route() {
        let mut world = MockWorld::new().with_extent(20.0);
        for x in [-20.0, -10.0, 0.0, 10.0, 20.0] {
            world.add_blocker(Vec3::new(x, 0.0, 10.0), 6.0);
        }
        let plan = plan_route(
            &world,
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 19.0),
            &PlannerConfig::default(),
        );
        assert_eq!(plan.completeness(), Completeness::Partial);
        assert!(plan.length() > 0.0);
        assert!(plan.length() < plan.straight_line());
    }

    #[test]
    fn test_replan_on_interval() {
        let world = MockWorld::new();
        let mut p = planner();
        assert!(p.update(1.0, &world, Vec3::ZERO, Vec3::Z).is_none());

        p.plan(&world, Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0));
        assert!(p.update(0.3, &world, Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0)).is_none());
        let replanned = p
            .update(0.3, &world, Vec3::new(0.0, 0.0, 2.0), Vec3::new(0.0, 0.0, 10.0))
            .expect("replanned");
        assert!((replanned.length() - 8.0).abs() < 1e-4);
        assert_eq!(p.plan_count(), 2);

        p.clear();
        assert!(p.current().is_none());
    }

    proptest! {
        #[test]
        fn prop_length_is_waypoint_sum(
            tx in -80.0f32..80.0, tz in -80.0f32..80.0,
            bx in -40.0f32..40.0, bz in -40.0f32..40.0, r in 0.5f32..6.0,
        ) {
            let mut world = MockWorld::new();
            if horizontal_distance(Vec3::ZERO, Vec3::new(bx, 0.0, bz)) > r + 0.5 {
                world.add_blocker(Vec3::new(bx, 0.0, bz), r);
            }
            let plan = plan_route(&world, Vec3::ZERO, Vec3::new(tx, 0.0, tz), &PlannerConfig::default());
            if plan.completeness() != Completeness::Unreachable {
                let sum: f32 = plan.waypoints().windows(2).map(|w| w[0].distance(w[1])).sum();
                prop_assert!((plan.length() - sum).abs() < 1e-3);
            }
        }
    }
}
