//! The guidance orchestrator.
//!
//! [`Guide`] owns the scanner, the selection cursor, the planner, the
//! auto-traverse controller and the audio cue, and runs them once per host
//! tick:
//!
//! ```text
//!  tick ──► scanner.update ──► area changed? ──► stop everything (AreaChanged)
//!              │
//!              ▼
//!          navigable? ── no ──► pause traversal, mute cue
//!              │ yes
//!              ▼
//!          target lost? ── yes ──► stop everything (reason)
//!              │ no
//!              ▼
//!          replan on interval ──► re-anchor traversal ──► move cue
//!              │
//!              ▼
//!          traversal tick ──► intent, detours, arrival
//! ```
//!
//! Every user-visible outcome is published on the [`EventBus`] and returned
//! from the call that caused it.

use beacon_common::{horizontal_distance, ObserverPose, Vec2, Vec3};
use beacon_nav::{
    anchor_index, Announcement, AreaScanner, AutoTraverseController, Completeness, CycleDirection,
    Entity, LossReason, NameCache, NavigationCursor, PathPlanner, RoutePlan, ScanReport,
    TraverseEvent, WalkableSurface, WorldQuery,
};
use tracing::{debug, info, warn};

use crate::config::{BeaconConfig, GuidanceMode};
use crate::cue::GuideCue;
use crate::events::{EventBus, GuideEvent};

/// Output of one [`Guide::tick`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuideTick {
    /// Movement intent for the input layer.
    pub intent: Vec2,
    /// Announcements raised this tick.
    pub announcements: Vec<Announcement>,
    /// What the scanner did.
    pub scan: ScanReport,
}

#[derive(Debug, Clone)]
struct ActiveGuidance {
    target: Entity,
    paused: bool,
}

/// Ties scanning, selection, planning, traversal and the audio cue together.
#[derive(Debug)]
pub struct Guide {
    mode: GuidanceMode,
    scanner: AreaScanner,
    cursor: NavigationCursor,
    planner: PathPlanner,
    traverse: AutoTraverseController,
    cue: Option<GuideCue>,
    events: EventBus,
    active: Option<ActiveGuidance>,
    reach_radius: f32,
    arrival_radius: f32,
    intent: Vec2,
}

impl Guide {
    /// Creates a guide. `cue` is `None` when no audio output is available;
    /// guidance then runs without the spatial cue.
    #[must_use]
    pub fn new(config: &BeaconConfig, cue: Option<GuideCue>) -> Self {
        let mut config = config.clone();
        config.validate();
        Self {
            mode: config.guidance_mode,
            scanner: AreaScanner::new(config.scanner, NameCache::shared()),
            cursor: NavigationCursor::new(),
            planner: PathPlanner::new(config.planner),
            reach_radius: config.traverse.reach_radius,
            arrival_radius: config.traverse.arrival_radius,
            traverse: AutoTraverseController::new(config.traverse),
            cue,
            events: EventBus::new(config.event_capacity),
            active: None,
            intent: Vec2::ZERO,
        }
    }

    /// Guide with a headless audio cue.
    #[must_use]
    pub fn headless(config: &BeaconConfig) -> Self {
        Self::new(config, Some(GuideCue::headless(config.audio.clone())))
    }

    /// Event bus.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Scanner.
    #[must_use]
    pub const fn scanner(&self) -> &AreaScanner {
        &self.scanner
    }

    /// Selection cursor.
    #[must_use]
    pub const fn cursor(&self) -> &NavigationCursor {
        &self.cursor
    }

    /// Planner.
    #[must_use]
    pub const fn planner(&self) -> &PathPlanner {
        &self.planner
    }

    /// Auto-traverse controller.
    #[must_use]
    pub const fn traverse(&self) -> &AutoTraverseController {
        &self.traverse
    }

    /// Audio cue.
    #[must_use]
    pub const fn cue(&self) -> Option<&GuideCue> {
        self.cue.as_ref()
    }

    /// Guidance mode.
    #[must_use]
    pub const fn mode(&self) -> GuidanceMode {
        self.mode
    }

    /// Changes the mode; takes effect on the next start.
    pub fn set_mode(&mut self, mode: GuidanceMode) {
        self.mode = mode;
    }

    /// Whether guidance is running (possibly paused).
    #[must_use]
    pub const fn is_guiding(&self) -> bool {
        self.active.is_some()
    }

    /// Whether guidance is paused outside a navigable context.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.paused)
    }

    /// Entity being guided to.
    #[must_use]
    pub fn target(&self) -> Option<&Entity> {
        self.active.as_ref().map(|a| &a.target)
    }

    /// Intent from the last tick.
    #[must_use]
    pub const fn intent(&self) -> Vec2 {
        self.intent
    }

    fn announce(&self, announcement: Announcement, out: &mut Vec<Announcement>) {
        debug!("Announcement: {announcement}");
        self.events.publish(GuideEvent::Announcement(announcement.clone()));
        out.push(announcement);
    }

    fn say(&self, announcement: Announcement) -> Announcement {
        debug!("Announcement: {announcement}");
        self.events.publish(GuideEvent::Announcement(announcement.clone()));
        announcement
    }

    /// Selects the next or previous non-empty category.
    pub fn cycle_category(&mut self, direction: CycleDirection) -> Announcement {
        let announcement = self.cursor.cycle_category(direction, self.scanner.lists());
        self.say(announcement)
    }

    /// Selects the next or previous entry in the current category.
    pub fn cycle_entry(&mut self, direction: CycleDirection, world: &dyn WorldQuery) -> Announcement {
        let observer = world.observer().position;
        let announcement =
            self.cursor
                .cycle_entry(direction, self.scanner.lists(), world, observer);
        self.say(announcement)
    }

    /// Repeats the current entry with a live distance.
    pub fn describe_current(&self, world: &dyn WorldQuery) -> Announcement {
        let observer = world.observer().position;
        self.say(self.cursor.describe(self.scanner.lists(), world, observer))
    }

    /// Starts guidance to the selected entry, replacing any running guidance.
    ///
    /// The route is planned immediately. Auto-traversal needs a route; the
    /// cue does not, and points straight at the target when there is none.
    pub fn start_guidance(
        &mut self,
        world: &dyn WorldQuery,
        surface: &dyn WalkableSurface,
    ) -> Vec<Announcement> {
        let mut out = Vec::new();
        if self.active.is_some() {
            self.halt();
        }

        let observer = world.observer();
        let Some(selected) = self.cursor.current(self.scanner.lists()) else {
            self.announce(Announcement::NoPointsOfInterest, &mut out);
            return out;
        };
        let target = selected.refreshed(world, observer.position);
        if let Some(reason) = target.loss_reason(world) {
            self.announce(
                Announcement::TargetLost {
                    name: target.name,
                    reason,
                },
                &mut out,
            );
            return out;
        }

        let plan = self
            .planner
            .plan(surface, observer.position, target.position)
            .clone();

        if self.mode.uses_traversal() {
            match self.traverse.start(&plan, observer.position) {
                Some(event) => self.events.publish(GuideEvent::Traverse(event)),
                None if !self.mode.uses_audio() => {
                    self.planner.clear();
                    self.announce(
                        Announcement::NoRoute {
                            name: target.name,
                            distance: plan.straight_line(),
                        },
                        &mut out,
                    );
                    return out;
                },
                None => {
                    self.announce(
                        Announcement::NoRoute {
                            name: target.name.clone(),
                            distance: plan.straight_line(),
                        },
                        &mut out,
                    );
                },
            }
        }

        if self.mode.uses_audio() {
            let point = self.cue_point(&plan, observer.position, target.position);
            if let Some(cue) = &mut self.cue {
                if let Err(e) = cue.start(observer, point) {
                    warn!("Guidance cue unavailable: {e}");
                }
            }
        }

        info!(
            "Guiding to {} ({:?}, {:.1} m)",
            target.name,
            plan.completeness(),
            plan.reported_distance()
        );
        self.announce(
            Announcement::RouteStarted {
                name: target.name.clone(),
                distance: plan.reported_distance(),
                completeness: plan.completeness(),
            },
            &mut out,
        );
        self.events.publish(GuideEvent::GuidanceChanged {
            active: true,
            target: Some(target.name.clone()),
        });
        self.active = Some(ActiveGuidance {
            target,
            paused: false,
        });
        out
    }

    /// Stops guidance. The cue is off the bus and its thread joined before
    /// this returns.
    pub fn stop_guidance(&mut self) -> Option<Announcement> {
        self.active.as_ref()?;
        self.halt();
        Some(self.say(Announcement::RouteStopped))
    }

    fn halt(&mut self) {
        if let Some(event) = self.traverse.stop() {
            self.events.publish(GuideEvent::Traverse(event));
        }
        self.planner.clear();
        if let Some(cue) = &mut self.cue {
            cue.stop();
        }
        if self.active.take().is_some() {
            self.events.publish(GuideEvent::GuidanceChanged {
                active: false,
                target: None,
            });
        }
        self.set_intent(Vec2::ZERO);
    }

    fn set_intent(&mut self, intent: Vec2) {
        if intent != self.intent {
            self.intent = intent;
            self.events.publish(GuideEvent::intent(intent));
        }
    }

    /// Where the cue sounds from: the next route waypoint beyond the reach
    /// radius, or the target itself without a route.
    fn cue_point(&self, plan: &RoutePlan, observer: Vec3, target: Vec3) -> Vec3 {
        if !plan.is_routable() {
            return target;
        }
        let waypoints = plan.waypoints();
        let mut index = anchor_index(waypoints, observer);
        while index < waypoints.len()
            && horizontal_distance(observer, waypoints[index]) <= self.reach_radius
        {
            index += 1;
        }
        waypoints.get(index).copied().unwrap_or(target)
    }

    /// Runs one simulation tick.
    pub fn tick(
        &mut self,
        dt: f32,
        world: &dyn WorldQuery,
        surface: &dyn WalkableSurface,
    ) -> GuideTick {
        let mut out = GuideTick {
            scan: self.scanner.update(dt, world),
            ..GuideTick::default()
        };

        if let Some(area) = out.scan.area_changed {
            debug!("Entered {area}");
            self.cursor.reset();
            if let Some(active) = &self.active {
                let name = active.target.name.clone();
                self.halt();
                info!("Guidance stopped: area changed");
                self.announce(
                    Announcement::TargetLost {
                        name,
                        reason: LossReason::AreaChanged,
                    },
                    &mut out.announcements,
                );
            }
        }
        self.sync_cursor(&out.scan);

        if !world.is_navigable() {
            self.pause();
            out.intent = self.intent;
            return out;
        }
        if self.active.is_none() {
            return out;
        }

        let observer = world.observer();
        if self.is_paused() {
            self.resume(&observer, surface);
        }
        self.guide(dt, &observer, world, surface, &mut out.announcements);
        out.intent = self.intent;
        out
    }

    fn sync_cursor(&mut self, scan: &ScanReport) {
        let lists = self.scanner.lists();
        if self.cursor.category().is_none() {
            if scan.added > 0 {
                self.cursor.restore_preferred(lists);
            }
        } else if scan.refreshed || scan.added > 0 {
            self.cursor.clamp(lists);
        }
    }

    fn pause(&mut self) {
        let Some(active) = &mut self.active else {
            return;
        };
        if active.paused {
            return;
        }
        active.paused = true;
        info!("Guidance paused outside a navigable context");
        self.traverse.pause();
        if let Some(cue) = &self.cue {
            cue.set_audible(false);
        }
        self.set_intent(Vec2::ZERO);
    }

    fn resume(&mut self, observer: &ObserverPose, surface: &dyn WalkableSurface) {
        let Some(active) = &mut self.active else {
            return;
        };
        active.paused = false;
        let target = active.target.position;
        info!("Guidance resumed");

        let plan = self.planner.plan(surface, observer.position, target);
        if let Some(event) = self.traverse.resume(plan, observer.position) {
            self.events.publish(GuideEvent::Traverse(event));
        }
        if let Some(cue) = &self.cue {
            cue.set_audible(true);
        }
    }

    fn guide(
        &mut self,
        dt: f32,
        observer: &ObserverPose,
        world: &dyn WorldQuery,
        surface: &dyn WalkableSurface,
        out: &mut Vec<Announcement>,
    ) {
        let Some(active) = &mut self.active else {
            return;
        };
        if let Some(reason) = active.target.loss_reason(world) {
            let name = active.target.name.clone();
            info!("Guidance stopped: {name} {reason}");
            self.halt();
            self.announce(Announcement::TargetLost { name, reason }, out);
            return;
        }
        active.target = active.target.refreshed(world, observer.position);
        let target = active.target.position;
        let pos = observer.position;

        if let Some(plan) = self.planner.update(dt, surface, pos, target) {
            self.traverse.on_route_updated(plan, pos);
        }

        if let Some(cue) = &self.cue {
            let point = self
                .planner
                .current()
                .map_or(target, |plan| self.cue_point(plan, pos, target));
            cue.update_pose(*observer, point);
        }

        if self.traverse.is_active() {
            let tick = self.traverse.tick(dt, observer, surface);
            self.set_intent(tick.intent);
            for event in tick.events {
                self.events.publish(GuideEvent::Traverse(event));
                self.on_traverse_event(event, observer, surface, out);
            }
        } else if horizontal_distance(pos, target) <= self.arrival_radius {
            self.arrive(out);
        }
    }

    fn on_traverse_event(
        &mut self,
        event: TraverseEvent,
        observer: &ObserverPose,
        surface: &dyn WalkableSurface,
        out: &mut Vec<Announcement>,
    ) {
        match event {
            TraverseEvent::AvoidanceStarted { .. } => {
                self.announce(Announcement::AvoidingObstacle, out);
            },
            TraverseEvent::DetourFinished { .. } => {
                if let Some(plan) = self.planner.replan(surface, observer.position) {
                    if plan.completeness() != Completeness::Unreachable {
                        self.traverse.on_route_updated(plan, observer.position);
                    }
                }
            },
            TraverseEvent::Arrived => self.arrive(out),
            TraverseEvent::Abandoned { attempts } => {
                let Some(name) = self.target().map(|t| t.name.clone()) else {
                    return;
                };
                warn!("Traversal to {name} abandoned after {attempts} attempts");
                self.halt();
                self.announce(Announcement::TraversalAbandoned { name }, out);
            },
            _ => {},
        }
    }

    fn arrive(&mut self, out: &mut Vec<Announcement>) {
        let Some(name) = self.target().map(|t| t.name.clone()) else {
            return;
        };
        info!("Arrived at {name}");
        self.halt();
        self.announce(Announcement::Arrived { name }, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_nav::{MockWorld, RecordKind};

    fn config(mode: GuidanceMode) -> BeaconConfig {
        BeaconConfig {
            guidance_mode: mode,
            ..BeaconConfig::default()
        }
    }

    fn scanned_guide(world: &MockWorld, mode: GuidanceMode) -> Guide {
        let mut guide = Guide::headless(&config(mode));
        for _ in 0..20 {
            guide.tick(0.1, world, world);
        }
        guide
    }

    #[test]
    fn test_nothing_selected() {
        let world = MockWorld::new();
        let mut guide = scanned_guide(&world, GuidanceMode::AudioCue);
        assert_eq!(
            guide.start_guidance(&world, &world),
            vec![Announcement::NoPointsOfInterest]
        );
        assert!(!guide.is_guiding());
    }

    #[test]
    fn test_cursor_restored_after_first_scan() {
        let mut world = MockWorld::new();
        world.spawn(RecordKind::Item, Vec3::new(3.0, 0.0, 0.0), "coin");
        let guide = scanned_guide(&world, GuidanceMode::AudioCue);
        assert!(guide.cursor().category().is_some());
    }

    #[test]
    fn test_audio_cue_follows_next_waypoint() {
        let mut world = MockWorld::new();
        world.spawn(RecordKind::Item, Vec3::new(0.0, 0.0, 12.0), "coin");
        world.add_blocker(Vec3::new(0.0, 0.0, 6.0), 2.0);
        let mut guide = scanned_guide(&world, GuidanceMode::AudioCue);

        let said = guide.start_guidance(&world, &world);
        assert!(matches!(
            said.last(),
            Some(Announcement::RouteStarted {
                completeness: Completeness::Complete,
                ..
            })
        ));
        let cue = guide.cue().expect("cue");
        assert!(cue.is_active());
        let snapshot = cue.source().expect("source").pose().snapshot();
        // The corner around the blocker, not the coin itself.
        assert!(snapshot.target.x.abs() > 1.0);

        assert_eq!(guide.stop_guidance(), Some(Announcement::RouteStopped));
        assert_eq!(guide.cue().expect("cue").bus().source_count(), 0);
        assert_eq!(guide.stop_guidance(), None);
    }
}
