//! In-memory world for tests and headless runs.
//!
//! [`MockWorld`] implements both collaborator traits. The walkable surface is
//! a flat square with circular blockers; routes go straight, or around a
//! single blocker, or stop short of it as a partial route.

use std::sync::atomic::{AtomicUsize, Ordering};

use ahash::{AHashMap, AHashSet};
use beacon_common::{flatten, horizontal_distance, AreaId, EntityHandle, ObserverPose, Vec3};

use crate::entity::{EntityRecord, ObjectClass, RecordKind};
use crate::world::{LookupError, RouteQuery, RouteStatus, WalkableSurface, WorldQuery};

/// Clearance kept from blockers when routing around them.
const ROUTE_CLEARANCE: f32 = 1.0;

/// Circular obstacle on the walkable surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blocker {
    /// Centre (Y ignored).
    pub center: Vec3,
    /// Radius.
    pub radius: f32,
}

impl Blocker {
    fn contains(&self, point: Vec3) -> bool {
        horizontal_distance(self.center, point) < self.radius
    }

    /// Parameter along `a → b` where the segment first enters the disc.
    fn hit(&self, a: Vec3, b: Vec3) -> Option<f32> {
        let a = flatten(a);
        let d = flatten(b) - a;
        let f = a - flatten(self.center);
        let qa = d.length_squared();
        if qa <= f32::EPSILON {
            return self.contains(a).then_some(0.0);
        }
        let qb = 2.0 * f.dot(d);
        let qc = f.length_squared() - self.radius * self.radius;
        let disc = qb * qb - 4.0 * qa * qc;
        if disc < 0.0 {
            return None;
        }
        let root = disc.sqrt();
        let t0 = (-qb - root) / (2.0 * qa);
        let t1 = (-qb + root) / (2.0 * qa);
        if t1 < 0.0 || t0 > 1.0 {
            return None;
        }
        Some(t0.max(0.0))
    }
}

#[derive(Debug, Clone)]
struct Slot {
    record: EntityRecord,
    alive: bool,
    picked_up: bool,
    defeated: bool,
}

/// Scriptable world.
#[derive(Debug)]
pub struct MockWorld {
    area: AreaId,
    navigable: bool,
    loaded: AHashSet<ObjectClass>,
    slots: Vec<Slot>,
    extra_records: Vec<EntityRecord>,
    flags: AHashSet<String>,
    related: AHashMap<u32, String>,
    related_lookups: AtomicUsize,
    observer: ObserverPose,
    half_extent: f32,
    blockers: Vec<Blocker>,
}

impl Default for MockWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWorld {
    /// Creates a navigable, fully loaded, empty 200 m square in area 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            area: AreaId::new(1),
            navigable: true,
            loaded: ObjectClass::ALL.into_iter().collect(),
            slots: Vec::new(),
            extra_records: Vec::new(),
            flags: AHashSet::new(),
            related: AHashMap::new(),
            related_lookups: AtomicUsize::new(0),
            observer: ObserverPose::default(),
            half_extent: 100.0,
            blockers: Vec::new(),
        }
    }

    /// Sets the half-width of the walkable square.
    #[must_use]
    pub fn with_extent(mut self, half_extent: f32) -> Self {
        self.half_extent = half_extent.max(1.0);
        self
    }

    /// Adds an object and returns its handle.
    pub fn spawn(&mut self, kind: RecordKind, position: Vec3, name: &str) -> EntityHandle {
        let class = match kind {
            RecordKind::Item | RecordKind::Material | RecordKind::KeyItem => ObjectClass::Items,
            RecordKind::Hostile => ObjectClass::Hostiles,
            RecordKind::Character | RecordKind::Transition => ObjectClass::Entities,
        };
        let handle = EntityHandle::new(self.slots.len() as u32, 0);
        let mut record = EntityRecord::new(handle, class, kind, position);
        if !name.is_empty() {
            record.display_name = Some(name.to_owned());
        }
        self.spawn_record(record)
    }

    /// Adds a fully specified record, assigning it a fresh handle.
    pub fn spawn_record(&mut self, mut record: EntityRecord) -> EntityHandle {
        let handle = EntityHandle::new(self.slots.len() as u32, 0);
        record.handle = handle;
        self.slots.push(Slot {
            record,
            alive: true,
            picked_up: false,
            defeated: false,
        });
        handle
    }

    /// Adds a second record for an existing handle, e.g. the facility view of
    /// a shopkeeper character.
    pub fn add_alias(&mut self, record: EntityRecord) {
        self.extra_records.push(record);
    }

    fn slot(&self, handle: EntityHandle) -> Option<&Slot> {
        self.slots
            .get(handle.index() as usize)
            .filter(|s| s.alive && s.record.handle == handle)
    }

    fn slot_mut(&mut self, handle: EntityHandle) -> Option<&mut Slot> {
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|s| s.alive && s.record.handle == handle)
    }

    /// Record for a handle.
    #[must_use]
    pub fn record(&self, handle: EntityHandle) -> Option<&EntityRecord> {
        self.slot(handle).map(|s| &s.record)
    }

    /// Mutable record for a handle.
    pub fn record_mut(&mut self, handle: EntityHandle) -> Option<&mut EntityRecord> {
        self.slot_mut(handle).map(|s| &mut s.record)
    }

    /// Destroys an object; its handle goes stale.
    pub fn despawn(&mut self, handle: EntityHandle) {
        if let Some(slot) = self.slot_mut(handle) {
            slot.alive = false;
            slot.record.handle = handle.next_generation();
        }
    }

    /// Marks a pickup collected.
    pub fn pick_up(&mut self, handle: EntityHandle) {
        if let Some(slot) = self.slot_mut(handle) {
            slot.picked_up = true;
        }
    }

    /// Marks a hostile defeated.
    pub fn defeat(&mut self, handle: EntityHandle) {
        if let Some(slot) = self.slot_mut(handle) {
            slot.defeated = true;
            slot.record.active = false;
        }
    }

    /// Sets an object's active flag.
    pub fn set_active(&mut self, handle: EntityHandle, active: bool) {
        if let Some(slot) = self.slot_mut(handle) {
            slot.record.active = active;
        }
    }

    /// Moves an object.
    pub fn move_entity(&mut self, handle: EntityHandle, position: Vec3) {
        if let Some(slot) = self.slot_mut(handle) {
            slot.record.position = position;
        }
    }

    /// Sets a persistent flag.
    pub fn set_flag(&mut self, flag: &str) {
        self.flags.insert(flag.to_owned());
    }

    /// Registers a related-record name.
    pub fn set_related_name(&mut self, record: u32, name: &str) {
        self.related.insert(record, name.to_owned());
    }

    /// Number of related-name lookups served.
    #[must_use]
    pub fn related_lookups(&self) -> usize {
        self.related_lookups.load(Ordering::Relaxed)
    }

    /// Marks a class loaded or not.
    pub fn set_loaded(&mut self, class: ObjectClass, loaded: bool) {
        if loaded {
            self.loaded.insert(class);
        } else {
            self.loaded.remove(&class);
        }
    }

    /// Switches to another area: every object is destroyed and every class
    /// starts unloaded.
    pub fn change_area(&mut self, area: AreaId) {
        let handles: Vec<_> = self.slots.iter().map(|s| s.record.handle).collect();
        for handle in handles {
            self.despawn(handle);
        }
        self.extra_records.clear();
        self.blockers.clear();
        self.loaded.clear();
        self.area = area;
    }

    /// Marks every class loaded.
    pub fn finish_loading(&mut self) {
        self.loaded = ObjectClass::ALL.into_iter().collect();
    }

    /// Toggles whether guidance applies.
    pub fn set_navigable(&mut self, navigable: bool) {
        self.navigable = navigable;
    }

    /// Places the observer.
    pub fn set_observer(&mut self, observer: ObserverPose) {
        self.observer = observer;
    }

    /// Adds a circular obstacle.
    pub fn add_blocker(&mut self, center: Vec3, radius: f32) {
        self.blockers.push(Blocker { center, radius });
    }

    /// Moves the observer along a stick-style intent at `speed` m/s. Movement
    /// into a blocker or off the surface is refused.
    pub fn walk(&mut self, intent: beacon_common::Vec2, speed: f32, dt: f32) {
        let (right, forward) = self.observer.input_axes();
        let step = (right * intent.x + forward * intent.y) * speed * dt;
        let next = self.observer.position + step;
        if self.is_walkable(next) {
            self.observer.position = next;
            if step.length_squared() > f32::EPSILON {
                self.observer.forward = step.normalize();
            }
        }
    }

    fn in_bounds(&self, point: Vec3) -> bool {
        point.x.abs() <= self.half_extent && point.z.abs() <= self.half_extent
    }

    fn is_walkable(&self, point: Vec3) -> bool {
        self.in_bounds(point) && !self.blockers.iter().any(|b| b.contains(point))
    }

    fn first_hit(&self, a: Vec3, b: Vec3) -> Option<(f32, Blocker)> {
        self.blockers
            .iter()
            .filter_map(|blocker| blocker.hit(a, b).map(|t| (t, *blocker)))
            .min_by(|x, y| x.0.total_cmp(&y.0))
    }
}

impl WorldQuery for MockWorld {
    fn area(&self) -> AreaId {
        self.area
    }

    fn is_navigable(&self) -> bool {
        self.navigable
    }

    fn is_loaded(&self, class: ObjectClass) -> bool {
        self.loaded.contains(&class)
    }

    fn records(&self, class: ObjectClass) -> Vec<EntityRecord> {
        self.slots
            .iter()
            .filter(|s| s.alive && s.record.class == class)
            .map(|s| s.record.clone())
            .chain(
                self.extra_records
                    .iter()
                    .filter(|r| r.class == class && self.slot(r.handle).is_some())
                    .cloned(),
            )
            .collect()
    }

    fn is_alive(&self, handle: EntityHandle) -> bool {
        self.slot(handle).is_some()
    }

    fn is_active(&self, handle: EntityHandle) -> bool {
        self.slot(handle).is_some_and(|s| s.record.active)
    }

    fn position(&self, handle: EntityHandle) -> Option<Vec3> {
        self.slot(handle).map(|s| s.record.position)
    }

    fn is_picked_up(&self, handle: EntityHandle) -> bool {
        self.slot(handle).is_some_and(|s| s.picked_up)
    }

    fn is_defeated(&self, handle: EntityHandle) -> bool {
        self.slot(handle).is_some_and(|s| s.defeated)
    }

    fn is_flag_set(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    fn related_name(&self, record: u32) -> Result<String, LookupError> {
        self.related_lookups.fetch_add(1, Ordering::Relaxed);
        self.related
            .get(&record)
            .cloned()
            .ok_or(LookupError::MissingRecord(record))
    }

    fn observer(&self) -> ObserverPose {
        self.observer
    }
}

impl WalkableSurface for MockWorld {
    fn snap(&self, point: Vec3, radius: f32) -> Option<Vec3> {
        let mut snapped = Vec3::new(
            point.x.clamp(-self.half_extent, self.half_extent),
            0.0,
            point.z.clamp(-self.half_extent, self.half_extent),
        );
        if let Some(blocker) = self.blockers.iter().find(|b| b.contains(snapped)) {
            let out = flatten(snapped - blocker.center).normalize_or_zero();
            let out = if out == Vec3::ZERO { Vec3::X } else { out };
            snapped = flatten(blocker.center) + out * (blocker.radius + 0.1);
        }
        (self.is_walkable(snapped) && horizontal_distance(point, snapped) <= radius)
            .then_some(snapped)
    }

    fn route(&self, from: Vec3, to: Vec3) -> RouteQuery {
        let (a, b) = (flatten(from), flatten(to));
        if !self.is_walkable(a) || !self.is_walkable(b) {
            return RouteQuery::failed();
        }
        let Some((t, blocker)) = self.first_hit(a, b) else {
            return RouteQuery {
                status: RouteStatus::Complete,
                waypoints: vec![a, b],
            };
        };

        let along = (b - a).normalize_or_zero();
        let side = Vec3::Y.cross(along);
        let closest = a + along * (flatten(blocker.center) - a).dot(along);
        let away = flatten(closest - blocker.center).normalize_or_zero();
        let away = if away == Vec3::ZERO { side } else { away };
        let corner = flatten(blocker.center) + away * (blocker.radius + ROUTE_CLEARANCE);

        if self.is_walkable(corner)
            && self.first_hit(a, corner).is_none()
            && self.first_hit(corner, b).is_none()
        {
            return RouteQuery {
                status: RouteStatus::Complete,
                waypoints: vec![a, corner, b],
            };
        }

        let length = (b - a).length();
        let stop = (t * length - ROUTE_CLEARANCE).max(0.0);
        RouteQuery {
            status: RouteStatus::Partial,
            waypoints: vec![a, a + along * stop],
        }
    }
}
