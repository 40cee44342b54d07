//! Area scanner.
//!
//! Keeps the categorized inventory of nearby points of interest for the
//! current area. The world loads objects asynchronously and in separate
//! classes, so the scanner works in phases:
//!
//! ```text
//!  area change ──► AwaitingLoad ──(load delay)──► Rescanning ──(window)──► Steady
//!                  lists empty                    additive sub-scans         periodic Refresh
//!                                                 per loaded class           (removals, re-sort)
//! ```
//!
//! During the rescan window scans only add: objects culled to inactive by
//! distance stay listed. Removal happens in [`AreaScanner::refresh`], which
//! drops destroyed, defeated and consumed objects, plus characters and
//! hostiles that left play.

use std::sync::Arc;

use ahash::AHashSet;
use beacon_common::{horizontal_distance, AreaId, EntityHandle, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::category::Category;
use crate::entity::{CategoryLists, Entity, EntityRecord, LossReason, ObjectClass};
use crate::names::{fallback_label, resolve_name, NameCache};
use crate::world::WorldQuery;

/// Scanner timing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Delay after an area change before the first scan (seconds).
    pub load_delay: f32,
    /// Length of the additive rescan window (seconds).
    pub rescan_window: f32,
    /// Interval between sub-scans inside the window (seconds).
    pub rescan_interval: f32,
    /// Interval between refreshes after the window (seconds).
    pub refresh_interval: f32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            load_delay: 1.0,
            rescan_window: 5.0,
            rescan_interval: 0.5,
            refresh_interval: 1.0,
        }
    }
}

impl ScannerConfig {
    /// Clamps values to sensible ranges.
    pub fn validate(&mut self) {
        self.load_delay = self.load_delay.clamp(0.0, 30.0);
        self.rescan_window = self.rescan_window.clamp(0.0, 60.0);
        self.rescan_interval = self.rescan_interval.clamp(0.05, 10.0);
        self.refresh_interval = self.refresh_interval.clamp(0.05, 10.0);
    }
}

/// Scanner phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanPhase {
    /// No area seen yet.
    Idle,
    /// Waiting for the area to load.
    AwaitingLoad {
        /// Seconds left.
        remaining: f32,
    },
    /// Additive sub-scans.
    Rescanning {
        /// Seconds left in the window.
        window: f32,
        /// Seconds to the next sub-scan.
        next_scan: f32,
    },
    /// Periodic refresh.
    Steady {
        /// Seconds to the next refresh.
        next_refresh: f32,
    },
}

/// An entity dropped by a refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    /// The entity as last tracked.
    pub entity: Entity,
    /// Why it was dropped.
    pub reason: LossReason,
}

/// What one [`AreaScanner::update`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    /// The area switched to this one; all lists were cleared.
    pub area_changed: Option<AreaId>,
    /// Entities added by scans this tick.
    pub added: usize,
    /// Entities removed by a refresh this tick.
    pub removed: Vec<Removal>,
    /// The rescan window closed this tick.
    pub window_closed: bool,
    /// A refresh ran this tick.
    pub refreshed: bool,
}

/// Discovers and classifies points of interest.
#[derive(Debug)]
pub struct AreaScanner {
    config: ScannerConfig,
    phase: ScanPhase,
    area: Option<AreaId>,
    lists: CategoryLists,
    known: AHashSet<EntityHandle>,
    names: Arc<NameCache>,
}

impl AreaScanner {
    /// Creates a scanner using a shared name cache.
    #[must_use]
    pub fn new(config: ScannerConfig, names: Arc<NameCache>) -> Self {
        Self {
            config,
            phase: ScanPhase::Idle,
            area: None,
            lists: CategoryLists::new(),
            known: AHashSet::new(),
            names,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// Area the lists belong to.
    #[must_use]
    pub const fn area(&self) -> Option<AreaId> {
        self.area
    }

    /// Current lists.
    #[must_use]
    pub const fn lists(&self) -> &CategoryLists {
        &self.lists
    }

    /// Number of identities seen in this area.
    #[must_use]
    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// Whether an identity has been seen in this area.
    #[must_use]
    pub fn is_known(&self, handle: EntityHandle) -> bool {
        self.known.contains(&handle)
    }

    /// Whether additive sub-scans are still running.
    #[must_use]
    pub const fn in_rescan_window(&self) -> bool {
        matches!(
            self.phase,
            ScanPhase::AwaitingLoad { .. } | ScanPhase::Rescanning { .. }
        )
    }

    /// Drops all lists and starts waiting for the new area to load.
    pub fn reset_for_area(&mut self, area: AreaId) {
        info!("Area changed to {area}, deferring scan");
        self.area = Some(area);
        self.lists.clear();
        self.known.clear();
        self.names.clear();
        self.phase = ScanPhase::AwaitingLoad {
            remaining: self.config.load_delay,
        };
    }

    /// Rebuilds every list from scratch over the loaded classes.
    pub fn rescan(&mut self, world: &dyn WorldQuery, observer: Vec3) -> &CategoryLists {
        self.lists.clear();
        self.known.clear();
        self.scan(world, observer);
        &self.lists
    }

    /// Adds objects that appeared since the last scan. Returns how many.
    pub fn incremental_rescan(&mut self, world: &dyn WorldQuery, observer: Vec3) -> usize {
        self.scan(world, observer)
    }

    fn scan(&mut self, world: &dyn WorldQuery, observer: Vec3) -> usize {
        let mut records: Vec<EntityRecord> = ObjectClass::ALL
            .into_iter()
            .filter(|class| world.is_loaded(*class))
            .flat_map(|class| world.records(class))
            .collect();
        // Facility views claim their handle before the plain character view.
        records.sort_by_key(|r| !r.facility);

        let mut added = 0;
        for record in &records {
            if self.known.contains(&record.handle) || !Self::admissible(record, world) {
                continue;
            }
            let category = record.category();
            let ordinal = self.lists.get(category).len() + 1;
            let name = resolve_name(record, world, &self.names).unwrap_or_else(|e| {
                warn!("Name for {} unresolved ({e}), using fallback", record.handle);
                fallback_label(ordinal)
            });
            let position = world.position(record.handle).unwrap_or(record.position);
            self.known.insert(record.handle);
            self.lists.get_mut(category).push(Entity {
                handle: record.handle,
                name,
                position,
                category,
                distance: horizontal_distance(observer, position),
                completion_flag: record.completion_flag.clone(),
            });
            added += 1;
        }

        if added > 0 {
            self.lists.sort();
            debug!("Scan added {added} entities ({} known)", self.known.len());
        }
        added
    }

    /// New objects are listed only when first seen live, active and not
    /// already resolved.
    fn admissible(record: &EntityRecord, world: &dyn WorldQuery) -> bool {
        if !record.active || !world.is_alive(record.handle) {
            return false;
        }
        if world.is_picked_up(record.handle) || world.is_defeated(record.handle) {
            return false;
        }
        !record
            .completion_flag
            .as_deref()
            .is_some_and(|flag| world.is_flag_set(flag))
    }

    /// Removes resolved objects, updates distances and re-sorts.
    pub fn refresh(&mut self, world: &dyn WorldQuery, observer: Vec3) -> Vec<Removal> {
        let mut removed = Vec::new();
        for category in Category::ALL {
            let list = self.lists.get_mut(category);
            let mut kept = Vec::with_capacity(list.len());
            for entity in list.drain(..) {
                let reason = entity.loss_reason(world).or_else(|| {
                    (category.deactivates() && !world.is_active(entity.handle))
                        .then_some(LossReason::Deactivated)
                });
                match reason {
                    Some(reason) => removed.push(Removal { entity, reason }),
                    None => kept.push(entity.refreshed(world, observer)),
                }
            }
            *list = kept;
        }
        for removal in &removed {
            self.known.remove(&removal.entity.handle);
            debug!(
                "Removed {} '{}': {}",
                removal.entity.handle, removal.entity.name, removal.reason
            );
        }
        self.lists.sort();
        removed
    }

    /// Advances the phase machine by `dt` seconds.
    ///
    /// Detects area changes, runs the deferred first scan once the load
    /// delay passes, sub-scans inside the window and refreshes afterwards.
    /// Does nothing while the world is not navigable.
    pub fn update(&mut self, dt: f32, world: &dyn WorldQuery) -> ScanReport {
        let mut report = ScanReport::default();

        let area = world.area();
        if self.area != Some(area) {
            self.reset_for_area(area);
            report.area_changed = Some(area);
        }
        if !world.is_navigable() {
            return report;
        }
        let observer = world.observer().position;

        self.phase = match self.phase {
            ScanPhase::Idle => ScanPhase::AwaitingLoad {
                remaining: self.config.load_delay,
            },
            ScanPhase::AwaitingLoad { remaining } => {
                let remaining = remaining - dt;
                if remaining > 0.0 {
                    ScanPhase::AwaitingLoad { remaining }
                } else {
                    report.added += self.scan(world, observer);
                    ScanPhase::Rescanning {
                        window: self.config.rescan_window,
                        next_scan: self.config.rescan_interval,
                    }
                }
            },
            ScanPhase::Rescanning { window, next_scan } => {
                let window = window - dt;
                let mut next_scan = next_scan - dt;
                if next_scan <= 0.0 {
                    report.added += self.scan(world, observer);
                    next_scan += self.config.rescan_interval;
                }
                if window > 0.0 {
                    ScanPhase::Rescanning { window, next_scan }
                } else {
                    report.window_closed = true;
                    info!(
                        "Rescan window closed for {area}: {} entities",
                        self.lists.len()
                    );
                    report.removed = self.refresh(world, observer);
                    report.refreshed = true;
                    ScanPhase::Steady {
                        next_refresh: self.config.refresh_interval,
                    }
                }
            },
            ScanPhase::Steady { next_refresh } => {
                let mut next_refresh = next_refresh - dt;
                if next_refresh <= 0.0 {
                    report.removed = self.refresh(world, observer);
                    report.refreshed = true;
                    next_refresh += self.config.refresh_interval;
                }
                ScanPhase::Steady { next_refresh }
            },
        };
        report
    }
}
