//! Selection state over the scanner's lists.

use beacon_common::Vec3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::announce::Announcement;
use crate::category::Category;
use crate::entity::{CategoryLists, Entity};
use crate::world::WorldQuery;

/// Cycling direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CycleDirection {
    /// Next item, wrapping to the first.
    Forward,
    /// Previous item, wrapping to the last.
    Backward,
}

impl CycleDirection {
    fn step(self, index: usize, len: usize) -> usize {
        match self {
            Self::Forward => (index + 1) % len,
            Self::Backward => (index + len - 1) % len,
        }
    }
}

/// Current category and entry, plus the category to come back to after an
/// area change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationCursor {
    category: Option<Category>,
    entry: usize,
    preferred: Option<Category>,
}

impl NavigationCursor {
    /// Creates an empty cursor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selected category.
    #[must_use]
    pub const fn category(&self) -> Option<Category> {
        self.category
    }

    /// Selected entry index.
    #[must_use]
    pub const fn entry_index(&self) -> usize {
        self.entry
    }

    /// Category restored after area changes.
    #[must_use]
    pub const fn preferred(&self) -> Option<Category> {
        self.preferred
    }

    /// Moves to the next or previous non-empty category and resets the entry.
    pub fn cycle_category(&mut self, direction: CycleDirection, lists: &CategoryLists) -> Announcement {
        let active = lists.active_categories();
        if active.is_empty() {
            self.category = None;
            self.entry = 0;
            return Announcement::NoPointsOfInterest;
        }

        let next = match self
            .category
            .and_then(|c| active.iter().position(|a| *a == c))
        {
            Some(i) => active[direction.step(i, active.len())],
            None => match direction {
                CycleDirection::Forward => active[0],
                CycleDirection::Backward => active[active.len() - 1],
            },
        };

        self.category = Some(next);
        self.preferred = Some(next);
        self.entry = 0;
        debug!("Category -> {next}");
        Announcement::CategorySelected {
            category: next,
            count: lists.get(next).len(),
        }
    }

    /// Moves to the next or previous entry in the current category.
    ///
    /// The announcement uses the entity's live position when it is still
    /// active.
    pub fn cycle_entry(
        &mut self,
        direction: CycleDirection,
        lists: &CategoryLists,
        world: &dyn WorldQuery,
        observer: Vec3,
    ) -> Announcement {
        self.clamp(lists);
        let Some(category) = self.category else {
            return Announcement::NoPointsOfInterest;
        };
        let len = lists.get(category).len();
        self.entry = direction.step(self.entry, len);
        self.describe(lists, world, observer)
    }

    /// Announcement for the current entry.
    pub fn describe(
        &self,
        lists: &CategoryLists,
        world: &dyn WorldQuery,
        observer: Vec3,
    ) -> Announcement {
        let Some(category) = self.category else {
            return Announcement::NoPointsOfInterest;
        };
        let list = lists.get(category);
        let Some(entity) = list.get(self.entry) else {
            return Announcement::NoPointsOfInterest;
        };
        let live = entity.refreshed(world, observer);
        Announcement::EntrySelected {
            name: live.name,
            distance: live.distance,
            ordinal: self.entry + 1,
            count: list.len(),
        }
    }

    /// The selected entity as last scanned.
    #[must_use]
    pub fn current<'a>(&self, lists: &'a CategoryLists) -> Option<&'a Entity> {
        lists.get(self.category?).get(self.entry)
    }

    /// Brings the selection back into range after the lists changed.
    ///
    /// A category that emptied falls back to the preferred category, then to
    /// the first non-empty one.
    pub fn clamp(&mut self, lists: &CategoryLists) {
        match self.category {
            Some(c) if lists.is_active(c) => {
                self.entry = self.entry.min(lists.get(c).len() - 1);
            },
            _ => {
                self.category = self.fallback_category(lists);
                self.entry = 0;
            },
        }
    }

    /// Re-selects the preferred category (or the first non-empty one) at its
    /// first entry. Used once a new area has been scanned.
    pub fn restore_preferred(&mut self, lists: &CategoryLists) {
        self.category = self.fallback_category(lists);
        self.entry = 0;
        debug!("Restored category {:?}", self.category);
    }

    /// Forgets the selection but keeps the preference.
    pub fn reset(&mut self) {
        self.category = None;
        self.entry = 0;
    }

    fn fallback_category(&self, lists: &CategoryLists) -> Option<Category> {
        self.preferred
            .filter(|p| lists.is_active(*p))
            .or_else(|| lists.active_categories().first().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::RecordKind;
    use crate::mock::MockWorld;
    use crate::names::NameCache;
    use crate::scanner::{AreaScanner, ScannerConfig};
    use beacon_common::AreaId;
    use proptest::prelude::*;

    fn scanned(world: &MockWorld) -> AreaScanner {
        let mut scanner = AreaScanner::new(ScannerConfig::default(), NameCache::shared());
        scanner.rescan(world, Vec3::ZERO);
        scanner
    }

    fn sample_world() -> MockWorld {
        let mut world = MockWorld::new();
        world.spawn(RecordKind::Item, Vec3::new(1.0, 0.0, 0.0), "coin");
        world.spawn(RecordKind::Item, Vec3::new(4.0, 0.0, 0.0), "gem");
        world.spawn(RecordKind::Item, Vec3::new(9.0, 0.0, 0.0), "ring");
        world.spawn(RecordKind::Hostile, Vec3::new(0.0, 0.0, 6.0), "wolf");
        world
    }

    #[test]
    fn test_empty_lists_report_nothing() {
        let world = MockWorld::new();
        let scanner = scanned(&world);
        let mut cursor = NavigationCursor::new();
        assert_eq!(
            cursor.cycle_category(CycleDirection::Forward, scanner.lists()),
            Announcement::NoPointsOfInterest
        );
        assert_eq!(
            cursor.cycle_entry(CycleDirection::Forward, scanner.lists(), &world, Vec3::ZERO),
            Announcement::NoPointsOfInterest
        );
    }

    #[test]
    fn test_category_cycle_wraps_and_sets_preference() {
        let world = sample_world();
        let scanner = scanned(&world);
        let mut cursor = NavigationCursor::new();

        cursor.cycle_category(CycleDirection::Forward, scanner.lists());
        assert_eq!(cursor.category(), Some(Category::Item));
        cursor.cycle_category(CycleDirection::Forward, scanner.lists());
        assert_eq!(cursor.category(), Some(Category::Hostile));
        cursor.cycle_category(CycleDirection::Forward, scanner.lists());
        assert_eq!(cursor.category(), Some(Category::Item));
        cursor.cycle_category(CycleDirection::Backward, scanner.lists());
        assert_eq!(cursor.preferred(), Some(Category::Hostile));
    }

    #[test]
    fn test_entering_category_resets_entry() {
        let world = sample_world();
        let scanner = scanned(&world);
        let mut cursor = NavigationCursor::new();
        cursor.cycle_category(CycleDirection::Forward, scanner.lists());
        cursor.cycle_entry(CycleDirection::Forward, scanner.lists(), &world, Vec3::ZERO);
        assert_eq!(cursor.entry_index(), 1);
        cursor.cycle_category(CycleDirection::Forward, scanner.lists());
        assert_eq!(cursor.entry_index(), 0);
    }

    #[test]
    fn test_entry_uses_live_position() {
        let mut world = sample_world();
        let scanner = scanned(&world);
        let mut cursor = NavigationCursor::new();
        cursor.cycle_category(CycleDirection::Backward, scanner.lists());
        assert_eq!(cursor.category(), Some(Category::Hostile));

        let wolf = cursor.current(scanner.lists()).expect("wolf").handle;
        world.move_entity(wolf, Vec3::new(0.0, 0.0, 20.0));
        match cursor.describe(scanner.lists(), &world, Vec3::ZERO) {
            Announcement::EntrySelected { distance, .. } => {
                assert!((distance - 20.0).abs() < 1e-4);
            },
            other => panic!("unexpected {other:?}"),
        }

        // Inactive: last known position.
        world.set_active(wolf, false);
        match cursor.describe(scanner.lists(), &world, Vec3::ZERO) {
            Announcement::EntrySelected { distance, .. } => {
                assert!((distance - 6.0).abs() < 1e-4);
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_restore_preferred_after_area_change() {
        let mut world = sample_world();
        let mut scanner = scanned(&world);
        let mut cursor = NavigationCursor::new();
        cursor.cycle_category(CycleDirection::Backward, scanner.lists());
        assert_eq!(cursor.preferred(), Some(Category::Hostile));

        // New area without hostiles: first non-empty category.
        world.change_area(AreaId::new(2));
        world.finish_loading();
        world.spawn(RecordKind::Transition, Vec3::X, "door");
        scanner.rescan(&world, Vec3::ZERO);
        cursor.restore_preferred(scanner.lists());
        assert_eq!(cursor.category(), Some(Category::Transition));
        assert_eq!(cursor.preferred(), Some(Category::Hostile));

        // Hostiles come back: preference restored.
        world.spawn(RecordKind::Hostile, Vec3::Z, "bat");
        scanner.rescan(&world, Vec3::ZERO);
        cursor.restore_preferred(scanner.lists());
        assert_eq!(cursor.category(), Some(Category::Hostile));
    }

    #[test]
    fn test_clamp_after_removal() {
        let mut world = sample_world();
        let mut scanner = scanned(&world);
        let mut cursor = NavigationCursor::new();
        cursor.cycle_category(CycleDirection::Forward, scanner.lists());
        cursor.cycle_entry(CycleDirection::Backward, scanner.lists(), &world, Vec3::ZERO);
        assert_eq!(cursor.entry_index(), 2);

        let ring = cursor.current(scanner.lists()).expect("ring").handle;
        world.pick_up(ring);
        scanner.refresh(&world, Vec3::ZERO);
        cursor.clamp(scanner.lists());
        assert_eq!(cursor.entry_index(), 1);
    }

    proptest! {
        #[test]
        fn prop_cycling_n_times_returns(
            count in 1usize..20,
            start in 0usize..20,
            backward in any::<bool>(),
        ) {
            let mut world = MockWorld::new();
            for i in 0..count {
                world.spawn(RecordKind::Item, Vec3::new(i as f32 + 1.0, 0.0, 0.0), "");
            }
            let scanner = scanned(&world);
            let mut cursor = NavigationCursor::new();
            cursor.cycle_category(CycleDirection::Forward, scanner.lists());
            let direction = if backward { CycleDirection::Backward } else { CycleDirection::Forward };
            for _ in 0..(start % count) {
                cursor.cycle_entry(CycleDirection::Forward, scanner.lists(), &world, Vec3::ZERO);
            }
            let original = cursor.entry_index();
            for _ in 0..count {
                cursor.cycle_entry(direction, scanner.lists(), &world, Vec3::ZERO);
            }
            prop_assert_eq!(cursor.entry_index(), original);
        }
    }
}
