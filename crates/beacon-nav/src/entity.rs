//! Entity model.
//!
//! [`EntityRecord`] is what the world reports; [`Entity`] is what the scanner
//! keeps after classification and naming. [`CategoryLists`] holds the
//! distance-sorted entries for every category.

use std::fmt;

use beacon_common::{horizontal_distance, EntityHandle, Vec3};
use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::world::WorldQuery;

/// Object classes the world loads independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectClass {
    /// Characters, facilities, transitions.
    Entities,
    /// Pickups and materials.
    Items,
    /// Enemies.
    Hostiles,
}

impl ObjectClass {
    /// Every class.
    pub const ALL: [Self; 3] = [Self::Entities, Self::Items, Self::Hostiles];
}

/// Raw kind reported by the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// A character.
    Character,
    /// A pickup.
    Item,
    /// A crafting material.
    Material,
    /// A quest pickup.
    KeyItem,
    /// A door or exit.
    Transition,
    /// An enemy.
    Hostile,
}

/// One world object as reported by [`WorldQuery::records`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Identity handle.
    pub handle: EntityHandle,
    /// Load class.
    pub class: ObjectClass,
    /// Raw kind.
    pub kind: RecordKind,
    /// Whether the object also acts as a facility (shop, save point).
    pub facility: bool,
    /// Last reported position.
    pub position: Vec3,
    /// Whether the object is currently active.
    pub active: bool,
    /// Name stored directly on the object, if any.
    pub display_name: Option<String>,
    /// Record the name can be derived from.
    pub related_record: Option<u32>,
    /// Internal identifier string.
    pub identifier: String,
    /// Flag that marks this object resolved (key items).
    pub completion_flag: Option<String>,
}

impl EntityRecord {
    /// Creates an active record with no name data.
    #[must_use]
    pub fn new(handle: EntityHandle, class: ObjectClass, kind: RecordKind, position: Vec3) -> Self {
        Self {
            handle,
            class,
            kind,
            facility: false,
            position,
            active: true,
            display_name: None,
            related_record: None,
            identifier: String::new(),
            completion_flag: None,
        }
    }

    /// Category after precedence: facility wins over the raw kind.
    #[must_use]
    pub const fn category(&self) -> Category {
        if self.facility {
            return Category::Facility;
        }
        match self.kind {
            RecordKind::Character => Category::Character,
            RecordKind::Item => Category::Item,
            RecordKind::Material => Category::Material,
            RecordKind::KeyItem => Category::KeyItem,
            RecordKind::Transition => Category::Transition,
            RecordKind::Hostile => Category::Hostile,
        }
    }
}

/// Why a tracked entity left its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LossReason {
    /// The handle no longer refers to a live object.
    Destroyed,
    /// A hostile was defeated.
    Defeated,
    /// Picked up, or its completion flag is set.
    Consumed,
    /// A character or hostile left play.
    Deactivated,
    /// The world area was unloaded.
    AreaChanged,
}

impl LossReason {
    /// Spoken suffix.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Destroyed => "is gone",
            Self::Defeated => "defeated",
            Self::Consumed => "picked up",
            Self::Deactivated => "no longer present",
            Self::AreaChanged => "left behind, area changed",
        }
    }
}

impl fmt::Display for LossReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A tracked point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Identity handle.
    pub handle: EntityHandle,
    /// Resolved name.
    pub name: String,
    /// Last known position.
    pub position: Vec3,
    /// Category.
    pub category: Category,
    /// Horizontal distance to the observer at the last refresh.
    pub distance: f32,
    /// Flag that marks this entity resolved.
    pub completion_flag: Option<String>,
}

impl Entity {
    /// Copy with live position and distance when the entity is still active,
    /// else the cached position with distance recomputed.
    #[must_use]
    pub fn refreshed(&self, world: &dyn WorldQuery, observer: Vec3) -> Self {
        let position = if world.is_alive(self.handle) && world.is_active(self.handle) {
            world.position(self.handle).unwrap_or(self.position)
        } else {
            self.position
        };
        Self {
            position,
            distance: horizontal_distance(observer, position),
            ..self.clone()
        }
    }

    /// Hard loss check: destroyed, defeated or consumed. Deactivation is not
    /// considered here.
    #[must_use]
    pub fn loss_reason(&self, world: &dyn WorldQuery) -> Option<LossReason> {
        if !world.is_alive(self.handle) {
            return Some(LossReason::Destroyed);
        }
        if self.category == Category::Hostile && world.is_defeated(self.handle) {
            return Some(LossReason::Defeated);
        }
        if self.category.consumable() {
            let flagged = self
                .completion_flag
                .as_deref()
                .is_some_and(|flag| world.is_flag_set(flag));
            if flagged || world.is_picked_up(self.handle) {
                return Some(LossReason::Consumed);
            }
        }
        None
    }
}

/// Distance-sorted entries per category.
#[derive(Debug, Clone, Default)]
pub struct CategoryLists {
    lists: [Vec<Entity>; Category::COUNT],
}

impl CategoryLists {
    /// Creates empty lists.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries of one category.
    #[must_use]
    pub fn get(&self, category: Category) -> &[Entity] {
        &self.lists[category.index()]
    }

    pub(crate) fn get_mut(&mut self, category: Category) -> &mut Vec<Entity> {
        &mut self.lists[category.index()]
    }

    /// Categories with at least one entry, in cycling order.
    #[must_use]
    pub fn active_categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| !self.get(*c).is_empty())
            .collect()
    }

    /// Whether a category has entries.
    #[must_use]
    pub fn is_active(&self, category: Category) -> bool {
        !self.get(category).is_empty()
    }

    /// Total entries across categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    /// Whether every list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(Vec::is_empty)
    }

    /// Finds an entry by handle.
    #[must_use]
    pub fn find(&self, handle: EntityHandle) -> Option<&Entity> {
        self.iter().find(|e| e.handle == handle)
    }

    /// All entries, category by category.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.lists.iter().flatten()
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
    }

    /// Sorts every list by ascending distance.
    pub fn sort(&mut self) {
        for list in &mut self.lists {
            list.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(index: u32, category: Category, distance: f32) -> Entity {
        Entity {
            handle: EntityHandle::new(index, 0),
            name: format!("e{index}"),
            position: Vec3::ZERO,
            category,
            distance,
            completion_flag: None,
        }
    }

    #[test]
    fn test_facility_precedence() {
        let mut record = EntityRecord::new(
            EntityHandle::new(1, 0),
            ObjectClass::Entities,
            RecordKind::Character,
            Vec3::ZERO,
        );
        assert_eq!(record.category(), Category::Character);
        record.facility = true;
        assert_eq!(record.category(), Category::Facility);
    }

    #[test]
    fn test_active_categories_iff_non_empty() {
        let mut lists = CategoryLists::new();
        assert!(lists.active_categories().is_empty());

        lists.get_mut(Category::Item).push(entity(1, Category::Item, 3.0));
        lists.get_mut(Category::Hostile).push(entity(2, Category::Hostile, 1.0));
        assert_eq!(
            lists.active_categories(),
            vec![Category::Item, Category::Hostile]
        );

        lists.get_mut(Category::Item).clear();
        assert_eq!(lists.active_categories(), vec![Category::Hostile]);
    }

    #[test]
    fn test_sort_by_distance() {
        let mut lists = CategoryLists::new();
        let items = lists.get_mut(Category::Item);
        items.push(entity(1, Category::Item, 9.0));
        items.push(entity(2, Category::Item, 2.0));
        items.push(entity(3, Category::Item, 5.0));
        lists.sort();

        let order: Vec<u32> = lists
            .get(Category::Item)
            .iter()
            .map(|e| e.handle.index())
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
    }
}
