//! Point-of-interest categories.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category an entity is listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Non-hostile characters.
    Character,
    /// Pickups.
    Item,
    /// Gatherable crafting materials.
    Material,
    /// Quest-relevant pickups.
    KeyItem,
    /// Doors, exits and other area transitions.
    Transition,
    /// Enemies.
    Hostile,
    /// Shops, save points, workbenches.
    Facility,
}

impl Category {
    /// Every category in cycling order.
    pub const ALL: [Self; 7] = [
        Self::Character,
        Self::Item,
        Self::Material,
        Self::KeyItem,
        Self::Transition,
        Self::Hostile,
        Self::Facility,
    ];

    /// Number of categories.
    pub const COUNT: usize = Self::ALL.len();

    /// Position in [`Category::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Spoken label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Character => "Characters",
            Self::Item => "Items",
            Self::Material => "Materials",
            Self::KeyItem => "Key items",
            Self::Transition => "Exits",
            Self::Hostile => "Enemies",
            Self::Facility => "Facilities",
        }
    }

    /// Members deactivate instead of despawning when they leave play.
    #[must_use]
    pub const fn deactivates(self) -> bool {
        matches!(self, Self::Hostile | Self::Character)
    }

    /// Members disappear when picked up or flagged complete.
    #[must_use]
    pub const fn consumable(self) -> bool {
        matches!(self, Self::Item | Self::Material | Self::KeyItem)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
