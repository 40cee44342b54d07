//! Spoken announcements.
//!
//! Every user-visible outcome is an [`Announcement`] value; its `Display`
//! form is the text handed to the speech layer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::entity::LossReason;
use crate::planner::Completeness;

/// Something to tell the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Announcement {
    /// Nothing to navigate to.
    NoPointsOfInterest,
    /// A category was entered.
    CategorySelected {
        /// The category.
        category: Category,
        /// Entries in it.
        count: usize,
    },
    /// An entry was selected.
    EntrySelected {
        /// Entry name.
        name: String,
        /// Distance in metres.
        distance: f32,
        /// 1-based position.
        ordinal: usize,
        /// Entries in the category.
        count: usize,
    },
    /// Guidance toward an entry started.
    RouteStarted {
        /// Entry name.
        name: String,
        /// Route length, or straight-line distance when unreachable.
        distance: f32,
        /// Route classification.
        completeness: Completeness,
    },
    /// Guidance stopped on request.
    RouteStopped,
    /// The destination was reached.
    Arrived {
        /// Entry name.
        name: String,
    },
    /// The target left the world.
    TargetLost {
        /// Entry name.
        name: String,
        /// Why.
        reason: LossReason,
    },
    /// Auto-traversal is trying a detour.
    AvoidingObstacle,
    /// Auto-traversal gave up.
    TraversalAbandoned {
        /// Entry name.
        name: String,
    },
    /// Auto-traversal cannot start without a route.
    NoRoute {
        /// Entry name.
        name: String,
        /// Straight-line distance.
        distance: f32,
    },
}

/// Formats a distance as whole metres.
#[must_use]
pub fn metres(distance: f32) -> String {
    let rounded = distance.max(0.0).round() as u32;
    if rounded == 1 {
        "1 metre".to_owned()
    } else {
        format!("{rounded} metres")
    }
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPointsOfInterest => f.write_str("No points of interest"),
            Self::CategorySelected { category, count } => {
                let noun = if *count == 1 { "entry" } else { "entries" };
                write!(f, "{category}, {count} {noun}")
            },
            Self::EntrySelected {
                name,
                distance,
                ordinal,
                count,
            } => write!(f, "{name}, {}, {ordinal} of {count}", metres(*distance)),
            Self::RouteStarted {
                name,
                distance,
                completeness,
            } => match completeness {
                Completeness::Complete => write!(f, "Guiding to {name}, {}", metres(*distance)),
                Completeness::Partial => {
                    write!(f, "Guiding to {name}, partial path, {}", metres(*distance))
                },
                Completeness::Unreachable => write!(
                    f,
                    "Guiding to {name}, no path, straight line {}",
                    metres(*distance)
                ),
            },
            Self::RouteStopped => f.write_str("Guidance stopped"),
            Self::Arrived { name } => write!(f, "Arrived at {name}"),
            Self::TargetLost { name, reason } => match reason {
                LossReason::AreaChanged => f.write_str("Area changed, guidance stopped"),
                other => write!(f, "{name} {other}, guidance stopped"),
            },
            Self::AvoidingObstacle => f.write_str("Blocked, trying another way"),
            Self::TraversalAbandoned { name } => {
                write!(f, "Cannot get past the obstacle, stopped guiding to {name}")
            },
            Self::NoRoute { name, distance } => write!(
                f,
                "No path to {name}, straight line {}",
                metres(*distance)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_wording() {
        let a = Announcement::EntrySelected {
            name: "Iron ore".into(),
            distance: 12.4,
            ordinal: 2,
            count: 5,
        };
        assert_eq!(a.to_string(), "Iron ore, 12 metres, 2 of 5");
    }

    #[test]
    fn test_route_wording_by_completeness() {
        let start = |completeness| Announcement::RouteStarted {
            name: "Gate".into(),
            distance: 20.6,
            completeness,
        };
        assert_eq!(start(Completeness::Complete).to_string(), "Guiding to Gate, 21 metres");
        assert!(start(Completeness::Partial).to_string().contains("partial path"));
        assert!(start(Completeness::Unreachable)
            .to_string()
            .contains("no path, straight line"));
    }

    #[test]
    fn test_singulars() {
        assert_eq!(metres(0.6), "1 metre");
        let a = Announcement::CategorySelected {
            category: Category::Hostile,
            count: 1,
        };
        assert_eq!(a.to_string(), "Enemies, 1 entry");
    }

    #[test]
    fn test_loss_wording() {
        let a = Announcement::TargetLost {
            name: "Wolf".into(),
            reason: LossReason::Defeated,
        };
        assert_eq!(a.to_string(), "Wolf defeated, guidance stopped");
    }
}
