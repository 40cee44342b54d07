//! Collaborator interfaces.
//!
//! The host world is consumed through two narrow traits: [`WorldQuery`] for
//! objects, flags and the observer, and [`WalkableSurface`] for snapping and
//! routing. Nothing here assumes how the host stores its objects; handles
//! are opaque and checked for liveness before use.

use beacon_common::{AreaId, EntityHandle, ObserverPose, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{EntityRecord, ObjectClass};

/// Transient failure looking something up in the world.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The handle no longer refers to a live object.
    #[error("handle {0} is stale")]
    Stale(EntityHandle),
    /// A referenced record does not exist.
    #[error("record {0} not found")]
    MissingRecord(u32),
    /// The data exists but cannot be read right now.
    #[error("lookup unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the host world.
pub trait WorldQuery {
    /// Currently loaded area.
    fn area(&self) -> AreaId;

    /// Whether the observer is in a state where guidance applies (not in a
    /// menu or cutscene).
    fn is_navigable(&self) -> bool;

    /// Whether a class has finished loading for the current area.
    fn is_loaded(&self, class: ObjectClass) -> bool;

    /// Every object of a class in the current area, active or not.
    fn records(&self, class: ObjectClass) -> Vec<EntityRecord>;

    /// Whether the handle still refers to a live object.
    fn is_alive(&self, handle: EntityHandle) -> bool;

    /// Whether the object is currently active.
    fn is_active(&self, handle: EntityHandle) -> bool;

    /// Current position.
    fn position(&self, handle: EntityHandle) -> Option<Vec3>;

    /// Whether a pickup has been collected.
    fn is_picked_up(&self, handle: EntityHandle) -> bool;

    /// Whether a hostile has been defeated.
    fn is_defeated(&self, handle: EntityHandle) -> bool;

    /// Whether a persistent flag is set (save data).
    fn is_flag_set(&self, flag: &str) -> bool;

    /// Name of a related record.
    fn related_name(&self, record: u32) -> Result<String, LookupError>;

    /// Observer pose.
    fn observer(&self) -> ObserverPose;
}

/// Outcome of a route query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteStatus {
    /// The route reaches the goal.
    Complete,
    /// The route ends as close to the goal as is walkable.
    Partial,
    /// No route.
    Failed,
}

/// Route returned by [`WalkableSurface::route`].
#[derive(Debug, Clone, PartialEq)]
pub struct RouteQuery {
    /// Outcome.
    pub status: RouteStatus,
    /// Corner points from start to end.
    pub waypoints: Vec<Vec3>,
}

impl RouteQuery {
    /// A failed query.
    #[must_use]
    pub const fn failed() -> Self {
        Self {
            status: RouteStatus::Failed,
            waypoints: Vec::new(),
        }
    }
}

/// Walkable-surface oracle (a navigation mesh or equivalent).
pub trait WalkableSurface {
    /// Nearest walkable point within `radius` of `point`.
    fn snap(&self, point: Vec3, radius: f32) -> Option<Vec3>;

    /// Route between two points.
    fn route(&self, from: Vec3, to: Vec3) -> RouteQuery;
}
