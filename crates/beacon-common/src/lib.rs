//! # Beacon Common
//!
//! Common types, utilities, and shared abstractions for Project Beacon.
//!
//! This crate provides foundational types used across all Beacon subsystems:
//! - Identity handles for host-owned world objects (index + generation)
//! - Sound and area identifiers
//! - Observer pose, camera basis and horizontal geometry helpers
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod geometry;
pub mod ids;

pub use glam::{Vec2, Vec3};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::geometry::*;
    pub use crate::ids::*;
    pub use glam::{Vec2, Vec3};
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_generation_detects_reuse() {
        let handle = EntityHandle::new(7, 0);
        let reused = handle.next_generation();
        assert_eq!(handle.index(), reused.index());
        assert_ne!(handle, reused);
    }

    #[test]
    fn test_sound_id_equality() {
        let a = SoundId::new("beacon");
        let b = SoundId::from("beacon");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "beacon");
    }

    #[test]
    fn test_area_id_display() {
        assert_eq!(AreaId::new(3).to_string(), "area 3");
    }
}
