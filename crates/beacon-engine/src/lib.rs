//! # Beacon Engine
//!
//! Guidance orchestration for Project Beacon.
//!
//! This crate ties together all subsystems:
//! - Nav: scanning, selection, route planning and auto-traversal
//! - Audio: the spatial route cue on the shared mix bus
//! - Configuration loaded from TOML
//! - An event bus carrying announcements and movement intent to the host

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod cue;
pub mod events;
pub mod guide;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::cue::*;
    pub use crate::events::*;
    pub use crate::guide::*;
}

pub use prelude::*;
