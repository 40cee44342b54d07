//! Beacon configuration.
//!
//! One TOML file holds every subsystem's settings. A missing or unreadable
//! file yields defaults; values are clamped by [`BeaconConfig::validate`].

use std::fs;
use std::path::Path;

use beacon_audio::AudioSettings;
use beacon_common::{BeaconError, BeaconResult};
use beacon_nav::{PlannerConfig, ScannerConfig, TraverseConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::events::DEFAULT_EVENT_CAPACITY;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "beacon.toml";

/// What starting guidance drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceMode {
    /// Spatial audio cue only.
    #[default]
    AudioCue,
    /// Movement intent only.
    AutoTraverse,
    /// Both.
    Both,
}

impl GuidanceMode {
    /// Whether this mode plays the cue.
    #[must_use]
    pub const fn uses_audio(self) -> bool {
        matches!(self, Self::AudioCue | Self::Both)
    }

    /// Whether this mode drives movement.
    #[must_use]
    pub const fn uses_traversal(self) -> bool {
        matches!(self, Self::AutoTraverse | Self::Both)
    }
}

/// All settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Default `tracing` filter directive (`RUST_LOG` adds to it).
    pub log_filter: String,
    /// What guidance drives.
    pub guidance_mode: GuidanceMode,
    /// Event bus capacity.
    pub event_capacity: usize,
    /// Scanner timing.
    pub scanner: ScannerConfig,
    /// Route planning.
    pub planner: PlannerConfig,
    /// Auto-traversal.
    pub traverse: TraverseConfig,
    /// Audio cue.
    pub audio: AudioSettings,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            log_filter: "beacon=info".to_owned(),
            guidance_mode: GuidanceMode::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            scanner: ScannerConfig::default(),
            planner: PlannerConfig::default(),
            traverse: TraverseConfig::default(),
            audio: AudioSettings::default(),
        }
    }
}

impl BeaconConfig {
    /// Loads from `path`, falling back to defaults when the file is missing
    /// or invalid. The result is validated.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }

        let mut config = match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                },
                Err(e) => {
                    warn!("Failed to parse config file: {e}");
                    Self::default()
                },
            },
            Err(e) => {
                warn!("Failed to read config file: {e}");
                Self::default()
            },
        };
        config.validate();
        config
    }

    /// Writes to `path`, creating parent directories.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> BeaconResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| BeaconError::Serialization(e.to_string()))?;
        fs::write(path, contents)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Clamps every value into a sane range.
    pub fn validate(&mut self) {
        if self.log_filter.trim().is_empty() {
            self.log_filter = Self::default().log_filter;
        }
        self.event_capacity = self.event_capacity.clamp(16, 65_536);
        self.scanner.validate();
        self.planner.validate();
        self.traverse.validate();
        self.audio.validate();
    }
}
