//! Audio cue settings.

use serde::{Deserialize, Serialize};

use crate::source::CueSound;
use crate::spatial::{BackendKind, Falloff, PitchModulation};
use crate::update_loop::{DEFAULT_TICK_HZ, MAX_TICK_HZ, MIN_TICK_HZ};

/// Default output sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Settings for the guidance cue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Preferred spatialization backend.
    pub backend: BackendKind,
    /// Update loop rate in Hz.
    pub tick_rate_hz: f32,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Distance falloff curve.
    pub falloff: Falloff,
    /// Maximum pitch rise for tone cues (0.25 = 25 %).
    pub pitch_rise: f32,
    /// Sound used for the route beacon.
    pub beacon: CueSound,
    /// Master volume (0.0-1.0).
    pub master_volume: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Binaural,
            tick_rate_hz: DEFAULT_TICK_HZ,
            sample_rate: DEFAULT_SAMPLE_RATE,
            falloff: Falloff::default(),
            pitch_rise: PitchModulation::default().max_rise,
            beacon: CueSound::default(),
            master_volume: 1.0,
        }
    }
}

impl AudioSettings {
    /// Pitch modulation derived from `pitch_rise`, if any.
    #[must_use]
    pub fn pitch_modulation(&self) -> Option<PitchModulation> {
        (self.pitch_rise > 0.0).then_some(PitchModulation {
            max_rise: self.pitch_rise,
        })
    }

    /// Clamps values to sensible ranges.
    pub fn validate(&mut self) {
        self.tick_rate_hz = self.tick_rate_hz.clamp(MIN_TICK_HZ, MAX_TICK_HZ);
        self.sample_rate = self.sample_rate.clamp(8_000, 192_000);
        self.falloff.validate();
        self.pitch_rise = self.pitch_rise.clamp(0.0, 1.0);
        self.master_volume = self.master_volume.clamp(0.0, 1.0);
        if let CueSound::Tone(spec) = &mut self.beacon {
            spec.frequency = spec.frequency.clamp(50.0, 8_000.0);
            spec.amplitude = spec.amplitude.clamp(0.0, 1.0);
            spec.pulse_on = spec.pulse_on.max(0.0);
            spec.pulse_off = spec.pulse_off.max(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = AudioSettings::default();
        assert_eq!(settings.backend, BackendKind::Binaural);
        assert!((settings.tick_rate_hz - 60.0).abs() < f32::EPSILON);
        assert_eq!(settings.sample_rate, 44_100);
        assert!((settings.falloff.near_radius - 3.0).abs() < f32::EPSILON);
        assert!((settings.falloff.max_range - 50.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_validate_clamps() {
        let mut settings = AudioSettings {
            tick_rate_hz: 10_000.0,
            pitch_rise: -1.0,
            master_volume: 4.0,
            ..AudioSettings::default()
        };
        settings.validate();
        assert!((settings.tick_rate_hz - 240.0).abs() < f32::EPSILON);
        assert!(settings.pitch_modulation().is_none());
        assert!((settings.master_volume - 1.0).abs() < f32::EPSILON);
    }
}
