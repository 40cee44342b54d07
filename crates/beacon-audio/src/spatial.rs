//! 3D Spatial Audio
//!
//! Turns a world-space direction and distance into per-ear playback
//! parameters.
//!
//! # Overview
//!
//! - **Distance falloff**: full volume inside a near radius, then an
//!   inverse-square-like curve down to a floor at the maximum range
//! - **Pitch modulation**: generated tones rise in pitch as the target gets
//!   closer, a proximity cue independent of panning
//! - **Backends**: a binaural renderer (interaural time and level difference
//!   plus a rear low-pass) and a plain stereo panner; both implement
//!   [`Spatializer`] so the falloff logic never knows which one is active
//!
//! # Example
//!
//! ```
//! use beacon_audio::spatial::{Falloff, Spatializer, StereoPanner};
//! use beacon_common::{CameraBasis, Vec3};
//!
//! let falloff = Falloff::default();
//! let volume = falloff.volume(10.0);
//!
//! let params = StereoPanner.spatialize(Vec3::X, &CameraBasis::world(), volume);
//! assert!(params.right_gain > params.left_gain);
//! ```

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fmt;
use std::sync::Arc;

use beacon_common::{CameraBasis, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AudioError, AudioResult};

/// Radius inside which volume is held at maximum (metres).
pub const DEFAULT_NEAR_RADIUS: f32 = 3.0;

/// Distance at which volume reaches its floor (metres).
pub const DEFAULT_MAX_RANGE: f32 = 50.0;

/// Speed of sound in metres per second (for interaural delay).
pub const SPEED_OF_SOUND: f32 = 343.0;

/// Average human head radius in metres.
pub const HEAD_RADIUS: f32 = 0.0875;

/// Lowest output rate at which interaural delays are resolvable.
pub const MIN_BINAURAL_SAMPLE_RATE: u32 = 22_050;

/// Cutoff used when no filtering is wanted.
pub const OPEN_CUTOFF_HZ: f32 = 20_000.0;

/// Distance-to-volume curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Falloff {
    /// Radius inside which volume is `max_volume`.
    pub near_radius: f32,
    /// Distance at which volume reaches `min_volume`.
    pub max_range: f32,
    /// Volume floor.
    pub min_volume: f32,
    /// Volume ceiling.
    pub max_volume: f32,
    /// Curve steepness (higher = faster initial drop).
    pub steepness: f32,
}

impl Default for Falloff {
    fn default() -> Self {
        Self {
            near_radius: DEFAULT_NEAR_RADIUS,
            max_range: DEFAULT_MAX_RANGE,
            min_volume: 0.05,
            max_volume: 1.0,
            steepness: 8.0,
        }
    }
}

impl Falloff {
    /// Distance divided by the maximum range, clamped to `[0, 1]`.
    #[must_use]
    pub fn normalized_distance(&self, distance: f32) -> f32 {
        if self.max_range <= 0.0 {
            return 1.0;
        }
        (distance / self.max_range).clamp(0.0, 1.0)
    }

    /// Volume at a distance.
    ///
    /// Within `near_radius` this is exactly `max_volume`; at or beyond
    /// `max_range` exactly `min_volume`. In between, `1 / (1 + k·u²)` is
    /// rescaled so the ends meet those bounds, where `u` is the normalized
    /// distance re-based to start at the near radius.
    #[must_use]
    pub fn volume(&self, distance: f32) -> f32 {
        if distance <= self.near_radius {
            return self.max_volume;
        }
        let t = self.normalized_distance(distance);
        if t >= 1.0 {
            return self.min_volume;
        }
        let near_t = self.normalized_distance(self.near_radius);
        let span = 1.0 - near_t;
        if span <= f32::EPSILON {
            return self.min_volume;
        }
        let u = ((t - near_t) / span).clamp(0.0, 1.0);
        let k = self.steepness.max(f32::EPSILON);
        let floor = 1.0 / (1.0 + k);
        let curve = ((1.0 / (1.0 + k * u * u)) - floor) / (1.0 - floor);
        self.min_volume + (self.max_volume - self.min_volume) * curve
    }

    /// Clamps fields into a usable configuration.
    pub fn validate(&mut self) {
        self.max_range = self.max_range.max(1.0);
        self.near_radius = self.near_radius.clamp(0.0, self.max_range);
        self.max_volume = self.max_volume.clamp(0.0, 1.0);
        self.min_volume = self.min_volume.clamp(0.0, self.max_volume);
        self.steepness = self.steepness.clamp(0.1, 100.0);
    }
}

/// Proximity pitch cue for generated tones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchModulation {
    /// Maximum rise as a fraction (0.25 = up to 25 % higher).
    pub max_rise: f32,
}

impl Default for PitchModulation {
    fn default() -> Self {
        Self { max_rise: 0.25 }
    }
}

impl PitchModulation {
    /// Pitch multiplier for a normalized distance: 1.0 at max range, rising
    /// linearly to `1 + max_rise` at the listener.
    #[must_use]
    pub fn pitch(&self, normalized_distance: f32) -> f32 {
        1.0 + self.max_rise.max(0.0) * (1.0 - normalized_distance.clamp(0.0, 1.0))
    }
}

/// Per-ear playback parameters produced by a spatializer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelParams {
    /// Left ear gain.
    pub left_gain: f32,
    /// Right ear gain.
    pub right_gain: f32,
    /// Left ear delay in seconds.
    pub left_delay: f32,
    /// Right ear delay in seconds.
    pub right_delay: f32,
    /// Low-pass cutoff in Hz applied to both ears.
    pub lowpass_hz: f32,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self::silent()
    }
}

impl ChannelParams {
    /// No output.
    #[must_use]
    pub const fn silent() -> Self {
        Self {
            left_gain: 0.0,
            right_gain: 0.0,
            left_delay: 0.0,
            right_delay: 0.0,
            lowpass_hz: OPEN_CUTOFF_HZ,
        }
    }

    /// Centered, unfiltered output at a volume.
    #[must_use]
    pub fn centered(volume: f32) -> Self {
        let gain = volume * FRAC_PI_4.cos();
        Self {
            left_gain: gain,
            right_gain: gain,
            ..Self::silent()
        }
    }

    /// Lateral balance in `[-1, 1]` (negative = left).
    #[must_use]
    pub fn balance(&self) -> f32 {
        let total = self.left_gain + self.right_gain;
        if total <= f32::EPSILON {
            0.0
        } else {
            (self.right_gain - self.left_gain) / total
        }
    }
}

/// Constant-power split of `volume` for a pan in `[-1, 1]`.
fn constant_power(pan: f32, volume: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (volume * angle.cos(), volume * angle.sin())
}

/// Spatialization backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Head-related rendering with front/back cues.
    #[default]
    Binaural,
    /// Left/right panning only.
    Stereo,
}

impl BackendKind {
    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Binaural => "Binaural",
            Self::Stereo => "Stereo",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Converts a direction into per-ear parameters.
pub trait Spatializer: Send + Sync + fmt::Debug {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Computes parameters for a unit world-space `direction` from listener
    /// to source (zero when co-located), seen through `basis`, at `volume`.
    fn spatialize(&self, direction: Vec3, basis: &CameraBasis, volume: f32) -> ChannelParams;
}

/// Stereo panning from the lateral (right-axis) component only.
#[derive(Debug, Clone, Copy, Default)]
pub struct StereoPanner;

impl Spatializer for StereoPanner {
    fn kind(&self) -> BackendKind {
        BackendKind::Stereo
    }

    fn spatialize(&self, direction: Vec3, basis: &CameraBasis, volume: f32) -> ChannelParams {
        let pan = direction.dot(basis.right);
        let (left_gain, right_gain) = constant_power(pan, volume);
        ChannelParams {
            left_gain,
            right_gain,
            ..ChannelParams::silent()
        }
    }
}

/// Spherical-head binaural model.
///
/// Interaural time difference follows Woodworth's formula, level difference
/// uses constant-power panning, and sources behind the listener are darkened
/// with a low-pass and a small gain cut so front and back are
/// distinguishable.
#[derive(Debug, Clone, Copy)]
pub struct BinauralRenderer {
    head_radius: f32,
    rear_cutoff_hz: f32,
    rear_gain: f32,
}

impl BinauralRenderer {
    /// Creates the renderer for an output rate.
    pub fn new(sample_rate: u32) -> AudioResult<Self> {
        if sample_rate < MIN_BINAURAL_SAMPLE_RATE {
            return Err(AudioError::BinauralUnavailable(format!(
                "sample rate {sample_rate} Hz is below {MIN_BINAURAL_SAMPLE_RATE} Hz"
            )));
        }
        Ok(Self {
            head_radius: HEAD_RADIUS,
            rear_cutoff_hz: 2_500.0,
            rear_gain: 0.7,
        })
    }

    /// Woodworth interaural time difference for a lateral angle.
    #[must_use]
    pub fn interaural_delay(&self, lateral: f32) -> f32 {
        let theta = lateral.abs().clamp(0.0, 1.0).asin().min(FRAC_PI_2);
        self.head_radius / SPEED_OF_SOUND * (theta + theta.sin())
    }
}

impl Spatializer for BinauralRenderer {
    fn kind(&self) -> BackendKind {
        BackendKind::Binaural
    }

    fn spatialize(&self, direction: Vec3, basis: &CameraBasis, volume: f32) -> ChannelParams {
        let local = basis.to_local(direction);
        if local.length_squared() <= f32::EPSILON {
            return ChannelParams::centered(volume);
        }
        let local = local.normalize();

        // 0 in front, 1 directly behind.
        let rearness = (-local.z).max(0.0);
        let gain = volume * (1.0 - (1.0 - self.rear_gain) * rearness);
        let (left_gain, right_gain) = constant_power(local.x, gain);

        let itd = self.interaural_delay(local.x);
        let (left_delay, right_delay) = if local.x >= 0.0 {
            (itd, 0.0)
        } else {
            (0.0, itd)
        };

        let lowpass_hz = OPEN_CUTOFF_HZ + (self.rear_cutoff_hz - OPEN_CUTOFF_HZ) * rearness;

        ChannelParams {
            left_gain,
            right_gain,
            left_delay,
            right_delay,
            lowpass_hz,
        }
    }
}

/// Picks the spatializer for the output, falling back to stereo panning
/// when binaural rendering is unavailable.
#[must_use]
pub fn select_backend(preferred: BackendKind, sample_rate: u32, channels: u16) -> Arc<dyn Spatializer> {
    if preferred == BackendKind::Stereo {
        info!("Using stereo panning backend");
        return Arc::new(StereoPanner);
    }
    if channels < 2 {
        warn!("Binaural rendering needs stereo output ({channels} channel), using stereo panning");
        return Arc::new(StereoPanner);
    }
    match BinauralRenderer::new(sample_rate) {
        Ok(renderer) => {
            info!("Using binaural backend at {sample_rate} Hz");
            Arc::new(renderer)
        },
        Err(e) => {
            warn!("{e}, using stereo panning");
            Arc::new(StereoPanner)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_falloff_near_is_max() {
        let falloff = Falloff::default();
        for d in [0.0, 1.0, 2.5, 3.0] {
            assert!((falloff.volume(d) - falloff.max_volume).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_falloff_far_is_min() {
        let falloff = Falloff::default();
        for d in [50.0, 75.0, 1000.0] {
            assert!((falloff.volume(d) - falloff.min_volume).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_falloff_not_linear() {
        let falloff = Falloff::default();
        let mid = (falloff.near_radius + falloff.max_range) / 2.0;
        let linear_mid = (falloff.max_volume + falloff.min_volume) / 2.0;
        // The curve drops faster than a straight line early on.
        assert!(falloff.volume(mid) < linear_mid);
    }

    #[test]
    fn test_pitch_modulation() {
        let pitch = PitchModulation { max_rise: 0.25 };
        assert!((pitch.pitch(1.0) - 1.0).abs() < f32::EPSILON);
        assert!((pitch.pitch(0.0) - 1.25).abs() < f32::EPSILON);
        assert!(pitch.pitch(0.2) > pitch.pitch(0.8));
    }

    #[test]
    fn test_stereo_panning_right() {
        let params = StereoPanner.spatialize(Vec3::X, &CameraBasis::world(), 1.0);
        assert!(params.right_gain > params.left_gain);
        assert!(params.balance() > 0.9);
    }

    #[test]
    fn test_stereo_ignores_front_back() {
        let front = StereoPanner.spatialize(Vec3::Z, &CameraBasis::world(), 1.0);
        let back = StereoPanner.spatialize(Vec3::NEG_Z, &CameraBasis::world(), 1.0);
        assert_eq!(front, back);
    }

    #[test]
    fn test_binaural_rear_is_darker() {
        let renderer = BinauralRenderer::new(44_100).expect("binaural");
        let basis = CameraBasis::world();
        let front = renderer.spatialize(Vec3::Z, &basis, 1.0);
        let back = renderer.spatialize(Vec3::NEG_Z, &basis, 1.0);
        assert!(back.lowpass_hz < front.lowpass_hz);
        assert!(back.left_gain < front.left_gain);
    }

    #[test]
    fn test_binaural_delays_far_ear() {
        let renderer = BinauralRenderer::new(48_000).expect("binaural");
        let params = renderer.spatialize(Vec3::X, &CameraBasis::world(), 1.0);
        assert!(params.left_delay > 0.0);
        assert!(params.right_delay.abs() < f32::EPSILON);
        // Roughly 0.65 ms for a source at 90 degrees.
        assert!(params.left_delay > 0.0005 && params.left_delay < 0.0008);
    }

    #[test]
    fn test_binaural_uses_camera_basis() {
        let renderer = BinauralRenderer::new(48_000).expect("binaural");
        // Camera facing +X: world +Z lies to the left.
        let basis = CameraBasis::from_forward(Vec3::X);
        let params = renderer.spatialize(Vec3::Z, &basis, 1.0);
        assert!(params.left_gain > params.right_gain);
    }

    #[test]
    fn test_backend_fallback() {
        assert_eq!(select_backend(BackendKind::Binaural, 8_000, 2).kind(), BackendKind::Stereo);
        assert_eq!(select_backend(BackendKind::Binaural, 44_100, 1).kind(), BackendKind::Stereo);
        assert_eq!(select_backend(BackendKind::Binaural, 44_100, 2).kind(), BackendKind::Binaural);
        assert_eq!(select_backend(BackendKind::Stereo, 44_100, 2).kind(), BackendKind::Stereo);
    }

    proptest! {
        #[test]
        fn prop_volume_within_bounds(distance in 0.0f32..500.0) {
            let falloff = Falloff::default();
            let v = falloff.volume(distance);
            prop_assert!(v >= falloff.min_volume - 1e-6);
            prop_assert!(v <= falloff.max_volume + 1e-6);
        }

        #[test]
        fn prop_volume_monotonic(a in 0.0f32..100.0, b in 0.0f32..100.0) {
            let falloff = Falloff::default();
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(falloff.volume(near) >= falloff.volume(far) - 1e-6);
        }
    }
}
