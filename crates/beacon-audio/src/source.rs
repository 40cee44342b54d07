//! Spatial sources.
//!
//! A [`SpatialSource`] owns one voice and turns the listener/target geometry
//! published by the simulation thread into per-ear parameters. The geometry
//! crosses threads through [`SharedPose`]: the simulation writes it, the
//! audio update loop reads it, neither holds the lock for longer than a copy.

use std::sync::Arc;

use beacon_common::{ObserverPose, SoundId, Vec3};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::cache::SampleCache;
use crate::error::AudioResult;
use crate::mix_bus::{AudioMixBus, SharedVoice, SourceId};
use crate::spatial::{ChannelParams, Falloff, PitchModulation, Spatializer};
use crate::voice::{ToneSpec, Voice};

/// Listener and target geometry at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSnapshot {
    /// Observer pose (listener).
    pub listener: ObserverPose,
    /// Position the cue sounds from.
    pub target: Vec3,
    /// Whether the cue should currently play.
    pub audible: bool,
}

impl Default for PoseSnapshot {
    fn default() -> Self {
        Self {
            listener: ObserverPose::default(),
            target: Vec3::ZERO,
            audible: false,
        }
    }
}

/// Geometry shared between the simulation thread (writer) and the audio
/// update loop (reader).
#[derive(Debug, Clone, Default)]
pub struct SharedPose {
    inner: Arc<Mutex<PoseSnapshot>>,
}

impl SharedPose {
    /// Creates a shared pose.
    #[must_use]
    pub fn new(snapshot: PoseSnapshot) -> Self {
        Self {
            inner: Arc::new(Mutex::new(snapshot)),
        }
    }

    /// Updates the listener.
    pub fn set_listener(&self, listener: ObserverPose) {
        self.inner.lock().listener = listener;
    }

    /// Updates the cue position.
    pub fn set_target(&self, target: Vec3) {
        self.inner.lock().target = target;
    }

    /// Toggles playback.
    pub fn set_audible(&self, audible: bool) {
        self.inner.lock().audible = audible;
    }

    /// Copies the current geometry.
    #[must_use]
    pub fn snapshot(&self) -> PoseSnapshot {
        *self.inner.lock()
    }
}

/// What a cue plays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueSound {
    /// A cached sample.
    Sample {
        /// Sound identifier in the sample cache.
        id: SoundId,
        /// Whether playback loops.
        looping: bool,
    },
    /// A generated tone.
    Tone(ToneSpec),
}

impl Default for CueSound {
    fn default() -> Self {
        Self::Tone(ToneSpec::default())
    }
}

/// Values computed by the most recent update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialParams {
    /// Listener-to-target distance in metres.
    pub distance: f32,
    /// Distance over max range, in `[0, 1]`.
    pub normalized: f32,
    /// Volume after falloff.
    pub volume: f32,
    /// Pitch multiplier (1.0 for samples).
    pub pitch: f32,
    /// Per-ear output.
    pub channels: ChannelParams,
}

impl Default for SpatialParams {
    fn default() -> Self {
        Self {
            distance: 0.0,
            normalized: 0.0,
            volume: 0.0,
            pitch: 1.0,
            channels: ChannelParams::silent(),
        }
    }
}

/// One tracked sound positioned in the world.
#[derive(Debug)]
pub struct SpatialSource {
    voice: SharedVoice,
    spatializer: Arc<dyn Spatializer>,
    falloff: Falloff,
    pitch: Option<PitchModulation>,
    pose: SharedPose,
    attachment: Mutex<Option<(AudioMixBus, SourceId)>>,
    last: Mutex<SpatialParams>,
}

impl SpatialSource {
    /// Creates a source for a cue.
    ///
    /// Sample cues are fetched through `cache` (loading on first use) and get
    /// a random start offset from `rng`. `pitch` only affects tone cues.
    pub fn new(
        cue: &CueSound,
        cache: &SampleCache,
        spatializer: Arc<dyn Spatializer>,
        falloff: Falloff,
        pitch: Option<PitchModulation>,
        pose: SharedPose,
        rng: &mut fastrand::Rng,
    ) -> AudioResult<Self> {
        let voice = match cue {
            CueSound::Sample { id, looping } => {
                let buffer = cache.get_or_load(id)?;
                Voice::from_sample(buffer, *looping, rng)
            },
            CueSound::Tone(spec) => Voice::tone(*spec),
        };
        debug!("Created {} spatial source", spatializer.kind());

        Ok(Self {
            voice: Arc::new(Mutex::new(voice)),
            spatializer,
            falloff,
            pitch,
            pose,
            attachment: Mutex::new(None),
            last: Mutex::new(SpatialParams::default()),
        })
    }

    /// Shared geometry handle.
    #[must_use]
    pub fn pose(&self) -> &SharedPose {
        &self.pose
    }

    /// Shared voice handle.
    #[must_use]
    pub fn voice(&self) -> &SharedVoice {
        &self.voice
    }

    /// Recomputes output from the current geometry.
    pub fn update(&self) -> SpatialParams {
        let snapshot = self.pose.snapshot();
        let offset = snapshot.target - snapshot.listener.position;
        let distance = offset.length();
        let direction = offset.normalize_or_zero();

        let normalized = self.falloff.normalized_distance(distance);
        let volume = self.falloff.volume(distance);
        let basis = snapshot.listener.listener_basis();
        let channels = self.spatializer.spatialize(direction, &basis, volume);

        let mut voice = self.voice.lock();
        let pitch = match self.pitch {
            Some(modulation) if voice.is_tone() => modulation.pitch(normalized),
            _ => 1.0,
        };
        voice.set_params(channels);
        voice.set_pitch(pitch);
        voice.set_playing(snapshot.audible);
        drop(voice);

        let params = SpatialParams {
            distance,
            normalized,
            volume,
            pitch,
            channels,
        };
        trace!(distance, volume, pitch, "Spatial source updated");
        *self.last.lock() = params;
        params
    }

    /// Parameters from the last update.
    #[must_use]
    pub fn last_params(&self) -> SpatialParams {
        *self.last.lock()
    }

    /// Attaches the voice to a bus. A source attaches to at most one bus.
    pub fn attach(&self, bus: &AudioMixBus) -> SourceId {
        let mut attachment = self.attachment.lock();
        if let Some((current, id)) = attachment.as_ref() {
            if current.is_attached(*id) {
                return *id;
            }
        }
        let id = bus.attach(Arc::clone(&self.voice));
        *attachment = Some((bus.clone(), id));
        id
    }

    /// Stops output and detaches from the bus. Returns whether it was attached.
    pub fn detach(&self) -> bool {
        self.voice.lock().set_playing(false);
        match self.attachment.lock().take() {
            Some((bus, id)) => bus.detach(id),
            None => false,
        }
    }

    /// Whether the voice is currently attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attachment
            .lock()
            .as_ref()
            .is_some_and(|(bus, id)| bus.is_attached(*id))
    }

    /// Whether the voice is producing output.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.voice.lock().is_playing()
    }
}

impl Drop for SpatialSource {
    fn drop(&mut self) {
        if let Some((bus, id)) = self.attachment.get_mut().take() {
            bus.detach(id);
        }
    }
}
