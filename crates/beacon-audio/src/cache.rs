//! Sample Cache
//!
//! Provides the process-scoped store of decoded sounds:
//! - `SampleBuffer`: mono f32 samples shared by every voice that plays them
//! - `SampleLoader`: storage backend that produces buffers on first use
//! - `SampleCache`: keyed by `SoundId`, loads each sound once
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  miss   ┌──────────────┐
//! │ SampleCache  │────────►│ SampleLoader │  (storage I/O, once per id)
//! │ (RwLock map) │◄────────│              │
//! └──────┬───────┘  Arc    └──────────────┘
//!        │ Arc<SampleBuffer>
//!        ▼
//!   Voice, Voice, Voice   (independent read cursors)
//! ```
//!
//! The cache is an explicit service: components receive an `Arc<SampleCache>`
//! instead of reaching for a global, so tests can hand in an empty one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use beacon_common::SoundId;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{AudioError, AudioResult};

/// Maximum number of cached sounds.
pub const MAX_CACHED_SOUNDS: usize = 256;

/// Decoded, mono audio data.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    id: SoundId,
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Creates a buffer from mono samples.
    #[must_use]
    pub fn new(id: SoundId, samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            id,
            samples,
            sample_rate: sample_rate.max(1),
        }
    }

    /// Creates a buffer from interleaved multi-channel samples, averaging the
    /// channels down to mono.
    #[must_use]
    pub fn from_interleaved(id: SoundId, interleaved: &[f32], channels: u16, sample_rate: u32) -> Self {
        let channels = usize::from(channels.max(1));
        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        Self::new(id, samples, sample_rate)
    }

    /// Sound identifier.
    #[must_use]
    pub fn id(&self) -> &SoundId {
        &self.id
    }

    /// Sample rate in Hz.
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (mono samples).
    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no audio.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Raw samples.
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Playback length at the native rate.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Linearly interpolated sample at a fractional position.
    ///
    /// Positions past the end wrap when `looping`, otherwise read as silence.
    #[must_use]
    pub fn sample_at(&self, position: f64, looping: bool) -> f32 {
        let len = self.samples.len();
        if len == 0 || position < 0.0 {
            return 0.0;
        }
        let i = position.floor() as usize;
        let frac = (position - position.floor()) as f32;
        let (a, b) = if looping {
            (self.samples[i % len], self.samples[(i + 1) % len])
        } else if i + 1 < len {
            (self.samples[i], self.samples[i + 1])
        } else if i < len {
            (self.samples[i], 0.0)
        } else {
            return 0.0;
        };
        a + (b - a) * frac
    }
}

/// Storage backend for sounds.
pub trait SampleLoader: Send + Sync {
    /// Loads and decodes one sound.
    fn load(&self, id: &SoundId) -> AudioResult<SampleBuffer>;
}

/// Loader over sounds registered in memory (embedded assets, tests).
#[derive(Debug, Default)]
pub struct MemoryLoader {
    sounds: RwLock<HashMap<SoundId, (Vec<f32>, u32)>>,
}

impl MemoryLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers mono samples under an identifier.
    #[must_use]
    pub fn with_sound(self, id: impl Into<SoundId>, samples: Vec<f32>, sample_rate: u32) -> Self {
        self.insert(id, samples, sample_rate);
        self
    }

    /// Registers mono samples under an identifier.
    pub fn insert(&self, id: impl Into<SoundId>, samples: Vec<f32>, sample_rate: u32) {
        self.sounds.write().insert(id.into(), (samples, sample_rate));
    }
}

impl SampleLoader for MemoryLoader {
    fn load(&self, id: &SoundId) -> AudioResult<SampleBuffer> {
        let sounds = self.sounds.read();
        let (samples, rate) = sounds
            .get(id)
            .ok_or_else(|| AudioError::UnknownSound(id.clone()))?;
        Ok(SampleBuffer::new(id.clone(), samples.clone(), *rate))
    }
}

/// Process-scoped cache of decoded sounds.
pub struct SampleCache {
    buffers: RwLock<HashMap<SoundId, Arc<SampleBuffer>>>,
    loader: Box<dyn SampleLoader>,
    loads: AtomicUsize,
}

impl std::fmt::Debug for SampleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleCache")
            .field("cached", &self.buffers.read().len())
            .field("loads", &self.loads.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for SampleCache {
    fn default() -> Self {
        Self::empty()
    }
}

impl SampleCache {
    /// Creates a cache backed by a loader.
    #[must_use]
    pub fn new(loader: impl SampleLoader + 'static) -> Self {
        debug!("Created sample cache");
        Self {
            buffers: RwLock::new(HashMap::new()),
            loader: Box::new(loader),
            loads: AtomicUsize::new(0),
        }
    }

    /// Creates a cache whose loader knows no sounds.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(MemoryLoader::new())
    }

    /// Returns a cached buffer without loading.
    #[must_use]
    pub fn get(&self, id: &SoundId) -> Option<Arc<SampleBuffer>> {
        self.buffers.read().get(id).cloned()
    }

    /// Returns the cached buffer, loading it on first use.
    ///
    /// The loader runs outside the lock; if two threads race on the same
    /// sound the first insert wins and both receive the same buffer.
    pub fn get_or_load(&self, id: &SoundId) -> AudioResult<Arc<SampleBuffer>> {
        if let Some(buffer) = self.get(id) {
            return Ok(buffer);
        }

        let buffer = self.loader.load(id)?;
        if buffer.is_empty() {
            return Err(AudioError::EmptySample(id.clone()));
        }
        self.loads.fetch_add(1, Ordering::Relaxed);
        debug!("Loaded sound '{}' ({} frames)", id, buffer.frames());
        Ok(self.insert(buffer))
    }

    /// Inserts a decoded buffer, keeping an existing entry for the same id.
    pub fn insert(&self, buffer: SampleBuffer) -> Arc<SampleBuffer> {
        let mut buffers = self.buffers.write();
        if let Some(existing) = buffers.get(buffer.id()) {
            return Arc::clone(existing);
        }
        if buffers.len() >= MAX_CACHED_SOUNDS {
            warn!("Sample cache full, not retaining '{}'", buffer.id());
            return Arc::new(buffer);
        }
        let shared = Arc::new(buffer);
        buffers.insert(shared.id().clone(), Arc::clone(&shared));
        shared
    }

    /// Loads every listed sound, stopping at the first failure.
    pub fn preload(&self, ids: &[SoundId]) -> AudioResult<()> {
        for id in ids {
            self.get_or_load(id)?;
        }
        Ok(())
    }

    /// Loads sounds on a background thread so storage reads stay off the
    /// frame-driven context.
    pub fn spawn_preload(
        self: &Arc<Self>,
        ids: Vec<SoundId>,
    ) -> AudioResult<JoinHandle<AudioResult<()>>> {
        let cache = Arc::clone(self);
        std::thread::Builder::new()
            .name("beacon-sample-load".into())
            .spawn(move || {
                let result = cache.preload(&ids);
                match &result {
                    Ok(()) => info!("Preloaded {} sounds", ids.len()),
                    Err(e) => warn!("Sound preload failed: {e}"),
                }
                result
            })
            .map_err(|e| AudioError::ThreadSpawn(e.to_string()))
    }

    /// Number of loader invocations that produced a buffer.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Number of cached sounds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.read().len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.read().is_empty()
    }

    /// Drops every cached buffer. Voices already playing keep theirs alive.
    pub fn clear(&self) {
        self.buffers.write().clear();
        debug!("Cleared sample cache");
    }
}
