//! Shared output sink.
//!
//! The [`AudioMixBus`] holds every attached voice and sums them into one
//! interleaved stereo stream when the output device pulls a block. Voices can
//! attach and detach at any time, from any thread, while the device is
//! playing.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::voice::Voice;

/// A voice shared between its owner (who updates parameters) and the bus.
pub type SharedVoice = Arc<Mutex<Voice>>;

/// Identifier of a voice attached to a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct BusInner {
    voices: Mutex<Vec<(SourceId, SharedVoice)>>,
    next_id: AtomicU64,
    master_volume: AtomicU32,
    sample_rate: u32,
}

/// Single shared output sink. Cloning yields another handle to the same bus.
#[derive(Debug, Clone)]
pub struct AudioMixBus {
    inner: Arc<BusInner>,
}

impl AudioMixBus {
    /// Creates a bus rendering at `sample_rate`.
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        debug!("Created mix bus at {sample_rate} Hz");
        Self {
            inner: Arc::new(BusInner {
                voices: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                master_volume: AtomicU32::new(1.0f32.to_bits()),
                sample_rate: sample_rate.max(1),
            }),
        }
    }

    /// Output sample rate.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    /// Attaches a voice and returns its bus id.
    pub fn attach(&self, voice: SharedVoice) -> SourceId {
        let id = SourceId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.voices.lock().push((id, voice));
        debug!("Attached source {}", id.raw());
        id
    }

    /// Detaches a voice. Returns whether it was attached.
    pub fn detach(&self, id: SourceId) -> bool {
        let mut voices = self.inner.voices.lock();
        let before = voices.len();
        voices.retain(|(attached, _)| *attached != id);
        let removed = voices.len() != before;
        if removed {
            debug!("Detached source {}", id.raw());
        }
        removed
    }

    /// Whether a voice is attached.
    #[must_use]
    pub fn is_attached(&self, id: SourceId) -> bool {
        self.inner.voices.lock().iter().any(|(attached, _)| *attached == id)
    }

    /// Number of attached voices.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.inner.voices.lock().len()
    }

    /// Detaches everything.
    pub fn clear(&self) {
        self.inner.voices.lock().clear();
    }

    /// Sets the master gain (0.0-1.0).
    pub fn set_master_volume(&self, volume: f32) {
        self.inner
            .master_volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Master gain.
    #[must_use]
    pub fn master_volume(&self) -> f32 {
        f32::from_bits(self.inner.master_volume.load(Ordering::Relaxed))
    }

    /// Renders one interleaved stereo block, overwriting `out`.
    ///
    /// One-shot voices that have finished are dropped from the bus.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        let rate = self.inner.sample_rate;

        let mut voices = self.inner.voices.lock();
        voices.retain(|(id, voice)| {
            let mut voice = voice.lock();
            voice.render_add(out, rate);
            if voice.is_finished() {
                trace!("Source {} finished", id.raw());
                false
            } else {
                true
            }
        });
        drop(voices);

        let master = self.master_volume();
        for sample in out.iter_mut() {
            *sample = (*sample * master).clamp(-1.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::ChannelParams;
    use crate::voice::ToneSpec;

    fn playing_tone() -> SharedVoice {
        let mut voice = Voice::tone(ToneSpec {
            pulse_off: 0.0,
            amplitude: 0.5,
            ..ToneSpec::default()
        });
        voice.set_params(ChannelParams::centered(1.0));
        voice.set_playing(true);
        Arc::new(Mutex::new(voice))
    }

    fn energy(block: &[f32]) -> f32 {
        block.iter().map(|s| s * s).sum()
    }

    #[test]
    fn test_attach_detach() {
        let bus = AudioMixBus::new(44_100);
        let a = bus.attach(playing_tone());
        let b = bus.attach(playing_tone());
        assert_ne!(a, b);
        assert_eq!(bus.source_count(), 2);

        assert!(bus.detach(a));
        assert!(!bus.detach(a));
        assert!(!bus.is_attached(a));
        assert!(bus.is_attached(b));
    }

    #[test]
    fn test_render_sums_sources() {
        let bus = AudioMixBus::new(44_100);
        let mut silent = vec![1.0; 512];
        bus.render(&mut silent);
        assert!(energy(&silent) < f32::EPSILON);

        bus.attach(playing_tone());
        let mut one = vec![0.0; 512];
        bus.render(&mut one);

        let two_bus = AudioMixBus::new(44_100);
        two_bus.attach(playing_tone());
        two_bus.attach(playing_tone());
        let mut two = vec![0.0; 512];
        two_bus.render(&mut two);

        assert!(energy(&two) > energy(&one));
    }

    #[test]
    fn test_render_clamps() {
        let bus = AudioMixBus::new(44_100);
        for _ in 0..8 {
            bus.attach(playing_tone());
        }
        let mut out = vec![0.0; 2048];
        bus.render(&mut out);
        assert!(out.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_detached_source_is_silent() {
        let bus = AudioMixBus::new(44_100);
        let id = bus.attach(playing_tone());
        bus.detach(id);
        let mut out = vec![0.0; 512];
        bus.render(&mut out);
        assert!(energy(&out) < f32::EPSILON);
    }

    #[test]
    fn test_master_volume() {
        let bus = AudioMixBus::new(44_100);
        bus.attach(playing_tone());
        bus.set_master_volume(0.0);
        let mut out = vec![0.0; 512];
        bus.render(&mut out);
        assert!(energy(&out) < f32::EPSILON);
        bus.set_master_volume(3.0);
        assert!((bus.master_volume() - 1.0).abs() < f32::EPSILON);
    }
}
