//! # Beacon Audio
//!
//! Spatial audio cues for wayfinding.
//!
//! This crate provides the real-time half of guidance:
//! - A shared mix bus that voices attach to and detach from while playing
//! - Spatial sources turning listener/target geometry into per-ear output
//! - Binaural and stereo-panning backends behind one interface
//! - A process-scoped sample cache with independent, randomized read cursors
//! - A fixed-rate update loop decoupled from the host frame rate
//! - Output devices (headless, or rodio with the `device` feature)
//!
//! ## Threading
//!
//! ```text
//!  simulation thread            audio update thread          output device
//!  ─────────────────            ───────────────────          ─────────────
//!  SharedPose::set_*  ──lock──► SpatialSource::update ──►   AudioMixBus::render
//!  (never waits)                (fixed tick, ~60 Hz)         (pulls blocks)
//! ```
//!
//! Only the pose struct is shared between the simulation and the update
//! thread. Stopping a cue detaches its voice and joins the update thread
//! before returning, so no sound outlives the request that started it.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod cache;
pub mod device;
pub mod error;
pub mod mix_bus;
pub mod settings;
pub mod source;
pub mod spatial;
pub mod update_loop;
pub mod voice;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cache::*;
    pub use crate::device::*;
    pub use crate::error::*;
    pub use crate::mix_bus::*;
    pub use crate::settings::*;
    pub use crate::source::*;
    pub use crate::spatial::*;
    pub use crate::update_loop::*;
    pub use crate::voice::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_shared_buffer_independent_cursors() {
        let cache = SampleCache::new(MemoryLoader::new().with_sound(
            "ping",
            (0..2048).map(|i| (i as f32 * 0.05).sin()).collect(),
            44_100,
        ));
        let mut rng = fastrand::Rng::with_seed(11);
        let spatializer: Arc<dyn Spatializer> = Arc::new(StereoPanner);
        let cue = CueSound::Sample {
            id: beacon_common::SoundId::new("ping"),
            looping: true,
        };

        let cursors: Vec<f64> = (0..32)
            .map(|_| {
                let source = SpatialSource::new(
                    &cue,
                    &cache,
                    Arc::clone(&spatializer),
                    Falloff::default(),
                    None,
                    SharedPose::default(),
                    &mut rng,
                )
                .expect("source");
                let cursor = source.voice().lock().cursor().expect("sample");
                cursor
            })
            .collect();

        assert_eq!(cache.load_count(), 1);
        assert!(cursors.iter().all(|&c| c > 0.0));
        assert!(cursors.windows(2).any(|w| (w[0] - w[1]).abs() > f64::EPSILON));
    }
}
