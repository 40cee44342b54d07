//! Fixed-rate audio update thread.
//!
//! One thread services every registered [`SpatialSource`], recomputing
//! pan/volume/pitch at a fixed tick rate regardless of how fast the host
//! simulation runs. The simulation only writes geometry into each source's
//! [`SharedPose`](crate::source::SharedPose); it never waits on a tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AudioError, AudioResult};
use crate::source::SpatialSource;

/// Default tick rate in Hz.
pub const DEFAULT_TICK_HZ: f32 = 60.0;

/// Slowest accepted tick rate in Hz.
pub const MIN_TICK_HZ: f32 = 10.0;

/// Fastest accepted tick rate in Hz.
pub const MAX_TICK_HZ: f32 = 240.0;

type SourceList = Arc<Mutex<Vec<Arc<SpatialSource>>>>;

/// Handle to the running update thread.
#[derive(Debug)]
pub struct AudioUpdateLoop {
    sources: SourceList,
    ticks: Arc<AtomicU64>,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AudioUpdateLoop {
    /// Spawns the thread ticking at `tick_hz`, clamped to
    /// [`MIN_TICK_HZ`]..=[`MAX_TICK_HZ`].
    ///
    /// Ticks are paced against fixed deadlines, so time spent updating
    /// sources does not stretch the period. Deadlines missed by more than a
    /// period are skipped rather than run back to back.
    pub fn start(tick_hz: f32) -> AudioResult<Self> {
        let tick_hz = if tick_hz.is_finite() && tick_hz > 0.0 {
            tick_hz.clamp(MIN_TICK_HZ, MAX_TICK_HZ)
        } else {
            warn!("Invalid audio tick rate {tick_hz}, using {DEFAULT_TICK_HZ} Hz");
            DEFAULT_TICK_HZ
        };
        let period = Duration::from_secs_f64(1.0 / f64::from(tick_hz));

        let sources: SourceList = Arc::new(Mutex::new(Vec::new()));
        let ticks = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread_sources = Arc::clone(&sources);
        let thread_ticks = Arc::clone(&ticks);
        let thread = std::thread::Builder::new()
            .name("beacon-audio-update".into())
            .spawn(move || {
                let mut deadline = Instant::now() + period;
                loop {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {
                            // Copy the list so registration never waits on a tick.
                            let current: Vec<_> = thread_sources.lock().clone();
                            for source in &current {
                                source.update();
                            }
                            thread_ticks.fetch_add(1, Ordering::Relaxed);

                            deadline += period;
                            let now = Instant::now();
                            if deadline < now {
                                deadline = now + period;
                            }
                        },
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| AudioError::ThreadSpawn(e.to_string()))?;

        info!("Audio update loop started at {tick_hz} Hz");
        Ok(Self {
            sources,
            ticks,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Adds a source to the tick set.
    pub fn register(&self, source: Arc<SpatialSource>) {
        let mut sources = self.sources.lock();
        if !sources.iter().any(|s| Arc::ptr_eq(s, &source)) {
            sources.push(source);
        }
    }

    /// Removes a source. Returns whether it was registered.
    pub fn unregister(&self, source: &Arc<SpatialSource>) -> bool {
        let mut sources = self.sources.lock();
        let before = sources.len();
        sources.retain(|s| !Arc::ptr_eq(s, source));
        sources.len() != before
    }

    /// Removes every source.
    pub fn clear(&self) {
        self.sources.lock().clear();
    }

    /// Number of registered sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.lock().len()
    }

    /// Ticks completed so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Whether the thread is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signals the thread and waits for it to exit.
    ///
    /// When this returns no source will be updated again.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // A full channel means a stop is already pending.
            let _ = tx.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Audio update thread panicked");
            }
            debug!("Audio update loop stopped");
        }
        self.clear();
    }
}

impl Drop for AudioUpdateLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SampleCache;
    use crate::source::{CueSound, PoseSnapshot, SharedPose};
    use crate::spatial::{Falloff, StereoPanner};
    use beacon_common::{ObserverPose, Vec3};
    use std::time::Instant;

    fn source(pose: SharedPose) -> Arc<SpatialSource> {
        let mut rng = fastrand::Rng::with_seed(5);
        Arc::new(
            SpatialSource::new(
                &CueSound::default(),
                &SampleCache::empty(),
                Arc::new(StereoPanner),
                Falloff::default(),
                None,
                pose,
                &mut rng,
            )
            .expect("source"),
        )
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_loop_updates_sources() {
        let pose = SharedPose::new(PoseSnapshot {
            listener: ObserverPose::at(Vec3::ZERO),
            target: Vec3::new(0.0, 0.0, 20.0),
            audible: true,
        });
        let src = source(pose.clone());
        let mut update_loop = AudioUpdateLoop::start(200.0).expect("start");
        update_loop.register(Arc::clone(&src));

        assert!(wait_for(|| (src.last_params().distance - 20.0).abs() < 1e-3));

        pose.set_target(Vec3::new(0.0, 0.0, 10.0));
        assert!(wait_for(|| (src.last_params().distance - 10.0).abs() < 1e-3));
        update_loop.stop();
    }

    #[test]
    fn test_stop_is_synchronous() {
        let mut update_loop = AudioUpdateLoop::start(500.0).expect("start");
        assert!(wait_for(|| update_loop.tick_count() > 2));
        update_loop.stop();
        assert!(!update_loop.is_running());

        let after = update_loop.tick_count();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(update_loop.tick_count(), after);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut update_loop = AudioUpdateLoop::start(60.0).expect("start");
        let src = source(SharedPose::default());
        update_loop.register(Arc::clone(&src));
        update_loop.register(Arc::clone(&src));
        assert_eq!(update_loop.source_count(), 1);
        assert!(update_loop.unregister(&src));
        assert!(!update_loop.unregister(&src));
        update_loop.stop();
    }

    #[test]
    fn test_invalid_rate_falls_back() {
        for rate in [0.0, -5.0, f32::NAN, f32::INFINITY, 1e-30] {
            let mut update_loop = AudioUpdateLoop::start(rate).expect("start");
            assert!(update_loop.is_running());
            update_loop.stop();
        }
    }

    #[test]
    fn test_tick_rate_is_kept() {
        let mut update_loop = AudioUpdateLoop::start(50.0).expect("start");
        update_loop.register(source(SharedPose::default()));
        assert!(wait_for(|| update_loop.tick_count() > 0));

        let started = Instant::now();
        let first = update_loop.tick_count();
        std::thread::sleep(Duration::from_millis(500));
        let ticks = update_loop.tick_count() - first;
        let expected = started.elapsed().as_secs_f32() * 50.0;
        update_loop.stop();

        assert!(
            (ticks as f32) > expected * 0.5 && (ticks as f32) < expected * 1.5 + 1.0,
            "{ticks} ticks, expected about {expected:.0}"
        );
    }
}
