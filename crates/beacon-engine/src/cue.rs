//! The route beacon: one spatial source on the mix bus, serviced by the
//! audio update loop.

use std::sync::Arc;

use beacon_audio::{
    select_backend, AudioMixBus, AudioResult, AudioSettings, AudioUpdateLoop, NullDevice,
    OutputDevice, PoseSnapshot, SampleCache, SharedPose, SpatialSource, Spatializer,
};
use beacon_common::{ObserverPose, Vec3};
use tracing::{debug, info};

/// Spatial cue pointing at the guidance target.
pub struct GuideCue {
    settings: AudioSettings,
    cache: Arc<SampleCache>,
    bus: AudioMixBus,
    device: Box<dyn OutputDevice + Send>,
    spatializer: Arc<dyn Spatializer>,
    rng: fastrand::Rng,
    source: Option<Arc<SpatialSource>>,
    update_loop: Option<AudioUpdateLoop>,
}

impl std::fmt::Debug for GuideCue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuideCue")
            .field("backend", &self.spatializer.kind())
            .field("active", &self.is_active())
            .field("device_running", &self.device.is_running())
            .finish_non_exhaustive()
    }
}

impl GuideCue {
    /// Creates an idle cue on `device`. The spatialization backend is picked
    /// from the device's format, falling back to stereo panning.
    #[must_use]
    pub fn new(
        settings: AudioSettings,
        cache: Arc<SampleCache>,
        device: Box<dyn OutputDevice + Send>,
    ) -> Self {
        let bus = AudioMixBus::new(device.sample_rate());
        bus.set_master_volume(settings.master_volume);
        let spatializer = select_backend(settings.backend, device.sample_rate(), device.channels());
        Self {
            settings,
            cache,
            bus,
            device,
            spatializer,
            rng: fastrand::Rng::new(),
            source: None,
            update_loop: None,
        }
    }

    /// Cue on a [`NullDevice`] with an empty sample cache.
    #[must_use]
    pub fn headless(settings: AudioSettings) -> Self {
        let device = NullDevice::new(settings.sample_rate);
        Self::new(settings, Arc::new(SampleCache::empty()), Box::new(device))
    }

    /// Mix bus the cue plays on.
    #[must_use]
    pub const fn bus(&self) -> &AudioMixBus {
        &self.bus
    }

    /// Active spatialization backend.
    #[must_use]
    pub fn spatializer(&self) -> &Arc<dyn Spatializer> {
        &self.spatializer
    }

    /// The playing source.
    #[must_use]
    pub fn source(&self) -> Option<&Arc<SpatialSource>> {
        self.source.as_ref()
    }

    /// Whether the cue is playing.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.source.is_some()
    }

    /// Whether the update loop is running.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.update_loop
            .as_ref()
            .is_some_and(AudioUpdateLoop::is_running)
    }

    /// Starts the cue at `target`, replacing any previous one.
    pub fn start(&mut self, listener: ObserverPose, target: Vec3) -> AudioResult<()> {
        self.stop();

        let pose = SharedPose::new(PoseSnapshot {
            listener,
            target,
            audible: true,
        });
        let source = Arc::new(SpatialSource::new(
            &self.settings.beacon,
            &self.cache,
            Arc::clone(&self.spatializer),
            self.settings.falloff,
            self.settings.pitch_modulation(),
            pose,
            &mut self.rng,
        )?);
        source.update();

        // A device failure drops the loop, which joins its thread.
        let update_loop = AudioUpdateLoop::start(self.settings.tick_rate_hz)?;
        if !self.device.is_running() {
            self.device.start(&self.bus)?;
        }
        source.attach(&self.bus);
        update_loop.register(Arc::clone(&source));

        info!("Guidance cue started");
        self.source = Some(source);
        self.update_loop = Some(update_loop);
        Ok(())
    }

    /// Publishes new geometry for the update loop. Never waits on a tick.
    pub fn update_pose(&self, listener: ObserverPose, target: Vec3) {
        if let Some(source) = &self.source {
            let pose = source.pose();
            pose.set_listener(listener);
            pose.set_target(target);
        }
    }

    /// Mutes or unmutes without tearing down.
    pub fn set_audible(&self, audible: bool) {
        if let Some(source) = &self.source {
            source.pose().set_audible(audible);
        }
    }

    /// Stops the cue. When this returns the update thread has exited and the
    /// voice is off the bus.
    pub fn stop(&mut self) -> bool {
        if let Some(mut update_loop) = self.update_loop.take() {
            update_loop.stop();
        }
        let Some(source) = self.source.take() else {
            return false;
        };
        source.detach();
        self.device.stop();
        debug!("Guidance cue stopped");
        true
    }
}

impl Drop for GuideCue {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_audio::{AudioError, BackendKind};

    /// Device whose output stream never opens.
    #[derive(Debug)]
    struct BrokenDevice;

    impl OutputDevice for BrokenDevice {
        fn sample_rate(&self) -> u32 {
            44_100
        }

        fn channels(&self) -> u16 {
            2
        }

        fn start(&mut self, _bus: &AudioMixBus) -> AudioResult<()> {
            Err(AudioError::DeviceInitFailed("no output".into()))
        }

        fn stop(&mut self) {}

        fn is_running(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_start_stop_is_synchronous() {
        let mut cue = GuideCue::headless(AudioSettings::default());
        cue.start(ObserverPose::default(), Vec3::new(0.0, 0.0, 10.0))
            .expect("start");
        assert!(cue.is_active());
        assert!(cue.is_ticking());
        assert_eq!(cue.bus().source_count(), 1);

        assert!(cue.stop());
        assert!(!cue.is_active());
        assert!(!cue.is_ticking());
        assert_eq!(cue.bus().source_count(), 0);
        assert!(!cue.stop());
    }

    #[test]
    fn test_device_failure_leaves_nothing_running() {
        let mut cue = GuideCue::new(
            AudioSettings::default(),
            Arc::new(SampleCache::empty()),
            Box::new(BrokenDevice),
        );
        assert!(cue.start(ObserverPose::default(), Vec3::X).is_err());
        assert!(!cue.is_active());
        assert!(!cue.is_ticking());
        assert_eq!(cue.bus().source_count(), 0);
    }

    #[test]
    fn test_restart_replaces_source() {
        let mut cue = GuideCue::headless(AudioSettings::default());
        cue.start(ObserverPose::default(), Vec3::X).expect("start");
        cue.start(ObserverPose::default(), Vec3::Z).expect("restart");
        assert_eq!(cue.bus().source_count(), 1);
    }

    #[test]
    fn test_pose_updates_reach_source() {
        let mut cue = GuideCue::headless(AudioSettings::default());
        cue.start(ObserverPose::default(), Vec3::X).expect("start");
        cue.update_pose(ObserverPose::default(), Vec3::new(0.0, 0.0, 30.0));
        let params = cue.source().expect("source").update();
        assert!((params.distance - 30.0).abs() < 1e-4);

        cue.set_audible(false);
        cue.source().expect("source").update();
        assert!(!cue.source().expect("source").is_playing());
    }

    #[test]
    fn test_unknown_sample_fails_to_start() {
        let settings = AudioSettings {
            beacon: beacon_audio::CueSound::Sample {
                id: beacon_common::SoundId::new("missing"),
                looping: true,
            },
            backend: BackendKind::Stereo,
            ..AudioSettings::default()
        };
        let mut cue = GuideCue::headless(settings);
        assert!(cue.start(ObserverPose::default(), Vec3::X).is_err());
        assert!(!cue.is_active());
        assert_eq!(cue.bus().source_count(), 0);
    }
}
