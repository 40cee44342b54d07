//! Output devices.
//!
//! An [`OutputDevice`] pulls rendered blocks from an [`AudioMixBus`]. The
//! headless [`NullDevice`] is pulled by hand (tests, demos, servers); with the
//! `device` feature [`RodioDevice`] streams the bus to the default output and
//! [`DecoderLoader`] decodes sounds from disk.

use tracing::debug;

use crate::error::AudioResult;
use crate::mix_bus::AudioMixBus;

/// Low-level audio output.
pub trait OutputDevice {
    /// Output rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Output channel count.
    fn channels(&self) -> u16;

    /// Starts pulling from `bus`.
    fn start(&mut self, bus: &AudioMixBus) -> AudioResult<()>;

    /// Stops pulling. Safe to call when not started.
    fn stop(&mut self);

    /// Whether the device is pulling.
    fn is_running(&self) -> bool;
}

/// Device that renders only when asked.
#[derive(Debug)]
pub struct NullDevice {
    sample_rate: u32,
    bus: Option<AudioMixBus>,
    frames_pulled: u64,
}

impl NullDevice {
    /// Creates a stereo null device.
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            bus: None,
            frames_pulled: 0,
        }
    }

    /// Renders `frames` stereo frames from the bus. Returns silence when
    /// stopped.
    pub fn pull(&mut self, frames: usize) -> Vec<f32> {
        let mut block = vec![0.0; frames * 2];
        if let Some(bus) = &self.bus {
            bus.render(&mut block);
            self.frames_pulled += frames as u64;
        }
        block
    }

    /// Total frames rendered while running.
    #[must_use]
    pub const fn frames_pulled(&self) -> u64 {
        self.frames_pulled
    }
}

impl OutputDevice for NullDevice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        2
    }

    fn start(&mut self, bus: &AudioMixBus) -> AudioResult<()> {
        self.bus = Some(bus.clone());
        debug!("Null device started");
        Ok(())
    }

    fn stop(&mut self) {
        if self.bus.take().is_some() {
            debug!("Null device stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.bus.is_some()
    }
}

#[cfg(feature = "device")]
pub use rodio_device::{DecoderLoader, RodioDevice};

#[cfg(feature = "device")]
mod rodio_device {
    use std::fs::File;
    use std::io::BufReader;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use beacon_common::SoundId;
    use rodio::{Decoder, OutputStream, OutputStreamHandle, Source};
    use tracing::{debug, info};

    use super::OutputDevice;
    use crate::cache::{SampleBuffer, SampleLoader};
    use crate::error::{AudioError, AudioResult};
    use crate::mix_bus::AudioMixBus;

    /// Frames rendered per bus pull.
    const BLOCK_FRAMES: usize = 512;

    /// Extensions tried when an id has none.
    const EXTENSIONS: [&str; 2] = ["wav", "mp3"];

    /// Streams a bus to the default output through rodio.
    pub struct RodioDevice {
        _stream: OutputStream,
        handle: OutputStreamHandle,
        sample_rate: u32,
        stop: Option<Arc<AtomicBool>>,
    }

    impl std::fmt::Debug for RodioDevice {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RodioDevice")
                .field("sample_rate", &self.sample_rate)
                .field("running", &self.stop.is_some())
                .finish_non_exhaustive()
        }
    }

    impl RodioDevice {
        /// Opens the default output. The bus is rendered at `sample_rate`
        /// and resampled by rodio if the device differs.
        pub fn open(sample_rate: u32) -> AudioResult<Self> {
            let (stream, handle) = OutputStream::try_default()
                .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?;
            info!("Audio device initialized");
            Ok(Self {
                _stream: stream,
                handle,
                sample_rate: sample_rate.max(1),
                stop: None,
            })
        }
    }

    impl OutputDevice for RodioDevice {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn channels(&self) -> u16 {
            2
        }

        fn start(&mut self, bus: &AudioMixBus) -> AudioResult<()> {
            self.stop();
            let stop = Arc::new(AtomicBool::new(false));
            let source = BusSource {
                bus: bus.clone(),
                block: vec![0.0; BLOCK_FRAMES * 2],
                pos: BLOCK_FRAMES * 2,
                stop: Arc::clone(&stop),
            };
            self.handle
                .play_raw(source)
                .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?;
            self.stop = Some(stop);
            debug!("Rodio device started");
            Ok(())
        }

        fn stop(&mut self) {
            if let Some(stop) = self.stop.take() {
                stop.store(true, Ordering::Relaxed);
                debug!("Rodio device stopped");
            }
        }

        fn is_running(&self) -> bool {
            self.stop.is_some()
        }
    }

    impl Drop for RodioDevice {
        fn drop(&mut self) {
            self.stop();
        }
    }

    /// Endless interleaved stereo stream pulled from a bus.
    struct BusSource {
        bus: AudioMixBus,
        block: Vec<f32>,
        pos: usize,
        stop: Arc<AtomicBool>,
    }

    impl Iterator for BusSource {
        type Item = f32;

        fn next(&mut self) -> Option<f32> {
            if self.stop.load(Ordering::Relaxed) {
                return None;
            }
            if self.pos >= self.block.len() {
                self.bus.render(&mut self.block);
                self.pos = 0;
            }
            let sample = self.block[self.pos];
            self.pos += 1;
            Some(sample)
        }
    }

    impl Source for BusSource {
        fn current_frame_len(&self) -> Option<usize> {
            Some(self.block.len() - self.pos.min(self.block.len()))
        }

        fn channels(&self) -> u16 {
            2
        }

        fn sample_rate(&self) -> u32 {
            self.bus.sample_rate()
        }

        fn total_duration(&self) -> Option<Duration> {
            None
        }
    }

    /// Decodes sounds from files under a root directory.
    ///
    /// An id like `cues/ping` resolves to `<root>/cues/ping.wav` or `.mp3`;
    /// an id with an extension is used as-is.
    #[derive(Debug, Clone)]
    pub struct DecoderLoader {
        root: PathBuf,
    }

    impl DecoderLoader {
        /// Creates a loader reading below `root`.
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }

        fn resolve(&self, id: &SoundId) -> Option<PathBuf> {
            let direct = self.root.join(id.as_str());
            if direct.extension().is_some() {
                return direct.is_file().then_some(direct);
            }
            EXTENSIONS
                .iter()
                .map(|ext| direct.with_extension(ext))
                .find(|p| p.is_file())
        }

        fn decode(id: &SoundId, path: &Path) -> AudioResult<SampleBuffer> {
            let file = File::open(path).map_err(|e| AudioError::LoadFailed {
                id: id.clone(),
                message: e.to_string(),
            })?;
            let decoder =
                Decoder::new(BufReader::new(file)).map_err(|e| AudioError::LoadFailed {
                    id: id.clone(),
                    message: e.to_string(),
                })?;
            let sample_rate = decoder.sample_rate();
            let channels = decoder.channels();
            let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();
            Ok(SampleBuffer::from_interleaved(
                id.clone(),
                &samples,
                channels,
                sample_rate,
            ))
        }
    }

    impl SampleLoader for DecoderLoader {
        fn load(&self, id: &SoundId) -> AudioResult<SampleBuffer> {
            let path = self
                .resolve(id)
                .ok_or_else(|| AudioError::UnknownSound(id.clone()))?;
            debug!("Decoding {:?}", path);
            Self::decode(id, &path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::ChannelParams;
    use crate::voice::{ToneSpec, Voice};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_null_device_pulls_bus() {
        let bus = AudioMixBus::new(44_100);
        let mut voice = Voice::tone(ToneSpec {
            pulse_off: 0.0,
            ..ToneSpec::default()
        });
        voice.set_params(ChannelParams::centered(1.0));
        voice.set_playing(true);
        bus.attach(Arc::new(Mutex::new(voice)));

        let mut device = NullDevice::new(44_100);
        assert!(device.pull(64).iter().all(|s| s.abs() < f32::EPSILON));

        device.start(&bus).expect("start");
        assert!(device.is_running());
        let block = device.pull(256);
        assert_eq!(block.len(), 512);
        assert!(block.iter().any(|s| s.abs() > 0.01));
        assert_eq!(device.frames_pulled(), 256);

        device.stop();
        assert!(!device.is_running());
    }
}
