//! Playing voices.
//!
//! A [`Voice`] is one playing instance: either a read cursor into a shared
//! [`SampleBuffer`] or a generated pulsed tone. It renders additively into an
//! interleaved stereo block using the latest [`ChannelParams`].

use std::f32::consts::TAU;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::SampleBuffer;
use crate::spatial::ChannelParams;

/// Longest interaural delay the delay line can hold, in frames.
pub const MAX_DELAY_FRAMES: usize = 64;

/// Attack/release ramp applied to each tone pulse, in seconds.
const PULSE_RAMP_SECS: f32 = 0.005;

/// Procedurally generated beacon tone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneSpec {
    /// Base frequency in Hz.
    pub frequency: f32,
    /// Length of each audible pulse in seconds.
    pub pulse_on: f32,
    /// Silence between pulses in seconds (0 = continuous).
    pub pulse_off: f32,
    /// Peak amplitude.
    pub amplitude: f32,
}

impl Default for ToneSpec {
    fn default() -> Self {
        Self {
            frequency: 660.0,
            pulse_on: 0.12,
            pulse_off: 0.38,
            amplitude: 0.6,
        }
    }
}

impl ToneSpec {
    /// Envelope value at a time since the tone started.
    fn gate(&self, elapsed: f32) -> f32 {
        if self.pulse_off <= 0.0 || self.pulse_on <= 0.0 {
            return 1.0;
        }
        let t = elapsed % (self.pulse_on + self.pulse_off);
        if t >= self.pulse_on {
            return 0.0;
        }
        let attack = t / PULSE_RAMP_SECS;
        let release = (self.pulse_on - t) / PULSE_RAMP_SECS;
        attack.min(release).min(1.0)
    }

    /// Envelope value after `frames` output frames at `sample_rate`.
    ///
    /// The position inside the pulse period is taken in `f64` so the gate
    /// keeps switching however long the tone has been playing.
    fn gate_at(&self, frames: u64, sample_rate: u32) -> f32 {
        let period = f64::from(self.pulse_on + self.pulse_off);
        if period <= 0.0 {
            return self.gate(0.0);
        }
        let seconds = frames as f64 / f64::from(sample_rate.max(1));
        self.gate((seconds % period) as f32)
    }
}

#[derive(Debug)]
enum VoiceSource {
    Sample {
        buffer: Arc<SampleBuffer>,
        cursor: f64,
        looping: bool,
    },
    Tone {
        spec: ToneSpec,
        phase: f32,
        /// Output frames rendered since the tone started.
        frames: u64,
    },
}

/// Fixed ring of recent mono samples for interaural delay taps.
#[derive(Debug)]
struct DelayLine {
    buf: [f32; MAX_DELAY_FRAMES],
    write: usize,
}

impl DelayLine {
    const fn new() -> Self {
        Self {
            buf: [0.0; MAX_DELAY_FRAMES],
            write: 0,
        }
    }

    fn push(&mut self, sample: f32) {
        self.buf[self.write] = sample;
        self.write = (self.write + 1) % MAX_DELAY_FRAMES;
    }

    /// Sample pushed `delay` frames ago (0 = latest).
    fn tap(&self, delay: usize) -> f32 {
        let delay = delay.min(MAX_DELAY_FRAMES - 1);
        self.buf[(self.write + MAX_DELAY_FRAMES - 1 - delay) % MAX_DELAY_FRAMES]
    }
}

/// One playing sound instance.
#[derive(Debug)]
pub struct Voice {
    source: VoiceSource,
    target: ChannelParams,
    left_gain: f32,
    right_gain: f32,
    pitch: f32,
    playing: bool,
    finished: bool,
    lowpass_state: f32,
    delay: DelayLine,
}

impl Voice {
    fn with_source(source: VoiceSource) -> Self {
        Self {
            source,
            target: ChannelParams::silent(),
            left_gain: 0.0,
            right_gain: 0.0,
            pitch: 1.0,
            playing: false,
            finished: false,
            lowpass_state: 0.0,
            delay: DelayLine::new(),
        }
    }

    /// Creates a voice over a cached buffer.
    ///
    /// The read cursor starts at a random non-zero frame so simultaneous
    /// instances of the same sound never play phase-locked.
    #[must_use]
    pub fn from_sample(buffer: Arc<SampleBuffer>, looping: bool, rng: &mut fastrand::Rng) -> Self {
        let frames = buffer.frames();
        let start = if frames > 1 { rng.usize(1..frames) } else { 0 };
        Self::with_source(VoiceSource::Sample {
            buffer,
            cursor: start as f64,
            looping,
        })
    }

    /// Creates a generated tone voice.
    #[must_use]
    pub fn tone(spec: ToneSpec) -> Self {
        Self::with_source(VoiceSource::Tone {
            spec,
            phase: 0.0,
            frames: 0,
        })
    }

    /// Current read cursor for sample voices.
    #[must_use]
    pub fn cursor(&self) -> Option<f64> {
        match &self.source {
            VoiceSource::Sample { cursor, .. } => Some(*cursor),
            VoiceSource::Tone { .. } => None,
        }
    }

    /// Whether this voice is a generated tone.
    #[must_use]
    pub fn is_tone(&self) -> bool {
        matches!(self.source, VoiceSource::Tone { .. })
    }

    /// Sets the target channel parameters; gains glide there over the next
    /// rendered block.
    pub fn set_params(&mut self, params: ChannelParams) {
        self.target = params;
    }

    /// Latest target parameters.
    #[must_use]
    pub fn params(&self) -> ChannelParams {
        self.target
    }

    /// Sets the playback rate multiplier.
    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch.clamp(0.25, 4.0);
    }

    /// Playback rate multiplier.
    #[must_use]
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Starts or pauses output.
    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// Whether the voice produces output.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing && !self.finished
    }

    /// Whether a one-shot sample reached its end.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn next_mono(&mut self, sample_rate: u32) -> f32 {
        let rate = sample_rate.max(1) as f32;
        match &mut self.source {
            VoiceSource::Sample {
                buffer,
                cursor,
                looping,
            } => {
                let frames = buffer.frames() as f64;
                if !*looping && *cursor >= frames {
                    self.finished = true;
                    return 0.0;
                }
                let value = buffer.sample_at(*cursor, *looping);
                *cursor += f64::from(buffer.sample_rate()) / f64::from(rate);
                if *looping && frames > 0.0 {
                    *cursor %= frames;
                }
                value
            },
            VoiceSource::Tone {
                spec,
                phase,
                frames,
            } => {
                let value = spec.amplitude * phase.sin() * spec.gate_at(*frames, sample_rate);
                *phase = (*phase + TAU * spec.frequency * self.pitch / rate) % TAU;
                *frames = frames.wrapping_add(1);
                value
            },
        }
    }

    /// Adds this voice into an interleaved stereo block.
    pub fn render_add(&mut self, out: &mut [f32], sample_rate: u32) {
        if !self.is_playing() {
            return;
        }
        let frames = out.len() / 2;
        if frames == 0 {
            return;
        }

        let rate = sample_rate.max(1) as f32;
        let alpha = if self.target.lowpass_hz >= rate * 0.5 {
            1.0
        } else {
            1.0 - (-TAU * self.target.lowpass_hz.max(1.0) / rate).exp()
        };
        let left_delay = (self.target.left_delay * rate).round() as usize;
        let right_delay = (self.target.right_delay * rate).round() as usize;

        let left_step = (self.target.left_gain - self.left_gain) / frames as f32;
        let right_step = (self.target.right_gain - self.right_gain) / frames as f32;

        for frame in out.chunks_exact_mut(2) {
            let raw = self.next_mono(sample_rate);
            self.lowpass_state += alpha * (raw - self.lowpass_state);
            self.delay.push(self.lowpass_state);

            self.left_gain += left_step;
            self.right_gain += right_step;

            frame[0] += self.delay.tap(left_delay) * self.left_gain;
            frame[1] += self.delay.tap(right_delay) * self.right_gain;
        }

        self.left_gain = self.target.left_gain;
        self.right_gain = self.target.right_gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_common::SoundId;

    fn buffer(frames: usize) -> Arc<SampleBuffer> {
        let samples = (0..frames).map(|i| (i as f32 * 0.1).sin()).collect();
        Arc::new(SampleBuffer::new(SoundId::new("s"), samples, 44_100))
    }

    fn loud() -> ChannelParams {
        ChannelParams {
            left_gain: 1.0,
            right_gain: 1.0,
            ..ChannelParams::silent()
        }
    }

    #[test]
    fn test_random_offset_never_zero() {
        let shared = buffer(4096);
        let mut rng = fastrand::Rng::with_seed(7);
        let cursors: Vec<f64> = (0..64)
            .map(|_| {
                Voice::from_sample(Arc::clone(&shared), true, &mut rng)
                    .cursor()
                    .expect("sample voice")
            })
            .collect();

        assert!(cursors.iter().all(|&c| c >= 1.0));
        let first = cursors[0];
        assert!(cursors.iter().any(|&c| (c - first).abs() > f64::EPSILON));
    }

    #[test]
    fn test_paused_voice_is_silent() {
        let mut voice = Voice::tone(ToneSpec::default());
        voice.set_params(loud());
        let mut out = vec![0.0; 256];
        voice.render_add(&mut out, 44_100);
        assert!(out.iter().all(|s| s.abs() < f32::EPSILON));
    }

    #[test]
    fn test_tone_renders() {
        let mut voice = Voice::tone(ToneSpec {
            pulse_off: 0.0,
            ..ToneSpec::default()
        });
        voice.set_params(loud());
        voice.set_playing(true);
        let mut out = vec![0.0; 1024];
        voice.render_add(&mut out, 44_100);
        assert!(out.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn test_one_shot_finishes() {
        let mut rng = fastrand::Rng::with_seed(1);
        let mut voice = Voice::from_sample(buffer(32), false, &mut rng);
        voice.set_params(loud());
        voice.set_playing(true);
        let mut out = vec![0.0; 256];
        voice.render_add(&mut out, 44_100);
        assert!(voice.is_finished());
        assert!(!voice.is_playing());
    }

    #[test]
    fn test_delay_shifts_one_ear() {
        let mut voice = Voice::tone(ToneSpec {
            pulse_off: 0.0,
            ..ToneSpec::default()
        });
        voice.set_playing(true);
        voice.set_params(ChannelParams {
            left_delay: 10.0 / 44_100.0,
            ..loud()
        });
        // Prime gains so the ramp doesn't mask the comparison.
        let mut warmup = vec![0.0; 128];
        voice.render_add(&mut warmup, 44_100);

        let mut out = vec![0.0; 128];
        voice.render_add(&mut out, 44_100);
        let differs = out
            .chunks_exact(2)
            .any(|frame| (frame[0] - frame[1]).abs() > 1e-3);
        assert!(differs);
    }

    #[test]
    fn test_gate_pulses() {
        let spec = ToneSpec {
            pulse_on: 0.1,
            pulse_off: 0.1,
            ..ToneSpec::default()
        };
        assert!(spec.gate(0.05) > 0.99);
        assert!(spec.gate(0.15).abs() < f32::EPSILON);
    }

    #[test]
    fn test_gate_keeps_pulsing_after_long_playback() {
        // Ten minutes in, well past where an f32 seconds clock stalls.
        let start = 600 * 44_100 + 8_820;
        let mut voice = Voice::with_source(VoiceSource::Tone {
            spec: ToneSpec::default(),
            phase: 0.0,
            frames: start,
        });
        voice.set_params(loud());
        voice.set_playing(true);

        let mut out = vec![0.0; 44_100 * 2];
        voice.render_add(&mut out, 44_100);

        let loud_frames = out.chunks_exact(2).filter(|f| f[0].abs() > 0.01).count();
        let silent_frames = out.chunks_exact(2).filter(|f| f[0].abs() < 1e-6).count();
        // 0.12 s on, 0.38 s off: about a quarter of a second is audible.
        assert!(loud_frames > 4_410, "loud frames: {loud_frames}");
        assert!(silent_frames > 22_050, "silent frames: {silent_frames}");
        match &voice.source {
            VoiceSource::Tone { frames, .. } => assert_eq!(*frames, start + 44_100),
            VoiceSource::Sample { .. } => panic!("expected a tone"),
        }
    }

    #[test]
    fn test_gate_at_matches_gate() {
        let spec = ToneSpec::default();
        let period_frames = 22_050;
        let late = 1_000_000 * period_frames;
        assert!(spec.gate_at(late + 2_646, 44_100) > 0.99);
        assert!(spec.gate_at(late + 11_025, 44_100).abs() < f32::EPSILON);
    }
}
