//! Audio error types.

use beacon_common::SoundId;
use thiserror::Error;

/// Audio subsystem error types.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Failed to initialize the output device.
    #[error("Failed to initialize audio device: {0}")]
    DeviceInitFailed(String),

    /// Failed to load a sound from storage.
    #[error("Failed to load sound '{id}': {message}")]
    LoadFailed {
        /// Sound that failed to load.
        id: SoundId,
        /// Error message.
        message: String,
    },

    /// Failed to decode audio data.
    #[error("Failed to decode audio: {0}")]
    DecodeFailed(String),

    /// The loader does not know this sound.
    #[error("Unknown sound: {0}")]
    UnknownSound(SoundId),

    /// The sound decoded to zero samples.
    #[error("Sound '{0}' contains no samples")]
    EmptySample(SoundId),

    /// Binaural rendering cannot run with the current output.
    #[error("Binaural rendering unavailable: {0}")]
    BinauralUnavailable(String),

    /// Failed to spawn a worker thread.
    #[error("Failed to spawn audio thread: {0}")]
    ThreadSpawn(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;
