//! Error types for setalight-core.

use thiserror::Error;

/// Error type for setalight-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid tempo: {0}. Must be a positive, finite BPM")]
    InvalidTempo(f64),

    #[error("Invalid time signature: {beats_per_bar}/{note_value}")]
    InvalidTimeSignature { beats_per_bar: u32, note_value: u32 },

    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[error("Audio output suspended: {0}")]
    OutputSuspended(String),

    #[cfg(feature = "device")]
    #[error("Audio device not available")]
    DeviceNotAvailable(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "device")]
    #[error("Failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "device")]
    #[error("Failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[cfg(feature = "device")]
    #[error("Failed to enumerate devices")]
    DevicesError(#[from] cpal::DevicesError),

    #[cfg(feature = "device")]
    #[error("Failed to get device name")]
    DeviceNameError(#[from] cpal::DeviceNameError),
}

impl Error {
    /// Whether a later retry (after the next user gesture) may succeed.
    ///
    /// A stream that refused to play is transient; a missing device is not.
    pub fn is_retryable(&self) -> bool {
        if matches!(self, Error::OutputSuspended(_)) {
            return true;
        }
        #[cfg(feature = "device")]
        if matches!(self, Error::PlayStream(_)) {
            return true;
        }
        false
    }
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
