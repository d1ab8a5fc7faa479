//! Centralized error type for the setalight-audio crate.
//!
//! Wraps core errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] setalight_core::Error),

    #[error("Pad unavailable for key {key}: {reason}")]
    PadUnavailable { key: String, reason: String },

    #[error("Invalid key: {0:?}")]
    InvalidKey(String),

    #[error("Preferences: {0}")]
    Prefs(String),

    #[error("Session driver stopped")]
    DriverStopped,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV: {0}")]
    Wav(#[from] hound::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
