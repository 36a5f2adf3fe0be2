//! The errors that can abort an Impulcifer run. The pipeline is offline and
//! deterministic, so nothing here is retried: every variant propagates up to
//! the caller and the run stops.

use thiserror::Error;

/// Everything that can go wrong while turning sweep recordings into
/// impulse responses.
#[derive(Debug, Error)]
pub enum ImpulciferError {
    /// Returned when a parameter is missing, malformed or inconsistent with
    /// the signals it is applied to, e.g. a silence length that does not
    /// land on a whole sample.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Returned when a recording and the reference sweep were captured at
    /// different sampling rates.
    #[error("sampling rates do not match: recording is {recording} Hz, reference sweep is {reference} Hz")]
    SampleRateMismatch {
        /// Sampling rate of the recording
        recording: u32,
        /// Sampling rate of the reference sweep
        reference: u32,
    },

    /// Returned when the measured responses contradict the known speaker
    /// geometry, or a left/right pair is only half silent.
    #[error("measurement integrity error: {0}")]
    MeasurementIntegrity(String),

    /// Returned when a speaker or channel label is not one we know about.
    #[error("unsupported channel: {0}")]
    UnsupportedChannel(String),

    /// Returned when hound fails to read or write a WAV file.
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    /// Returned when io fails when reading or writing files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when a configuration file cannot be deserialized.
    #[error("ron error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    /// Returned when a configuration cannot be serialized.
    #[error("ron serialization error: {0}")]
    RonSerialize(#[from] ron::Error),
}

/// Shorthand used by every fallible function in the crate.
pub type Result<T> = std::result::Result<T, ImpulciferError>;
