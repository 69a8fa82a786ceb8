//! Crate-level error type for the practice listener engine.
//!
//! Only lifecycle and configuration problems are errors. Silence, unmatched
//! chords and short device reads are ordinary outcomes and surface as
//! sentinel results instead.

/// Errors reported by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The capture device could not be opened or configured.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device offers no sample format the engine can convert to 16-bit mono.
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// A configuration value is out of range (e.g. a non power-of-two FFT size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `start()` was called on a detector that is already capturing.
    #[error("detector is already running")]
    AlreadyRunning,

    /// The worker thread died before reporting whether the device opened.
    #[error("detection worker panicked during start-up")]
    WorkerPanicked,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
