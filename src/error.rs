//! Error types for detector and configuration operations.

use thiserror::Error;

/// Errors raised by the detector when its preconditions are violated.
///
/// Whether a sample is anomalous is never an error; these only cover misuse
/// and malformed input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    /// Bootstrap window shorter than the configured size
    #[error("bootstrap needs at least {needed} samples, got {got}")]
    InsufficientBootstrap { needed: usize, got: usize },

    /// Window sum overflowed, leaving no usable split point
    #[error("bootstrap window mean is not finite ({mean})")]
    NonFiniteThreshold { mean: f64 },

    /// Thresholds are set once; a second bootstrap would overwrite them
    #[error("detector is already bootstrapped")]
    AlreadyBootstrapped,

    /// Sample processing before bootstrap completed
    #[error("detector is not bootstrapped")]
    NotBootstrapped,

    /// Index not strictly greater than the last processed one
    #[error("sample index {index} is not after last processed index {last}")]
    OutOfOrderInput { index: u64, last: u64 },

    /// Power must be finite and non-negative
    #[error("invalid power value {value} at index {index}")]
    InvalidPower { index: u64, value: f64 },
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type alias for detector operations.
pub type Result<T> = std::result::Result<T, DetectorError>;
