//! Error handling for Splice
//!
//! Precondition violations (bad FFT size, unknown profile, engine not
//! initialized) surface immediately. Per-clip media problems are logged by the
//! renderer and degrade to silence instead of failing the whole render.

use thiserror::Error;

/// Result type alias for Splice operations
pub type Result<T> = std::result::Result<T, SpliceError>;

/// Main error type for Splice operations
#[derive(Error, Debug)]
pub enum SpliceError {
    // Precondition Errors
    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("Invalid parameter '{param}': {value} (expected {expected})")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    #[error("Engine not initialized: cannot {operation} before init()")]
    NotInitialized { operation: String },

    // Lookup Errors
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    // Media Errors
    #[error("Could not decode media '{media_id}': {reason}")]
    Decode { media_id: String, reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SpliceError {
    /// Shorthand for a validation failure
    pub fn validation(reason: impl Into<String>) -> Self {
        SpliceError::Validation {
            reason: reason.into(),
        }
    }

    /// Shorthand for a missing resource of the given kind
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        SpliceError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            SpliceError::Validation { .. } => "VALIDATION_ERROR",
            SpliceError::InvalidParameter { .. } => "INVALID_PARAMETER",
            SpliceError::NotInitialized { .. } => "NOT_INITIALIZED",
            SpliceError::NotFound { .. } => "NOT_FOUND",
            SpliceError::Decode { .. } => "DECODE_ERROR",
            SpliceError::Io(_) => "IO_ERROR",
            SpliceError::Wav(_) => "WAV_ERROR",
            SpliceError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error leaves the engine usable for further calls
    ///
    /// Decode failures only silence one clip; a missing profile or media id
    /// fails the single call without touching engine state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SpliceError::Decode { .. } | SpliceError::NotFound { .. }
        )
    }
}
