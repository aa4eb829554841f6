//! Error handling for the BSP Framework
//!
//! One error type for the whole workspace. Every failure is local,
//! synchronous and non-retryable: it aborts the current pull and carries
//! enough context (identifiers, expected vs. actual shapes) to diagnose
//! the misconfiguration that caused it.

use thiserror::Error;

/// Result type alias for BSP Framework operations
pub type BspResult<T> = Result<T, BspError>;

/// Comprehensive error type for all BSP Framework operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BspError {
    /// An entity with this identifier is already registered
    #[error("Duplicate {kind} identifier '{id}'")]
    DuplicateId {
        /// Entity kind (setup, modality, session, ...)
        kind: &'static str,
        /// The offending identifier
        id: String,
    },

    /// Time or sample index outside the valid range of a buffer
    #[error("Index out of bounds: {reason}")]
    OutOfBounds {
        /// Description including the requested and available range
        reason: String,
    },

    /// Row or column count mismatch on construction or write
    #[error("Shape error: expected {expected}, got {actual}")]
    Shape {
        /// Expected shape description
        expected: String,
        /// Actual shape description
        actual: String,
    },

    /// Containers with incompatible shapes passed to a collation
    #[error("Shape mismatch in container {index}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Position of the first offending container
        index: usize,
        /// Shape of the first container (samples, channels)
        expected: (usize, usize),
        /// Shape of the offending container (samples, channels)
        actual: (usize, usize),
    },

    /// Resampling between frequencies that are not integer multiples
    #[error("Cannot resample from {from}Hz to {to}Hz: ratio is not an integer")]
    FrequencyRatio {
        /// Input frequency
        from: f64,
        /// Requested output frequency
        to: f64,
    },

    /// Input shorter than the requested processing window
    #[error("Window of {window} samples exceeds input length of {samples} samples")]
    InsufficientLength {
        /// Window length in samples
        window: usize,
        /// Available samples
        samples: usize,
    },

    /// Missing entity, event or label
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Entity kind
        kind: &'static str,
        /// Requested identifier
        id: String,
    },

    /// Operation requires data that is absent
    #[error("Empty: {reason}")]
    Empty {
        /// What was empty
        reason: String,
    },

    /// File extension without a registered loader
    #[error("Unsupported file format '{extension}'")]
    UnsupportedFormat {
        /// The extension that could not be dispatched
        extension: String,
    },

    /// Malformed content in an input file
    #[error("Parse error: {reason}")]
    Parse {
        /// Description of the parse failure
        reason: String,
    },

    /// Malformed live-stream message
    #[error("Decode error: {reason}")]
    Decode {
        /// Description of the decoding failure
        reason: String,
    },

    /// Invalid pipeline or stream configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem
        message: String,
    },

    /// The upstream message queue has been closed
    #[error("Stream closed: {reason}")]
    StreamClosed {
        /// Why the stream ended
        reason: String,
    },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BspError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        BspError::NotFound { kind, id: id.into() }
    }

    pub fn duplicate(kind: &'static str, id: impl Into<String>) -> Self {
        BspError::DuplicateId { kind, id: id.into() }
    }

    pub fn out_of_bounds(reason: impl Into<String>) -> Self {
        BspError::OutOfBounds { reason: reason.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        BspError::Configuration { message: message.into() }
    }
}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::BspError::Configuration {
            message: format!($($arg)*),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BspError::ShapeMismatch {
            index: 2,
            expected: (10, 3),
            actual: (7, 3),
        };
        let display = error.to_string();
        assert!(display.contains("container 2"));
        assert!(display.contains("(10, 3)"));
        assert!(display.contains("(7, 3)"));
    }

    #[test]
    fn test_not_found_display() {
        let error = BspError::not_found("modality", "emg");
        assert_eq!(error.to_string(), "modality 'emg' not found");
    }

    #[test]
    fn test_config_macro() {
        let error = config_error!("window size {} must be positive", -1.0);
        assert!(matches!(error, BspError::Configuration { .. }));
        assert!(error.to_string().contains("-1"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.csv");
        let error: BspError = io.into();
        assert!(matches!(error, BspError::Io(_)));
    }
}
