//! Error types for the inference fallback

use std::time::Duration;

/// Result type for inference operations.
///
/// This is a convenience type alias that uses [`InferError`] as the error type.
pub type Result<T> = std::result::Result<T, InferError>;

/// Everything that can go wrong while asking the inference service.
///
/// None of these are fatal to the rename pipeline: the improver turns every
/// variant into "no improvement" and keeps the rule-based descriptor.
#[derive(Debug, thiserror::Error)]
pub enum InferError {
    /// The service did not answer within the configured timeout
    #[error("Inference request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Connection, DNS or TLS failure
    #[error("Inference service unavailable: {source}")]
    Unavailable {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The service answered with a non-success HTTP status
    #[error("Inference service returned HTTP {status}")]
    Status { status: u16 },

    /// The answer could not be mapped to a descriptor
    #[error("Malformed inference response: {message}")]
    Malformed { message: String },

    /// Error when the inference configuration is invalid
    #[error("Invalid inference configuration: {message}")]
    InvalidConfig { message: String },
}

impl InferError {
    /// Create an unavailability error from any error type.
    ///
    /// # Arguments
    /// * `source` - The underlying transport error
    pub fn unavailable<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unavailable {
            source: Box::new(source),
        }
    }

    /// Create a malformed-response error with a custom message.
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether this failure was the hard timeout firing
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
