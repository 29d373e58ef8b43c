//! Result and error types for Sondear.
//!
//! None of these ever propagate into instrumented application code. The
//! hot path (`CoverageManager::acquire`) is infallible by construction: an
//! unregistered class is logged with throttling and served the stub array
//! rather than surfacing an error. What remains below is the background
//! delivery taxonomy.

use thiserror::Error;

/// Result type for Sondear operations
pub type SondearResult<T> = Result<T, SondearError>;

/// Errors that can occur on the delivery side of Sondear
#[derive(Debug, Error)]
pub enum SondearError {
    /// Transport reported the destination as unreachable; pending pages
    /// were queued instead of sent
    #[error("Coverage transport unavailable")]
    TransportUnavailable,

    /// Transport attempted delivery and failed
    #[error("Coverage transport failed: {message}")]
    TransportFailed {
        /// Error message from the transport implementation
        message: String,
    },

    /// Retention queue rejected a payload to preserve older queued data
    #[error("Retention queue full: {needed} bytes needed, {used}/{limit} bytes used")]
    RetentionOverflow {
        /// Size of the rejected payload
        needed: u64,
        /// Bytes currently queued
        used: u64,
        /// Configured byte ceiling
        limit: u64,
    },

    /// Coverage page serialization error
    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    mod error_display_tests {
        use super::*;

        /// Transport failures carry the implementation's message
        #[test]
        fn test_transport_failed_display() {
            let err = SondearError::TransportFailed {
                message: "connection refused".to_string(),
            };
            assert_eq!(
                err.to_string(),
                "Coverage transport failed: connection refused"
            );
        }

        /// Retention overflow reports usage against the ceiling
        #[test]
        fn test_retention_overflow_display() {
            let err = SondearError::RetentionOverflow {
                needed: 100,
                used: 950,
                limit: 1000,
            };
            assert_eq!(
                err.to_string(),
                "Retention queue full: 100 bytes needed, 950/1000 bytes used"
            );
        }

        /// Serialization errors convert via From
        #[test]
        fn test_serialization_from() {
            let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
            let err: SondearError = json_err.into();
            assert!(matches!(err, SondearError::Serialization(_)));
        }
    }
}
