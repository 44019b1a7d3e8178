//! Error types for the Xyston library.
//!
//! All fallible operations return [`Result`], and every failure mode is a
//! variant of [`XystonError`]. Outcomes that cross component boundaries
//! (quorum resolution, timeouts, planning failures) are always carried as
//! values of this type rather than panics, so a caller can match on the
//! specific variant and decide whether to retry.

use std::io;

use thiserror::Error;

use crate::topology::NodeAddr;

/// The main error type for Xyston operations.
#[derive(Error, Debug)]
pub enum XystonError {
    /// I/O errors (file operations, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No replica set for a sub-range satisfies the consistency level.
    /// Planning fails fatally before any dispatch.
    #[error("insufficient live replicas: required {required}, alive {alive}")]
    InsufficientReplicas {
        /// Replica acknowledgements the consistency level requires.
        required: usize,
        /// Live replicas actually available for the sub-range.
        alive: usize,
    },

    /// A range read did not reach its acknowledgement threshold before the
    /// read deadline.
    #[error("read timeout: received {received} of {block_for} required replies")]
    ReadTimeout {
        /// Replies the consistency level blocked for.
        block_for: usize,
        /// Replies actually received before the deadline.
        received: usize,
    },

    /// A read-repair write did not complete within the write deadline.
    /// Non-fatal: the read already satisfied its quorum, so this is
    /// reported and logged but never fails the query.
    #[error("read repair timed out against {node}")]
    RepairTimeout {
        /// Replica the repair write targeted.
        node: NodeAddr,
    },

    /// Selectivity statistics were missing or invalid. Recovered locally
    /// by falling back to a conservative yield estimate.
    #[error("yield estimator unavailable: {0}")]
    EstimatorUnavailable(String),

    /// Range planning errors other than replica shortage.
    #[error("plan error: {0}")]
    Plan(String),

    /// Transport-level request failures.
    #[error("transport error: {0}")]
    Transport(String),

    /// Continuation token or key encoding errors.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operation cancelled
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Invalid operation
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Generic error for other cases
    #[error("error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with XystonError.
pub type Result<T> = std::result::Result<T, XystonError>;

impl XystonError {
    /// Create a new plan error.
    pub fn plan<S: Into<String>>(msg: S) -> Self {
        XystonError::Plan(msg.into())
    }

    /// Create a new transport error.
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        XystonError::Transport(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        XystonError::Serialization(msg.into())
    }

    /// Create a new cancelled error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        XystonError::Cancelled(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        XystonError::InvalidOperation(msg.into())
    }

    /// Create a new estimator error.
    pub fn estimator<S: Into<String>>(msg: S) -> Self {
        XystonError::EstimatorUnavailable(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        XystonError::Other(msg.into())
    }

    /// Whether this error fails the query. Repair timeouts and estimator
    /// fallbacks are recovered locally; everything else is fatal to the
    /// current wave.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            XystonError::RepairTimeout { .. } | XystonError::EstimatorUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = XystonError::plan("no owner for range");
        assert_eq!(error.to_string(), "plan error: no owner for range");

        let error = XystonError::transport("connection refused");
        assert_eq!(error.to_string(), "transport error: connection refused");

        let error = XystonError::ReadTimeout {
            block_for: 2,
            received: 1,
        };
        assert_eq!(
            error.to_string(),
            "read timeout: received 1 of 2 required replies"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error = XystonError::from(io_error);

        match error {
            XystonError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_fatality() {
        assert!(
            XystonError::InsufficientReplicas {
                required: 2,
                alive: 1
            }
            .is_fatal()
        );
        assert!(
            XystonError::ReadTimeout {
                block_for: 2,
                received: 0
            }
            .is_fatal()
        );
        assert!(
            !XystonError::RepairTimeout {
                node: NodeAddr::new("10.0.0.1:7000")
            }
            .is_fatal()
        );
        assert!(!XystonError::estimator("no stats for table").is_fatal());
    }
}
