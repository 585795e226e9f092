//! Index store error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

/// Remote error code signalling that provisioned capacity was exceeded.
pub const THROTTLED_ERROR_CODE: &str = "ProvisionedThroughputExceededException";

#[derive(Debug, Error)]
pub enum IndexError {
    /// The store rejected the request for capacity reasons. Retried with
    /// backoff by the dispatcher; never surfaced to callers.
    #[error("provisioned throughput exceeded")]
    Throttled,

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("malformed range key")]
    MalformedRangeKey,

    #[error("inline metadata decode failed: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("{operation} failed: {code}: {message}")]
    Remote {
        operation: &'static str,
        code: String,
        message: String,
    },
}

impl IndexError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, IndexError::Throttled)
    }

    /// Reason label for the failure counter: the remote error code when
    /// there is one, `other` otherwise.
    pub fn reason(&self) -> &str {
        match self {
            IndexError::Throttled => THROTTLED_ERROR_CODE,
            IndexError::Remote { code, .. } => code,
            _ => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttled_detection() {
        assert!(IndexError::Throttled.is_throttled());
        assert!(!IndexError::MalformedRangeKey.is_throttled());
    }

    #[test]
    fn failure_reasons() {
        assert_eq!(IndexError::Throttled.reason(), THROTTLED_ERROR_CODE);
        assert_eq!(
            IndexError::Remote {
                operation: "Query",
                code: "ValidationException".to_string(),
                message: "bad".to_string(),
            }
            .reason(),
            "ValidationException"
        );
        assert_eq!(IndexError::MalformedRangeKey.reason(), "other");
    }
}
