//! Error handling for catalog API operations.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single catalog request.
///
/// The type is `Clone` so that one failure can be handed to every waiter of a
/// shared request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request was superseded and aborted by its caller.
    #[error("request was cancelled")]
    Cancelled,
    #[error("request timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),
    #[error("could not reach catalog: {message}")]
    Network { message: String },
    #[error("{what} not found in catalog")]
    NotFound { what: String },
    #[error("catalog responded with {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid catalog response: {message}")]
    Decode { message: String },
}

impl FetchError {
    /// The HTTP status associated with this failure, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::NotFound { .. } => Some(StatusCode::NOT_FOUND.as_u16()),
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    /// Whether repeating the same request could plausibly succeed.
    ///
    /// Transport failures and 408/429/5xx responses are retryable;
    /// missing items, malformed payloads and cancellations are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Network { .. } => true,
            FetchError::Status { status, .. } => {
                matches!(*status, 408 | 429) || (500..600).contains(status)
            },
            FetchError::Cancelled | FetchError::NotFound { .. } | FetchError::Decode { .. } => {
                false
            },
        }
    }

    /// Map a transport level reqwest error.
    pub(crate) fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else if err.is_decode() {
            FetchError::Decode {
                message: err.to_string(),
            }
        } else {
            FetchError::Network {
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(FetchError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(FetchError::Network {
            message: "connection refused".into()
        }
        .is_retryable());
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(
                FetchError::Status {
                    status,
                    message: String::new()
                }
                .is_retryable(),
                "{status} should be retryable"
            );
        }
        assert!(!FetchError::Status {
            status: 400,
            message: String::new()
        }
        .is_retryable());
        assert!(!FetchError::NotFound { what: "x".into() }.is_retryable());
        assert!(!FetchError::Cancelled.is_retryable());
    }

    #[test]
    fn not_found_reports_404() {
        let err = FetchError::NotFound {
            what: "item 'missingno'".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "item 'missingno' not found in catalog");
        assert_eq!(FetchError::Cancelled.status(), None);
    }
}
