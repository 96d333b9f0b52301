//! Client error types.

use thiserror::Error;

/// Client transport errors.
///
/// Transport failures are always delivered through the same completion
/// channel as successful replies, never thrown from a send call.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] svcwire_protocol::ProtocolError),

    #[error("invalid endpoint '{0}': {1}")]
    InvalidEndpoint(String, String),

    #[error("connect to {0} failed: {1}")]
    ConnectFailed(String, String),

    #[error("login to {0} failed: {1}")]
    LoginFailed(String, String),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    ConnectionClosed,
}

impl ClientError {
    /// Returns whether a retry of the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Timeout
                | ClientError::ConnectionClosed
                | ClientError::ConnectFailed(_, _)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::ConnectionClosed.is_retryable());
        assert!(ClientError::ConnectFailed("a:1".into(), "refused".into()).is_retryable());

        assert!(!ClientError::LoginFailed("a:1".into(), "rejected".into()).is_retryable());
        assert!(!ClientError::InvalidEndpoint("x".into(), "bad scheme".into()).is_retryable());
    }
}
