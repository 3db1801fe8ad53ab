//! Client-level error type.
//!
//! Every operation of the identity service reports failures through
//! [`ClientError`]. The API signals most failures in-band, so the variants
//! follow the interpreted outcome rather than the raw HTTP status.

use thiserror::Error;

use super::ports::SessionTransportError;

/// Errors surfaced by the identity client.
///
/// # Examples
/// ```
/// use ipa_client::domain::ClientError;
///
/// let err = ClientError::not_found("user jdoe");
/// assert_eq!(err.http_status(), Some(404));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The request never produced a response.
    #[error("transport failed: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
        /// Whether the configured request deadline elapsed.
        timeout: bool,
    },

    /// The server rejected the session or the login credentials.
    #[error("session unauthorized (status {status})")]
    Unauthorized {
        /// HTTP status reported by the server.
        status: u16,
    },

    /// The addressed user or role does not exist.
    #[error("entity not found: {message}")]
    NotFound {
        /// Server-provided description.
        message: String,
    },

    /// In-band failure with a code that has no dedicated classification.
    #[error("rpc error {code} ({name}): {message}")]
    Rpc {
        /// In-band error code.
        code: i64,
        /// Server-side error class name.
        name: String,
        /// Server-provided description.
        message: String,
    },

    /// At least one member of a batched call failed.
    #[error("batch call failed: {}", .failures.join("; "))]
    Batch {
        /// One entry per failing batch member.
        failures: Vec<String>,
    },

    /// Transport-level failure status without a more specific meaning.
    #[error("http status {status}: {message}")]
    Http {
        /// HTTP status reported by the server.
        status: u16,
        /// Server-provided description or body preview.
        message: String,
    },

    /// A successful response carried a payload that could not be decoded.
    #[error("malformed response: {message}")]
    Parse {
        /// Description of the decoding failure.
        message: String,
    },

    /// The outgoing call could not be assembled.
    #[error("failed to build request: {message}")]
    Build {
        /// Description of the serialization failure.
        message: String,
    },

    /// Caller input was rejected before contacting the server.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of the rejected input.
        message: String,
    },
}

impl ClientError {
    /// Convenience constructor for [`ClientError::Transport`].
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            timeout: false,
        }
    }

    /// Convenience constructor for a [`ClientError::Transport`] deadline.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            timeout: true,
        }
    }

    /// Convenience constructor for [`ClientError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`ClientError::Parse`].
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`ClientError::Build`].
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`ClientError::InvalidRequest`].
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Whether the error reports a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// HTTP status an HTTP-facing front-end should answer with.
    ///
    /// `None` marks unclassified failures (in-band RPC and batch errors);
    /// callers pick their own fallback for those.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status } | Self::Http { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(404),
            Self::InvalidRequest { .. } | Self::Build { .. } => Some(400),
            Self::Transport { timeout: true, .. } => Some(504),
            Self::Transport { .. } | Self::Parse { .. } => Some(502),
            Self::Rpc { .. } | Self::Batch { .. } => None,
        }
    }
}

impl From<SessionTransportError> for ClientError {
    fn from(error: SessionTransportError) -> Self {
        match error {
            SessionTransportError::Timeout { .. } => Self::timeout(error.to_string()),
            SessionTransportError::Transport { .. } | SessionTransportError::Closed => {
                Self::transport(error.to_string())
            }
        }
    }
}
