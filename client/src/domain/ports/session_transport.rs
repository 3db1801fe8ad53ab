//! Driven port for the cookie-bearing HTTP exchange with the IPA server.
//!
//! The domain owns the login credentials and the raw response contract so the
//! identity service can stay adapter-agnostic. Adapters keep the session
//! cookie between calls; the domain never sees it.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use zeroize::Zeroizing;

use super::define_port_error;
use crate::domain::ClientError;

/// Status line and body returned by one exchange with the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes, possibly empty.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Build a response from its parts.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is below 400.
    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

/// Login identity and secret posted to the password login form.
///
/// ## Invariants
/// - `identity` is trimmed and non-empty.
/// - `secret` is non-empty and keeps caller-provided whitespace.
///
/// # Examples
/// ```
/// use ipa_client::domain::ports::Credentials;
///
/// let creds = Credentials::try_new(" admin ", "Secret123").unwrap();
/// assert_eq!(creds.identity(), "admin");
/// assert!(!format!("{creds:?}").contains("Secret123"));
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    identity: String,
    secret: Zeroizing<String>,
}

impl Credentials {
    /// Validate raw login input.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] when either part is blank.
    pub fn try_new(identity: &str, secret: &str) -> Result<Self, ClientError> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(ClientError::invalid_request("login identity must not be empty"));
        }
        if secret.is_empty() {
            return Err(ClientError::invalid_request("login secret must not be empty"));
        }
        Ok(Self {
            identity: identity.to_owned(),
            secret: Zeroizing::new(secret.to_owned()),
        })
    }

    /// Principal name posted as the `user` form field.
    pub fn identity(&self) -> &str {
        self.identity.as_str()
    }

    /// Secret posted as the `password` form field.
    pub fn secret(&self) -> &str {
        self.secret.as_str()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

define_port_error! {
    /// Errors surfaced by the session transport.
    pub enum SessionTransportError {
        /// Network transport failed before a response arrived.
        Transport { message: String } =>
            "session transport failed: {message}",
        /// The request exceeded its deadline.
        Timeout { message: String } =>
            "session request timed out: {message}",
        /// The transport was closed before the call.
        Closed =>
            "session transport is closed",
    }
}

/// Port for exchanging requests with the IPA server over one session.
///
/// Cookies received on any response are stored before the response is
/// returned, so the next call presents the refreshed session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Post the password login form.
    ///
    /// The body is returned untouched; only the status matters to callers.
    async fn login(&self, credentials: &Credentials) -> Result<RawResponse, SessionTransportError>;

    /// Post one JSON-RPC envelope to the session endpoint.
    async fn call(&self, payload: &Value) -> Result<RawResponse, SessionTransportError>;

    /// Release pooled connections. Later calls fail with
    /// [`SessionTransportError::Closed`]; repeated closes are no-ops.
    fn close(&mut self);
}
