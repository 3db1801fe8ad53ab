//! Session-cookie JSON-RPC client for IPA identity management.
//!
//! - [`domain`]: records, errors, the session port, and [`IdentityService`].
//! - [`rpc`]: envelope building, response interpretation, attribute decoding.
//! - [`outbound`]: the reqwest-backed session transport.
//! - [`config`]: OrthoConfig connection settings.

pub mod config;
pub mod domain;
pub mod outbound;
pub mod rpc;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::IpaSettings;
pub use domain::{ClientError, ClientResult, IdentityService, RequestUser, Role, User};
pub use outbound::http::{HttpSessionTransport, IpaEndpoints};
pub use pagination::{Page, Window};
