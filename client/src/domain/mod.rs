//! Domain primitives, ports, and the identity service.
//!
//! Public surface:
//! - [`ClientError`]: uniform failure model for every operation.
//! - [`User`], [`RequestUser`], [`Role`]: typed directory records.
//! - [`IdentityService`]: user and role administration over one session.
//! - [`ports`]: the session transport boundary.

pub mod error;
pub mod identity_service;
pub mod ports;
pub mod role;
pub mod user;

pub use self::error::ClientError;
pub use self::identity_service::{DEFAULT_MAX_PASSWORD_LIFE_DAYS, IdentityService};
pub use self::role::Role;
pub use self::user::{RequestUser, User};

/// Convenient client result alias.
pub type ClientResult<T> = Result<T, ClientError>;
