//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod session_transport;

#[cfg(test)]
pub use session_transport::MockSessionTransport;
pub use session_transport::{Credentials, RawResponse, SessionTransport, SessionTransportError};
