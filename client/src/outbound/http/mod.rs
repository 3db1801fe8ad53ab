//! HTTP outbound adapters.
//!
//! This module provides the reqwest implementation of the
//! `SessionTransport` port.

mod session;

pub use session::{HttpSessionTransport, IpaEndpoints, SessionJar};
