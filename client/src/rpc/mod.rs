//! Wire dialect of the identity API.
//!
//! - [`envelope`]: call and batch payload construction.
//! - [`response`]: two-stage status classification and batch demultiplexing.
//! - [`attributes`]: typed decoding of LDAP-style attribute maps.

pub mod attributes;
pub mod envelope;
pub mod response;

pub use attributes::{Attributes, decode_role, decode_user};
pub use envelope::{DEFAULT_API_VERSION, RpcCall};
pub use response::{
    BatchItem, EffectiveStatus, Interpretation, ResponseEnvelope, RpcError, RpcResult,
    batch_results, interpret,
};
