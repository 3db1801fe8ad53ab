//! JSON-RPC call builder.
//!
//! Arguments must be sent as a positional array followed by one options
//! object, so calls are assembled explicitly instead of serializing a request
//! struct:
//!
//! ```json
//! {"id": "<uuid>", "version": "2.0", "method": "user_show",
//!  "params": [["jdoe"], {"all": true, "version": "2.254"}]}
//! ```
//!
//! Batch members drop `id` and `version` and carry only `method` and
//! `params`.

use serde::Serialize;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::domain::ClientError;

/// API version sent with every call so responses omit upgrade notices.
pub const DEFAULT_API_VERSION: &str = "2.254";

const ENVELOPE_VERSION: &str = "2.0";
const BATCH_METHOD: &str = "batch";
const VERSION_OPTION: &str = "version";

/// One RPC method invocation.
///
/// # Examples
/// ```
/// use ipa_client::rpc::RpcCall;
/// use uuid::Uuid;
///
/// let call = RpcCall::new("user_show").arg("jdoe").flag("all", true);
/// let envelope = call.envelope(Uuid::nil(), "2.254");
/// assert_eq!(envelope["params"][0][0], "jdoe");
/// assert_eq!(envelope["params"][1]["version"], "2.254");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    method: String,
    batch: Option<Vec<RpcCall>>,
    args: Vec<Value>,
    options: Map<String, Value>,
}

impl RpcCall {
    /// Start a call to `method` with no arguments or options.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            batch: None,
            args: Vec::new(),
            options: Map::new(),
        }
    }

    /// Wrap `calls` into one `batch` call.
    ///
    /// The nested calls fill the positional argument array, so `params` reads
    /// `[[call, call, ...], {"version": ...}]`.
    pub fn batch(calls: impl IntoIterator<Item = Self>) -> Self {
        Self {
            method: BATCH_METHOD.to_owned(),
            batch: Some(calls.into_iter().collect()),
            args: Vec::new(),
            options: Map::new(),
        }
    }

    /// Append one positional argument.
    ///
    /// On a batch call the argument follows the nested calls.
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a named option from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Build`] when `value` cannot be represented as
    /// JSON.
    pub fn option<V: Serialize>(mut self, key: &str, value: V) -> Result<Self, ClientError> {
        let encoded = serde_json::to_value(value).map_err(|error| {
            ClientError::build(format!("option `{key}` for `{}`: {error}", self.method))
        })?;
        self.options.insert(key.to_owned(), encoded);
        Ok(self)
    }

    /// Set a boolean option.
    #[must_use]
    pub fn flag(mut self, key: &str, value: bool) -> Self {
        self.options.insert(key.to_owned(), Value::Bool(value));
        self
    }

    /// Set a text option.
    #[must_use]
    pub fn text(mut self, key: &str, value: impl Into<String>) -> Self {
        self.options.insert(key.to_owned(), Value::String(value.into()));
        self
    }

    /// Method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Number of nested calls when this is a batch.
    pub fn batch_len(&self) -> Option<usize> {
        self.batch.as_ref().map(Vec::len)
    }

    /// Top-level envelope with correlation id and protocol version.
    pub fn envelope(&self, id: Uuid, api_version: &str) -> Value {
        json!({
            "id": id.to_string(),
            "version": ENVELOPE_VERSION,
            "method": self.method,
            "params": self.params(api_version),
        })
    }

    /// Batch-member envelope carrying only method and params.
    pub fn nested_envelope(&self, api_version: &str) -> Value {
        json!({
            "method": self.method,
            "params": self.params(api_version),
        })
    }

    fn params(&self, api_version: &str) -> Value {
        let mut args: Vec<Value> = self
            .batch
            .iter()
            .flatten()
            .map(|call| call.nested_envelope(api_version))
            .collect();
        args.extend(self.args.iter().cloned());
        let mut options = self.options.clone();
        options.insert(
            VERSION_OPTION.to_owned(),
            Value::String(api_version.to_owned()),
        );
        Value::Array(vec![Value::Array(args), Value::Object(options)])
    }
}
