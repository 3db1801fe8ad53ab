//! Response interpretation.
//!
//! The server answers most failures with HTTP 200 and an `error` object in
//! the body, so the outcome is derived in two stages: the transport status
//! first, then the in-band error code, which may override it.

use serde::Deserialize;
use serde_json::Value;

use crate::domain::ClientError;
use crate::domain::ports::RawResponse;

/// In-band code for a missing user, role, or policy.
pub const NOT_FOUND_CODE: i64 = 4001;
/// In-band code for an update that changed nothing.
pub const NO_MODIFICATIONS_CODE: i64 = 4202;

const PREVIEW_CHAR_LIMIT: usize = 160;

/// Decoded response body.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ResponseEnvelope {
    /// Call payload, absent on failures.
    #[serde(default)]
    pub result: Option<RpcResult>,
    /// In-band error object.
    #[serde(default)]
    pub error: Option<RpcError>,
    /// Echoed correlation id.
    #[serde(default)]
    pub id: Option<Value>,
    /// Kerberos principal that made the call.
    #[serde(default)]
    pub principal: Option<String>,
    /// Server version string.
    #[serde(default)]
    pub version: Option<String>,
}

/// Payload object of a successful call.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RpcResult {
    /// Entity, entity list, or scalar produced by the method.
    #[serde(default)]
    pub result: Value,
    /// Per-member results of a `batch` call.
    #[serde(default)]
    pub results: Vec<BatchItem>,
    /// Total matches reported by `*_find` and `batch`.
    #[serde(default)]
    pub count: Option<u64>,
    /// Whether a `*_find` hit the server size limit.
    #[serde(default)]
    pub truncated: Option<bool>,
    /// Human-readable summary.
    #[serde(default)]
    pub summary: Option<String>,
    /// Primary key the call addressed.
    #[serde(default)]
    pub value: Option<Value>,
}

/// In-band error object.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    #[serde(default)]
    pub code: i64,
    /// Human-readable description.
    #[serde(default)]
    pub message: String,
    /// Error class name, e.g. `NotFound` or `ACIError`.
    #[serde(default)]
    pub name: String,
    /// Structured detail.
    #[serde(default)]
    pub data: Value,
}

/// One member of a `batch` result.
///
/// Members report errors as flat fields instead of a nested object.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BatchItem {
    /// Entity produced by the nested call.
    #[serde(default)]
    pub result: Value,
    /// Primary key the nested call addressed.
    #[serde(default)]
    pub value: Value,
    /// Human-readable summary.
    #[serde(default)]
    pub summary: Option<String>,
    /// Error description when the nested call failed.
    #[serde(default)]
    pub error: Option<String>,
    /// Error code when the nested call failed.
    #[serde(default)]
    pub error_code: Option<i64>,
    /// Error class name when the nested call failed.
    #[serde(default)]
    pub error_name: Option<String>,
    /// Structured error detail.
    #[serde(default)]
    pub error_kw: Option<Value>,
}

impl BatchItem {
    /// Failure description, or `None` when the member succeeded.
    pub fn failure(&self) -> Option<String> {
        let message = self.error.as_deref().filter(|text| !text.is_empty())?;
        let name = self.error_name.as_deref().unwrap_or("error");
        Some(match self.error_code {
            Some(code) => format!("{name} ({code}): {message}"),
            None => format!("{name}: {message}"),
        })
    }
}

/// Outcome classification after the in-band error code is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveStatus {
    /// Outcome maps onto an HTTP status.
    Http(u16),
    /// In-band failure with a code outside the known classifications.
    Unclassified,
}

/// Two-stage view of one response.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    /// Status line as received.
    pub transport_status: u16,
    /// Status after in-band classification.
    pub status: EffectiveStatus,
    /// Parsed body, if any. A no-modification error is already cleared.
    pub envelope: Option<ResponseEnvelope>,
    detail: String,
}

/// Classify a raw response.
///
/// # Errors
///
/// Returns [`ClientError::Parse`] when a successful transport status carries
/// a non-empty body that is not a response envelope. Unparsable bodies on
/// failed statuses are ignored.
///
/// # Examples
/// ```
/// use ipa_client::domain::ports::RawResponse;
/// use ipa_client::rpc::{EffectiveStatus, interpret};
///
/// let body = r#"{"result": null, "error": {"code": 4001, "message": "jdoe: user not found", "name": "NotFound"}}"#;
/// let outcome = interpret(&RawResponse::new(200, body)).unwrap();
/// assert_eq!(outcome.transport_status, 200);
/// assert_eq!(outcome.status, EffectiveStatus::Http(404));
/// ```
pub fn interpret(response: &RawResponse) -> Result<Interpretation, ClientError> {
    let transport_status = response.status;
    let failed = !response.is_success();
    let trimmed = response.body.trim_ascii();

    let mut envelope = if trimmed.is_empty() {
        None
    } else {
        match serde_json::from_slice::<ResponseEnvelope>(trimmed) {
            Ok(parsed) => Some(parsed),
            Err(_) if failed => None,
            Err(error) => {
                return Err(ClientError::parse(format!(
                    "invalid response envelope: {error}"
                )));
            }
        }
    };

    let mut status = EffectiveStatus::Http(transport_status);
    let mut detail = String::new();
    if let Some(parsed) = envelope.as_mut() {
        if let Some((code, message)) = parsed
            .error
            .as_ref()
            .map(|error| (error.code, error.message.clone()))
        {
            detail = message;
            match code {
                NOT_FOUND_CODE => status = EffectiveStatus::Http(404),
                NO_MODIFICATIONS_CODE => parsed.error = None,
                _ => status = EffectiveStatus::Unclassified,
            }
        }
    }
    if detail.is_empty() && failed {
        detail = body_preview(trimmed);
    }

    Ok(Interpretation {
        transport_status,
        status,
        envelope,
        detail,
    })
}

impl Interpretation {
    /// Convert the classification into the call payload or a client error.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Unauthorized`] for 401/403,
    /// [`ClientError::NotFound`] for 404, [`ClientError::Http`] for other
    /// failure statuses, and [`ClientError::Rpc`] for unclassified in-band
    /// failures.
    pub fn into_result(self) -> Result<RpcResult, ClientError> {
        match self.status {
            EffectiveStatus::Unclassified => {
                let error = self.envelope.and_then(|parsed| parsed.error).unwrap_or_default();
                Err(ClientError::Rpc {
                    code: error.code,
                    name: error.name,
                    message: error.message,
                })
            }
            EffectiveStatus::Http(status @ (401 | 403)) => Err(ClientError::Unauthorized { status }),
            EffectiveStatus::Http(404) => Err(ClientError::not_found(self.detail)),
            EffectiveStatus::Http(status) if status >= 400 => {
                let message = if self.detail.is_empty() {
                    format!("status {status}")
                } else {
                    self.detail
                };
                Err(ClientError::Http { status, message })
            }
            EffectiveStatus::Http(_) => Ok(self
                .envelope
                .and_then(|parsed| parsed.result)
                .unwrap_or_default()),
        }
    }
}

/// Split a batch payload into member results, failing when any member failed.
///
/// # Errors
///
/// Returns [`ClientError::Batch`] listing every failing member, even when
/// other members succeeded.
pub fn batch_results(result: RpcResult) -> Result<Vec<BatchItem>, ClientError> {
    let failures: Vec<String> = result.results.iter().filter_map(BatchItem::failure).collect();
    if failures.is_empty() {
        Ok(result.results)
    } else {
        Err(ClientError::Batch { failures })
    }
}

fn body_preview(body: &[u8]) -> String {
    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}
