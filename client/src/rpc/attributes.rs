//! Decoder for LDAP-style attribute maps.
//!
//! The server reports almost every attribute as an array, even single-valued
//! ones, and wraps timestamps and binaries in marker objects:
//!
//! ```json
//! {
//!   "uid": ["jdoe"],
//!   "nsaccountlock": false,
//!   "krbpasswordexpiration": [{"__datetime__": "20251020165845Z"}],
//!   "jpegphoto": [{"__base64__": "AAEC"}],
//!   "dn": "uid=jdoe,cn=users,cn=accounts,dc=example,dc=test"
//! }
//! ```
//!
//! Decoding never fails. Absent attributes produce the field's zero value and
//! malformed wrapped values are logged and dropped.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::{Role, User};

/// Attribute map of one directory entry.
pub type Attributes = Map<String, Value>;

/// `strftime` layout of wrapped timestamps, always UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%SZ";

const DATETIME_MARKER: &str = "__datetime__";
const BASE64_MARKER: &str = "__base64__";

/// Unwrap a single-valued attribute.
///
/// Arrays yield their first element; scalars and objects are returned as-is.
/// `null` and empty arrays yield `None`.
pub fn first_value(value: &Value) -> Option<&Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => items.first().filter(|item| !item.is_null()),
        other => Some(other),
    }
}

/// Read a single-valued text attribute, or an empty string when absent.
pub fn single_string(attrs: &Attributes, key: &str) -> String {
    attrs
        .get(key)
        .and_then(first_value)
        .and_then(scalar_text)
        .unwrap_or_default()
}

/// Read a multi-valued text attribute in server order without duplicates.
pub fn string_list(attrs: &Attributes, key: &str) -> Vec<String> {
    let values: Vec<&Value> = match attrs.get(key) {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    };

    let mut seen = Vec::with_capacity(values.len());
    for text in values.into_iter().filter_map(scalar_text) {
        if !seen.contains(&text) {
            seen.push(text);
        }
    }
    seen
}

/// Read a `{"__datetime__": "..."}` wrapped timestamp.
pub fn datetime_wrapper(attrs: &Attributes, key: &str) -> Option<DateTime<Utc>> {
    let wrapped = attrs.get(key).and_then(first_value)?.get(DATETIME_MARKER)?;
    let Some(text) = wrapped.as_str() else {
        warn!(attribute = key, "ignoring non-text timestamp");
        return None;
    };
    match NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT) {
        Ok(naive) => Some(naive.and_utc()),
        Err(error) => {
            warn!(attribute = key, value = text, %error, "ignoring malformed timestamp");
            None
        }
    }
}

/// Read a `{"__base64__": "..."}` wrapped binary.
pub fn base64_wrapper(attrs: &Attributes, key: &str) -> Option<Vec<u8>> {
    let wrapped = attrs.get(key).and_then(first_value)?.get(BASE64_MARKER)?;
    let Some(text) = wrapped.as_str() else {
        warn!(attribute = key, "ignoring non-text binary");
        return None;
    };
    match STANDARD.decode(text) {
        Ok(bytes) => Some(bytes),
        Err(error) => {
            warn!(attribute = key, %error, "ignoring malformed base64 value");
            None
        }
    }
}

/// Read a boolean attribute. `"TRUE"`/`"FALSE"` strings are accepted too.
///
/// Flags are scalars on the wire, so arrays are not unwrapped and read as
/// `false`.
pub fn flag(attrs: &Attributes, key: &str) -> bool {
    match attrs.get(key) {
        Some(Value::Bool(value)) => *value,
        Some(Value::String(text)) => text.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Render a timestamp in the wire layout used by mutation options.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Decode a user entry.
pub fn decode_user(attrs: &Attributes) -> User {
    User {
        uid: single_string(attrs, "uid"),
        given_name: single_string(attrs, "givenname"),
        surname: single_string(attrs, "sn"),
        common_name: single_string(attrs, "cn"),
        mail: single_string(attrs, "mail"),
        telephone_number: single_string(attrs, "telephonenumber"),
        mobile: single_string(attrs, "mobile"),
        title: single_string(attrs, "title"),
        org_unit: single_string(attrs, "ou"),
        organization: single_string(attrs, "o"),
        dn: single_string(attrs, "dn"),
        member_of_groups: string_list(attrs, "memberof_group"),
        member_of_roles: string_list(attrs, "memberof_role"),
        account_locked: flag(attrs, "nsaccountlock"),
        password_expiration: datetime_wrapper(attrs, "krbpasswordexpiration"),
        photo: base64_wrapper(attrs, "jpegphoto"),
    }
}

/// Decode a role entry.
pub fn decode_role(attrs: &Attributes) -> Role {
    Role {
        cn: single_string(attrs, "cn"),
        dn: single_string(attrs, "dn"),
        description: single_string(attrs, "description"),
        object_classes: string_list(attrs, "objectclass"),
        member_users: string_list(attrs, "member_user"),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
