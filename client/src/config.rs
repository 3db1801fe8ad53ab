//! Connection settings loaded via OrthoConfig.

use std::fmt;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use serde::de::{self, Deserializer, Visitor};

use crate::domain::ClientError;
use crate::outbound::http::IpaEndpoints;
use crate::rpc::DEFAULT_API_VERSION;

const DEFAULT_SCHEME: &str = "https";

/// Settings describing which identity server to talk to and as whom.
#[derive(Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "IPA")]
pub struct IpaSettings {
    /// URL scheme, `https` unless overridden.
    pub scheme: Option<String>,
    /// Server host name, optionally with a port.
    pub host: Option<String>,
    /// Per-request timeout in seconds.
    #[ortho_config(default = 30)]
    pub timeout_secs: u64,
    /// API version pinned on every call.
    ///
    /// Environment values such as `2.251` arrive as numbers and are kept as
    /// text. Quote the value in config files when trailing zeros matter.
    #[serde(default, deserialize_with = "deserialize_version")]
    pub api_version: Option<String>,
    /// Login identity.
    pub user: Option<String>,
    /// Login secret.
    pub password: Option<String>,
}

impl IpaSettings {
    /// Return the configured scheme, falling back to `https`.
    pub fn scheme(&self) -> &str {
        self.scheme.as_deref().unwrap_or(DEFAULT_SCHEME)
    }

    /// Return the configured request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Return the configured API version, falling back to the pinned default.
    pub fn api_version(&self) -> &str {
        self.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION)
    }

    /// Derive the login, RPC, and referer URLs.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] when no host is configured or
    /// the scheme and host do not form a valid URL.
    pub fn endpoints(&self) -> Result<IpaEndpoints, ClientError> {
        let host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ClientError::invalid_request("IPA host is not configured"))?;
        IpaEndpoints::new(self.scheme(), host).map_err(|error| {
            ClientError::invalid_request(format!("invalid IPA address `{host}`: {error}"))
        })
    }
}

fn deserialize_version<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct VersionVisitor;

    impl<'de> Visitor<'de> for VersionVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a version string or number")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_owned()))
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value))
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(Self)
        }
    }

    deserializer.deserialize_any(VersionVisitor)
}

impl fmt::Debug for IpaSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpaSettings")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_version", &self.api_version)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
