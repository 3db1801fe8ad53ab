//! User and role administration over one authenticated session.
//!
//! The service composes the call builder, the session transport, the
//! response interpreter, and the attribute decoder. Listing operations run in
//! two phases: a primary-key-only `*_find` learns the full ordered key set,
//! then a single `batch` of `*_show` calls materializes the requested window.

use pagination::{Page, Window};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::ports::{Credentials, SessionTransport};
use super::{ClientError, ClientResult, RequestUser, Role, User};
use crate::rpc::attributes::{self, Attributes};
use crate::rpc::{DEFAULT_API_VERSION, RpcCall, RpcResult, batch_results, interpret};

/// Password lifetime assumed when the policy leaves `krbmaxpwdlife` unset.
pub const DEFAULT_MAX_PASSWORD_LIFE_DAYS: u32 = 90;

/// Identity administration client bound to one session transport.
///
/// Session-changing operations (`login`, `logout`, `close`) take `&mut self`
/// so they cannot overlap other calls on the same instance. Everything else
/// takes `&self` and may run concurrently.
pub struct IdentityService<T> {
    transport: T,
    api_version: String,
}

impl<T> IdentityService<T> {
    /// Create a service speaking the default API version.
    pub fn new(transport: T) -> Self {
        Self::with_api_version(transport, DEFAULT_API_VERSION)
    }

    /// Create a service pinned to `api_version`.
    pub fn with_api_version(transport: T, api_version: impl Into<String>) -> Self {
        Self {
            transport,
            api_version: api_version.into(),
        }
    }

    /// Transport backing the service.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// API version sent with every call.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }
}

impl<T> IdentityService<T>
where
    T: SessionTransport,
{
    /// Authenticate with the password login form.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] for blank input and
    /// [`ClientError::Unauthorized`] when the server answers with a failure
    /// status.
    pub async fn login(&mut self, identity: &str, secret: &str) -> ClientResult<()> {
        let credentials = Credentials::try_new(identity, secret)?;
        let response = self.transport.login(&credentials).await?;
        if response.is_success() {
            debug!(identity = credentials.identity(), "ipa session established");
            Ok(())
        } else {
            warn!(
                identity = credentials.identity(),
                status = response.status,
                "ipa login rejected"
            );
            Err(ClientError::Unauthorized {
                status: response.status,
            })
        }
    }

    /// End the server-side session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Unauthorized`] when no session is active.
    pub async fn logout(&mut self) -> ClientResult<()> {
        self.execute(RpcCall::new("session_logout")).await?;
        Ok(())
    }

    /// List one page of users.
    ///
    /// `limit` outside `1..=20` falls back to 20 and negative `offset`
    /// starts at the first user.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Batch`] when any user in the window fails to
    /// load, plus the transport, parse, and session errors of any call.
    pub async fn users(&self, limit: i64, offset: i64) -> ClientResult<Page<User>> {
        let window = Window::new(limit, offset);
        let listing = self
            .execute(RpcCall::new("user_find").flag("pkey_only", true))
            .await?;
        let uids = primary_keys(&listing, "uid")?;
        let total = total_count(&listing, uids.len());

        let selected = window.slice(&uids);
        if selected.is_empty() {
            return Ok(Page::new(Vec::new(), total, window));
        }
        let batch = RpcCall::batch(selected.iter().map(|uid| {
            RpcCall::new("user_show")
                .arg(uid.as_str())
                .flag("all", true)
                .flag("no_members", true)
        }));
        let users = self.execute_batch(batch, attributes::decode_user).await?;
        Ok(Page::new(users, total, window))
    }

    /// Fetch one user with all attributes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] when `uid` does not exist.
    pub async fn user(&self, uid: &str) -> ClientResult<User> {
        require("uid", uid)?;
        let result = self
            .execute(RpcCall::new("user_show").arg(uid).flag("all", true))
            .await?;
        entity(&result).map(attributes::decode_user)
    }

    /// Create a user and return the stored entry.
    ///
    /// Without a password the server generates a random one.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] when uid, given name, or
    /// surname is missing and [`ClientError::Rpc`] for server-side
    /// validation failures such as duplicates.
    pub async fn create_user(&self, request: &RequestUser) -> ClientResult<User> {
        request.validate_for_create()?;
        let mut call = RpcCall::new("user_add").arg(request.uid.as_str());
        if request.password.is_none() {
            call = call.flag("random", true);
        }
        let call = user_options(call, request)?;
        let result = self.execute(call).await?;
        entity(&result).map(attributes::decode_user)
    }

    /// Apply a change set to an existing user.
    ///
    /// An update that changes nothing succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] when the user does not exist and
    /// [`ClientError::Rpc`] for privilege failures.
    pub async fn update_user(&self, request: &RequestUser) -> ClientResult<()> {
        request.validate_for_update()?;
        let call = user_options(RpcCall::new("user_mod").arg(request.uid.as_str()), request)?;
        self.execute(call).await?;
        Ok(())
    }

    /// Delete a user.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] when `uid` does not exist.
    pub async fn delete_user(&self, uid: &str) -> ClientResult<()> {
        require("uid", uid)?;
        self.execute(RpcCall::new("user_del").arg(uid)).await?;
        Ok(())
    }

    /// List one page of roles, following the same window rules as
    /// [`Self::users`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Batch`] when any role in the window fails to
    /// load.
    pub async fn roles(&self, limit: i64, offset: i64) -> ClientResult<Page<Role>> {
        let window = Window::new(limit, offset);
        let names = self.role_names().await?;
        let total = names.total;
        let roles = self.roles_by_name(window.slice(&names.keys)).await?;
        Ok(Page::new(roles, total, window))
    }

    /// Fetch several roles in one batch, preserving the order of `names`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Batch`] naming every missing role; no partial
    /// result is returned.
    pub async fn roles_by_name<S>(&self, names: &[S]) -> ClientResult<Vec<Role>>
    where
        S: AsRef<str> + Sync,
    {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        for name in names {
            require("role name", name.as_ref())?;
        }
        let batch = RpcCall::batch(names.iter().map(|name| {
            RpcCall::new("role_show")
                .arg(name.as_ref())
                .flag("all", true)
                .flag("no_members", true)
        }));
        self.execute_batch(batch, attributes::decode_role).await
    }

    /// Fetch one role with all attributes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] when the role does not exist.
    pub async fn role(&self, name: &str) -> ClientResult<Role> {
        require("role name", name)?;
        let result = self
            .execute(RpcCall::new("role_show").arg(name).flag("all", true))
            .await?;
        entity(&result).map(attributes::decode_role)
    }

    /// Whether a role named `name` exists.
    ///
    /// # Errors
    ///
    /// Fails only on transport, parse, or session errors.
    pub async fn has_role(&self, name: &str) -> ClientResult<bool> {
        let names = self.role_names().await?;
        Ok(names.keys.iter().any(|known| known == name))
    }

    /// Create a role and return the stored entry.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rpc`] when the role already exists.
    pub async fn create_role(&self, name: &str, description: Option<&str>) -> ClientResult<Role> {
        require("role name", name)?;
        let mut call = RpcCall::new("role_add").arg(name);
        if let Some(description) = description {
            call = call.text("description", description);
        }
        let result = self.execute(call).await?;
        entity(&result).map(attributes::decode_role)
    }

    /// Replace a role's description.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] when the role does not exist.
    pub async fn update_role(&self, name: &str, description: &str) -> ClientResult<()> {
        require("role name", name)?;
        self.execute(
            RpcCall::new("role_mod")
                .arg(name)
                .text("description", description),
        )
        .await?;
        Ok(())
    }

    /// Delete a role.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] when the role does not exist.
    pub async fn delete_role(&self, name: &str) -> ClientResult<()> {
        require("role name", name)?;
        self.execute(RpcCall::new("role_del").arg(name)).await?;
        Ok(())
    }

    /// Grant `role` to `uid`, or revoke it when already granted.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] when the user or the role does not
    /// exist.
    pub async fn toggle_role_for_user(&self, role: &str, uid: &str) -> ClientResult<()> {
        require("role name", role)?;
        let user = self.user(uid).await?;
        let method = if user.has_role(role) {
            "role_remove_member"
        } else {
            "role_add_member"
        };
        debug!(role, uid, method, "toggling role membership");
        self.execute(RpcCall::new(method).arg(role).text("user", uid))
            .await?;
        Ok(())
    }

    /// Maximum password lifetime in days from the global password policy.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Parse`] when the policy value is not a
    /// non-negative integer, plus the session errors of any call.
    pub async fn krb_max_pwd_life(&self) -> ClientResult<u32> {
        let result = self.execute(RpcCall::new("pwpolicy_show")).await?;
        let policy = entity(&result)?;
        let Some(raw) = policy.get("krbmaxpwdlife").and_then(attributes::first_value) else {
            return Ok(DEFAULT_MAX_PASSWORD_LIFE_DAYS);
        };
        let text = match raw {
            Value::String(text) => text.clone(),
            Value::Number(number) => number.to_string(),
            other => {
                return Err(ClientError::parse(format!(
                    "krbmaxpwdlife has unexpected shape: {other}"
                )));
            }
        };
        text.trim()
            .parse::<u32>()
            .map_err(|error| ClientError::parse(format!("krbmaxpwdlife `{text}`: {error}")))
    }

    /// Release the transport. Idempotent.
    pub fn close(&mut self) {
        self.transport.close();
    }

    async fn execute(&self, call: RpcCall) -> ClientResult<RpcResult> {
        let correlation_id = Uuid::new_v4();
        debug!(
            method = call.method(),
            %correlation_id,
            batch_size = call.batch_len(),
            "ipa rpc call"
        );
        let payload = call.envelope(correlation_id, &self.api_version);
        let response = self.transport.call(&payload).await?;
        interpret(&response)?.into_result()
    }

    async fn execute_batch<R>(
        &self,
        batch: RpcCall,
        decode: fn(&Attributes) -> R,
    ) -> ClientResult<Vec<R>> {
        let items = batch_results(self.execute(batch).await?)?;
        Ok(items
            .iter()
            .filter_map(|item| item.result.as_object())
            .map(decode)
            .collect())
    }

    async fn role_names(&self) -> ClientResult<KeyListing> {
        let listing = self
            .execute(RpcCall::new("role_find").flag("pkey_only", true))
            .await?;
        let keys = primary_keys(&listing, "cn")?;
        let total = total_count(&listing, keys.len());
        Ok(KeyListing { keys, total })
    }
}

struct KeyListing {
    keys: Vec<String>,
    total: usize,
}

fn require(field: &str, value: &str) -> ClientResult<()> {
    if value.trim().is_empty() {
        Err(ClientError::invalid_request(format!(
            "{field} must not be empty"
        )))
    } else {
        Ok(())
    }
}

fn entity(result: &RpcResult) -> ClientResult<&Attributes> {
    result
        .result
        .as_object()
        .ok_or_else(|| ClientError::parse("expected an entry object in the response"))
}

fn primary_keys(listing: &RpcResult, key: &str) -> ClientResult<Vec<String>> {
    let entries = listing
        .result
        .as_array()
        .ok_or_else(|| ClientError::parse("expected an entry list in the response"))?;
    entries
        .iter()
        .map(|entry| {
            entry
                .as_object()
                .map(|attrs| attributes::single_string(attrs, key))
                .ok_or_else(|| ClientError::parse(format!("listing entry is not an object: {entry}")))
        })
        .filter(|parsed| parsed.as_ref().map_or(true, |value| !value.is_empty()))
        .collect()
}

fn total_count(listing: &RpcResult, fallback: usize) -> usize {
    listing
        .count
        .map_or(fallback, |count| usize::try_from(count).unwrap_or(usize::MAX))
}

fn user_options(call: RpcCall, request: &RequestUser) -> ClientResult<RpcCall> {
    let mut call = call;
    let texts = [
        ("givenname", request.given_name.as_deref()),
        ("sn", request.surname.as_deref()),
        ("cn", request.common_name.as_deref()),
        ("mail", request.mail.as_deref()),
        ("telephonenumber", request.telephone_number.as_deref()),
        ("mobile", request.mobile.as_deref()),
        ("title", request.title.as_deref()),
        ("ou", request.org_unit.as_deref()),
        ("userpassword", request.password.as_deref().map(String::as_str)),
    ];
    for (key, value) in texts {
        if let Some(value) = value {
            call = call.text(key, value);
        }
    }
    if let Some(expires_at) = request.password_expiration.as_ref() {
        call = call.text(
            "krbpasswordexpiration",
            attributes::format_timestamp(expires_at),
        );
    }
    if let Some(locked) = request.account_locked {
        call = call.flag("nsaccountlock", locked);
    }
    if !request.add_attrs.is_empty() {
        call = call.option("addattr", &request.add_attrs)?;
    }
    Ok(call)
}

#[cfg(test)]
#[path = "identity_service_tests.rs"]
mod tests;
