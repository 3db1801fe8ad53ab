//! Test utilities for the client crate.
//!
//! [`FakeIpaServer`] is an in-memory [`SessionTransport`] that speaks the
//! same wire dialect as a real IPA server: session cookies become a logged-in
//! flag, listings honour `pkey_only`, `batch` fans out to nested calls, and
//! failures surface as in-band error codes. It is shared by unit tests (in
//! `src/`) and integration tests (in `tests/`) through the `test-support`
//! feature.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::domain::ports::{Credentials, RawResponse, SessionTransport, SessionTransportError};
use crate::rpc::Attributes;

const BASE_DN: &str = "dc=example,dc=test";
const SERVER_VERSION: &str = "4.12.2";
const RANDOM_PASSWORD: &str = "Rand0m-Generated";
const USER_TEXT_OPTIONS: [&str; 8] = [
    "givenname",
    "sn",
    "cn",
    "mail",
    "telephonenumber",
    "mobile",
    "title",
    "ou",
];

/// In-memory IPA server double.
///
/// Clones share the directory and the session, so a test can keep one handle
/// for inspection after moving another into a service.
#[derive(Clone)]
pub struct FakeIpaServer {
    state: Arc<Mutex<Directory>>,
    closed: bool,
}

#[derive(Default)]
struct Directory {
    identity: String,
    secret: String,
    logged_in: bool,
    users: BTreeMap<String, FakeUser>,
    roles: BTreeMap<String, FakeRole>,
    max_password_life: Option<Value>,
    methods: Vec<String>,
}

#[derive(Clone, PartialEq)]
struct FakeUser {
    attrs: Attributes,
    password: Option<String>,
}

#[derive(Clone)]
struct FakeRole {
    description: Option<String>,
    members: BTreeSet<String>,
}

struct Fault {
    code: i64,
    name: &'static str,
    message: String,
}

impl Fault {
    fn not_found(kind: &str, key: &str) -> Self {
        Self {
            code: 4001,
            name: "NotFound",
            message: format!("{key}: {kind} not found"),
        }
    }

    fn duplicate(kind: &str, key: &str) -> Self {
        Self {
            code: 4002,
            name: "DuplicateEntry",
            message: format!("{kind} with name \"{key}\" already exists"),
        }
    }

    fn empty_modlist() -> Self {
        Self {
            code: 4202,
            name: "EmptyModlist",
            message: "no modifications to be performed".to_owned(),
        }
    }

    fn requirement(name: &str) -> Self {
        Self {
            code: 3007,
            name: "RequirementError",
            message: format!("'{name}' is required"),
        }
    }
}

struct Success {
    result: Value,
    value: Value,
    count: Option<usize>,
}

impl Success {
    fn entry(result: Value, value: &str) -> Self {
        Self {
            result,
            value: Value::String(value.to_owned()),
            count: None,
        }
    }

    fn listing(entries: Vec<Value>) -> Self {
        Self {
            count: Some(entries.len()),
            result: Value::Array(entries),
            value: Value::Null,
        }
    }

    fn flag(value: &str) -> Self {
        Self::entry(Value::Bool(true), value)
    }

    fn into_body(self) -> Value {
        let mut body = json!({ "result": self.result, "value": self.value, "summary": null });
        if let Some(count) = self.count {
            body["count"] = json!(count);
            body["truncated"] = Value::Bool(false);
        }
        body
    }
}

type Outcome = Result<Success, Fault>;

impl FakeIpaServer {
    /// Create an empty directory that accepts one login.
    pub fn new(identity: &str, secret: &str) -> Self {
        let directory = Directory {
            identity: identity.to_owned(),
            secret: secret.to_owned(),
            ..Directory::default()
        };
        Self {
            state: Arc::new(Mutex::new(directory)),
            closed: false,
        }
    }

    /// Seed a user with the mandatory naming attributes.
    #[must_use]
    pub fn with_user(self, uid: &str, given_name: &str, surname: &str) -> Self {
        let mut attrs = Map::new();
        attrs.insert("givenname".to_owned(), json!([given_name]));
        attrs.insert("sn".to_owned(), json!([surname]));
        attrs.insert("cn".to_owned(), json!([format!("{given_name} {surname}")]));
        attrs.insert("nsaccountlock".to_owned(), Value::Bool(false));
        self.directory().users.insert(
            uid.to_owned(),
            FakeUser {
                attrs,
                password: None,
            },
        );
        self
    }

    /// Seed a role.
    #[must_use]
    pub fn with_role(self, name: &str, description: &str) -> Self {
        self.directory().roles.insert(
            name.to_owned(),
            FakeRole {
                description: Some(description.to_owned()),
                members: BTreeSet::new(),
            },
        );
        self
    }

    /// Grant a seeded role to a seeded user.
    #[must_use]
    pub fn with_role_member(self, role: &str, uid: &str) -> Self {
        if let Some(entry) = self.directory().roles.get_mut(role) {
            entry.members.insert(uid.to_owned());
        }
        self
    }

    /// Set the raw `krbmaxpwdlife` value of the global password policy.
    #[must_use]
    pub fn with_max_password_life(self, raw: impl Into<Value>) -> Self {
        self.directory().max_password_life = Some(raw.into());
        self
    }

    /// Drop the server-side session so later calls answer 401.
    pub fn expire_session(&self) {
        self.directory().logged_in = false;
    }

    /// Whether a login is currently active.
    pub fn is_logged_in(&self) -> bool {
        self.directory().logged_in
    }

    /// Top-level methods received so far, in order.
    pub fn methods(&self) -> Vec<String> {
        self.directory().methods.clone()
    }

    /// Number of users stored.
    pub fn user_count(&self) -> usize {
        self.directory().users.len()
    }

    fn directory(&self) -> MutexGuard<'_, Directory> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionTransport for FakeIpaServer {
    async fn login(&self, credentials: &Credentials) -> Result<RawResponse, SessionTransportError> {
        if self.closed {
            return Err(SessionTransportError::closed());
        }
        let mut directory = self.directory();
        if credentials.identity() == directory.identity && credentials.secret() == directory.secret
        {
            directory.logged_in = true;
            Ok(RawResponse::new(200, Vec::new()))
        } else {
            directory.logged_in = false;
            Ok(RawResponse::new(
                401,
                "<html><body>Login failed: invalid credentials</body></html>",
            ))
        }
    }

    async fn call(&self, payload: &Value) -> Result<RawResponse, SessionTransportError> {
        if self.closed {
            return Err(SessionTransportError::closed());
        }
        let mut directory = self.directory();
        let method = payload["method"].as_str().unwrap_or_default().to_owned();
        directory.methods.push(method);
        if !directory.logged_in {
            return Ok(RawResponse::new(
                401,
                "<html><head><title>401 Unauthorized</title></head></html>",
            ));
        }
        let body = match directory.dispatch(payload) {
            Ok(result) => json!({
                "result": result,
                "error": null,
                "id": payload["id"],
                "principal": format!("{}@EXAMPLE.TEST", directory.identity),
                "version": SERVER_VERSION,
            }),
            Err(fault) => json!({
                "result": null,
                "error": {
                    "code": fault.code,
                    "name": fault.name,
                    "message": fault.message,
                    "data": {},
                },
                "id": payload["id"],
                "principal": format!("{}@EXAMPLE.TEST", directory.identity),
                "version": SERVER_VERSION,
            }),
        };
        Ok(RawResponse::new(200, body.to_string()))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

fn batch_item(outcome: Result<Value, Fault>) -> Value {
    match outcome {
        Ok(body) => json!({
            "result": body["result"],
            "value": body["value"],
            "summary": body["summary"],
            "error": null,
        }),
        Err(fault) => json!({
            "error": fault.message,
            "error_code": fault.code,
            "error_name": fault.name,
            "error_kw": {},
        }),
    }
}

impl Directory {
    fn dispatch(&mut self, payload: &Value) -> Result<Value, Fault> {
        let method = payload["method"].as_str().unwrap_or_default();
        let args = payload["params"][0].as_array().cloned().unwrap_or_default();
        let options = payload["params"][1].as_object().cloned().unwrap_or_default();
        if !options.contains_key("version") {
            return Err(Fault {
                code: 3009,
                name: "VersionError",
                message: "API version must be supplied".to_owned(),
            });
        }
        if method == "batch" {
            let results: Vec<Value> = args
                .iter()
                .map(|nested| {
                    let mut nested = nested.clone();
                    nested["params"][1]["version"] = options["version"].clone();
                    batch_item(self.dispatch(&nested))
                })
                .collect();
            return Ok(json!({ "count": results.len(), "results": results }));
        }
        let key = args.first().and_then(Value::as_str).unwrap_or_default();
        self.command(method, key, &options).map(Success::into_body)
    }

    fn command(&mut self, method: &str, key: &str, options: &Map<String, Value>) -> Outcome {
        match method {
            "session_logout" => {
                self.logged_in = false;
                Ok(Success::entry(Value::Null, ""))
            }
            "user_find" => Ok(self.user_find(options)),
            "user_show" => self.user_show(key, options),
            "user_add" => self.user_add(key, options),
            "user_mod" => self.user_mod(key, options),
            "user_del" => self.user_del(key),
            "role_find" => Ok(self.role_find(options)),
            "role_show" => self.role_show(key, options),
            "role_add" => self.role_add(key, options),
            "role_mod" => self.role_mod(key, options),
            "role_del" => self.role_del(key),
            "role_add_member" => self.role_member(key, options, true),
            "role_remove_member" => self.role_member(key, options, false),
            "pwpolicy_show" => Ok(self.pwpolicy_show()),
            other => Err(Fault {
                code: 3005,
                name: "CommandError",
                message: format!("unknown command '{other}'"),
            }),
        }
    }

    fn user_entry(&self, uid: &str, user: &FakeUser, members: bool) -> Value {
        let mut entry = user.attrs.clone();
        entry.insert("uid".to_owned(), json!([uid]));
        entry.insert(
            "dn".to_owned(),
            json!(format!("uid={uid},cn=users,cn=accounts,{BASE_DN}")),
        );
        entry.insert("has_password".to_owned(), Value::Bool(user.password.is_some()));
        if members {
            let roles: Vec<&String> = self
                .roles
                .iter()
                .filter(|(_, role)| role.members.contains(uid))
                .map(|(name, _)| name)
                .collect();
            if !roles.is_empty() {
                entry.insert("memberof_role".to_owned(), json!(roles));
            }
        }
        Value::Object(entry)
    }

    fn role_entry(&self, name: &str, role: &FakeRole, members: bool) -> Value {
        let mut entry = json!({
            "cn": [name],
            "dn": format!("cn={name},cn=roles,cn=accounts,{BASE_DN}"),
            "objectclass": ["groupofnames", "nestedgroup", "top"],
        });
        if let Some(description) = role.description.as_deref() {
            entry["description"] = json!([description]);
        }
        if members && !role.members.is_empty() {
            entry["member_user"] = json!(role.members);
        }
        entry
    }

    fn user_find(&self, options: &Map<String, Value>) -> Success {
        let pkey_only = is_set(options, "pkey_only");
        let entries = self
            .users
            .iter()
            .map(|(uid, user)| {
                if pkey_only {
                    json!({ "uid": [uid] })
                } else {
                    self.user_entry(uid, user, false)
                }
            })
            .collect();
        Success::listing(entries)
    }

    fn user_show(&self, uid: &str, options: &Map<String, Value>) -> Outcome {
        let user = self
            .users
            .get(uid)
            .ok_or_else(|| Fault::not_found("user", uid))?;
        let members = !is_set(options, "no_members");
        Ok(Success::entry(self.user_entry(uid, user, members), uid))
    }

    fn user_add(&mut self, uid: &str, options: &Map<String, Value>) -> Outcome {
        if uid.is_empty() {
            return Err(Fault::requirement("uid"));
        }
        if self.users.contains_key(uid) {
            return Err(Fault::duplicate("user", uid));
        }
        for required in ["givenname", "sn"] {
            if !options.contains_key(required) {
                return Err(Fault::requirement(required));
            }
        }
        let mut user = FakeUser {
            attrs: Map::new(),
            password: None,
        };
        user.attrs.insert("nsaccountlock".to_owned(), Value::Bool(false));
        apply_user_options(&mut user, options);
        if !user.attrs.contains_key("cn") {
            let common_name = format!(
                "{} {}",
                first_text(&user.attrs, "givenname"),
                first_text(&user.attrs, "sn")
            );
            user.attrs.insert("cn".to_owned(), json!([common_name]));
        }
        let random = is_set(options, "random");
        if random {
            user.password = Some(RANDOM_PASSWORD.to_owned());
        }
        let mut entry = self.user_entry(uid, &user, true);
        if random {
            entry["randompassword"] = json!(RANDOM_PASSWORD);
        }
        self.users.insert(uid.to_owned(), user);
        Ok(Success::entry(entry, uid))
    }

    fn user_mod(&mut self, uid: &str, options: &Map<String, Value>) -> Outcome {
        let stored = self
            .users
            .get(uid)
            .ok_or_else(|| Fault::not_found("user", uid))?;
        let mut updated = stored.clone();
        apply_user_options(&mut updated, options);
        let password_changed = options.contains_key("userpassword");
        if &updated == stored && !password_changed {
            return Err(Fault::empty_modlist());
        }
        let entry = self.user_entry(uid, &updated, true);
        self.users.insert(uid.to_owned(), updated);
        Ok(Success::entry(entry, uid))
    }

    fn user_del(&mut self, uid: &str) -> Outcome {
        self.users
            .remove(uid)
            .ok_or_else(|| Fault::not_found("user", uid))?;
        for role in self.roles.values_mut() {
            role.members.remove(uid);
        }
        Ok(Success::flag(uid))
    }

    fn role_find(&self, options: &Map<String, Value>) -> Success {
        let pkey_only = is_set(options, "pkey_only");
        let entries = self
            .roles
            .iter()
            .map(|(name, role)| {
                if pkey_only {
                    json!({ "cn": [name] })
                } else {
                    self.role_entry(name, role, false)
                }
            })
            .collect();
        Success::listing(entries)
    }

    fn role_show(&self, name: &str, options: &Map<String, Value>) -> Outcome {
        let role = self
            .roles
            .get(name)
            .ok_or_else(|| Fault::not_found("role", name))?;
        let members = !is_set(options, "no_members");
        Ok(Success::entry(self.role_entry(name, role, members), name))
    }

    fn role_add(&mut self, name: &str, options: &Map<String, Value>) -> Outcome {
        if name.is_empty() {
            return Err(Fault::requirement("cn"));
        }
        if self.roles.contains_key(name) {
            return Err(Fault::duplicate("role", name));
        }
        let role = FakeRole {
            description: options
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_owned),
            members: BTreeSet::new(),
        };
        let entry = self.role_entry(name, &role, true);
        self.roles.insert(name.to_owned(), role);
        Ok(Success::entry(entry, name))
    }

    fn role_mod(&mut self, name: &str, options: &Map<String, Value>) -> Outcome {
        let role = self
            .roles
            .get_mut(name)
            .ok_or_else(|| Fault::not_found("role", name))?;
        let description = options
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_owned);
        if description.is_none() || description == role.description {
            return Err(Fault::empty_modlist());
        }
        role.description = description;
        let role = role.clone();
        Ok(Success::entry(self.role_entry(name, &role, true), name))
    }

    fn role_del(&mut self, name: &str) -> Outcome {
        self.roles
            .remove(name)
            .ok_or_else(|| Fault::not_found("role", name))?;
        Ok(Success::flag(name))
    }

    fn role_member(&mut self, name: &str, options: &Map<String, Value>, add: bool) -> Outcome {
        let uid = options
            .get("user")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let role = self
            .roles
            .get_mut(name)
            .ok_or_else(|| Fault::not_found("role", name))?;
        if add {
            role.members.insert(uid);
        } else {
            role.members.remove(&uid);
        }
        let role = role.clone();
        Ok(Success::entry(self.role_entry(name, &role, true), name))
    }

    fn pwpolicy_show(&self) -> Success {
        let mut entry = json!({
            "cn": ["global_policy"],
            "krbminpwdlife": ["1"],
            "krbpwdminlength": ["8"],
        });
        if let Some(raw) = self.max_password_life.as_ref() {
            entry["krbmaxpwdlife"] = json!([raw]);
        }
        Success::entry(entry, "global_policy")
    }
}

fn apply_user_options(user: &mut FakeUser, options: &Map<String, Value>) {
    for key in USER_TEXT_OPTIONS {
        match options.get(key).and_then(Value::as_str) {
            Some("") => {
                user.attrs.remove(key);
            }
            Some(value) => {
                user.attrs.insert(key.to_owned(), json!([value]));
            }
            None => {}
        }
    }
    if let Some(expires) = options.get("krbpasswordexpiration").and_then(Value::as_str) {
        user.attrs.insert(
            "krbpasswordexpiration".to_owned(),
            json!([{ "__datetime__": expires }]),
        );
    }
    if let Some(locked) = options.get("nsaccountlock").and_then(Value::as_bool) {
        user.attrs
            .insert("nsaccountlock".to_owned(), Value::Bool(locked));
    }
    if let Some(password) = options.get("userpassword").and_then(Value::as_str) {
        user.password = Some(password.to_owned());
    }
    let pairs = options
        .get("addattr")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter_map(|pair| pair.split_once('='));
    for (key, value) in pairs {
        let slot = user
            .attrs
            .entry(key.to_ascii_lowercase())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(values) = slot {
            values.push(Value::String(value.to_owned()));
        }
    }
}

fn is_set(options: &Map<String, Value>, key: &str) -> bool {
    options.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn first_text<'a>(attrs: &'a Attributes, key: &str) -> &'a str {
    attrs
        .get(key)
        .and_then(|value| value.get(0))
        .and_then(Value::as_str)
        .unwrap_or_default()
}
