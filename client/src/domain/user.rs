//! User data model.
//!
//! [`User`] is the decoded view of a directory entry and is only produced by
//! the attribute decoder. [`RequestUser`] is the caller-built change set for
//! create and update calls: every optional field left as `None` means "server
//! default" on create and "leave unchanged" on update.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use zeroize::Zeroizing;

use super::ClientError;

/// Directory user as returned by the server.
///
/// ## Invariants
/// - `uid` is the immutable primary key.
/// - `member_of_groups` and `member_of_roles` hold no duplicates and keep the
///   server order.
/// - `password_expiration` is `None` when the password has expired or was
///   never set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[non_exhaustive]
pub struct User {
    /// Login name.
    pub uid: String,
    /// First name.
    pub given_name: String,
    /// Last name.
    pub surname: String,
    /// Full name.
    pub common_name: String,
    /// Primary e-mail address.
    pub mail: String,
    /// Work telephone number.
    pub telephone_number: String,
    /// Mobile telephone number.
    pub mobile: String,
    /// Job title.
    pub title: String,
    /// Department within the organization.
    pub org_unit: String,
    /// Company name.
    pub organization: String,
    /// Distinguished name of the entry.
    pub dn: String,
    /// Groups the user belongs to.
    pub member_of_groups: Vec<String>,
    /// Roles granted to the user.
    pub member_of_roles: Vec<String>,
    /// Whether the account is disabled.
    pub account_locked: bool,
    /// Kerberos password expiry.
    pub password_expiration: Option<DateTime<Utc>>,
    /// Raw avatar bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<Vec<u8>>,
}

impl User {
    /// Whether the user currently holds `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.member_of_roles.iter().any(|held| held == role)
    }
}

/// Change set for creating or updating a user.
///
/// # Examples
/// ```
/// use ipa_client::domain::RequestUser;
///
/// let request = RequestUser::new("jdoe")
///     .with_names("John", "Doe")
///     .with_password("Secret123");
/// assert_eq!(request.uid, "jdoe");
/// assert!(!format!("{request:?}").contains("Secret123"));
/// ```
#[derive(Clone, PartialEq, Eq, Default)]
pub struct RequestUser {
    /// Login name of the target user.
    pub uid: String,
    /// First name; mandatory on create.
    pub given_name: Option<String>,
    /// Last name; mandatory on create.
    pub surname: Option<String>,
    /// Full name.
    pub common_name: Option<String>,
    /// Primary e-mail address.
    pub mail: Option<String>,
    /// Work telephone number.
    pub telephone_number: Option<String>,
    /// Mobile telephone number.
    pub mobile: Option<String>,
    /// Job title.
    pub title: Option<String>,
    /// Department within the organization.
    pub org_unit: Option<String>,
    /// New password. A create without one asks the server for a random
    /// password.
    pub password: Option<Zeroizing<String>>,
    /// Kerberos password expiry.
    pub password_expiration: Option<DateTime<Utc>>,
    /// Whether the account is disabled.
    pub account_locked: Option<bool>,
    /// Raw `attr=value` pairs, e.g. `o=Acme` or `jpegphoto=<base64>`.
    pub add_attrs: Vec<String>,
}

impl RequestUser {
    /// Start a change set for `uid`.
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            ..Self::default()
        }
    }

    /// Set first and last name.
    pub fn with_names(mut self, given_name: impl Into<String>, surname: impl Into<String>) -> Self {
        self.given_name = Some(given_name.into());
        self.surname = Some(surname.into());
        self
    }

    /// Set the new password.
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(Zeroizing::new(password.to_owned()));
        self
    }

    /// Set the e-mail address.
    pub fn with_mail(mut self, mail: impl Into<String>) -> Self {
        self.mail = Some(mail.into());
        self
    }

    /// Lock or unlock the account.
    pub fn with_account_locked(mut self, locked: bool) -> Self {
        self.account_locked = Some(locked);
        self
    }

    /// Set the Kerberos password expiry.
    pub fn with_password_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.password_expiration = Some(expires_at);
        self
    }

    /// Append one raw `attr=value` pair.
    pub fn with_add_attr(mut self, attr: impl Into<String>) -> Self {
        self.add_attrs.push(attr.into());
        self
    }

    pub(crate) fn validate_for_create(&self) -> Result<(), ClientError> {
        self.validate_for_update()?;
        if is_blank(self.given_name.as_deref()) {
            return Err(ClientError::invalid_request("given name is required"));
        }
        if is_blank(self.surname.as_deref()) {
            return Err(ClientError::invalid_request("surname is required"));
        }
        if self.password.as_ref().is_some_and(|password| password.is_empty()) {
            return Err(ClientError::invalid_request("password must not be empty"));
        }
        Ok(())
    }

    pub(crate) fn validate_for_update(&self) -> Result<(), ClientError> {
        if self.uid.trim().is_empty() {
            return Err(ClientError::invalid_request("uid must not be empty"));
        }
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|inner| inner.trim().is_empty())
}

impl fmt::Debug for RequestUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestUser")
            .field("uid", &self.uid)
            .field("given_name", &self.given_name)
            .field("surname", &self.surname)
            .field("common_name", &self.common_name)
            .field("mail", &self.mail)
            .field("telephone_number", &self.telephone_number)
            .field("mobile", &self.mobile)
            .field("title", &self.title)
            .field("org_unit", &self.org_unit)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_expiration", &self.password_expiration)
            .field("account_locked", &self.account_locked)
            .field("add_attrs", &self.add_attrs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::missing_uid(RequestUser::new(" ").with_names("A", "B"))]
    #[case::missing_names(RequestUser::new("jdoe"))]
    #[case::blank_surname(RequestUser::new("jdoe").with_names("John", " "))]
    #[case::empty_password(RequestUser::new("jdoe").with_names("John", "Doe").with_password(""))]
    fn create_requires_identity_fields(#[case] request: RequestUser) {
        let err = request.validate_for_create().expect_err("request must be rejected");
        assert!(matches!(err, ClientError::InvalidRequest { .. }));
    }

    #[test]
    fn update_needs_only_uid() {
        assert!(RequestUser::new("jdoe").validate_for_update().is_ok());
    }

    #[test]
    fn debug_output_redacts_password() {
        let request = RequestUser::new("jdoe").with_password("hunter2");
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn role_membership_is_exact_match() {
        let user = User {
            member_of_roles: vec!["helpdesk".to_owned()],
            ..User::default()
        };
        assert!(user.has_role("helpdesk"));
        assert!(!user.has_role("help"));
    }
}
