//! Role data model.

use serde::Serialize;

/// Directory role as returned by the server.
///
/// `cn` is the immutable primary key; `member_users` holds no duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[non_exhaustive]
pub struct Role {
    /// Role name.
    pub cn: String,
    /// Distinguished name of the entry.
    pub dn: String,
    /// Free-form description.
    pub description: String,
    /// LDAP object classes of the entry.
    pub object_classes: Vec<String>,
    /// Users granted the role.
    pub member_users: Vec<String>,
}

impl Role {
    /// Whether `uid` is a direct member of the role.
    pub fn has_member(&self, uid: &str) -> bool {
        self.member_users.iter().any(|member| member == uid)
    }
}
