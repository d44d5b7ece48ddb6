use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for RBAC.
///
/// Roles are stored as opaque strings (`user_roles.role_key`), but only the
/// four platform roles are ever granted. Use [`Role::parse_known`] when a role
/// comes from an untrusted source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const STUDENT: Role = Role(Cow::Borrowed("student"));
    pub const TEACHER: Role = Role(Cow::Borrowed("teacher"));
    pub const SCHOOL_ADMIN: Role = Role(Cow::Borrowed("school_admin"));
    pub const ETHICS_ADMIN: Role = Role(Cow::Borrowed("ethics_admin"));

    /// All roles the platform grants.
    pub const ALL: [Role; 4] = [Self::STUDENT, Self::TEACHER, Self::SCHOOL_ADMIN, Self::ETHICS_ADMIN];

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Map a string to one of the platform roles, or `None`.
    pub fn parse_known(name: &str) -> Option<Role> {
        Self::ALL.into_iter().find(|r| r.as_str() == name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_accepts_platform_roles_only() {
        assert_eq!(Role::parse_known("teacher"), Some(Role::TEACHER));
        assert_eq!(Role::parse_known("ethics_admin"), Some(Role::ETHICS_ADMIN));
        assert_eq!(Role::parse_known("superuser"), None);
        assert_eq!(Role::parse_known("Teacher"), None);
    }

    #[test]
    fn owned_and_borrowed_roles_compare_equal() {
        assert_eq!(Role::new(String::from("student")), Role::STUDENT);
    }
}
