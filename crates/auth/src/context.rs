use serde::{Deserialize, Serialize};

use classroom_core::{AuthUserId, OrganizationId, UserId};

use crate::Role;

/// Fully resolved identity attached to an authenticated request.
///
/// Produced once per request by identity resolution (token → app user).
/// `roles` is never empty and `primary_role` is its first element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub auth_user_id: AuthUserId,
    pub app_user_id: UserId,
    pub organization_id: Option<OrganizationId>,
    pub roles: Vec<Role>,
    pub primary_role: Role,
    pub email: String,
}

impl AuthContext {
    pub fn new(
        auth_user_id: AuthUserId,
        app_user_id: UserId,
        organization_id: Option<OrganizationId>,
        roles: Vec<Role>,
        email: impl Into<String>,
    ) -> Self {
        let roles = if roles.is_empty() { vec![Role::STUDENT] } else { roles };
        let primary_role = roles[0].clone();
        Self {
            auth_user_id,
            app_user_id,
            organization_id,
            roles,
            primary_role,
            email: email.into(),
        }
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// Users whose primary role is ethics admin operate across organizations
    /// (moderation, policy, audit). A later ethics grant on top of another
    /// primary role keeps the user scoped to their organization.
    pub fn is_global_admin(&self) -> bool {
        self.primary_role == Role::ETHICS_ADMIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_roles_fall_back_to_student() {
        let ctx = AuthContext::new(AuthUserId::new(), UserId::new(), None, vec![], "a@b.test");
        assert_eq!(ctx.roles, vec![Role::STUDENT]);
        assert_eq!(ctx.primary_role, Role::STUDENT);
    }

    #[test]
    fn primary_role_is_first_granted() {
        let ctx = AuthContext::new(
            AuthUserId::new(),
            UserId::new(),
            None,
            vec![Role::SCHOOL_ADMIN, Role::ETHICS_ADMIN],
            "a@b.test",
        );
        assert_eq!(ctx.primary_role, Role::SCHOOL_ADMIN);
        assert!(!ctx.is_global_admin());
    }

    #[test]
    fn global_scope_follows_primary_role() {
        let ctx = AuthContext::new(
            AuthUserId::new(),
            UserId::new(),
            None,
            vec![Role::ETHICS_ADMIN, Role::TEACHER],
            "e@b.test",
        );
        assert!(ctx.is_global_admin());
    }

    #[test]
    fn serializes_camel_case() {
        let ctx = AuthContext::new(AuthUserId::new(), UserId::new(), None, vec![Role::TEACHER], "t@b.test");
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["primaryRole"], "teacher");
        assert!(json["organizationId"].is_null());
        assert!(json.get("appUserId").is_some());
    }
}
