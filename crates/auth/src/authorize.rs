use thiserror::Error;

use classroom_core::OrganizationId;

use crate::{AuthContext, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("Forbidden")]
    Forbidden,

    #[error("User is not assigned to an organization.")]
    NoOrganization,
}

/// Role allow-list check.
///
/// - No IO
/// - No panics
/// - Passes when the caller holds at least one allowed role
pub fn authorize_roles(context: &AuthContext, allowed: &[Role]) -> Result<(), AuthzError> {
    if context.roles.iter().any(|r| allowed.contains(r)) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %context.app_user_id,
            roles = ?context.roles,
            allowed = ?allowed,
            "role guard denied request"
        );
        Err(AuthzError::Forbidden)
    }
}

/// Organization the caller acts within; most routes refuse callers without one.
pub fn require_organization(context: &AuthContext) -> Result<OrganizationId, AuthzError> {
    context.organization_id.ok_or(AuthzError::NoOrganization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom_core::{AuthUserId, UserId};

    fn ctx(roles: Vec<Role>, org: Option<OrganizationId>) -> AuthContext {
        AuthContext::new(AuthUserId::new(), UserId::new(), org, roles, "x@y.test")
    }

    #[test]
    fn any_allowed_role_passes() {
        let c = ctx(vec![Role::STUDENT, Role::TEACHER], None);
        assert!(authorize_roles(&c, &[Role::TEACHER, Role::SCHOOL_ADMIN]).is_ok());
    }

    #[test]
    fn disjoint_roles_are_forbidden() {
        let c = ctx(vec![Role::STUDENT], None);
        assert_eq!(authorize_roles(&c, &[Role::TEACHER]), Err(AuthzError::Forbidden));
        assert_eq!(authorize_roles(&c, &[]), Err(AuthzError::Forbidden));
    }

    #[test]
    fn organization_is_required() {
        assert_eq!(
            require_organization(&ctx(vec![Role::TEACHER], None)),
            Err(AuthzError::NoOrganization)
        );
        let org = OrganizationId::new();
        assert_eq!(require_organization(&ctx(vec![Role::TEACHER], Some(org))), Ok(org));
    }
}
