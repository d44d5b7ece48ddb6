//! Route-level role guard.
//!
//! Every handler names its allow-list up front; ownership checks (class
//! teacher, session host, attempt owner) happen afterwards against stored rows.

use classroom_auth::{Role, authorize_roles, require_organization};
use classroom_core::OrganizationId;

use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

/// Pass when the caller holds at least one of `allowed`.
pub fn require_roles(principal: &PrincipalContext, allowed: &[Role]) -> Result<(), ApiError> {
    authorize_roles(principal.auth(), allowed).map_err(ApiError::from)
}

/// Role guard followed by the organization requirement most routes share.
pub fn require_roles_in_org(principal: &PrincipalContext, allowed: &[Role]) -> Result<OrganizationId, ApiError> {
    require_roles(principal, allowed)?;
    require_organization(principal.auth()).map_err(ApiError::from)
}

/// Organization filter for admin listings: ethics admins see every organization.
pub fn admin_scope(principal: &PrincipalContext) -> Result<Option<OrganizationId>, ApiError> {
    if principal.is_global_admin() {
        return Ok(None);
    }
    require_organization(principal.auth()).map(Some).map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom_auth::AuthContext;
    use classroom_core::{AuthUserId, UserId};

    fn principal(roles: Vec<Role>, org: Option<OrganizationId>) -> PrincipalContext {
        PrincipalContext::new(AuthContext::new(AuthUserId::new(), UserId::new(), org, roles, "p@s.test"))
    }

    #[test]
    fn role_is_checked_before_organization() {
        let p = principal(vec![Role::STUDENT], None);
        assert!(matches!(
            require_roles_in_org(&p, &[Role::TEACHER]),
            Err(ApiError::Forbidden(_))
        ));

        let p = principal(vec![Role::TEACHER], None);
        assert_eq!(require_roles_in_org(&p, &[Role::TEACHER]), Err(ApiError::NoOrganization));
    }

    #[test]
    fn ethics_admin_scope_is_global() {
        let org = OrganizationId::new();
        assert_eq!(admin_scope(&principal(vec![Role::ETHICS_ADMIN], None)), Ok(None));
        assert_eq!(admin_scope(&principal(vec![Role::SCHOOL_ADMIN], Some(org))), Ok(Some(org)));
        assert_eq!(
            admin_scope(&principal(vec![Role::SCHOOL_ADMIN], None)),
            Err(ApiError::NoOrganization)
        );
    }

    #[test]
    fn secondary_ethics_grant_stays_in_organization() {
        let org = OrganizationId::new();
        let p = principal(vec![Role::SCHOOL_ADMIN, Role::ETHICS_ADMIN], Some(org));
        assert_eq!(admin_scope(&p), Ok(Some(org)));
    }
}
