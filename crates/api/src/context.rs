use classroom_auth::{AuthContext, Role};
use classroom_core::{OrganizationId, UserId};

/// Resolved caller of an authenticated request.
///
/// Inserted into request extensions by the auth middleware; handlers read it
/// with `Extension<PrincipalContext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    auth: AuthContext,
}

impl PrincipalContext {
    pub fn new(auth: AuthContext) -> Self {
        Self { auth }
    }

    pub fn user_id(&self) -> UserId {
        self.auth.app_user_id
    }

    pub fn organization_id(&self) -> Option<OrganizationId> {
        self.auth.organization_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.auth.roles
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.auth.has_role(role)
    }

    pub fn is_global_admin(&self) -> bool {
        self.auth.is_global_admin()
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }
}
