//! Application user records (the internal side of identity resolution).

use serde::{Deserialize, Serialize};

use classroom_auth::Role;
use classroom_core::{AuthUserId, OrganizationId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub auth_user_id: Option<AuthUserId>,
    pub organization_id: Option<OrganizationId>,
    pub email: String,
    pub display_name: String,
    /// Granted roles in grant order.
    pub roles: Vec<Role>,
}

/// Input for provisioning a user seen for the first time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub id: UserId,
    pub auth_user_id: AuthUserId,
    pub organization_id: Option<OrganizationId>,
    pub email: String,
    pub display_name: String,
}
