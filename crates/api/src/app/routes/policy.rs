use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    routing::{get, post},
};
use chrono::Utc;

use classroom_auth::Role;
use classroom_core::OrganizationId;
use classroom_domain::policy::PolicySettings;

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz::{require_roles, require_roles_in_org};
use crate::context::PrincipalContext;

const POLICY_ADMINS: &[Role] = &[Role::SCHOOL_ADMIN, Role::ETHICS_ADMIN];

pub fn router() -> Router {
    Router::new()
        .route("/settings", post(upsert_settings))
        .route("/settings/:organization_id", get(get_settings))
}

pub async fn upsert_settings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::PolicyRequest>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, POLICY_ADMINS)?;
    let settings = PolicySettings::new(
        org,
        body.data_retention_days,
        body.allow_guest_live_join,
        body.pii_filter_level,
        Utc::now(),
    )?;
    services.store().upsert_policy(&settings).await?;
    tracing::info!(organization_id = %org, "policy settings updated");
    errors::ok(settings)
}

/// `data` is null for an organization that never saved settings.
pub async fn get_settings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(organization_id): Path<String>,
) -> ApiResult {
    require_roles(&principal, POLICY_ADMINS)?;
    let organization_id: OrganizationId = dto::parse_id(&organization_id)?;
    if !principal.is_global_admin() && principal.organization_id() != Some(organization_id) {
        return Err(ApiError::forbidden("You can only view your own organization's policy."));
    }
    errors::ok(services.store().get_policy(organization_id).await?)
}
