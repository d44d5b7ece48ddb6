use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    routing::{get, post},
};
use chrono::Utc;

use classroom_auth::Role;
use classroom_core::FlagId;
use classroom_domain::moderation::ModerationFlag;

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz::{admin_scope, require_roles, require_roles_in_org};
use crate::context::PrincipalContext;

const REPORTERS: &[Role] = &[Role::TEACHER, Role::SCHOOL_ADMIN, Role::ETHICS_ADMIN];
const REVIEWERS: &[Role] = &[Role::SCHOOL_ADMIN, Role::ETHICS_ADMIN];

pub fn router() -> Router {
    Router::new()
        .route("/flags", post(create_flag))
        .route("/flags/open", get(open_flags))
        .route("/flags/:flag_id/resolve", post(resolve_flag))
}

pub async fn create_flag(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::CreateFlagRequest>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, REPORTERS)?;
    if !body.details.is_object() {
        return Err(ApiError::validation("details must be an object"));
    }
    let flag = ModerationFlag::raise(
        org,
        body.source_type,
        body.source_id,
        body.flag_reason,
        body.details,
        principal.user_id(),
        Utc::now(),
    );
    services.store().insert_flag(&flag).await?;
    tracing::info!(flag_id = %flag.id, reason = flag.flag_reason.as_str(), "moderation flag raised");
    errors::ok(flag)
}

pub async fn open_flags(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require_roles(&principal, REVIEWERS)?;
    let scope = admin_scope(&principal)?;
    errors::ok(services.store().open_flags(scope).await?)
}

pub async fn resolve_flag(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(flag_id): Path<String>,
    ApiJson(body): ApiJson<dto::ResolveFlagRequest>,
) -> ApiResult {
    require_roles(&principal, REVIEWERS)?;
    let scope = admin_scope(&principal)?;
    let flag_id: FlagId = dto::parse_id(&flag_id)?;

    let flag = services
        .store()
        .resolve_flag(scope, flag_id, body.resolution.into(), principal.user_id(), Utc::now())
        .await?
        .ok_or_else(|| ApiError::not_found("Flag not found."))?;
    tracing::info!(%flag_id, status = flag.resolution_status.as_str(), "moderation flag closed");
    errors::ok(flag)
}
