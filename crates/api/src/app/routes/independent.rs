use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;

use classroom_auth::Role;
use classroom_core::{AttemptId, OrganizationId};
use classroom_domain::independent::{ProgressUpdate, can_view_attempt, can_view_runtime, next_step};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz::require_roles_in_org;
use crate::context::PrincipalContext;

const VIEWERS: &[Role] = &[Role::STUDENT, Role::TEACHER];

pub fn router() -> Router {
    Router::new()
        .route("/progress", post(record_progress))
        .route("/attempts/:attempt_id", get(attempt_progress))
        .route("/attempts/:attempt_id/next-step", get(attempt_next_step))
        .route("/attempts/:attempt_id/runtime", get(attempt_runtime))
}

pub async fn record_progress(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::ProgressRequest>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, &[Role::STUDENT])?;
    let store = services.store();

    let owned = store
        .attempt_access(org, body.attempt_id)
        .await?
        .is_some_and(|access| access.student_id == principal.user_id());
    if !owned {
        return Err(ApiError::forbidden("Attempt does not belong to you."));
    }

    let update = ProgressUpdate {
        attempt_id: body.attempt_id,
        lesson_block_id: body.lesson_block_id,
        user_id: principal.user_id(),
        status: body.status,
        score: body.score,
        confidence: body.confidence,
        response_payload: body.response_payload,
        submitted_at: Utc::now(),
    };
    update.validate()?;

    let progress_percent = store.record_progress(&update).await?;
    tracing::debug!(attempt_id = %update.attempt_id, progress_percent, "progress recorded");
    errors::ok(json!({ "progressPercent": progress_percent }))
}

pub async fn attempt_progress(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(attempt_id): Path<String>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, VIEWERS)?;
    let attempt_id: AttemptId = dto::parse_id(&attempt_id)?;
    ensure_can_view(&services, &principal, org, attempt_id).await?;
    errors::ok(services.store().list_step_progress(attempt_id).await?)
}

pub async fn attempt_next_step(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(attempt_id): Path<String>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, VIEWERS)?;
    let attempt_id: AttemptId = dto::parse_id(&attempt_id)?;
    ensure_can_view(&services, &principal, org, attempt_id).await?;
    let steps = services.store().step_candidates(attempt_id).await?;
    errors::ok(next_step(&steps))
}

pub async fn attempt_runtime(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(attempt_id): Path<String>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, VIEWERS)?;
    let attempt_id: AttemptId = dto::parse_id(&attempt_id)?;

    let rows = services.store().runtime(org, attempt_id).await?;
    let Some(first) = rows.first() else {
        return Err(ApiError::not_found("Attempt not found."));
    };
    if !can_view_runtime(principal.auth(), first.attempt_user_id) {
        return Err(ApiError::forbidden("You cannot view this attempt."));
    }
    errors::ok(rows)
}

async fn ensure_can_view(
    services: &AppServices,
    principal: &PrincipalContext,
    org: OrganizationId,
    attempt_id: AttemptId,
) -> Result<(), ApiError> {
    let access = services
        .store()
        .attempt_access(org, attempt_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Attempt not found."))?;
    if !can_view_attempt(principal.auth(), access) {
        return Err(ApiError::forbidden("You cannot view this attempt."));
    }
    Ok(())
}
