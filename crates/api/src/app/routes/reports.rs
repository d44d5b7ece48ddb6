use std::sync::Arc;

use axum::{
    Router,
    extract::Extension,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};

use classroom_auth::Role;
use classroom_domain::reports::{DAILY_REPORT_LIMIT, EXPORT_ROW_LIMIT, render_teacher_csv};

use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz::{require_roles, require_roles_in_org};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/teacher/overview", get(teacher_overview))
        .route("/teacher/export.csv", get(teacher_export))
        .route("/school/usage", get(school_usage))
        .route("/global/funnel", get(global_funnel))
}

pub async fn teacher_overview(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, &[Role::TEACHER])?;
    errors::ok(services.store().teacher_overview(org, principal.user_id()).await?)
}

pub async fn school_usage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, &[Role::SCHOOL_ADMIN])?;
    errors::ok(services.store().usage_rollups(org, DAILY_REPORT_LIMIT).await?)
}

/// Platform-wide; not tied to the caller's organization.
pub async fn global_funnel(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require_roles(&principal, &[Role::ETHICS_ADMIN])?;
    errors::ok(services.store().global_funnel(DAILY_REPORT_LIMIT).await?)
}

pub async fn teacher_export(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, &[Role::TEACHER])?;
    let rows = services
        .store()
        .teacher_export(org, principal.user_id(), EXPORT_ROW_LIMIT)
        .await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"teacher-report.csv\""),
        ],
        render_teacher_csv(&rows),
    )
        .into_response())
}
