use std::sync::Arc;

use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use chrono::Utc;

use classroom_auth::Role;
use classroom_domain::audit::{AUDIT_LOG_LIMIT, AuditEntry};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz::{admin_scope, require_roles, require_roles_in_org};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/log", post(write_entry))
        .route("/logs", get(list_entries))
}

pub async fn write_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::AuditLogRequest>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, &[Role::TEACHER, Role::SCHOOL_ADMIN, Role::ETHICS_ADMIN])?;
    let entry = AuditEntry::record(
        org,
        principal.user_id(),
        body.action_key,
        body.target_type,
        body.target_id,
        body.metadata,
        Utc::now(),
    )?;
    services.store().insert_audit(&entry).await?;
    errors::ok(entry)
}

pub async fn list_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require_roles(&principal, &[Role::SCHOOL_ADMIN, Role::ETHICS_ADMIN])?;
    let scope = admin_scope(&principal)?;
    errors::ok(services.store().list_audit(scope, AUDIT_LOG_LIMIT).await?)
}
