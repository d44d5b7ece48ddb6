use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    routing::{get, post},
};
use chrono::Utc;

use classroom_auth::Role;
use classroom_core::AssignmentId;
use classroom_domain::assignments::{Assignment, Attempt};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz::require_roles_in_org;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_assignment))
        .route("/my", get(my_assignments))
        .route("/:assignment_id/start", post(start_assignment))
}

pub async fn create_assignment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::CreateAssignmentRequest>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, &[Role::TEACHER])?;
    let store = services.store();

    let class = store
        .get_class(org, body.class_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Class not found."))?;
    if !class.is_taught_by(principal.user_id()) {
        return Err(ApiError::forbidden("You can only assign lessons to your own classes."));
    }
    store
        .get_version(body.lesson_version_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Lesson version not found."))?;

    let assignment = Assignment::create(
        org,
        class.id,
        body.lesson_version_id,
        principal.user_id(),
        body.due_at,
        Utc::now(),
    );
    store.insert_assignment(&assignment).await?;
    tracing::info!(assignment_id = %assignment.id, class_id = %class.id, "assignment created");
    errors::ok(assignment)
}

pub async fn my_assignments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, &[Role::STUDENT])?;
    let rows = services.store().assignments_for_student(org, principal.user_id()).await?;
    errors::ok(rows)
}

pub async fn start_assignment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(assignment_id): Path<String>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, &[Role::STUDENT])?;
    let assignment_id: AssignmentId = dto::parse_id(&assignment_id)?;
    let store = services.store();

    let not_enrolled = || ApiError::forbidden("You are not enrolled in this assignment's class.");
    let assignment = store.get_assignment(org, assignment_id).await?.ok_or_else(not_enrolled)?;
    if !store.is_enrolled(assignment.class_id, principal.user_id()).await? {
        return Err(not_enrolled());
    }

    let attempt = store
        .start_attempt(Attempt::start(assignment.id, principal.user_id(), Utc::now()))
        .await?;
    errors::ok(attempt)
}
