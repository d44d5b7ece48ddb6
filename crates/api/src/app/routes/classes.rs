use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    routing::{get, post},
};
use chrono::Utc;

use classroom_auth::Role;
use classroom_core::{ClassId, OrganizationId};
use classroom_domain::classes::{Class, Enrollment, EnrollmentStatus, can_manage_roster};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz::require_roles_in_org;
use crate::context::PrincipalContext;

const CLASS_MANAGERS: &[Role] = &[Role::TEACHER, Role::SCHOOL_ADMIN];

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_class).get(list_classes))
        .route("/:class_id/roster", get(roster))
        .route("/:class_id/enrollments", post(enroll))
}

pub async fn create_class(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::CreateClassRequest>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, CLASS_MANAGERS)?;
    let class = Class::create(org, principal.user_id(), body.name, body.grade_band, Utc::now())?;
    services.store().insert_class(&class).await?;
    tracing::info!(class_id = %class.id, "class created");
    errors::ok(class)
}

pub async fn list_classes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, CLASS_MANAGERS)?;
    let teacher = (!principal.has_role(&Role::SCHOOL_ADMIN)).then(|| principal.user_id());
    let classes = services.store().list_classes(org, teacher).await?;
    errors::ok(classes)
}

pub async fn roster(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(class_id): Path<String>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, CLASS_MANAGERS)?;
    let class_id: ClassId = dto::parse_id(&class_id)?;
    managed_class(&services, &principal, org, class_id).await?;
    let rows = services.store().roster(org, class_id).await?;
    errors::ok(rows)
}

pub async fn enroll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(class_id): Path<String>,
    ApiJson(body): ApiJson<dto::EnrollRequest>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, CLASS_MANAGERS)?;
    let class_id: ClassId = dto::parse_id(&class_id)?;
    managed_class(&services, &principal, org, class_id).await?;

    let store = services.store();
    let student = store
        .get_user(body.user_id)
        .await?
        .filter(|u| u.organization_id == Some(org))
        .ok_or_else(|| ApiError::not_found("User not found in your organization."))?;

    if !body.accommodations.is_object() {
        return Err(ApiError::validation("accommodations must be an object"));
    }

    let enrollment = store
        .upsert_enrollment(&Enrollment {
            class_id,
            user_id: student.id,
            status: EnrollmentStatus::Active,
            accommodations: body.accommodations,
            enrolled_at: Utc::now(),
        })
        .await?;
    tracing::info!(%class_id, user_id = %student.id, "student enrolled");
    errors::ok(enrollment)
}

/// Class of the organization that the caller may manage: 404 outside the
/// organization, 403 for a teacher who does not own it.
async fn managed_class(
    services: &AppServices,
    principal: &PrincipalContext,
    org: OrganizationId,
    class_id: ClassId,
) -> Result<Class, ApiError> {
    let class = services
        .store()
        .get_class(org, class_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Class not found."))?;
    if !can_manage_roster(principal.auth(), &class) {
        return Err(ApiError::forbidden("You can only manage your own classes."));
    }
    Ok(class)
}
