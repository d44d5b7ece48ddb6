use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    routing::{get, post},
};
use chrono::Utc;

use classroom_auth::Role;
use classroom_core::LessonVersionId;
use classroom_domain::curriculum::{Lesson, LessonVersion, NewLessonBlock};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz::require_roles;
use crate::context::PrincipalContext;

const AUTHORS: &[Role] = &[Role::ETHICS_ADMIN];
const LIBRARY_READERS: &[Role] = &[Role::TEACHER, Role::SCHOOL_ADMIN, Role::ETHICS_ADMIN];
const BLOCK_READERS: &[Role] = &[Role::TEACHER, Role::SCHOOL_ADMIN, Role::ETHICS_ADMIN, Role::STUDENT];

pub fn router() -> Router {
    Router::new()
        .route("/library", get(library))
        .route("/lessons", post(create_lesson))
        .route("/publish", post(publish_version))
        .route("/versions/:version_id/blocks", post(add_block).get(list_blocks))
}

/// Published lessons; the library is shared across organizations.
pub async fn library(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require_roles(&principal, LIBRARY_READERS)?;
    errors::ok(services.store().library().await?)
}

pub async fn create_lesson(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::CreateLessonRequest>,
) -> ApiResult {
    require_roles(&principal, AUTHORS)?;
    let lesson = Lesson::create(body.title, body.grade_band, Utc::now())?;
    services.store().insert_lesson(&lesson).await?;
    errors::ok(lesson)
}

pub async fn publish_version(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::PublishVersionRequest>,
) -> ApiResult {
    require_roles(&principal, AUTHORS)?;
    let store = services.store();
    store
        .get_lesson(body.lesson_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Lesson not found."))?;

    let version = LessonVersion::publish(body.lesson_id, body.version_label, Utc::now())?;
    store.insert_version(&version).await?;
    tracing::info!(lesson_id = %version.lesson_id, version_id = %version.id, "lesson version published");
    errors::ok(version)
}

pub async fn add_block(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(version_id): Path<String>,
    ApiJson(body): ApiJson<dto::CreateBlockRequest>,
) -> ApiResult {
    require_roles(&principal, AUTHORS)?;
    let version_id: LessonVersionId = dto::parse_id(&version_id)?;

    let block = NewLessonBlock {
        block_type: body.block_type,
        title: body.title,
        body: body.body,
        mastery_rules: body.mastery_rules,
        remediation_config: body.remediation_config,
    };
    block.validate()?;

    let store = services.store();
    store
        .get_version(version_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Lesson version not found."))?;
    let block = store.append_block(version_id, block).await?;
    errors::ok(block)
}

pub async fn list_blocks(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(version_id): Path<String>,
) -> ApiResult {
    require_roles(&principal, BLOCK_READERS)?;
    let version_id: LessonVersionId = dto::parse_id(&version_id)?;
    errors::ok(services.store().list_blocks(version_id).await?)
}
