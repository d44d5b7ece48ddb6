use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;

use classroom_auth::Role;
use classroom_core::{LiveSessionId, OrganizationId};
use classroom_infra::StoreError;
use classroom_live::{
    LiveBroadcast, LiveResponse, LiveSession, generate_session_code, recent_events, replay,
};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz::require_roles_in_org;
use crate::context::PrincipalContext;

/// Codes are random; a clash with another open session just draws again.
const CODE_ATTEMPTS: usize = 5;

pub fn router() -> Router {
    Router::new()
        .route("/sessions/start", post(start_session))
        .route("/sessions/event", post(host_event))
        .route("/sessions/:session_id/end", post(end_session))
        .route("/sessions/:session_id/state", get(session_state))
        .route("/responses", post(submit_response))
}

pub async fn start_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::StartSessionRequest>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, &[Role::TEACHER])?;
    let store = services.store();

    let owns_class = store
        .get_class(org, body.class_id)
        .await?
        .is_some_and(|class| class.is_taught_by(principal.user_id()));
    if !owns_class {
        return Err(ApiError::forbidden("You can only start sessions for your own class."));
    }
    store
        .get_version(body.lesson_version_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Lesson version not found."))?;

    for attempt in 1..=CODE_ATTEMPTS {
        let session = LiveSession::start(
            org,
            body.class_id,
            body.lesson_version_id,
            principal.user_id(),
            generate_session_code(),
            Utc::now(),
        );
        match store.insert_session(&session).await {
            Ok(()) => {
                tracing::info!(live_session_id = %session.id, class_id = %session.class_id, "live session started");
                return errors::ok(json!({ "id": session.id, "session_code": session.session_code }));
            }
            Err(StoreError::Conflict(_)) => {
                tracing::debug!(attempt, "session code already in use; drawing another");
            }
            Err(other) => return Err(other.into()),
        }
    }
    Err(ApiError::conflict("Could not allocate a free session code."))
}

pub async fn host_event(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::HostEventRequest>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, &[Role::TEACHER])?;
    if !body.event_payload.is_object() {
        return Err(ApiError::validation("eventPayload must be an object"));
    }

    // Checked again under the store's lock; this only spares the write.
    let session = hosted_session(&services, &principal, org, body.live_session_id).await?;
    if session.is_ended() {
        return Err(ApiError::conflict("Live session has ended."));
    }

    let event = services
        .store()
        .append_event(
            session.id,
            principal.user_id(),
            body.event_type,
            body.event_payload,
            Utc::now(),
        )
        .await?;

    services.gateway().publish(LiveBroadcast::event(&event));
    errors::ok(event)
}

pub async fn end_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(session_id): Path<String>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, &[Role::TEACHER])?;
    let session_id: LiveSessionId = dto::parse_id(&session_id)?;
    let session = hosted_session(&services, &principal, org, session_id).await?;

    let ended = services.store().end_session(session.id, Utc::now()).await?;
    if !session.is_ended() {
        tracing::info!(live_session_id = %ended.id, "live session ended");
        services.gateway().publish(LiveBroadcast::SessionEnded {
            live_session_id: ended.id,
        });
    }
    errors::ok(ended)
}

pub async fn submit_response(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::LiveResponseRequest>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, &[Role::STUDENT])?;
    let store = services.store();

    store
        .get_session(org, body.live_session_id)
        .await?
        .ok_or_else(|| ApiError::forbidden("Live session is not available in your organization."))?;

    let response = LiveResponse {
        live_session_id: body.live_session_id,
        lesson_block_id: body.lesson_block_id,
        user_id: principal.user_id(),
        response_payload: body.response_payload,
        confidence: body.confidence,
        submitted_at: Utc::now(),
    };
    response.validate()?;
    store.upsert_live_response(&response).await?;
    errors::ok_empty()
}

pub async fn session_state(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(session_id): Path<String>,
) -> ApiResult {
    let org = require_roles_in_org(&principal, &[Role::STUDENT, Role::TEACHER])?;
    let session_id: LiveSessionId = dto::parse_id(&session_id)?;
    let store = services.store();

    let session = store
        .get_session(org, session_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Live session not found."))?;
    let blocks = store.list_blocks(session.lesson_version_id).await?;
    let events = store.list_events(session.id).await?;

    let pacing = replay(&blocks, &events);
    errors::ok(json!({
        "session": session,
        "activeBlock": pacing.active_block(&blocks),
        "recentEvents": recent_events(&events),
        "pacing": pacing,
    }))
}

/// Session of the organization hosted by the caller. Sessions of other
/// organizations and other hosts look the same: 403.
async fn hosted_session(
    services: &AppServices,
    principal: &PrincipalContext,
    org: OrganizationId,
    session_id: LiveSessionId,
) -> Result<LiveSession, ApiError> {
    services
        .store()
        .get_session(org, session_id)
        .await?
        .filter(|s| s.is_hosted_by(principal.user_id()))
        .ok_or_else(|| ApiError::forbidden("You can only control your own live session."))
}
