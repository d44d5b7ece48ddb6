use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde_json::json;

use classroom_domain::policy::guests_allowed;
use classroom_live::{GuestParticipant, SESSION_CODE_LEN, normalize_session_code};

use crate::app::dto::{ApiJson, GuestJoinRequest};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

const DELEGATED: &str = "Use the identity provider on the client and send Bearer tokens to the API.";

pub fn router() -> Router {
    Router::new().route("/me", get(me))
}

fn delegated() -> Json<serde_json::Value> {
    Json(json!({ "ok": false, "error": DELEGATED }))
}

/// Sign-in happens at the identity provider; this endpoint only says so.
pub async fn email_sign_in() -> Response {
    (StatusCode::GONE, delegated()).into_response()
}

pub async fn oauth_callback() -> Response {
    (StatusCode::OK, delegated()).into_response()
}

pub async fn me(Extension(principal): Extension<PrincipalContext>) -> ApiResult {
    errors::ok(principal.auth())
}

pub async fn guest_join_session(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<GuestJoinRequest>,
) -> ApiResult {
    let code = normalize_session_code(&body.session_code);
    if code.chars().count() < SESSION_CODE_LEN {
        return Err(ApiError::validation(format!(
            "sessionCode must be at least {SESSION_CODE_LEN} characters"
        )));
    }

    let store = services.store();
    let session = store
        .find_open_session_by_code(&code)
        .await?
        .ok_or_else(|| ApiError::not_found("Session not found or ended"))?;

    let policy = store.get_policy(session.organization_id).await?;
    if !guests_allowed(policy.as_ref()) {
        return Err(ApiError::forbidden("Guest access is disabled for this organization."));
    }

    let participant = GuestParticipant::join(&session, body.display_name, Utc::now())?;
    store.insert_participant(&participant).await?;
    tracing::info!(live_session_id = %session.id, "guest joined live session");

    errors::ok(json!({ "liveSessionId": session.id }))
}
