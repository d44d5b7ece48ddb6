use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use classroom_auth::AuthzError;
use classroom_core::DomainError;
use classroom_infra::StoreError;

/// Error leaving a handler; rendered as `{ok:false,error,message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    Validation(String),
    InvalidId(String),
    NoOrganization,
    Unauthorized,
    Forbidden(String),
    NotFound(String),
    Gone(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::InvalidId(msg) => (StatusCode::BAD_REQUEST, "invalid_id", msg.clone()),
            ApiError::NoOrganization => (
                StatusCode::BAD_REQUEST,
                "no_organization",
                AuthzError::NoOrganization.to_string(),
            ),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", "Unauthorized".to_string()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Gone(msg) => (StatusCode::GONE, "gone", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
        }
        json_error(status, code, message)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => ApiError::Validation(msg),
            DomainError::InvalidId(msg) => ApiError::InvalidId(format!("invalid identifier: {msg}")),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Forbidden => ApiError::Forbidden("Forbidden".to_string()),
            AuthzError::NoOrganization => ApiError::NoOrganization,
        }
    }
}

pub type ApiResult<T = Response> = Result<T, ApiError>;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "ok": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// `{ok:true,data}` with status 200.
pub fn ok<T: Serialize>(data: T) -> ApiResult {
    ok_with(StatusCode::OK, data)
}

pub fn ok_with<T: Serialize>(status: StatusCode, data: T) -> ApiResult {
    let data = serde_json::to_value(data).map_err(|e| ApiError::Internal(format!("serialize response: {e}")))?;
    Ok((status, axum::Json(json!({ "ok": true, "data": data }))).into_response())
}

/// Bare `{ok:true}`.
pub fn ok_empty() -> ApiResult {
    Ok((StatusCode::OK, axum::Json(json!({ "ok": true }))).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        let cases = [
            (ApiError::from(DomainError::validation("x")), StatusCode::BAD_REQUEST),
            (ApiError::from(DomainError::invalid_id("x")), StatusCode::BAD_REQUEST),
            (ApiError::from(AuthzError::NoOrganization), StatusCode::BAD_REQUEST),
            (ApiError::from(AuthzError::Forbidden), StatusCode::FORBIDDEN),
            (ApiError::from(StoreError::Conflict("dup".into())), StatusCode::CONFLICT),
            (ApiError::from(StoreError::NotFound("x".into())), StatusCode::NOT_FOUND),
            (ApiError::from(StoreError::Backend("db".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn organization_message_is_stable() {
        let (_, code, message) = ApiError::NoOrganization.parts();
        assert_eq!(code, "no_organization");
        assert_eq!(message, "User is not assigned to an organization.");
    }
}
