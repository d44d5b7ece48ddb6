use std::str::FromStr;

use axum::extract::{FromRequest, Request};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use classroom_core::{
    AttemptId, ClassId, DomainError, LessonBlockId, LessonId, LessonVersionId, LiveSessionId, UserId,
};
use classroom_domain::independent::StepStatus;
use classroom_domain::moderation::{FlagReason, Resolution, SourceType};
use classroom_domain::policy::PiiFilterLevel;
use classroom_live::LiveEventType;

use crate::app::errors::ApiError;

/// JSON body extractor whose rejections use the API error envelope.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Parse a path segment into a typed id; failures are `400 invalid_id`.
pub fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse::<T>().map_err(ApiError::from)
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestJoinRequest {
    pub session_code: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClassRequest {
    pub name: String,
    pub grade_band: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    pub user_id: UserId,
    #[serde(default = "empty_object")]
    pub accommodations: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLessonRequest {
    pub title: String,
    pub grade_band: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishVersionRequest {
    pub lesson_id: LessonId,
    pub version_label: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlockRequest {
    pub block_type: String,
    pub title: String,
    #[serde(default = "empty_object")]
    pub body: serde_json::Value,
    pub mastery_rules: Option<serde_json::Value>,
    pub remediation_config: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssignmentRequest {
    pub class_id: ClassId,
    pub lesson_version_id: LessonVersionId,
    pub due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub attempt_id: AttemptId,
    pub lesson_block_id: LessonBlockId,
    pub status: StepStatus,
    pub score: Option<f64>,
    pub confidence: Option<i16>,
    pub response_payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub class_id: ClassId,
    pub lesson_version_id: LessonVersionId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostEventRequest {
    pub live_session_id: LiveSessionId,
    pub event_type: LiveEventType,
    #[serde(default = "empty_object")]
    pub event_payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveResponseRequest {
    pub live_session_id: LiveSessionId,
    pub lesson_block_id: LessonBlockId,
    pub response_payload: serde_json::Value,
    pub confidence: Option<i16>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFlagRequest {
    pub source_type: SourceType,
    pub source_id: uuid::Uuid,
    pub flag_reason: FlagReason,
    #[serde(default = "empty_object")]
    pub details: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ResolveFlagRequest {
    pub resolution: Resolution,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRequest {
    pub data_retention_days: i32,
    pub allow_guest_live_join: bool,
    pub pii_filter_level: PiiFilterLevel,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogRequest {
    pub action_key: String,
    pub target_type: Option<String>,
    pub target_id: Option<uuid::Uuid>,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_objects_default_to_empty() {
        let req: HostEventRequest = serde_json::from_value(json!({
            "liveSessionId": LiveSessionId::new(),
            "eventType": "next_block",
        }))
        .unwrap();
        assert_eq!(req.event_type, LiveEventType::NextBlock);
        assert_eq!(req.event_payload, json!({}));
    }

    #[test]
    fn unknown_enum_values_are_rejected() {
        let res = serde_json::from_value::<CreateFlagRequest>(json!({
            "sourceType": "email",
            "sourceId": uuid::Uuid::now_v7(),
            "flagReason": "pii",
        }));
        assert!(res.is_err());
    }

    #[test]
    fn bad_path_id_is_invalid_id() {
        assert!(matches!(parse_id::<ClassId>("nope"), Err(ApiError::InvalidId(_))));
        assert!(parse_id::<ClassId>(&ClassId::new().to_string()).is_ok());
    }
}
