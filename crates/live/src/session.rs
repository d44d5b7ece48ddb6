use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use classroom_core::{ClassId, DomainResult, LessonBlockId, LessonVersionId, LiveSessionId, OrganizationId, UserId};
use classroom_domain::{validate_confidence, validate_non_empty};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSession {
    pub id: LiveSessionId,
    pub organization_id: OrganizationId,
    pub class_id: ClassId,
    pub lesson_version_id: LessonVersionId,
    pub host_teacher_id: UserId,
    pub session_code: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl LiveSession {
    pub fn start(
        organization_id: OrganizationId,
        class_id: ClassId,
        lesson_version_id: LessonVersionId,
        host_teacher_id: UserId,
        session_code: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LiveSessionId::new(),
            organization_id,
            class_id,
            lesson_version_id,
            host_teacher_id,
            session_code,
            started_at: now,
            ended_at: None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn is_hosted_by(&self, user: UserId) -> bool {
        self.host_teacher_id == user
    }
}

/// A student's answer to a block during a live session. One per (session, block, user).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveResponse {
    pub live_session_id: LiveSessionId,
    pub lesson_block_id: LessonBlockId,
    pub user_id: UserId,
    pub response_payload: serde_json::Value,
    pub confidence: Option<i16>,
    pub submitted_at: DateTime<Utc>,
}

impl LiveResponse {
    pub fn validate(&self) -> DomainResult<()> {
        validate_confidence(self.confidence)?;
        if !self.response_payload.is_object() {
            return Err(classroom_core::DomainError::validation("responsePayload must be an object"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Guest,
    Student,
}

impl JoinKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JoinKind::Guest => "guest",
            JoinKind::Student => "student",
        }
    }
}

/// Someone who joined a session by code without an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestParticipant {
    pub id: Uuid,
    pub live_session_id: LiveSessionId,
    pub organization_id: OrganizationId,
    pub display_name: String,
    pub join_kind: JoinKind,
    pub joined_at: DateTime<Utc>,
}

impl GuestParticipant {
    pub fn join(session: &LiveSession, display_name: String, now: DateTime<Utc>) -> DomainResult<Self> {
        validate_non_empty("displayName", &display_name)?;
        Ok(Self {
            id: Uuid::now_v7(),
            live_session_id: session.id,
            organization_id: session.organization_id,
            display_name,
            join_kind: JoinKind::Guest,
            joined_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> LiveSession {
        LiveSession::start(
            OrganizationId::new(),
            ClassId::new(),
            LessonVersionId::new(),
            UserId::new(),
            "ABC123".into(),
            Utc::now(),
        )
    }

    #[test]
    fn new_session_is_open() {
        let s = session();
        assert!(!s.is_ended());
        assert!(s.is_hosted_by(s.host_teacher_id));
        assert!(!s.is_hosted_by(UserId::new()));
    }

    #[test]
    fn guest_inherits_session_org() {
        let s = session();
        let guest = GuestParticipant::join(&s, "Sam".into(), Utc::now()).unwrap();
        assert_eq!(guest.organization_id, s.organization_id);
        assert_eq!(guest.join_kind, JoinKind::Guest);
        assert!(GuestParticipant::join(&s, "  ".into(), Utc::now()).is_err());
    }

    #[test]
    fn response_requires_object_payload() {
        let mut r = LiveResponse {
            live_session_id: LiveSessionId::new(),
            lesson_block_id: LessonBlockId::new(),
            user_id: UserId::new(),
            response_payload: json!({ "choice": "b" }),
            confidence: Some(5),
            submitted_at: Utc::now(),
        };
        assert!(r.validate().is_ok());
        r.response_payload = json!("b");
        assert!(r.validate().is_err());
    }
}
