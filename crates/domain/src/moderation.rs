//! Moderation flags raised against student-generated content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use classroom_core::{FlagId, OrganizationId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    LiveResponse,
    IndependentResponse,
    BoardPost,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::LiveResponse => "live_response",
            SourceType::IndependentResponse => "independent_response",
            SourceType::BoardPost => "board_post",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "live_response" => Some(SourceType::LiveResponse),
            "independent_response" => Some(SourceType::IndependentResponse),
            "board_post" => Some(SourceType::BoardPost),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    Pii,
    Profanity,
    Safety,
    Other,
}

impl FlagReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FlagReason::Pii => "pii",
            FlagReason::Profanity => "profanity",
            FlagReason::Safety => "safety",
            FlagReason::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pii" => Some(FlagReason::Pii),
            "profanity" => Some(FlagReason::Profanity),
            "safety" => Some(FlagReason::Safety),
            "other" => Some(FlagReason::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Open,
    Resolved,
    Dismissed,
}

impl ResolutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionStatus::Open => "open",
            ResolutionStatus::Resolved => "resolved",
            ResolutionStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ResolutionStatus::Open),
            "resolved" => Some(ResolutionStatus::Resolved),
            "dismissed" => Some(ResolutionStatus::Dismissed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationFlag {
    pub id: FlagId,
    pub organization_id: OrganizationId,
    pub source_type: SourceType,
    pub source_id: Uuid,
    pub flag_reason: FlagReason,
    pub details: serde_json::Value,
    pub created_by_user_id: UserId,
    pub resolution_status: ResolutionStatus,
    pub resolved_by_user_id: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ModerationFlag {
    pub fn raise(
        organization_id: OrganizationId,
        source_type: SourceType,
        source_id: Uuid,
        flag_reason: FlagReason,
        details: serde_json::Value,
        created_by_user_id: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: FlagId::new(),
            organization_id,
            source_type,
            source_id,
            flag_reason,
            details,
            created_by_user_id,
            resolution_status: ResolutionStatus::Open,
            resolved_by_user_id: None,
            resolved_at: None,
            created_at: now,
        }
    }
}

/// Outcome chosen by a reviewer when closing a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Resolved,
    Dismissed,
}

impl From<Resolution> for ResolutionStatus {
    fn from(value: Resolution) -> Self {
        match value {
            Resolution::Resolved => ResolutionStatus::Resolved,
            Resolution::Dismissed => ResolutionStatus::Dismissed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for s in [SourceType::LiveResponse, SourceType::IndependentResponse, SourceType::BoardPost] {
            assert_eq!(SourceType::parse(s.as_str()), Some(s));
            assert_eq!(serde_json::to_value(s).unwrap(), s.as_str());
        }
        for r in [FlagReason::Pii, FlagReason::Profanity, FlagReason::Safety, FlagReason::Other] {
            assert_eq!(FlagReason::parse(r.as_str()), Some(r));
        }
        for r in [ResolutionStatus::Open, ResolutionStatus::Resolved, ResolutionStatus::Dismissed] {
            assert_eq!(ResolutionStatus::parse(r.as_str()), Some(r));
        }
    }

    #[test]
    fn raised_flags_start_open() {
        let flag = ModerationFlag::raise(
            OrganizationId::new(),
            SourceType::BoardPost,
            Uuid::now_v7(),
            FlagReason::Safety,
            serde_json::json!({}),
            UserId::new(),
            Utc::now(),
        );
        assert_eq!(flag.resolution_status, ResolutionStatus::Open);
        assert!(flag.resolved_at.is_none());
    }
}
