use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use classroom_core::{LessonBlockId, LiveEventId, LiveSessionId, UserId};

use crate::LiveEventType;

/// One entry of a session's append-only event log.
///
/// `sequence_no` is strictly increasing within a session and is the only
/// ordering the replay trusts; `created_at` is informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    pub id: LiveEventId,
    pub live_session_id: LiveSessionId,
    pub actor_user_id: UserId,
    pub sequence_no: i64,
    pub event_type: LiveEventType,
    pub event_payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl LiveEvent {
    pub fn new(
        live_session_id: LiveSessionId,
        actor_user_id: UserId,
        sequence_no: i64,
        event_type: LiveEventType,
        event_payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LiveEventId::new(),
            live_session_id,
            actor_user_id,
            sequence_no,
            event_type,
            event_payload,
            created_at,
        }
    }

    /// `payload.lessonBlockId`, when it parses as a block id.
    pub fn target_block(&self) -> Option<LessonBlockId> {
        self.event_payload
            .get("lessonBlockId")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| s.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn target_block_ignores_garbage() {
        let session = LiveSessionId::new();
        let actor = UserId::new();
        let block = LessonBlockId::new();

        let ev = LiveEvent::new(
            session,
            actor,
            1,
            LiveEventType::NextBlock,
            json!({ "lessonBlockId": block.to_string() }),
            Utc::now(),
        );
        assert_eq!(ev.target_block(), Some(block));

        let ev = LiveEvent::new(session, actor, 2, LiveEventType::NextBlock, json!({ "lessonBlockId": "nope" }), Utc::now());
        assert_eq!(ev.target_block(), None);

        let ev = LiveEvent::new(session, actor, 3, LiveEventType::NextBlock, json!(null), Utc::now());
        assert_eq!(ev.target_block(), None);
    }
}
