use serde::{Deserialize, Serialize};

use classroom_core::LiveSessionId;

use crate::{LiveEvent, LiveEventType};

/// Message fanned out to every open live connection.
///
/// There is no per-session targeting: clients filter on `liveSessionId`.
/// Concurrent hosts can publish out of log order; `sequenceNo` restores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveBroadcast {
    #[serde(rename_all = "camelCase")]
    LiveEvent {
        live_session_id: LiveSessionId,
        sequence_no: i64,
        event_type: LiveEventType,
        event_payload: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    SessionEnded { live_session_id: LiveSessionId },
}

impl LiveBroadcast {
    pub fn event(event: &LiveEvent) -> Self {
        LiveBroadcast::LiveEvent {
            live_session_id: event.live_session_id,
            sequence_no: event.sequence_no,
            event_type: event.event_type,
            event_payload: event.event_payload.clone(),
        }
    }

    pub fn live_session_id(&self) -> LiveSessionId {
        match self {
            LiveBroadcast::LiveEvent { live_session_id, .. }
            | LiveBroadcast::SessionEnded { live_session_id } => *live_session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use classroom_core::UserId;
    use serde_json::json;

    #[test]
    fn live_event_wire_shape() {
        let id = LiveSessionId::new();
        let event = LiveEvent::new(
            id,
            UserId::new(),
            7,
            LiveEventType::RevealResults,
            json!({ "blockIndex": 2 }),
            Utc::now(),
        );
        let msg = LiveBroadcast::event(&event);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "live_event",
                "liveSessionId": id.to_string(),
                "sequenceNo": 7,
                "eventType": "reveal_results",
                "eventPayload": { "blockIndex": 2 }
            })
        );
    }

    #[test]
    fn session_ended_wire_shape() {
        let id = LiveSessionId::new();
        let msg = LiveBroadcast::SessionEnded { live_session_id: id };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "type": "session_ended", "liveSessionId": id.to_string() })
        );
        assert_eq!(msg.live_session_id(), id);
    }
}
