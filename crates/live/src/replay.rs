//! Reconstruct the on-screen state of a live session from its event log.
//!
//! The fold starts on the first block and applies events in `sequence_no`
//! order:
//!
//! - a `lessonBlockId` in the payload that names a block of the lesson moves
//!   the session straight to that block, and the event's own navigation
//!   (`next_block` / `previous_block`) is not applied;
//! - `next_block` and `previous_block` move one block, clamped to the lesson;
//! - `lock` / `unlock`, `reveal_results`, `pin_answer` and `timer` set flags;
//! - landing on a different block hides revealed results and drops the pin.
//!
//! Events repeated with an already applied `sequence_no` are ignored, so the
//! result is the same no matter how many times the log was delivered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use classroom_core::LessonBlockId;
use classroom_domain::curriculum::LessonBlock;

use crate::{LiveEvent, LiveEventType};

/// Number of events returned alongside the state, newest first.
pub const RECENT_EVENTS_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub seconds: i64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacingState {
    pub active_index: usize,
    pub active_block_id: Option<LessonBlockId>,
    pub locked: bool,
    pub results_revealed: bool,
    pub pinned_answer: Option<serde_json::Value>,
    pub timer: Option<TimerState>,
    pub last_sequence_no: Option<i64>,
}

impl PacingState {
    fn move_to(&mut self, index: usize, block_ids: &[LessonBlockId]) {
        if index != self.active_index {
            self.results_revealed = false;
            self.pinned_answer = None;
        }
        self.active_index = index;
        self.active_block_id = block_ids.get(index).copied();
    }

    fn apply(&mut self, block_ids: &[LessonBlockId], event: &LiveEvent) {
        if self.last_sequence_no.is_some_and(|last| event.sequence_no <= last) {
            return;
        }
        self.last_sequence_no = Some(event.sequence_no);

        let jump = event
            .target_block()
            .and_then(|target| block_ids.iter().position(|id| *id == target));

        match (jump, event.event_type) {
            (Some(index), _) => self.move_to(index, block_ids),
            (None, LiveEventType::NextBlock) => {
                let last = block_ids.len().saturating_sub(1);
                self.move_to((self.active_index + 1).min(last), block_ids);
            }
            (None, LiveEventType::PreviousBlock) => {
                self.move_to(self.active_index.saturating_sub(1), block_ids);
            }
            _ => {}
        }

        let payload = &event.event_payload;
        match event.event_type {
            LiveEventType::Lock => self.locked = true,
            LiveEventType::Unlock => self.locked = false,
            LiveEventType::RevealResults => self.results_revealed = true,
            LiveEventType::PinAnswer => {
                self.pinned_answer = Some(payload.get("answer").unwrap_or(payload).clone());
            }
            LiveEventType::Timer => {
                self.timer = payload
                    .get("seconds")
                    .and_then(serde_json::Value::as_i64)
                    .filter(|s| *s > 0)
                    .map(|seconds| TimerState {
                        seconds,
                        started_at: event.created_at,
                    });
            }
            LiveEventType::NextBlock | LiveEventType::PreviousBlock => {}
        }
    }

    /// The block currently on screen; `None` for a lesson without blocks.
    pub fn active_block<'a>(&self, blocks: &'a [LessonBlock]) -> Option<&'a LessonBlock> {
        let id = self.active_block_id?;
        blocks.iter().find(|b| b.id == id)
    }
}

/// Fold a session's events over the blocks of its lesson version.
///
/// Neither slice needs to be pre-sorted.
pub fn replay(blocks: &[LessonBlock], events: &[LiveEvent]) -> PacingState {
    let mut ordered_blocks: Vec<&LessonBlock> = blocks.iter().collect();
    ordered_blocks.sort_by_key(|b| b.sequence_no);
    let block_ids: Vec<LessonBlockId> = ordered_blocks.iter().map(|b| b.id).collect();

    let mut ordered_events: Vec<&LiveEvent> = events.iter().collect();
    ordered_events.sort_by_key(|e| e.sequence_no);

    let mut state = PacingState {
        active_block_id: block_ids.first().copied(),
        ..PacingState::default()
    };
    for event in ordered_events {
        state.apply(&block_ids, event);
    }

    tracing::trace!(
        events = events.len(),
        blocks = blocks.len(),
        active_index = state.active_index,
        "live session replayed"
    );
    state
}

/// The newest [`RECENT_EVENTS_LIMIT`] events, newest first.
pub fn recent_events(events: &[LiveEvent]) -> Vec<&LiveEvent> {
    let mut ordered: Vec<&LiveEvent> = events.iter().collect();
    ordered.sort_by_key(|e| std::cmp::Reverse(e.sequence_no));
    ordered.truncate(RECENT_EVENTS_LIMIT);
    ordered
}
