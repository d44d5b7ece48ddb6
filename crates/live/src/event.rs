use serde::{Deserialize, Serialize};

/// A pacing command issued by the host teacher.
///
/// Events are facts: once appended to a session log they are never edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveEventType {
    NextBlock,
    PreviousBlock,
    Lock,
    Unlock,
    Timer,
    RevealResults,
    PinAnswer,
}

impl LiveEventType {
    pub const ALL: [LiveEventType; 7] = [
        LiveEventType::NextBlock,
        LiveEventType::PreviousBlock,
        LiveEventType::Lock,
        LiveEventType::Unlock,
        LiveEventType::Timer,
        LiveEventType::RevealResults,
        LiveEventType::PinAnswer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LiveEventType::NextBlock => "next_block",
            LiveEventType::PreviousBlock => "previous_block",
            LiveEventType::Lock => "lock",
            LiveEventType::Unlock => "unlock",
            LiveEventType::Timer => "timer",
            LiveEventType::RevealResults => "reveal_results",
            LiveEventType::PinAnswer => "pin_answer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl core::fmt::Display for LiveEventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
