//! Live sessions: pacing events, the ordered per-session event log, and the
//! replay that reconstructs which block is currently on screen.
//!
//! Nothing here talks to storage or sockets. The log is the source of truth;
//! [`replay`] folds it into a [`PacingState`] on every read.

pub mod broadcast;
pub mod envelope;
pub mod event;
pub mod replay;
pub mod session;
pub mod session_code;

pub use broadcast::LiveBroadcast;
pub use envelope::LiveEvent;
pub use event::LiveEventType;
pub use replay::{PacingState, RECENT_EVENTS_LIMIT, TimerState, recent_events, replay};
pub use session::{GuestParticipant, JoinKind, LiveResponse, LiveSession};
pub use session_code::{
    SESSION_CODE_LEN, generate_session_code, generate_session_code_with, normalize_session_code,
};
