//! Shared primitives for the classroom platform: typed identifiers and the
//! error raised when untrusted input does not form a valid domain value.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{
    AssignmentId, AttemptId, AuditEntryId, AuthUserId, ClassId, FlagId, LessonBlockId, LessonId,
    LessonVersionId, LiveEventId, LiveSessionId, OrganizationId, UserId,
};
