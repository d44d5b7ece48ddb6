//! Persistence boundary.
//!
//! Each domain area has its own async trait; [`Store`] bundles them so the API
//! can hold a single `Arc<dyn Store>`. Two implementations exist:
//!
//! - [`InMemoryStore`]: `RwLock`-guarded maps for dev and tests
//! - [`PostgresStore`]: sqlx over a `PgPool`
//!
//! Tenant scoping is part of every signature that reads tenant data: callers
//! pass the organization and implementations filter on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use classroom_auth::Role;
use classroom_core::{
    AssignmentId, AttemptId, AuthUserId, ClassId, FlagId, LessonId, LessonVersionId, LiveSessionId, OrganizationId,
    UserId,
};
use classroom_domain::{
    assignments::{Assignment, Attempt, AttemptAccess},
    audit::AuditEntry,
    classes::{Class, Enrollment, RosterEntry},
    curriculum::{Lesson, LessonBlock, LessonVersion, LibraryEntry, NewLessonBlock},
    independent::{ProgressUpdate, RuntimeStep, StepCandidate, StepProgress},
    moderation::{ModerationFlag, ResolutionStatus},
    policy::PolicySettings,
    reports::{ExportRow, FunnelRow, TeacherOverviewRow, UsageRollup},
    users::{NewUser, UserRecord},
};
use classroom_live::{GuestParticipant, LiveEvent, LiveEventType, LiveResponse, LiveSession};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Storage operation error.
///
/// Infrastructure failures, as opposed to the domain's validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A row the operation depends on does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Anything else the backend reported (connection, decoding, poisoned lock).
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Match by identity-provider id, or by email ignoring case.
    async fn find_user_for_identity(&self, auth_user_id: AuthUserId, email: &str) -> StoreResult<Option<UserRecord>>;
    async fn get_user(&self, user_id: UserId) -> StoreResult<Option<UserRecord>>;
    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord>;
    /// Set `auth_user_id` only when the user has none yet.
    async fn link_auth_user(&self, user_id: UserId, auth_user_id: AuthUserId) -> StoreResult<()>;
    /// Idempotent.
    async fn grant_role(&self, user_id: UserId, role: Role) -> StoreResult<()>;
}

#[async_trait]
pub trait ClassStore: Send + Sync {
    async fn insert_class(&self, class: &Class) -> StoreResult<()>;
    async fn get_class(&self, organization_id: OrganizationId, class_id: ClassId) -> StoreResult<Option<Class>>;
    /// Classes of the organization, optionally only those taught by `teacher`, ordered by name.
    async fn list_classes(&self, organization_id: OrganizationId, teacher: Option<UserId>) -> StoreResult<Vec<Class>>;
    /// Enrolled users of the organization, ordered by email.
    async fn roster(&self, organization_id: OrganizationId, class_id: ClassId) -> StoreResult<Vec<RosterEntry>>;
    /// Insert or reactivate; `enrolled_at` of an existing row is kept.
    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<Enrollment>;
    async fn is_enrolled(&self, class_id: ClassId, user_id: UserId) -> StoreResult<bool>;
}

#[async_trait]
pub trait CurriculumStore: Send + Sync {
    async fn insert_lesson(&self, lesson: &Lesson) -> StoreResult<()>;
    async fn get_lesson(&self, lesson_id: LessonId) -> StoreResult<Option<Lesson>>;
    async fn insert_version(&self, version: &LessonVersion) -> StoreResult<()>;
    async fn get_version(&self, version_id: LessonVersionId) -> StoreResult<Option<LessonVersion>>;
    /// Published versions joined with their lesson, ordered by title.
    async fn library(&self) -> StoreResult<Vec<LibraryEntry>>;
    /// Append at the next sequence number of the version.
    async fn append_block(&self, version_id: LessonVersionId, block: NewLessonBlock) -> StoreResult<LessonBlock>;
    /// Ordered by sequence number.
    async fn list_blocks(&self, version_id: LessonVersionId) -> StoreResult<Vec<LessonBlock>>;
}

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn insert_assignment(&self, assignment: &Assignment) -> StoreResult<()>;
    async fn get_assignment(
        &self,
        organization_id: OrganizationId,
        assignment_id: AssignmentId,
    ) -> StoreResult<Option<Assignment>>;
    /// Assignments of classes the student is enrolled in, newest first.
    async fn assignments_for_student(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> StoreResult<Vec<Assignment>>;
    /// One attempt per (assignment, student); an existing attempt is returned unchanged.
    async fn start_attempt(&self, attempt: Attempt) -> StoreResult<Attempt>;
    /// Owner and class teacher of an attempt within the organization.
    async fn attempt_access(
        &self,
        organization_id: OrganizationId,
        attempt_id: AttemptId,
    ) -> StoreResult<Option<AttemptAccess>>;
}

#[async_trait]
pub trait IndependentStore: Send + Sync {
    /// Upsert step progress, append the response and recompute the attempt's
    /// progress. Returns the new progress percentage.
    async fn record_progress(&self, update: &ProgressUpdate) -> StoreResult<i32>;
    /// Ordered by update time.
    async fn list_step_progress(&self, attempt_id: AttemptId) -> StoreResult<Vec<StepProgress>>;
    /// Blocks of the attempt's lesson joined with progress, ordered by sequence.
    async fn step_candidates(&self, attempt_id: AttemptId) -> StoreResult<Vec<StepCandidate>>;
    async fn runtime(&self, organization_id: OrganizationId, attempt_id: AttemptId) -> StoreResult<Vec<RuntimeStep>>;
}

#[async_trait]
pub trait LiveStore: Send + Sync {
    /// Fails with `Conflict` when an open session already uses the code.
    async fn insert_session(&self, session: &LiveSession) -> StoreResult<()>;
    async fn get_session(
        &self,
        organization_id: OrganizationId,
        session_id: LiveSessionId,
    ) -> StoreResult<Option<LiveSession>>;
    async fn find_open_session_by_code(&self, code: &str) -> StoreResult<Option<LiveSession>>;
    /// Idempotent; the first end time wins.
    async fn end_session(&self, session_id: LiveSessionId, now: DateTime<Utc>) -> StoreResult<LiveSession>;
    /// Append at the next per-session sequence number.
    async fn append_event(
        &self,
        session_id: LiveSessionId,
        actor_user_id: UserId,
        event_type: LiveEventType,
        event_payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<LiveEvent>;
    /// Ordered by sequence number.
    async fn list_events(&self, session_id: LiveSessionId) -> StoreResult<Vec<LiveEvent>>;
    async fn upsert_live_response(&self, response: &LiveResponse) -> StoreResult<()>;
    async fn insert_participant(&self, participant: &GuestParticipant) -> StoreResult<()>;
}

#[async_trait]
pub trait ModerationStore: Send + Sync {
    async fn insert_flag(&self, flag: &ModerationFlag) -> StoreResult<()>;
    /// Open flags, newest first; `None` scope means every organization.
    async fn open_flags(&self, scope: Option<OrganizationId>) -> StoreResult<Vec<ModerationFlag>>;
    /// `None` when the flag is not visible in the scope.
    async fn resolve_flag(
        &self,
        scope: Option<OrganizationId>,
        flag_id: FlagId,
        status: ResolutionStatus,
        resolved_by: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<ModerationFlag>>;
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn upsert_policy(&self, settings: &PolicySettings) -> StoreResult<()>;
    async fn get_policy(&self, organization_id: OrganizationId) -> StoreResult<Option<PolicySettings>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert_audit(&self, entry: &AuditEntry) -> StoreResult<()>;
    /// Newest first; `None` scope means every organization.
    async fn list_audit(&self, scope: Option<OrganizationId>, limit: usize) -> StoreResult<Vec<AuditEntry>>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn teacher_overview(
        &self,
        organization_id: OrganizationId,
        teacher_id: UserId,
    ) -> StoreResult<Vec<TeacherOverviewRow>>;
    /// Newest day first.
    async fn usage_rollups(&self, organization_id: OrganizationId, limit: usize) -> StoreResult<Vec<UsageRollup>>;
    /// Newest day first.
    async fn global_funnel(&self, limit: usize) -> StoreResult<Vec<FunnelRow>>;
    /// Responses to the teacher's assignments, newest first.
    async fn teacher_export(
        &self,
        organization_id: OrganizationId,
        teacher_id: UserId,
        limit: usize,
    ) -> StoreResult<Vec<ExportRow>>;
}

/// Everything the API needs from storage.
pub trait Store:
    UserStore
    + ClassStore
    + CurriculumStore
    + AssignmentStore
    + IndependentStore
    + LiveStore
    + ModerationStore
    + PolicyStore
    + AuditStore
    + ReportStore
{
}

impl<T> Store for T where
    T: UserStore
        + ClassStore
        + CurriculumStore
        + AssignmentStore
        + IndependentStore
        + LiveStore
        + ModerationStore
        + PolicyStore
        + AuditStore
        + ReportStore
{
}
