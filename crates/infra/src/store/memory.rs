use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use classroom_auth::Role;
use classroom_core::{
    AssignmentId, AttemptId, AuthUserId, ClassId, FlagId, LessonBlockId, LessonId, LessonVersionId, LiveSessionId,
    OrganizationId, UserId,
};
use classroom_domain::{
    assignments::{Assignment, Attempt, AttemptAccess},
    audit::AuditEntry,
    classes::{Class, Enrollment, RosterEntry},
    curriculum::{Lesson, LessonBlock, LessonVersion, LibraryEntry, NewLessonBlock, PublishStatus},
    independent::{ProgressUpdate, RuntimeStep, StepCandidate, StepProgress, StepStatus, progress_percent},
    moderation::{ModerationFlag, ResolutionStatus},
    policy::PolicySettings,
    reports::{ExportRow, FunnelRow, TeacherOverviewRow, UsageRollup},
    users::{NewUser, UserRecord},
};
use classroom_live::{GuestParticipant, LiveEvent, LiveEventType, LiveResponse, LiveSession};

use super::{
    AssignmentStore, AuditStore, ClassStore, CurriculumStore, IndependentStore, LiveStore, ModerationStore,
    PolicyStore, ReportStore, StoreError, StoreResult, UserStore,
};

#[derive(Debug, Clone)]
struct StepRow {
    user_id: UserId,
    status: StepStatus,
    score: Option<f64>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ResponseRow {
    attempt_id: AttemptId,
    score: Option<f64>,
    submitted_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, UserRecord>,
    classes: HashMap<ClassId, Class>,
    enrollments: HashMap<(ClassId, UserId), Enrollment>,
    lessons: HashMap<LessonId, Lesson>,
    versions: HashMap<LessonVersionId, LessonVersion>,
    blocks: HashMap<LessonVersionId, Vec<LessonBlock>>,
    assignments: HashMap<AssignmentId, Assignment>,
    attempts: HashMap<AttemptId, Attempt>,
    steps: HashMap<(AttemptId, LessonBlockId), StepRow>,
    responses: Vec<ResponseRow>,
    sessions: HashMap<LiveSessionId, LiveSession>,
    events: HashMap<LiveSessionId, Vec<LiveEvent>>,
    live_responses: HashMap<(LiveSessionId, LessonBlockId, UserId), LiveResponse>,
    participants: Vec<GuestParticipant>,
    flags: HashMap<FlagId, ModerationFlag>,
    policies: HashMap<OrganizationId, PolicySettings>,
    audit: Vec<AuditEntry>,
    usage: Vec<(OrganizationId, UsageRollup)>,
    funnel: Vec<FunnelRow>,
}

impl State {
    fn attempt_in_org(&self, organization_id: OrganizationId, attempt_id: AttemptId) -> Option<(&Attempt, &Assignment)> {
        let attempt = self.attempts.get(&attempt_id)?;
        let assignment = self.assignments.get(&attempt.assignment_id)?;
        (assignment.organization_id == organization_id).then_some((attempt, assignment))
    }

    fn attempt_with_assignment(&self, attempt_id: AttemptId) -> StoreResult<(&Attempt, &Assignment)> {
        let attempt = self
            .attempts
            .get(&attempt_id)
            .ok_or_else(|| StoreError::NotFound(format!("attempt {attempt_id}")))?;
        let assignment = self
            .assignments
            .get(&attempt.assignment_id)
            .ok_or_else(|| StoreError::NotFound(format!("assignment {}", attempt.assignment_id)))?;
        Ok((attempt, assignment))
    }

    fn blocks_of(&self, version_id: LessonVersionId) -> Vec<LessonBlock> {
        let mut blocks = self.blocks.get(&version_id).cloned().unwrap_or_default();
        blocks.sort_by_key(|b| b.sequence_no);
        blocks
    }

    fn step_for(&self, attempt: &Attempt, block_id: LessonBlockId) -> Option<&StepRow> {
        self.steps
            .get(&(attempt.id, block_id))
            .filter(|row| row.user_id == attempt.user_id)
    }
}

/// In-memory store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    /// Load a daily usage rollup (normally produced by the analytics pipeline).
    pub fn seed_usage_rollup(&self, organization_id: OrganizationId, rollup: UsageRollup) -> StoreResult<()> {
        let mut state = self.write()?;
        state
            .usage
            .retain(|(org, r)| !(*org == organization_id && r.metric_date == rollup.metric_date));
        state.usage.push((organization_id, rollup));
        Ok(())
    }

    /// Load a global funnel row (normally produced by the analytics pipeline).
    pub fn seed_funnel_row(&self, row: FunnelRow) -> StoreResult<()> {
        let mut state = self.write()?;
        state.funnel.retain(|r| r.metric_date != row.metric_date);
        state.funnel.push(row);
        Ok(())
    }

    /// Guest participants recorded for a session.
    pub fn participants(&self, session_id: LiveSessionId) -> StoreResult<Vec<GuestParticipant>> {
        let state = self.read()?;
        Ok(state
            .participants
            .iter()
            .filter(|p| p.live_session_id == session_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_user_for_identity(&self, auth_user_id: AuthUserId, email: &str) -> StoreResult<Option<UserRecord>> {
        let state = self.read()?;
        let by_auth = state.users.values().find(|u| u.auth_user_id == Some(auth_user_id));
        let email = email.to_lowercase();
        let found = by_auth.or_else(|| {
            state
                .users
                .values()
                .filter(|u| !email.is_empty() && u.email.to_lowercase() == email)
                .min_by_key(|u| u.id)
        });
        Ok(found.cloned())
    }

    async fn get_user(&self, user_id: UserId) -> StoreResult<Option<UserRecord>> {
        Ok(self.read()?.users.get(&user_id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord> {
        let mut state = self.write()?;
        let email = user.email.to_lowercase();
        if state
            .users
            .values()
            .any(|u| u.auth_user_id == Some(user.auth_user_id) || u.email.to_lowercase() == email)
        {
            return Err(StoreError::Conflict(format!("user {} already exists", user.email)));
        }
        let record = UserRecord {
            id: user.id,
            auth_user_id: Some(user.auth_user_id),
            organization_id: user.organization_id,
            email: user.email,
            display_name: user.display_name,
            roles: Vec::new(),
        };
        state.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn link_auth_user(&self, user_id: UserId, auth_user_id: AuthUserId) -> StoreResult<()> {
        let mut state = self.write()?;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        if user.auth_user_id.is_none() {
            user.auth_user_id = Some(auth_user_id);
        }
        Ok(())
    }

    async fn grant_role(&self, user_id: UserId, role: Role) -> StoreResult<()> {
        let mut state = self.write()?;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        if !user.roles.contains(&role) {
            user.roles.push(role);
        }
        Ok(())
    }
}

#[async_trait]
impl ClassStore for InMemoryStore {
    async fn insert_class(&self, class: &Class) -> StoreResult<()> {
        self.write()?.classes.insert(class.id, class.clone());
        Ok(())
    }

    async fn get_class(&self, organization_id: OrganizationId, class_id: ClassId) -> StoreResult<Option<Class>> {
        let state = self.read()?;
        Ok(state
            .classes
            .get(&class_id)
            .filter(|c| c.organization_id == organization_id)
            .cloned())
    }

    async fn list_classes(&self, organization_id: OrganizationId, teacher: Option<UserId>) -> StoreResult<Vec<Class>> {
        let state = self.read()?;
        let mut classes: Vec<Class> = state
            .classes
            .values()
            .filter(|c| c.organization_id == organization_id)
            .filter(|c| teacher.is_none_or(|t| c.teacher_id == t))
            .cloned()
            .collect();
        classes.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(classes)
    }

    async fn roster(&self, organization_id: OrganizationId, class_id: ClassId) -> StoreResult<Vec<RosterEntry>> {
        let state = self.read()?;
        let mut rows: Vec<RosterEntry> = state
            .enrollments
            .values()
            .filter(|e| e.class_id == class_id)
            .filter_map(|e| {
                let user = state.users.get(&e.user_id)?;
                (user.organization_id == Some(organization_id)).then(|| RosterEntry {
                    user_id: user.id,
                    email: user.email.clone(),
                    status: e.status,
                    accommodations: e.accommodations.clone(),
                })
            })
            .collect();
        rows.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(rows)
    }

    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<Enrollment> {
        let mut state = self.write()?;
        let key = (enrollment.class_id, enrollment.user_id);
        let stored = match state.enrollments.get(&key) {
            Some(existing) => Enrollment {
                enrolled_at: existing.enrolled_at,
                ..enrollment.clone()
            },
            None => enrollment.clone(),
        };
        state.enrollments.insert(key, stored.clone());
        Ok(stored)
    }

    async fn is_enrolled(&self, class_id: ClassId, user_id: UserId) -> StoreResult<bool> {
        Ok(self.read()?.enrollments.contains_key(&(class_id, user_id)))
    }
}

#[async_trait]
impl CurriculumStore for InMemoryStore {
    async fn insert_lesson(&self, lesson: &Lesson) -> StoreResult<()> {
        self.write()?.lessons.insert(lesson.id, lesson.clone());
        Ok(())
    }

    async fn get_lesson(&self, lesson_id: LessonId) -> StoreResult<Option<Lesson>> {
        Ok(self.read()?.lessons.get(&lesson_id).cloned())
    }

    async fn insert_version(&self, version: &LessonVersion) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.lessons.contains_key(&version.lesson_id) {
            return Err(StoreError::NotFound(format!("lesson {}", version.lesson_id)));
        }
        state.versions.insert(version.id, version.clone());
        Ok(())
    }

    async fn get_version(&self, version_id: LessonVersionId) -> StoreResult<Option<LessonVersion>> {
        Ok(self.read()?.versions.get(&version_id).cloned())
    }

    async fn library(&self) -> StoreResult<Vec<LibraryEntry>> {
        let state = self.read()?;
        let mut entries: Vec<LibraryEntry> = state
            .versions
            .values()
            .filter(|v| v.publish_status == PublishStatus::Published)
            .filter_map(|v| {
                let lesson = state.lessons.get(&v.lesson_id)?;
                Some(LibraryEntry {
                    id: lesson.id,
                    title: lesson.title.clone(),
                    grade_band: lesson.grade_band.clone(),
                    lesson_version_id: v.id,
                    version_label: v.version_label.clone(),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.title.cmp(&b.title).then(a.lesson_version_id.cmp(&b.lesson_version_id)));
        Ok(entries)
    }

    async fn append_block(&self, version_id: LessonVersionId, block: NewLessonBlock) -> StoreResult<LessonBlock> {
        let mut state = self.write()?;
        if !state.versions.contains_key(&version_id) {
            return Err(StoreError::NotFound(format!("lesson version {version_id}")));
        }
        let blocks = state.blocks.entry(version_id).or_default();
        let next = blocks.iter().map(|b| b.sequence_no).max().unwrap_or(0) + 1;
        let block = block.into_block(version_id, next);
        blocks.push(block.clone());
        Ok(block)
    }

    async fn list_blocks(&self, version_id: LessonVersionId) -> StoreResult<Vec<LessonBlock>> {
        Ok(self.read()?.blocks_of(version_id))
    }
}

#[async_trait]
impl AssignmentStore for InMemoryStore {
    async fn insert_assignment(&self, assignment: &Assignment) -> StoreResult<()> {
        self.write()?.assignments.insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn get_assignment(
        &self,
        organization_id: OrganizationId,
        assignment_id: AssignmentId,
    ) -> StoreResult<Option<Assignment>> {
        let state = self.read()?;
        Ok(state
            .assignments
            .get(&assignment_id)
            .filter(|a| a.organization_id == organization_id)
            .cloned())
    }

    async fn assignments_for_student(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> StoreResult<Vec<Assignment>> {
        let state = self.read()?;
        let mut rows: Vec<Assignment> = state
            .assignments
            .values()
            .filter(|a| a.organization_id == organization_id)
            .filter(|a| state.enrollments.contains_key(&(a.class_id, user_id)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn start_attempt(&self, attempt: Attempt) -> StoreResult<Attempt> {
        let mut state = self.write()?;
        if let Some(existing) = state
            .attempts
            .values()
            .find(|a| a.assignment_id == attempt.assignment_id && a.user_id == attempt.user_id)
        {
            return Ok(existing.clone());
        }
        state.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    async fn attempt_access(
        &self,
        organization_id: OrganizationId,
        attempt_id: AttemptId,
    ) -> StoreResult<Option<AttemptAccess>> {
        let state = self.read()?;
        Ok(state
            .attempt_in_org(organization_id, attempt_id)
            .and_then(|(attempt, assignment)| {
                let class = state.classes.get(&assignment.class_id)?;
                Some(AttemptAccess {
                    student_id: attempt.user_id,
                    teacher_id: class.teacher_id,
                })
            }))
    }
}

#[async_trait]
impl IndependentStore for InMemoryStore {
    async fn record_progress(&self, update: &ProgressUpdate) -> StoreResult<i32> {
        let mut state = self.write()?;
        let version_id = state.attempt_with_assignment(update.attempt_id)?.1.lesson_version_id;

        state.steps.insert(
            (update.attempt_id, update.lesson_block_id),
            StepRow {
                user_id: update.user_id,
                status: update.status,
                score: update.score,
                updated_at: update.submitted_at,
            },
        );
        state.responses.push(ResponseRow {
            attempt_id: update.attempt_id,
            score: update.score,
            submitted_at: update.submitted_at,
        });

        let blocks = state.blocks_of(version_id);
        let completed = blocks
            .iter()
            .filter(|b| {
                state
                    .steps
                    .get(&(update.attempt_id, b.id))
                    .is_some_and(|s| s.status == StepStatus::Completed)
            })
            .count();
        let percent = progress_percent(completed, blocks.len());
        if let Some(attempt) = state.attempts.get_mut(&update.attempt_id) {
            attempt.progress_percent = percent;
        }
        Ok(percent)
    }

    async fn list_step_progress(&self, attempt_id: AttemptId) -> StoreResult<Vec<StepProgress>> {
        let state = self.read()?;
        let mut rows: Vec<StepProgress> = state
            .steps
            .iter()
            .filter(|((attempt, _), _)| *attempt == attempt_id)
            .map(|((_, block), row)| StepProgress {
                lesson_block_id: *block,
                status: row.status,
                score: row.score,
                updated_at: row.updated_at,
            })
            .collect();
        rows.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.lesson_block_id.cmp(&b.lesson_block_id)));
        Ok(rows)
    }

    async fn step_candidates(&self, attempt_id: AttemptId) -> StoreResult<Vec<StepCandidate>> {
        let state = self.read()?;
        let (attempt, assignment) = state.attempt_with_assignment(attempt_id)?;
        Ok(state
            .blocks_of(assignment.lesson_version_id)
            .into_iter()
            .map(|b| {
                let step = state.step_for(attempt, b.id);
                StepCandidate {
                    lesson_block_id: b.id,
                    sequence_no: b.sequence_no,
                    remediation_config: b.remediation_config,
                    mastery_rules: b.mastery_rules,
                    status: step.map(|s| s.status),
                    score: step.and_then(|s| s.score),
                }
            })
            .collect())
    }

    async fn runtime(&self, organization_id: OrganizationId, attempt_id: AttemptId) -> StoreResult<Vec<RuntimeStep>> {
        let state = self.read()?;
        let Some((attempt, assignment)) = state.attempt_in_org(organization_id, attempt_id) else {
            return Ok(Vec::new());
        };
        Ok(state
            .blocks_of(assignment.lesson_version_id)
            .into_iter()
            .map(|b| {
                let step = state.step_for(attempt, b.id);
                RuntimeStep {
                    attempt_id: attempt.id,
                    attempt_user_id: attempt.user_id,
                    progress_percent: attempt.progress_percent,
                    lesson_block_id: b.id,
                    sequence_no: b.sequence_no,
                    block_type: b.block_type,
                    title: b.title,
                    body: b.body,
                    mastery_rules: b.mastery_rules,
                    status: step.map(|s| s.status),
                    score: step.and_then(|s| s.score),
                }
            })
            .collect())
    }
}

#[async_trait]
impl LiveStore for InMemoryStore {
    async fn insert_session(&self, session: &LiveSession) -> StoreResult<()> {
        let mut state = self.write()?;
        if state
            .sessions
            .values()
            .any(|s| !s.is_ended() && s.session_code == session.session_code)
        {
            return Err(StoreError::Conflict(format!("session code {} in use", session.session_code)));
        }
        state.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(
        &self,
        organization_id: OrganizationId,
        session_id: LiveSessionId,
    ) -> StoreResult<Option<LiveSession>> {
        let state = self.read()?;
        Ok(state
            .sessions
            .get(&session_id)
            .filter(|s| s.organization_id == organization_id)
            .cloned())
    }

    async fn find_open_session_by_code(&self, code: &str) -> StoreResult<Option<LiveSession>> {
        let state = self.read()?;
        Ok(state
            .sessions
            .values()
            .find(|s| !s.is_ended() && s.session_code == code)
            .cloned())
    }

    async fn end_session(&self, session_id: LiveSessionId, now: DateTime<Utc>) -> StoreResult<LiveSession> {
        let mut state = self.write()?;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| StoreError::NotFound(format!("live session {session_id}")))?;
        session.ended_at.get_or_insert(now);
        Ok(session.clone())
    }

    async fn append_event(
        &self,
        session_id: LiveSessionId,
        actor_user_id: UserId,
        event_type: LiveEventType,
        event_payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<LiveEvent> {
        let mut state = self.write()?;
        match state.sessions.get(&session_id) {
            None => return Err(StoreError::NotFound(format!("live session {session_id}"))),
            Some(session) if session.is_ended() => {
                return Err(StoreError::Conflict(format!("live session {session_id} has ended")));
            }
            Some(_) => {}
        }
        let log = state.events.entry(session_id).or_default();
        let next = log.last().map(|e| e.sequence_no).unwrap_or(0) + 1;
        let event = LiveEvent::new(session_id, actor_user_id, next, event_type, event_payload, now);
        log.push(event.clone());
        Ok(event)
    }

    async fn list_events(&self, session_id: LiveSessionId) -> StoreResult<Vec<LiveEvent>> {
        Ok(self.read()?.events.get(&session_id).cloned().unwrap_or_default())
    }

    async fn upsert_live_response(&self, response: &LiveResponse) -> StoreResult<()> {
        let key = (response.live_session_id, response.lesson_block_id, response.user_id);
        self.write()?.live_responses.insert(key, response.clone());
        Ok(())
    }

    async fn insert_participant(&self, participant: &GuestParticipant) -> StoreResult<()> {
        self.write()?.participants.push(participant.clone());
        Ok(())
    }
}

#[async_trait]
impl ModerationStore for InMemoryStore {
    async fn insert_flag(&self, flag: &ModerationFlag) -> StoreResult<()> {
        self.write()?.flags.insert(flag.id, flag.clone());
        Ok(())
    }

    async fn open_flags(&self, scope: Option<OrganizationId>) -> StoreResult<Vec<ModerationFlag>> {
        let state = self.read()?;
        let mut flags: Vec<ModerationFlag> = state
            .flags
            .values()
            .filter(|f| f.resolution_status == ResolutionStatus::Open)
            .filter(|f| scope.is_none_or(|org| f.organization_id == org))
            .cloned()
            .collect();
        flags.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(flags)
    }

    async fn resolve_flag(
        &self,
        scope: Option<OrganizationId>,
        flag_id: FlagId,
        status: ResolutionStatus,
        resolved_by: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<ModerationFlag>> {
        let mut state = self.write()?;
        let Some(flag) = state
            .flags
            .get_mut(&flag_id)
            .filter(|f| scope.is_none_or(|org| f.organization_id == org))
        else {
            return Ok(None);
        };
        flag.resolution_status = status;
        flag.resolved_by_user_id = Some(resolved_by);
        flag.resolved_at = Some(now);
        Ok(Some(flag.clone()))
    }
}

#[async_trait]
impl PolicyStore for InMemoryStore {
    async fn upsert_policy(&self, settings: &PolicySettings) -> StoreResult<()> {
        self.write()?.policies.insert(settings.organization_id, settings.clone());
        Ok(())
    }

    async fn get_policy(&self, organization_id: OrganizationId) -> StoreResult<Option<PolicySettings>> {
        Ok(self.read()?.policies.get(&organization_id).cloned())
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn insert_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.write()?.audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit(&self, scope: Option<OrganizationId>, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        let state = self.read()?;
        let mut rows: Vec<AuditEntry> = state
            .audit
            .iter()
            .filter(|e| scope.is_none_or(|org| e.organization_id == org))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[async_trait]
impl ReportStore for InMemoryStore {
    async fn teacher_overview(
        &self,
        organization_id: OrganizationId,
        teacher_id: UserId,
    ) -> StoreResult<Vec<TeacherOverviewRow>> {
        let state = self.read()?;
        let mut rows: Vec<TeacherOverviewRow> = state
            .classes
            .values()
            .filter(|c| c.organization_id == organization_id && c.teacher_id == teacher_id)
            .map(|c| TeacherOverviewRow {
                class_id: c.id,
                class_name: c.name.clone(),
                roster_count: state.enrollments.keys().filter(|(class, _)| *class == c.id).count() as i64,
            })
            .collect();
        rows.sort_by(|a, b| a.class_name.cmp(&b.class_name));
        Ok(rows)
    }

    async fn usage_rollups(&self, organization_id: OrganizationId, limit: usize) -> StoreResult<Vec<UsageRollup>> {
        let state = self.read()?;
        let mut rows: Vec<UsageRollup> = state
            .usage
            .iter()
            .filter(|(org, _)| *org == organization_id)
            .map(|(_, r)| r.clone())
            .collect();
        rows.sort_by(|a, b| b.metric_date.cmp(&a.metric_date));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn global_funnel(&self, limit: usize) -> StoreResult<Vec<FunnelRow>> {
        let state = self.read()?;
        let mut rows = state.funnel.clone();
        rows.sort_by(|a, b| b.metric_date.cmp(&a.metric_date));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn teacher_export(
        &self,
        organization_id: OrganizationId,
        teacher_id: UserId,
        limit: usize,
    ) -> StoreResult<Vec<ExportRow>> {
        let state = self.read()?;
        let mut rows: Vec<ExportRow> = state
            .responses
            .iter()
            .filter_map(|r| {
                let attempt = state.attempts.get(&r.attempt_id)?;
                let assignment = state.assignments.get(&attempt.assignment_id)?;
                let class = state.classes.get(&assignment.class_id)?;
                if class.organization_id != organization_id || class.teacher_id != teacher_id {
                    return None;
                }
                let student = state.users.get(&attempt.user_id)?;
                Some(ExportRow {
                    class_name: class.name.clone(),
                    student_email: student.email.clone(),
                    score: r.score,
                    submitted_at: r.submitted_at,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        rows.truncate(limit);
        Ok(rows)
    }
}
