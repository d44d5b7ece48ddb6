//! Postgres-backed store.
//!
//! All queries are runtime-checked (`sqlx::query` + `bind`); the schema lives in
//! `migrations/schema.sql` and is applied by [`PostgresStore::migrate`].
//!
//! ## Error mapping
//!
//! | PostgreSQL code | StoreError | Scenario |
//! |---|---|---|
//! | `23505` | `Conflict` | unique violation (duplicate email, session code, sequence number) |
//! | `23503` | `NotFound` | foreign key points at a missing row |
//! | other / non-database | `Backend` | connection, decoding, constraint checks |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use classroom_auth::Role;
use classroom_core::{
    AssignmentId, AttemptId, AuthUserId, ClassId, FlagId, LessonId, LessonVersionId, LiveSessionId, OrganizationId,
    UserId,
};
use classroom_domain::{
    assignments::{Assignment, Attempt, AttemptAccess},
    audit::AuditEntry,
    classes::{Class, Enrollment, EnrollmentStatus, RosterEntry},
    curriculum::{Lesson, LessonBlock, LessonVersion, LibraryEntry, NewLessonBlock, PublishStatus},
    independent::{ProgressUpdate, RuntimeStep, StepCandidate, StepProgress, StepStatus, progress_percent},
    moderation::{FlagReason, ModerationFlag, ResolutionStatus, SourceType},
    policy::{PiiFilterLevel, PolicySettings},
    reports::{ExportRow, FunnelRow, TeacherOverviewRow, UsageRollup},
    users::{NewUser, UserRecord},
};
use classroom_live::{GuestParticipant, LiveEvent, LiveEventType, LiveResponse, LiveSession};

use super::{
    AssignmentStore, AuditStore, ClassStore, CurriculumStore, IndependentStore, LiveStore, ModerationStore,
    PolicyStore, ReportStore, StoreError, StoreResult, UserStore,
};

const SCHEMA: &str = include_str!("../../migrations/schema.sql");

const LOCK_SESSION_FOR_APPEND: &str = "SELECT ended_at FROM live_sessions WHERE id = $1 FOR UPDATE";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema. Safe to run on every start.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::NotFound(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn decode_error(what: &str, value: &str) -> sqlx::Error {
    sqlx::Error::Decode(format!("unknown {what} '{value}'").into())
}

fn rows<T>(
    operation: &str,
    rows: Vec<PgRow>,
    decode: impl Fn(&PgRow) -> Result<T, sqlx::Error>,
) -> StoreResult<Vec<T>> {
    rows.iter()
        .map(|r| decode(r).map_err(|e| map_sqlx_error(operation, e)))
        .collect()
}

fn user_from_row(row: &PgRow) -> Result<UserRecord, sqlx::Error> {
    let roles: Vec<String> = row.try_get("roles")?;
    Ok(UserRecord {
        id: UserId::from_uuid(row.try_get("id")?),
        auth_user_id: row.try_get::<Option<Uuid>, _>("auth_user_id")?.map(AuthUserId::from_uuid),
        organization_id: row.try_get::<Option<Uuid>, _>("organization_id")?.map(OrganizationId::from_uuid),
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        roles: roles.iter().filter_map(|r| Role::parse_known(r)).collect(),
    })
}

fn class_from_row(row: &PgRow) -> Result<Class, sqlx::Error> {
    Ok(Class {
        id: ClassId::from_uuid(row.try_get("id")?),
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        teacher_id: UserId::from_uuid(row.try_get("teacher_id")?),
        name: row.try_get("name")?,
        grade_band: row.try_get("grade_band")?,
        created_at: row.try_get("created_at")?,
    })
}

fn enrollment_status(row: &PgRow) -> Result<EnrollmentStatus, sqlx::Error> {
    let raw: String = row.try_get("status")?;
    EnrollmentStatus::parse(&raw).ok_or_else(|| decode_error("enrollment status", &raw))
}

fn version_from_row(row: &PgRow) -> Result<LessonVersion, sqlx::Error> {
    let status: String = row.try_get("publish_status")?;
    Ok(LessonVersion {
        id: LessonVersionId::from_uuid(row.try_get("id")?),
        lesson_id: LessonId::from_uuid(row.try_get("lesson_id")?),
        version_label: row.try_get("version_label")?,
        publish_status: PublishStatus::parse(&status).ok_or_else(|| decode_error("publish status", &status))?,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn block_from_row(row: &PgRow) -> Result<LessonBlock, sqlx::Error> {
    Ok(LessonBlock {
        id: classroom_core::LessonBlockId::from_uuid(row.try_get("id")?),
        lesson_version_id: LessonVersionId::from_uuid(row.try_get("lesson_version_id")?),
        sequence_no: row.try_get("sequence_no")?,
        block_type: row.try_get("block_type")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        mastery_rules: row.try_get("mastery_rules")?,
        remediation_config: row.try_get("remediation_config")?,
    })
}

fn assignment_from_row(row: &PgRow) -> Result<Assignment, sqlx::Error> {
    Ok(Assignment {
        id: AssignmentId::from_uuid(row.try_get("id")?),
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        class_id: ClassId::from_uuid(row.try_get("class_id")?),
        lesson_version_id: LessonVersionId::from_uuid(row.try_get("lesson_version_id")?),
        assigned_by_user_id: UserId::from_uuid(row.try_get("assigned_by_user_id")?),
        due_at: row.try_get("due_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn attempt_from_row(row: &PgRow) -> Result<Attempt, sqlx::Error> {
    Ok(Attempt {
        id: AttemptId::from_uuid(row.try_get("id")?),
        assignment_id: AssignmentId::from_uuid(row.try_get("assignment_id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        started_at: row.try_get("started_at")?,
        progress_percent: row.try_get("progress_percent")?,
    })
}

fn step_status(row: &PgRow) -> Result<Option<StepStatus>, sqlx::Error> {
    let raw: Option<String> = row.try_get("status")?;
    raw.map(|s| StepStatus::parse(&s).ok_or_else(|| decode_error("step status", &s)))
        .transpose()
}

fn session_from_row(row: &PgRow) -> Result<LiveSession, sqlx::Error> {
    Ok(LiveSession {
        id: LiveSessionId::from_uuid(row.try_get("id")?),
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        class_id: ClassId::from_uuid(row.try_get("class_id")?),
        lesson_version_id: LessonVersionId::from_uuid(row.try_get("lesson_version_id")?),
        host_teacher_id: UserId::from_uuid(row.try_get("host_teacher_id")?),
        session_code: row.try_get("session_code")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

fn event_from_row(row: &PgRow) -> Result<LiveEvent, sqlx::Error> {
    let event_type: String = row.try_get("event_type")?;
    Ok(LiveEvent {
        id: classroom_core::LiveEventId::from_uuid(row.try_get("id")?),
        live_session_id: LiveSessionId::from_uuid(row.try_get("live_session_id")?),
        actor_user_id: UserId::from_uuid(row.try_get("actor_user_id")?),
        sequence_no: row.try_get("sequence_no")?,
        event_type: LiveEventType::parse(&event_type).ok_or_else(|| decode_error("event type", &event_type))?,
        event_payload: row.try_get("event_payload")?,
        created_at: row.try_get("created_at")?,
    })
}

fn flag_from_row(row: &PgRow) -> Result<ModerationFlag, sqlx::Error> {
    let source_type: String = row.try_get("source_type")?;
    let flag_reason: String = row.try_get("flag_reason")?;
    let status: String = row.try_get("resolution_status")?;
    Ok(ModerationFlag {
        id: FlagId::from_uuid(row.try_get("id")?),
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        source_type: SourceType::parse(&source_type).ok_or_else(|| decode_error("source type", &source_type))?,
        source_id: row.try_get("source_id")?,
        flag_reason: FlagReason::parse(&flag_reason).ok_or_else(|| decode_error("flag reason", &flag_reason))?,
        details: row.try_get("details")?,
        created_by_user_id: UserId::from_uuid(row.try_get("created_by_user_id")?),
        resolution_status: ResolutionStatus::parse(&status).ok_or_else(|| decode_error("resolution", &status))?,
        resolved_by_user_id: row.try_get::<Option<Uuid>, _>("resolved_by_user_id")?.map(UserId::from_uuid),
        resolved_at: row.try_get("resolved_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn policy_from_row(row: &PgRow) -> Result<PolicySettings, sqlx::Error> {
    let level: String = row.try_get("pii_filter_level")?;
    Ok(PolicySettings {
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        data_retention_days: row.try_get("data_retention_days")?,
        allow_guest_live_join: row.try_get("allow_guest_live_join")?,
        pii_filter_level: PiiFilterLevel::parse(&level).ok_or_else(|| decode_error("pii filter level", &level))?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn audit_from_row(row: &PgRow) -> Result<AuditEntry, sqlx::Error> {
    Ok(AuditEntry {
        id: classroom_core::AuditEntryId::from_uuid(row.try_get("id")?),
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        actor_user_id: UserId::from_uuid(row.try_get("actor_user_id")?),
        action_key: row.try_get("action_key")?,
        target_type: row.try_get("target_type")?,
        target_id: row.try_get("target_id")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

const USER_SELECT: &str = r#"
    SELECT
        u.id,
        u.auth_user_id,
        u.organization_id,
        u.email,
        u.display_name,
        COALESCE(
            array_agg(ur.role_key ORDER BY ur.created_at, ur.role_key) FILTER (WHERE ur.role_key IS NOT NULL),
            ARRAY[]::text[]
        ) AS roles
    FROM users u
    LEFT JOIN user_roles ur ON ur.user_id = u.id
"#;

#[async_trait]
impl UserStore for PostgresStore {
    #[instrument(skip(self, email), fields(auth_user_id = %auth_user_id), err)]
    async fn find_user_for_identity(&self, auth_user_id: AuthUserId, email: &str) -> StoreResult<Option<UserRecord>> {
        let sql = format!(
            "{USER_SELECT}
            WHERE u.auth_user_id = $1 OR ($2 <> '' AND lower(u.email) = lower($2))
            GROUP BY u.id
            ORDER BY (u.auth_user_id IS NOT DISTINCT FROM $1) DESC, u.created_at ASC
            LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(auth_user_id.as_uuid())
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_for_identity", e))?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_user_for_identity", e))
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn get_user(&self, user_id: UserId) -> StoreResult<Option<UserRecord>> {
        let sql = format!("{USER_SELECT} WHERE u.id = $1 GROUP BY u.id");
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_user", e))
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord> {
        sqlx::query(
            r#"
            INSERT INTO users (id, auth_user_id, organization_id, email, display_name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(user.auth_user_id.as_uuid())
        .bind(user.organization_id.map(|o| *o.as_uuid()))
        .bind(&user.email)
        .bind(&user.display_name)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_user", e))?;

        Ok(UserRecord {
            id: user.id,
            auth_user_id: Some(user.auth_user_id),
            organization_id: user.organization_id,
            email: user.email,
            display_name: user.display_name,
            roles: Vec::new(),
        })
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn link_auth_user(&self, user_id: UserId, auth_user_id: AuthUserId) -> StoreResult<()> {
        sqlx::query("UPDATE users SET auth_user_id = $1, updated_at = NOW() WHERE id = $2 AND auth_user_id IS NULL")
            .bind(auth_user_id.as_uuid())
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("link_auth_user", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id, role = %role), err)]
    async fn grant_role(&self, user_id: UserId, role: Role) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_key, created_at) VALUES ($1, $2, clock_timestamp())
             ON CONFLICT (user_id, role_key) DO NOTHING",
        )
        .bind(user_id.as_uuid())
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("grant_role", e))?;
        Ok(())
    }
}

#[async_trait]
impl ClassStore for PostgresStore {
    #[instrument(skip(self, class), fields(class_id = %class.id), err)]
    async fn insert_class(&self, class: &Class) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO classes (id, organization_id, teacher_id, name, grade_band, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(class.id.as_uuid())
        .bind(class.organization_id.as_uuid())
        .bind(class.teacher_id.as_uuid())
        .bind(&class.name)
        .bind(&class.grade_band)
        .bind(class.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_class", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_class(&self, organization_id: OrganizationId, class_id: ClassId) -> StoreResult<Option<Class>> {
        let row = sqlx::query(
            "SELECT id, organization_id, teacher_id, name, grade_band, created_at
             FROM classes WHERE id = $1 AND organization_id = $2",
        )
        .bind(class_id.as_uuid())
        .bind(organization_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_class", e))?;
        row.as_ref()
            .map(class_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_class", e))
    }

    #[instrument(skip(self), err)]
    async fn list_classes(&self, organization_id: OrganizationId, teacher: Option<UserId>) -> StoreResult<Vec<Class>> {
        let found = sqlx::query(
            r#"
            SELECT id, organization_id, teacher_id, name, grade_band, created_at
            FROM classes
            WHERE organization_id = $1 AND ($2::uuid IS NULL OR teacher_id = $2)
            ORDER BY name ASC, id ASC
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(teacher.map(|t| *t.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_classes", e))?;
        rows("list_classes", found, class_from_row)
    }

    #[instrument(skip(self), err)]
    async fn roster(&self, organization_id: OrganizationId, class_id: ClassId) -> StoreResult<Vec<RosterEntry>> {
        let found = sqlx::query(
            r#"
            SELECT ce.user_id, u.email, ce.status, ce.accommodations
            FROM class_enrollments ce
            JOIN users u ON u.id = ce.user_id
            WHERE ce.class_id = $1 AND u.organization_id = $2
            ORDER BY u.email ASC
            "#,
        )
        .bind(class_id.as_uuid())
        .bind(organization_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("roster", e))?;
        rows("roster", found, |row| {
            Ok(RosterEntry {
                user_id: UserId::from_uuid(row.try_get("user_id")?),
                email: row.try_get("email")?,
                status: enrollment_status(row)?,
                accommodations: row.try_get("accommodations")?,
            })
        })
    }

    #[instrument(skip(self, enrollment), fields(class_id = %enrollment.class_id, user_id = %enrollment.user_id), err)]
    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<Enrollment> {
        let row = sqlx::query(
            r#"
            INSERT INTO class_enrollments (class_id, user_id, status, accommodations, enrolled_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (class_id, user_id)
            DO UPDATE SET status = EXCLUDED.status, accommodations = EXCLUDED.accommodations
            RETURNING enrolled_at
            "#,
        )
        .bind(enrollment.class_id.as_uuid())
        .bind(enrollment.user_id.as_uuid())
        .bind(enrollment.status.as_str())
        .bind(&enrollment.accommodations)
        .bind(enrollment.enrolled_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_enrollment", e))?;
        let enrolled_at = row
            .try_get("enrolled_at")
            .map_err(|e| map_sqlx_error("upsert_enrollment", e))?;
        Ok(Enrollment {
            enrolled_at,
            ..enrollment.clone()
        })
    }

    #[instrument(skip(self), err)]
    async fn is_enrolled(&self, class_id: ClassId, user_id: UserId) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 AS one FROM class_enrollments WHERE class_id = $1 AND user_id = $2")
            .bind(class_id.as_uuid())
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("is_enrolled", e))?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl CurriculumStore for PostgresStore {
    #[instrument(skip(self, lesson), fields(lesson_id = %lesson.id), err)]
    async fn insert_lesson(&self, lesson: &Lesson) -> StoreResult<()> {
        sqlx::query("INSERT INTO lessons (id, title, grade_band, created_at) VALUES ($1, $2, $3, $4)")
            .bind(lesson.id.as_uuid())
            .bind(&lesson.title)
            .bind(&lesson.grade_band)
            .bind(lesson.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_lesson", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_lesson(&self, lesson_id: LessonId) -> StoreResult<Option<Lesson>> {
        let row = sqlx::query("SELECT id, title, grade_band, created_at FROM lessons WHERE id = $1")
            .bind(lesson_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_lesson", e))?;
        row.as_ref()
            .map(|row| -> Result<Lesson, sqlx::Error> {
                Ok(Lesson {
                    id: LessonId::from_uuid(row.try_get("id")?),
                    title: row.try_get("title")?,
                    grade_band: row.try_get("grade_band")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .transpose()
            .map_err(|e| map_sqlx_error("get_lesson", e))
    }

    #[instrument(skip(self, version), fields(version_id = %version.id), err)]
    async fn insert_version(&self, version: &LessonVersion) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO lesson_versions (id, lesson_id, version_label, publish_status, published_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(version.id.as_uuid())
        .bind(version.lesson_id.as_uuid())
        .bind(&version.version_label)
        .bind(version.publish_status.as_str())
        .bind(version.published_at)
        .bind(version.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_version", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_version(&self, version_id: LessonVersionId) -> StoreResult<Option<LessonVersion>> {
        let row = sqlx::query(
            "SELECT id, lesson_id, version_label, publish_status, published_at, created_at
             FROM lesson_versions WHERE id = $1",
        )
        .bind(version_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_version", e))?;
        row.as_ref()
            .map(version_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_version", e))
    }

    #[instrument(skip(self), err)]
    async fn library(&self) -> StoreResult<Vec<LibraryEntry>> {
        let found = sqlx::query(
            r#"
            SELECT l.id, l.title, l.grade_band, lv.id AS lesson_version_id, lv.version_label
            FROM lessons l
            JOIN lesson_versions lv ON lv.lesson_id = l.id
            WHERE lv.publish_status = 'published'
            ORDER BY l.title ASC, lv.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("library", e))?;
        rows("library", found, |row| {
            Ok(LibraryEntry {
                id: LessonId::from_uuid(row.try_get("id")?),
                title: row.try_get("title")?,
                grade_band: row.try_get("grade_band")?,
                lesson_version_id: LessonVersionId::from_uuid(row.try_get("lesson_version_id")?),
                version_label: row.try_get("version_label")?,
            })
        })
    }

    #[instrument(skip(self, block), fields(version_id = %version_id), err)]
    async fn append_block(&self, version_id: LessonVersionId, block: NewLessonBlock) -> StoreResult<LessonBlock> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Serialize appends per version so sequence numbers stay dense.
        let locked = sqlx::query("SELECT id FROM lesson_versions WHERE id = $1 FOR UPDATE")
            .bind(version_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("append_block", e))?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("lesson version {version_id}")));
        }

        let next: i32 = sqlx::query(
            "SELECT COALESCE(MAX(sequence_no), 0) + 1 AS next FROM lesson_blocks WHERE lesson_version_id = $1",
        )
        .bind(version_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .and_then(|row| row.try_get("next"))
        .map_err(|e| map_sqlx_error("append_block", e))?;

        let block = block.into_block(version_id, next);
        sqlx::query(
            r#"
            INSERT INTO lesson_blocks
                (id, lesson_version_id, sequence_no, block_type, title, body, mastery_rules, remediation_config)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(block.id.as_uuid())
        .bind(version_id.as_uuid())
        .bind(block.sequence_no)
        .bind(&block.block_type)
        .bind(&block.title)
        .bind(&block.body)
        .bind(&block.mastery_rules)
        .bind(&block.remediation_config)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("append_block", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(block)
    }

    #[instrument(skip(self), err)]
    async fn list_blocks(&self, version_id: LessonVersionId) -> StoreResult<Vec<LessonBlock>> {
        let found = sqlx::query(
            r#"
            SELECT id, lesson_version_id, sequence_no, block_type, title, body, mastery_rules, remediation_config
            FROM lesson_blocks
            WHERE lesson_version_id = $1
            ORDER BY sequence_no ASC
            "#,
        )
        .bind(version_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_blocks", e))?;
        rows("list_blocks", found, block_from_row)
    }
}

#[async_trait]
impl AssignmentStore for PostgresStore {
    #[instrument(skip(self, assignment), fields(assignment_id = %assignment.id), err)]
    async fn insert_assignment(&self, assignment: &Assignment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO assignments
                (id, organization_id, class_id, lesson_version_id, assigned_by_user_id, due_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(assignment.id.as_uuid())
        .bind(assignment.organization_id.as_uuid())
        .bind(assignment.class_id.as_uuid())
        .bind(assignment.lesson_version_id.as_uuid())
        .bind(assignment.assigned_by_user_id.as_uuid())
        .bind(assignment.due_at)
        .bind(assignment.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_assignment", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_assignment(
        &self,
        organization_id: OrganizationId,
        assignment_id: AssignmentId,
    ) -> StoreResult<Option<Assignment>> {
        let row = sqlx::query(
            r#"
            SELECT id, organization_id, class_id, lesson_version_id, assigned_by_user_id, due_at, created_at
            FROM assignments
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(assignment_id.as_uuid())
        .bind(organization_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_assignment", e))?;
        row.as_ref()
            .map(assignment_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_assignment", e))
    }

    #[instrument(skip(self), err)]
    async fn assignments_for_student(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
    ) -> StoreResult<Vec<Assignment>> {
        let found = sqlx::query(
            r#"
            SELECT a.id, a.organization_id, a.class_id, a.lesson_version_id, a.assigned_by_user_id, a.due_at, a.created_at
            FROM assignments a
            JOIN class_enrollments ce ON ce.class_id = a.class_id
            WHERE ce.user_id = $1 AND a.organization_id = $2
            ORDER BY a.created_at DESC, a.id DESC
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(organization_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("assignments_for_student", e))?;
        rows("assignments_for_student", found, assignment_from_row)
    }

    #[instrument(skip(self, attempt), fields(assignment_id = %attempt.assignment_id, user_id = %attempt.user_id), err)]
    async fn start_attempt(&self, attempt: Attempt) -> StoreResult<Attempt> {
        let row = sqlx::query(
            r#"
            INSERT INTO independent_attempts (id, assignment_id, user_id, started_at, progress_percent)
            VALUES ($1, $2, $3, $4, 0)
            ON CONFLICT (assignment_id, user_id)
            DO UPDATE SET started_at = independent_attempts.started_at
            RETURNING id, assignment_id, user_id, started_at, progress_percent
            "#,
        )
        .bind(attempt.id.as_uuid())
        .bind(attempt.assignment_id.as_uuid())
        .bind(attempt.user_id.as_uuid())
        .bind(attempt.started_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("start_attempt", e))?;
        attempt_from_row(&row).map_err(|e| map_sqlx_error("start_attempt", e))
    }

    #[instrument(skip(self), err)]
    async fn attempt_access(
        &self,
        organization_id: OrganizationId,
        attempt_id: AttemptId,
    ) -> StoreResult<Option<AttemptAccess>> {
        let row = sqlx::query(
            r#"
            SELECT ia.user_id, c.teacher_id
            FROM independent_attempts ia
            JOIN assignments a ON a.id = ia.assignment_id
            JOIN classes c ON c.id = a.class_id
            WHERE ia.id = $1 AND a.organization_id = $2
            "#,
        )
        .bind(attempt_id.as_uuid())
        .bind(organization_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("attempt_access", e))?;
        row.as_ref()
            .map(|row| -> Result<AttemptAccess, sqlx::Error> {
                Ok(AttemptAccess {
                    student_id: UserId::from_uuid(row.try_get("user_id")?),
                    teacher_id: UserId::from_uuid(row.try_get("teacher_id")?),
                })
            })
            .transpose()
            .map_err(|e| map_sqlx_error("attempt_access", e))
    }
}

#[async_trait]
impl IndependentStore for PostgresStore {
    #[instrument(skip(self, update), fields(attempt_id = %update.attempt_id, block_id = %update.lesson_block_id), err)]
    async fn record_progress(&self, update: &ProgressUpdate) -> StoreResult<i32> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO attempt_step_progress
                (independent_attempt_id, lesson_block_id, user_id, status, score, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (independent_attempt_id, lesson_block_id, user_id)
            DO UPDATE SET status = EXCLUDED.status, score = EXCLUDED.score, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(update.attempt_id.as_uuid())
        .bind(update.lesson_block_id.as_uuid())
        .bind(update.user_id.as_uuid())
        .bind(update.status.as_str())
        .bind(update.score)
        .bind(update.submitted_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("record_progress", e))?;

        sqlx::query(
            r#"
            INSERT INTO attempt_responses
                (independent_attempt_id, lesson_block_id, user_id, response_payload, confidence, score, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(update.attempt_id.as_uuid())
        .bind(update.lesson_block_id.as_uuid())
        .bind(update.user_id.as_uuid())
        .bind(&update.response_payload)
        .bind(update.confidence)
        .bind(update.score)
        .bind(update.submitted_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("record_progress", e))?;

        let counts = sqlx::query(
            r#"
            SELECT
                COUNT(lb.id) AS total,
                COUNT(asp.lesson_block_id) FILTER (WHERE asp.status = 'completed') AS completed
            FROM independent_attempts ia
            JOIN assignments a ON a.id = ia.assignment_id
            JOIN lesson_blocks lb ON lb.lesson_version_id = a.lesson_version_id
            LEFT JOIN attempt_step_progress asp
                ON asp.independent_attempt_id = ia.id
                AND asp.lesson_block_id = lb.id
                AND asp.user_id = ia.user_id
            WHERE ia.id = $1
            "#,
        )
        .bind(update.attempt_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("record_progress", e))?;
        let total: i64 = counts.try_get("total").map_err(|e| map_sqlx_error("record_progress", e))?;
        let completed: i64 = counts
            .try_get("completed")
            .map_err(|e| map_sqlx_error("record_progress", e))?;
        let percent = progress_percent(completed.max(0) as usize, total.max(0) as usize);

        sqlx::query("UPDATE independent_attempts SET progress_percent = $1 WHERE id = $2")
            .bind(percent)
            .bind(update.attempt_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("record_progress", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(percent)
    }

    #[instrument(skip(self), err)]
    async fn list_step_progress(&self, attempt_id: AttemptId) -> StoreResult<Vec<StepProgress>> {
        let found = sqlx::query(
            r#"
            SELECT lesson_block_id, status, score, updated_at
            FROM attempt_step_progress
            WHERE independent_attempt_id = $1
            ORDER BY updated_at ASC, lesson_block_id ASC
            "#,
        )
        .bind(attempt_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_step_progress", e))?;
        rows("list_step_progress", found, |row| {
            let raw: String = row.try_get("status")?;
            Ok(StepProgress {
                lesson_block_id: classroom_core::LessonBlockId::from_uuid(row.try_get("lesson_block_id")?),
                status: StepStatus::parse(&raw).ok_or_else(|| decode_error("step status", &raw))?,
                score: row.try_get("score")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
    }

    #[instrument(skip(self), err)]
    async fn step_candidates(&self, attempt_id: AttemptId) -> StoreResult<Vec<StepCandidate>> {
        let found = sqlx::query(
            r#"
            SELECT lb.id AS lesson_block_id, lb.sequence_no, lb.remediation_config, lb.mastery_rules, asp.status, asp.score
            FROM independent_attempts ia
            JOIN assignments a ON a.id = ia.assignment_id
            JOIN lesson_blocks lb ON lb.lesson_version_id = a.lesson_version_id
            LEFT JOIN attempt_step_progress asp
                ON asp.independent_attempt_id = ia.id
                AND asp.lesson_block_id = lb.id
                AND asp.user_id = ia.user_id
            WHERE ia.id = $1
            ORDER BY lb.sequence_no ASC
            "#,
        )
        .bind(attempt_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("step_candidates", e))?;
        rows("step_candidates", found, |row| {
            Ok(StepCandidate {
                lesson_block_id: classroom_core::LessonBlockId::from_uuid(row.try_get("lesson_block_id")?),
                sequence_no: row.try_get("sequence_no")?,
                remediation_config: row.try_get("remediation_config")?,
                mastery_rules: row.try_get("mastery_rules")?,
                status: step_status(row)?,
                score: row.try_get("score")?,
            })
        })
    }

    #[instrument(skip(self), err)]
    async fn runtime(&self, organization_id: OrganizationId, attempt_id: AttemptId) -> StoreResult<Vec<RuntimeStep>> {
        let found = sqlx::query(
            r#"
            SELECT
                ia.id AS attempt_id,
                ia.user_id AS attempt_user_id,
                ia.progress_percent,
                lb.id AS lesson_block_id,
                lb.sequence_no,
                lb.block_type,
                lb.title,
                lb.body,
                lb.mastery_rules,
                asp.status,
                asp.score
            FROM independent_attempts ia
            JOIN assignments a ON a.id = ia.assignment_id
            JOIN lesson_blocks lb ON lb.lesson_version_id = a.lesson_version_id
            LEFT JOIN attempt_step_progress asp
                ON asp.independent_attempt_id = ia.id
                AND asp.lesson_block_id = lb.id
                AND asp.user_id = ia.user_id
            WHERE ia.id = $1 AND a.organization_id = $2
            ORDER BY lb.sequence_no ASC
            "#,
        )
        .bind(attempt_id.as_uuid())
        .bind(organization_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("runtime", e))?;
        rows("runtime", found, |row| {
            Ok(RuntimeStep {
                attempt_id: AttemptId::from_uuid(row.try_get("attempt_id")?),
                attempt_user_id: UserId::from_uuid(row.try_get("attempt_user_id")?),
                progress_percent: row.try_get("progress_percent")?,
                lesson_block_id: classroom_core::LessonBlockId::from_uuid(row.try_get("lesson_block_id")?),
                sequence_no: row.try_get("sequence_no")?,
                block_type: row.try_get("block_type")?,
                title: row.try_get("title")?,
                body: row.try_get("body")?,
                mastery_rules: row.try_get("mastery_rules")?,
                status: step_status(row)?,
                score: row.try_get("score")?,
            })
        })
    }
}

const SESSION_COLUMNS: &str =
    "id, organization_id, class_id, lesson_version_id, host_teacher_id, session_code, started_at, ended_at";

#[async_trait]
impl LiveStore for PostgresStore {
    #[instrument(skip(self, session), fields(session_id = %session.id), err)]
    async fn insert_session(&self, session: &LiveSession) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO live_sessions
                (id, organization_id, class_id, lesson_version_id, host_teacher_id, session_code, started_at, ended_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(session.id.as_uuid())
        .bind(session.organization_id.as_uuid())
        .bind(session.class_id.as_uuid())
        .bind(session.lesson_version_id.as_uuid())
        .bind(session.host_teacher_id.as_uuid())
        .bind(&session.session_code)
        .bind(session.started_at)
        .bind(session.ended_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_session", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_session(
        &self,
        organization_id: OrganizationId,
        session_id: LiveSessionId,
    ) -> StoreResult<Option<LiveSession>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM live_sessions WHERE id = $1 AND organization_id = $2");
        let row = sqlx::query(&sql)
            .bind(session_id.as_uuid())
            .bind(organization_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_session", e))?;
        row.as_ref()
            .map(session_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_session", e))
    }

    #[instrument(skip(self, code), err)]
    async fn find_open_session_by_code(&self, code: &str) -> StoreResult<Option<LiveSession>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM live_sessions WHERE session_code = $1 AND ended_at IS NULL");
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_open_session_by_code", e))?;
        row.as_ref()
            .map(session_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_open_session_by_code", e))
    }

    #[instrument(skip(self), err)]
    async fn end_session(&self, session_id: LiveSessionId, now: DateTime<Utc>) -> StoreResult<LiveSession> {
        let sql = format!(
            "UPDATE live_sessions SET ended_at = COALESCE(ended_at, $2) WHERE id = $1 RETURNING {SESSION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(session_id.as_uuid())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("end_session", e))?
            .ok_or_else(|| StoreError::NotFound(format!("live session {session_id}")))?;
        session_from_row(&row).map_err(|e| map_sqlx_error("end_session", e))
    }

    #[instrument(skip(self, event_payload), fields(session_id = %session_id, event_type = %event_type), err)]
    async fn append_event(
        &self,
        session_id: LiveSessionId,
        actor_user_id: UserId,
        event_type: LiveEventType,
        event_payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<LiveEvent> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // The session row lock orders appends against each other and against `end_session`.
        let ended_at: Option<Option<DateTime<Utc>>> =
            sqlx::query(LOCK_SESSION_FOR_APPEND)
                .bind(session_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .and_then(|row| row.map(|r| r.try_get("ended_at")).transpose())
                .map_err(|e| map_sqlx_error("append_event", e))?;
        match ended_at {
            None => return Err(StoreError::NotFound(format!("live session {session_id}"))),
            Some(Some(_)) => return Err(StoreError::Conflict(format!("live session {session_id} has ended"))),
            Some(None) => {}
        }

        let event_id = classroom_core::LiveEventId::new();
        let sequence_no: i64 = sqlx::query(
            r#"
            INSERT INTO live_session_events
                (id, live_session_id, actor_user_id, sequence_no, event_type, event_payload, created_at)
            SELECT $1, $2, $3, COALESCE(MAX(sequence_no), 0) + 1, $4, $5, $6
            FROM live_session_events
            WHERE live_session_id = $2
            RETURNING sequence_no
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(session_id.as_uuid())
        .bind(actor_user_id.as_uuid())
        .bind(event_type.as_str())
        .bind(&event_payload)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .and_then(|row| row.try_get("sequence_no"))
        .map_err(|e| map_sqlx_error("append_event", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;

        Ok(LiveEvent {
            id: event_id,
            live_session_id: session_id,
            actor_user_id,
            sequence_no,
            event_type,
            event_payload,
            created_at: now,
        })
    }

    #[instrument(skip(self), err)]
    async fn list_events(&self, session_id: LiveSessionId) -> StoreResult<Vec<LiveEvent>> {
        let found = sqlx::query(
            r#"
            SELECT id, live_session_id, actor_user_id, sequence_no, event_type, event_payload, created_at
            FROM live_session_events
            WHERE live_session_id = $1
            ORDER BY sequence_no ASC
            "#,
        )
        .bind(session_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_events", e))?;
        rows("list_events", found, event_from_row)
    }

    #[instrument(skip(self, response), fields(session_id = %response.live_session_id), err)]
    async fn upsert_live_response(&self, response: &LiveResponse) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO live_responses
                (live_session_id, lesson_block_id, user_id, response_payload, confidence, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (live_session_id, lesson_block_id, user_id)
            DO UPDATE SET
                response_payload = EXCLUDED.response_payload,
                confidence = EXCLUDED.confidence,
                submitted_at = EXCLUDED.submitted_at
            "#,
        )
        .bind(response.live_session_id.as_uuid())
        .bind(response.lesson_block_id.as_uuid())
        .bind(response.user_id.as_uuid())
        .bind(&response.response_payload)
        .bind(response.confidence)
        .bind(response.submitted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_live_response", e))?;
        Ok(())
    }

    #[instrument(skip(self, participant), fields(session_id = %participant.live_session_id), err)]
    async fn insert_participant(&self, participant: &GuestParticipant) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO live_session_participants
                (id, live_session_id, organization_id, user_id, display_name, join_kind, joined_at)
            VALUES ($1, $2, $3, NULL, $4, $5, $6)
            "#,
        )
        .bind(participant.id)
        .bind(participant.live_session_id.as_uuid())
        .bind(participant.organization_id.as_uuid())
        .bind(&participant.display_name)
        .bind(participant.join_kind.as_str())
        .bind(participant.joined_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_participant", e))?;
        Ok(())
    }
}

const FLAG_COLUMNS: &str = "id, organization_id, source_type, source_id, flag_reason, details, created_by_user_id, \
                            resolution_status, resolved_by_user_id, resolved_at, created_at";

#[async_trait]
impl ModerationStore for PostgresStore {
    #[instrument(skip(self, flag), fields(flag_id = %flag.id), err)]
    async fn insert_flag(&self, flag: &ModerationFlag) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO moderation_flags
                (id, organization_id, source_type, source_id, flag_reason, details, created_by_user_id,
                 resolution_status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(flag.id.as_uuid())
        .bind(flag.organization_id.as_uuid())
        .bind(flag.source_type.as_str())
        .bind(flag.source_id)
        .bind(flag.flag_reason.as_str())
        .bind(&flag.details)
        .bind(flag.created_by_user_id.as_uuid())
        .bind(flag.resolution_status.as_str())
        .bind(flag.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_flag", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn open_flags(&self, scope: Option<OrganizationId>) -> StoreResult<Vec<ModerationFlag>> {
        let sql = format!(
            "SELECT {FLAG_COLUMNS} FROM moderation_flags
             WHERE resolution_status = 'open' AND ($1::uuid IS NULL OR organization_id = $1)
             ORDER BY created_at DESC, id DESC"
        );
        let found = sqlx::query(&sql)
            .bind(scope.map(|o| *o.as_uuid()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("open_flags", e))?;
        rows("open_flags", found, flag_from_row)
    }

    #[instrument(skip(self), err)]
    async fn resolve_flag(
        &self,
        scope: Option<OrganizationId>,
        flag_id: FlagId,
        status: ResolutionStatus,
        resolved_by: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<ModerationFlag>> {
        let sql = format!(
            "UPDATE moderation_flags
             SET resolution_status = $3, resolved_by_user_id = $4, resolved_at = $5
             WHERE id = $1 AND ($2::uuid IS NULL OR organization_id = $2)
             RETURNING {FLAG_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(flag_id.as_uuid())
            .bind(scope.map(|o| *o.as_uuid()))
            .bind(status.as_str())
            .bind(resolved_by.as_uuid())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("resolve_flag", e))?;
        row.as_ref()
            .map(flag_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("resolve_flag", e))
    }
}

#[async_trait]
impl PolicyStore for PostgresStore {
    #[instrument(skip(self, settings), fields(organization_id = %settings.organization_id), err)]
    async fn upsert_policy(&self, settings: &PolicySettings) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO organization_policy_settings
                (organization_id, data_retention_days, allow_guest_live_join, pii_filter_level, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (organization_id)
            DO UPDATE SET
                data_retention_days = EXCLUDED.data_retention_days,
                allow_guest_live_join = EXCLUDED.allow_guest_live_join,
                pii_filter_level = EXCLUDED.pii_filter_level,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(settings.organization_id.as_uuid())
        .bind(settings.data_retention_days)
        .bind(settings.allow_guest_live_join)
        .bind(settings.pii_filter_level.as_str())
        .bind(settings.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_policy", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_policy(&self, organization_id: OrganizationId) -> StoreResult<Option<PolicySettings>> {
        let row = sqlx::query(
            r#"
            SELECT organization_id, data_retention_days, allow_guest_live_join, pii_filter_level, updated_at
            FROM organization_policy_settings
            WHERE organization_id = $1
            "#,
        )
        .bind(organization_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_policy", e))?;
        row.as_ref()
            .map(policy_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("get_policy", e))
    }
}

#[async_trait]
impl AuditStore for PostgresStore {
    #[instrument(skip(self, entry), fields(action_key = %entry.action_key), err)]
    async fn insert_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (id, organization_id, actor_user_id, action_key, target_type, target_id, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.organization_id.as_uuid())
        .bind(entry.actor_user_id.as_uuid())
        .bind(&entry.action_key)
        .bind(&entry.target_type)
        .bind(entry.target_id)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_audit", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_audit(&self, scope: Option<OrganizationId>, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        let found = sqlx::query(
            r#"
            SELECT id, organization_id, actor_user_id, action_key, target_type, target_id, metadata, created_at
            FROM audit_logs
            WHERE ($1::uuid IS NULL OR organization_id = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(scope.map(|o| *o.as_uuid()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_audit", e))?;
        rows("list_audit", found, audit_from_row)
    }
}

#[async_trait]
impl ReportStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn teacher_overview(
        &self,
        organization_id: OrganizationId,
        teacher_id: UserId,
    ) -> StoreResult<Vec<TeacherOverviewRow>> {
        let found = sqlx::query(
            r#"
            SELECT c.id AS class_id, c.name AS class_name, COUNT(ce.user_id) AS roster_count
            FROM classes c
            LEFT JOIN class_enrollments ce ON ce.class_id = c.id
            WHERE c.teacher_id = $1 AND c.organization_id = $2
            GROUP BY c.id, c.name
            ORDER BY c.name ASC
            "#,
        )
        .bind(teacher_id.as_uuid())
        .bind(organization_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("teacher_overview", e))?;
        rows("teacher_overview", found, |row| {
            Ok(TeacherOverviewRow {
                class_id: ClassId::from_uuid(row.try_get("class_id")?),
                class_name: row.try_get("class_name")?,
                roster_count: row.try_get("roster_count")?,
            })
        })
    }

    #[instrument(skip(self), err)]
    async fn usage_rollups(&self, organization_id: OrganizationId, limit: usize) -> StoreResult<Vec<UsageRollup>> {
        let found = sqlx::query(
            r#"
            SELECT metric_date, active_teachers, active_students, completion_rate
            FROM analytics_daily_rollups
            WHERE organization_id = $1
            ORDER BY metric_date DESC
            LIMIT $2
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("usage_rollups", e))?;
        rows("usage_rollups", found, |row| {
            Ok(UsageRollup {
                metric_date: row.try_get("metric_date")?,
                active_teachers: row.try_get("active_teachers")?,
                active_students: row.try_get("active_students")?,
                completion_rate: row.try_get("completion_rate")?,
            })
        })
    }

    #[instrument(skip(self), err)]
    async fn global_funnel(&self, limit: usize) -> StoreResult<Vec<FunnelRow>> {
        let found = sqlx::query(
            r#"
            SELECT metric_date, total_joins, total_starts, total_finishes, retention_d7
            FROM global_analytics_daily
            ORDER BY metric_date DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("global_funnel", e))?;
        rows("global_funnel", found, |row| {
            Ok(FunnelRow {
                metric_date: row.try_get("metric_date")?,
                total_joins: row.try_get("total_joins")?,
                total_starts: row.try_get("total_starts")?,
                total_finishes: row.try_get("total_finishes")?,
                retention_d7: row.try_get("retention_d7")?,
            })
        })
    }

    #[instrument(skip(self), err)]
    async fn teacher_export(
        &self,
        organization_id: OrganizationId,
        teacher_id: UserId,
        limit: usize,
    ) -> StoreResult<Vec<ExportRow>> {
        let found = sqlx::query(
            r#"
            SELECT c.name AS class_name, u.email AS student_email, ar.score, ar.submitted_at
            FROM classes c
            JOIN assignments a ON a.class_id = c.id
            JOIN independent_attempts ia ON ia.assignment_id = a.id
            JOIN attempt_responses ar ON ar.independent_attempt_id = ia.id
            JOIN users u ON u.id = ia.user_id
            WHERE c.teacher_id = $1 AND c.organization_id = $2
            ORDER BY ar.submitted_at DESC
            LIMIT $3
            "#,
        )
        .bind(teacher_id.as_uuid())
        .bind(organization_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("teacher_export", e))?;
        rows("teacher_export", found, |row| {
            Ok(ExportRow {
                class_name: row.try_get("class_name")?,
                student_email: row.try_get("student_email")?,
                score: row.try_get("score")?,
                submitted_at: row.try_get("submitted_at")?,
            })
        })
    }
}
