//! Assignments of lesson versions to classes, and the attempts students start on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use classroom_core::{AssignmentId, AttemptId, ClassId, LessonVersionId, OrganizationId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub organization_id: OrganizationId,
    pub class_id: ClassId,
    pub lesson_version_id: LessonVersionId,
    pub assigned_by_user_id: UserId,
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    pub fn create(
        organization_id: OrganizationId,
        class_id: ClassId,
        lesson_version_id: LessonVersionId,
        assigned_by_user_id: UserId,
        due_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AssignmentId::new(),
            organization_id,
            class_id,
            lesson_version_id,
            assigned_by_user_id,
            due_at,
            created_at: now,
        }
    }
}

/// An independent-study attempt. Unique per (assignment, student).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub assignment_id: AssignmentId,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub progress_percent: i32,
}

impl Attempt {
    pub fn start(assignment_id: AssignmentId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: AttemptId::new(),
            assignment_id,
            user_id,
            started_at: now,
            progress_percent: 0,
        }
    }
}

/// Who may look at an attempt: the student who owns it, or the teacher of its class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptAccess {
    pub student_id: UserId,
    pub teacher_id: UserId,
}
