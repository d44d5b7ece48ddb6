//! Independent-study progress and next-step selection.
//!
//! A student works through the blocks of the assigned lesson version at their
//! own pace. Each block carries a step status; the next step is chosen from the
//! ordered list of blocks joined with the student's progress:
//!
//! 1. the first block never touched (or still `locked`) is the next candidate;
//! 2. otherwise the first block that is not `completed`, or whose score falls
//!    short of the block's `minimumScore`, needs remediation;
//! 3. otherwise the attempt is complete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use classroom_auth::{AuthContext, Role};
use classroom_core::{AttemptId, DomainError, DomainResult, LessonBlockId, UserId};

use crate::assignments::AttemptAccess;
use crate::curriculum::minimum_score;
use crate::validate_confidence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Locked,
    Unlocked,
    Completed,
    Retry,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Locked => "locked",
            StepStatus::Unlocked => "unlocked",
            StepStatus::Completed => "completed",
            StepStatus::Retry => "retry",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "locked" => Some(StepStatus::Locked),
            "unlocked" => Some(StepStatus::Unlocked),
            "completed" => Some(StepStatus::Completed),
            "retry" => Some(StepStatus::Retry),
            _ => None,
        }
    }
}

/// A progress report for one block of an attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub attempt_id: AttemptId,
    pub lesson_block_id: LessonBlockId,
    pub user_id: UserId,
    pub status: StepStatus,
    pub score: Option<f64>,
    pub confidence: Option<i16>,
    pub response_payload: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(score) = self.score {
            if !(0.0..=100.0).contains(&score) {
                return Err(DomainError::validation("score must be between 0 and 100"));
            }
        }
        validate_confidence(self.confidence)?;
        if !self.response_payload.is_object() {
            return Err(DomainError::validation("responsePayload must be an object"));
        }
        Ok(())
    }
}

/// Current progress of one block (`attempt_step_progress`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepProgress {
    pub lesson_block_id: LessonBlockId,
    pub status: StepStatus,
    pub score: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// A block of the attempt's lesson joined with the student's progress on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCandidate {
    pub lesson_block_id: LessonBlockId,
    pub sequence_no: i32,
    pub remediation_config: Option<serde_json::Value>,
    pub mastery_rules: Option<serde_json::Value>,
    pub status: Option<StepStatus>,
    pub score: Option<f64>,
}

impl StepCandidate {
    fn below_mastery(&self) -> bool {
        match (self.score, minimum_score(self.mastery_rules.as_ref())) {
            (Some(score), Some(min)) => score < min,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStepReason {
    NextUnlockedCandidate,
    RemediationRetry,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStep {
    pub next_step: Option<StepCandidate>,
    pub reason: NextStepReason,
}

/// Choose the next step from blocks ordered by `sequence_no`.
pub fn next_step(steps: &[StepCandidate]) -> NextStep {
    if let Some(step) = steps
        .iter()
        .find(|s| matches!(s.status, None | Some(StepStatus::Locked)))
    {
        return NextStep {
            next_step: Some(step.clone()),
            reason: NextStepReason::NextUnlockedCandidate,
        };
    }

    if let Some(step) = steps
        .iter()
        .find(|s| s.status != Some(StepStatus::Completed) || s.below_mastery())
    {
        return NextStep {
            next_step: Some(step.clone()),
            reason: NextStepReason::RemediationRetry,
        };
    }

    NextStep {
        next_step: None,
        reason: NextStepReason::Completed,
    }
}

/// Share of completed blocks, rounded down; 0 for a lesson without blocks.
pub fn progress_percent(completed: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    ((completed.min(total) * 100) / total) as i32
}

/// One row of the attempt runtime view: block content plus the student's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStep {
    pub attempt_id: AttemptId,
    pub attempt_user_id: UserId,
    pub progress_percent: i32,
    pub lesson_block_id: LessonBlockId,
    pub sequence_no: i32,
    pub block_type: String,
    pub title: String,
    pub body: serde_json::Value,
    pub mastery_rules: Option<serde_json::Value>,
    pub status: Option<StepStatus>,
    pub score: Option<f64>,
}

/// Attempt detail and next-step views: owning student or the class teacher.
pub fn can_view_attempt(context: &AuthContext, access: AttemptAccess) -> bool {
    (context.has_role(&Role::STUDENT) && access.student_id == context.app_user_id)
        || (context.has_role(&Role::TEACHER) && access.teacher_id == context.app_user_id)
}

/// Runtime view: owning student or any teacher of the organization.
pub fn can_view_runtime(context: &AuthContext, attempt_user_id: UserId) -> bool {
    (context.has_role(&Role::STUDENT) && attempt_user_id == context.app_user_id)
        || context.has_role(&Role::TEACHER)
}
