//! Lessons, versions and their ordered blocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use classroom_core::{DomainResult, LessonBlockId, LessonId, LessonVersionId};

use crate::validate_non_empty;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub title: String,
    pub grade_band: String,
    pub created_at: DateTime<Utc>,
}

impl Lesson {
    pub fn create(title: String, grade_band: String, now: DateTime<Utc>) -> DomainResult<Self> {
        validate_non_empty("title", &title)?;
        validate_non_empty("gradeBand", &grade_band)?;
        Ok(Self {
            id: LessonId::new(),
            title,
            grade_band,
            created_at: now,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Draft,
    Published,
    Archived,
}

impl PublishStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishStatus::Draft => "draft",
            PublishStatus::Published => "published",
            PublishStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PublishStatus::Draft),
            "published" => Some(PublishStatus::Published),
            "archived" => Some(PublishStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonVersion {
    pub id: LessonVersionId,
    pub lesson_id: LessonId,
    pub version_label: String,
    pub publish_status: PublishStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl LessonVersion {
    /// A version that is published immediately.
    pub fn publish(lesson_id: LessonId, version_label: String, now: DateTime<Utc>) -> DomainResult<Self> {
        validate_non_empty("versionLabel", &version_label)?;
        Ok(Self {
            id: LessonVersionId::new(),
            lesson_id,
            version_label,
            publish_status: PublishStatus::Published,
            published_at: Some(now),
            created_at: now,
        })
    }
}

/// A published lesson version as shown in the curriculum library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub id: LessonId,
    pub title: String,
    pub grade_band: String,
    pub lesson_version_id: LessonVersionId,
    pub version_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonBlock {
    pub id: LessonBlockId,
    pub lesson_version_id: LessonVersionId,
    /// 1-based position within the version.
    pub sequence_no: i32,
    pub block_type: String,
    pub title: String,
    pub body: serde_json::Value,
    /// e.g. `{"minimumScore": 70}`
    pub mastery_rules: Option<serde_json::Value>,
    pub remediation_config: Option<serde_json::Value>,
}

/// Block content supplied by an author; the store assigns id and position.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLessonBlock {
    pub block_type: String,
    pub title: String,
    pub body: serde_json::Value,
    pub mastery_rules: Option<serde_json::Value>,
    pub remediation_config: Option<serde_json::Value>,
}

impl NewLessonBlock {
    pub fn validate(&self) -> DomainResult<()> {
        validate_non_empty("blockType", &self.block_type)?;
        validate_non_empty("title", &self.title)
    }

    pub fn into_block(self, lesson_version_id: LessonVersionId, sequence_no: i32) -> LessonBlock {
        LessonBlock {
            id: LessonBlockId::new(),
            lesson_version_id,
            sequence_no,
            block_type: self.block_type,
            title: self.title,
            body: self.body,
            mastery_rules: self.mastery_rules,
            remediation_config: self.remediation_config,
        }
    }
}

/// `minimumScore` from a block's mastery rules, when it is a positive number.
pub fn minimum_score(mastery_rules: Option<&serde_json::Value>) -> Option<f64> {
    mastery_rules
        .and_then(|rules| rules.get("minimumScore"))
        .and_then(serde_json::Value::as_f64)
        .filter(|min| *min > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimum_score_reads_positive_numbers_only() {
        assert_eq!(minimum_score(Some(&json!({"minimumScore": 70}))), Some(70.0));
        assert_eq!(minimum_score(Some(&json!({"minimumScore": 0}))), None);
        assert_eq!(minimum_score(Some(&json!({"minimumScore": "70"}))), None);
        assert_eq!(minimum_score(Some(&json!({}))), None);
        assert_eq!(minimum_score(None), None);
    }

    #[test]
    fn publish_sets_status_and_timestamp() {
        let now = Utc::now();
        let v = LessonVersion::publish(LessonId::new(), "v2".into(), now).unwrap();
        assert_eq!(v.publish_status, PublishStatus::Published);
        assert_eq!(v.published_at, Some(now));
        assert!(LessonVersion::publish(LessonId::new(), "".into(), now).is_err());
    }

    #[test]
    fn new_block_requires_type_and_title() {
        let block = NewLessonBlock {
            block_type: "prompt".into(),
            title: "".into(),
            body: json!({}),
            mastery_rules: None,
            remediation_config: None,
        };
        assert!(block.validate().is_err());
    }
}
