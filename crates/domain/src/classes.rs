//! Classes, enrollments and roster visibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use classroom_auth::{AuthContext, Role};
use classroom_core::{ClassId, DomainResult, OrganizationId, UserId};

use crate::validate_non_empty;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub id: ClassId,
    pub organization_id: OrganizationId,
    pub teacher_id: UserId,
    pub name: String,
    pub grade_band: String,
    pub created_at: DateTime<Utc>,
}

impl Class {
    pub fn create(
        organization_id: OrganizationId,
        teacher_id: UserId,
        name: String,
        grade_band: String,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        validate_non_empty("name", &name)?;
        validate_non_empty("gradeBand", &grade_band)?;
        Ok(Self {
            id: ClassId::new(),
            organization_id,
            teacher_id,
            name,
            grade_band,
            created_at: now,
        })
    }

    pub fn is_taught_by(&self, user_id: UserId) -> bool {
        self.teacher_id == user_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Withdrawn,
}

impl EnrollmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(EnrollmentStatus::Active),
            "withdrawn" => Some(EnrollmentStatus::Withdrawn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub class_id: ClassId,
    pub user_id: UserId,
    pub status: EnrollmentStatus,
    pub accommodations: serde_json::Value,
    pub enrolled_at: DateTime<Utc>,
}

/// One row of a class roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: UserId,
    pub email: String,
    pub status: EnrollmentStatus,
    pub accommodations: serde_json::Value,
}

/// Whether the caller may see or manage the roster of `class`.
///
/// Teachers are limited to their own classes unless they also hold the
/// school admin role. Pure school admins see every class in their organization.
pub fn can_manage_roster(context: &AuthContext, class: &Class) -> bool {
    let is_teacher = context.has_role(&Role::TEACHER);
    let is_owner = class.is_taught_by(context.app_user_id);
    !(is_teacher && !is_owner && !context.has_role(&Role::SCHOOL_ADMIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom_core::AuthUserId;

    fn ctx(user: UserId, roles: Vec<Role>) -> AuthContext {
        AuthContext::new(AuthUserId::new(), user, Some(OrganizationId::new()), roles, "t@s.test")
    }

    fn class(teacher: UserId) -> Class {
        Class::create(OrganizationId::new(), teacher, "Ethics".into(), "6-8".into(), Utc::now()).unwrap()
    }

    #[test]
    fn create_rejects_blank_fields() {
        let err = Class::create(OrganizationId::new(), UserId::new(), "".into(), "6-8".into(), Utc::now());
        assert!(err.is_err());
        let err = Class::create(OrganizationId::new(), UserId::new(), "Ethics".into(), " ".into(), Utc::now());
        assert!(err.is_err());
    }

    #[test]
    fn roster_visibility_rules() {
        let owner = UserId::new();
        let other = UserId::new();
        let c = class(owner);

        assert!(can_manage_roster(&ctx(owner, vec![Role::TEACHER]), &c));
        assert!(!can_manage_roster(&ctx(other, vec![Role::TEACHER]), &c));
        assert!(can_manage_roster(&ctx(other, vec![Role::TEACHER, Role::SCHOOL_ADMIN]), &c));
        assert!(can_manage_roster(&ctx(other, vec![Role::SCHOOL_ADMIN]), &c));
    }

    #[test]
    fn enrollment_status_strings() {
        for s in [EnrollmentStatus::Active, EnrollmentStatus::Withdrawn] {
            assert_eq!(EnrollmentStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(EnrollmentStatus::parse("pending"), None);
    }
}
