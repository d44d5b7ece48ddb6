//! Per-organization privacy and participation policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use classroom_core::{DomainError, DomainResult, OrganizationId};

pub const MIN_RETENTION_DAYS: i32 = 30;
pub const MAX_RETENTION_DAYS: i32 = 3650;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiFilterLevel {
    Standard,
    Strict,
}

impl PiiFilterLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            PiiFilterLevel::Standard => "standard",
            PiiFilterLevel::Strict => "strict",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(PiiFilterLevel::Standard),
            "strict" => Some(PiiFilterLevel::Strict),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySettings {
    pub organization_id: OrganizationId,
    pub data_retention_days: i32,
    pub allow_guest_live_join: bool,
    pub pii_filter_level: PiiFilterLevel,
    pub updated_at: DateTime<Utc>,
}

impl PolicySettings {
    pub fn new(
        organization_id: OrganizationId,
        data_retention_days: i32,
        allow_guest_live_join: bool,
        pii_filter_level: PiiFilterLevel,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if !(MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS).contains(&data_retention_days) {
            return Err(DomainError::validation(format!(
                "dataRetentionDays must be between {MIN_RETENTION_DAYS} and {MAX_RETENTION_DAYS}"
            )));
        }
        Ok(Self {
            organization_id,
            data_retention_days,
            allow_guest_live_join,
            pii_filter_level,
            updated_at: now,
        })
    }
}

/// Guests may join unless the organization explicitly turned it off.
pub fn guests_allowed(settings: Option<&PolicySettings>) -> bool {
    settings.is_none_or(|s| s.allow_guest_live_join)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_bounds_are_inclusive() {
        let org = OrganizationId::new();
        let now = Utc::now();
        assert!(PolicySettings::new(org, 29, true, PiiFilterLevel::Standard, now).is_err());
        assert!(PolicySettings::new(org, 30, true, PiiFilterLevel::Standard, now).is_ok());
        assert!(PolicySettings::new(org, 3650, true, PiiFilterLevel::Strict, now).is_ok());
        assert!(PolicySettings::new(org, 3651, true, PiiFilterLevel::Strict, now).is_err());
    }

    #[test]
    fn guests_default_to_allowed() {
        assert!(guests_allowed(None));
        let s = PolicySettings::new(OrganizationId::new(), 90, false, PiiFilterLevel::Strict, Utc::now()).unwrap();
        assert!(!guests_allowed(Some(&s)));
    }
}
