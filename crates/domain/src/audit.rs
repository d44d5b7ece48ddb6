//! Append-only audit trail of administrative actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use classroom_core::{AuditEntryId, DomainResult, OrganizationId, UserId};

use crate::validate_non_empty;

/// Maximum number of entries returned by a log listing.
pub const AUDIT_LOG_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub organization_id: OrganizationId,
    pub actor_user_id: UserId,
    pub action_key: String,
    pub target_type: Option<String>,
    pub target_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn record(
        organization_id: OrganizationId,
        actor_user_id: UserId,
        action_key: String,
        target_type: Option<String>,
        target_id: Option<Uuid>,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        validate_non_empty("actionKey", &action_key)?;
        Ok(Self {
            id: AuditEntryId::new(),
            organization_id,
            actor_user_id,
            action_key,
            target_type,
            target_id,
            metadata,
            created_at: now,
        })
    }
}
