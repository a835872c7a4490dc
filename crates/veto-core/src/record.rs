use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VetoError;
use crate::status::AuthorizationStatus;
use crate::types::{ActionType, PrincipalId, RecordId};

/// One logged authorization decision.
///
/// Records are append-only. The single permitted mutation is flipping
/// `was_executed` from false to true on an `APPROVED` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub id: RecordId,
    pub principal_id: PrincipalId,
    pub agent_id: Option<String>,
    pub action_type: ActionType,
    pub amount: f64,
    pub category: Option<String>,
    pub merchant: Option<String>,
    pub description: Option<String>,
    pub status: AuthorizationStatus,
    pub reason: String,
    pub risk_score: Option<u8>,
    pub authorization_token: Option<String>,
    pub was_executed: bool,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationRecord {
    /// Whether `was_executed` may be flipped on this record.
    pub fn check_executable(&self) -> crate::Result<()> {
        if self.status != AuthorizationStatus::Approved {
            return Err(VetoError::validation(
                "record",
                format!("record {} is {}, only APPROVED records can be executed", self.id, self.status),
            ));
        }
        if self.was_executed {
            return Err(VetoError::validation(
                "record",
                format!("record {} was already executed", self.id),
            ));
        }
        Ok(())
    }
}

/// Inputs for a new ledger record; id, executed flag and timestamp are
/// assigned when it is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuthorization {
    pub agent_id: Option<String>,
    pub action_type: ActionType,
    pub amount: f64,
    pub category: Option<String>,
    pub merchant: Option<String>,
    pub description: Option<String>,
    pub status: AuthorizationStatus,
    pub reason: String,
    pub risk_score: Option<u8>,
    pub authorization_token: Option<String>,
}

impl NewAuthorization {
    pub fn into_record(self, principal_id: PrincipalId, created_at: DateTime<Utc>) -> AuthorizationRecord {
        AuthorizationRecord {
            id: Uuid::new_v4(),
            principal_id,
            agent_id: self.agent_id,
            action_type: self.action_type,
            amount: self.amount,
            category: self.category,
            merchant: self.merchant,
            description: self.description,
            status: self.status,
            reason: self.reason,
            risk_score: self.risk_score,
            authorization_token: self.authorization_token,
            was_executed: false,
            created_at,
        }
    }
}

/// The projection the spend aggregator reads from the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpendEntry {
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

/// Filter for spend aggregation: one principal, one status, one executed
/// flag, and `since <= created_at <= until`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpendQuery {
    pub principal_id: PrincipalId,
    pub status: AuthorizationStatus,
    pub executed: bool,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl SpendQuery {
    /// Approved records whose action was carried out.
    pub fn executed(principal_id: PrincipalId, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            principal_id,
            status: AuthorizationStatus::Approved,
            executed: true,
            since,
            until,
        }
    }

    /// Approved records still waiting to be carried out.
    pub fn pending(principal_id: PrincipalId, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            executed: false,
            ..Self::executed(principal_id, since, until)
        }
    }

    pub fn matches(&self, record: &AuthorizationRecord) -> bool {
        record.principal_id == self.principal_id
            && record.status == self.status
            && record.was_executed == self.executed
            && record.created_at >= self.since
            && record.created_at <= self.until
    }
}
