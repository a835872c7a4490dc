use serde::{Deserialize, Serialize};

use crate::status::AuthorizationStatus;
use crate::types::{ActionType, RecordId, validate_amount};

/// Reason logged when no check fires.
pub const WITHIN_LIMITS: &str = "within budget limits";

/// A financial action an agent wants to take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub action_type: ActionType,
    pub amount: f64,
    pub category: String,
    pub merchant: Option<String>,
    pub description: Option<String>,
    pub agent_id: Option<String>,
}

impl ProposedAction {
    pub fn purchase(amount: f64, category: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Purchase,
            amount,
            category: category.into(),
            merchant: None,
            description: None,
            agent_id: None,
        }
    }

    pub fn with_merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant = Some(merchant.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn validate(&self) -> crate::Result<()> {
        validate_amount("amount", self.amount)
    }
}

/// The answer returned to the agent. Derived on every call, never stored
/// as its own entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub status: AuthorizationStatus,
    /// One entry per triggered check; empty when approved outright.
    pub reasons: Vec<String>,
    pub remaining_daily: Option<f64>,
    pub remaining_weekly: Option<f64>,
    /// Ledger record this decision was logged as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_token: Option<String>,
}

impl Decision {
    /// A failed pipeline. Only the message distinguishes causes.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: AuthorizationStatus::Error,
            reasons: vec![message.into()],
            remaining_daily: None,
            remaining_weekly: None,
            record_id: None,
            authorization_token: None,
        }
    }

    /// The single reason string written to the ledger.
    pub fn reason(&self) -> String {
        if self.reasons.is_empty() {
            WITHIN_LIMITS.to_string()
        } else {
            self.reasons.join("; ")
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == AuthorizationStatus::Approved
    }
}
