use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use veto_config::{GuardConfig, VetoConfig};
use veto_core::{
    ActionType, AuthorizationRecord, AuthorizationStatus, Decision, LedgerStore, NewAuthorization,
    PolicySettings, PolicySettingsUpdate, Principal, PrincipalStore, ProposedAction, RecordId,
    SettingsStore, SpendWindow, VetoError, validate_amount,
};
use veto_store::SqliteStore;

use crate::aggregator::SpendAggregator;
use crate::audit::AuditLogger;
use crate::engine::AuthorizationEngine;
use crate::locks::PrincipalLocks;
use crate::risk::{self, RiskAssessment, RiskInput};
use crate::settings::SettingsManager;

/// Spend in one window next to its ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendSummary {
    pub period: SpendWindow,
    /// Approved and executed spend.
    pub spend: f64,
    /// Approved but not yet executed.
    pub pending: f64,
    pub limit: f64,
    /// `limit - spend`, never below zero.
    pub remaining: f64,
}

/// A caller-supplied ledger entry, as received over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRequest {
    pub action_type: String,
    pub amount: f64,
    pub status: String,
    pub category: Option<String>,
    pub merchant: Option<String>,
    pub reason: Option<String>,
    pub agent_id: Option<String>,
}

impl LogRequest {
    /// Parse status and action type. Unknown values are rejected.
    fn into_entry(self) -> veto_core::Result<NewAuthorization> {
        validate_amount("amount", self.amount)?;
        let status: AuthorizationStatus = self.status.trim().to_ascii_uppercase().parse()?;
        let action_type: ActionType = self.action_type.trim().to_ascii_lowercase().parse()?;
        Ok(NewAuthorization {
            agent_id: self.agent_id,
            action_type,
            amount: self.amount,
            category: self.category,
            merchant: self.merchant,
            description: None,
            status,
            reason: self.reason.unwrap_or_default(),
            risk_score: None,
            authorization_token: None,
        })
    }
}

/// The spending guard's public surface.
///
/// Every call resolves the username to a principal (creating it on first
/// sight). Authorization runs settings lookup, spend aggregation, the
/// policy checks and the ledger append under that principal's lock.
pub struct VetoGuard {
    principals: Arc<dyn PrincipalStore>,
    settings: SettingsManager,
    aggregator: SpendAggregator,
    engine: AuthorizationEngine,
    audit: AuditLogger,
    locks: PrincipalLocks,
    config: GuardConfig,
}

impl VetoGuard {
    /// Build a guard over one backend implementing every port.
    pub fn new<S>(store: Arc<S>, config: &VetoConfig) -> Self
    where
        S: PrincipalStore + SettingsStore + LedgerStore + 'static,
    {
        Self::with_stores(store.clone(), store.clone(), store, config)
    }

    pub fn with_stores(
        principals: Arc<dyn PrincipalStore>,
        settings: Arc<dyn SettingsStore>,
        ledger: Arc<dyn LedgerStore>,
        config: &VetoConfig,
    ) -> Self {
        let settings = SettingsManager::new(settings, config.policy.clone());
        let aggregator = SpendAggregator::new(Arc::clone(&ledger));
        let engine = AuthorizationEngine::new(settings.clone(), aggregator.clone(), &config.guard);
        Self {
            principals,
            settings,
            aggregator,
            engine,
            audit: AuditLogger::new(ledger),
            locks: PrincipalLocks::new(),
            config: config.guard.clone(),
        }
    }

    /// Open the SQLite database named in the config.
    pub fn open(config: &VetoConfig) -> veto_core::Result<Self> {
        if !config.storage.is_in_memory() {
            if let Some(parent) = config.storage.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Arc::new(SqliteStore::open(&config.storage.path)?);
        info!(path = ?config.storage.path, "veto guard ready");
        Ok(Self::new(store, config))
    }

    /// For registering extra checks.
    pub fn engine_mut(&mut self) -> &mut AuthorizationEngine {
        &mut self.engine
    }

    fn principal(&self, username: &str) -> veto_core::Result<Principal> {
        let username = username.trim();
        if username.is_empty() {
            return Err(VetoError::validation("username", "must not be empty"));
        }
        self.principals.ensure_principal(username)
    }

    // ── Authorization ──────────────────────────────────────────

    pub fn authorize_purchase(
        &self,
        username: &str,
        amount: f64,
        category: &str,
        merchant: Option<&str>,
        description: Option<&str>,
        agent_id: Option<&str>,
    ) -> Decision {
        let action = ProposedAction {
            action_type: ActionType::Purchase,
            amount,
            category: category.to_string(),
            merchant: merchant.map(str::to_string),
            description: description.map(str::to_string),
            agent_id: agent_id.map(str::to_string),
        };
        self.authorize_action(username, &action)
    }

    /// Decide on `action` and log the decision. Any failure along the way
    /// comes back as an `ERROR` decision carrying the failure message; those
    /// are not logged to the ledger.
    pub fn authorize_action(&self, username: &str, action: &ProposedAction) -> Decision {
        match self.try_authorize(username, action) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(username, amount = action.amount, error = %e, "authorization failed");
                Decision::error(e.to_string())
            }
        }
    }

    fn try_authorize(&self, username: &str, action: &ProposedAction) -> veto_core::Result<Decision> {
        action.validate()?;
        let principal = self.principal(username)?;
        self.locks.with_lock(principal.id, || {
            let mut decision = self.engine.authorize(principal.id, action)?;
            let record = self.audit.record_decision(principal.id, action, &decision)?;
            decision.record_id = Some(record.id);
            decision.authorization_token = record.authorization_token;
            Ok(decision)
        })
    }

    // ── Settings ───────────────────────────────────────────────

    pub fn get_or_create_settings(&self, username: &str) -> veto_core::Result<PolicySettings> {
        let principal = self.principal(username)?;
        self.settings.get_or_create(principal.id)
    }

    pub fn settings(&self, username: &str) -> veto_core::Result<Option<PolicySettings>> {
        let principal = self.principal(username)?;
        self.settings.get(principal.id)
    }

    /// `None` when the principal has no settings yet.
    pub fn update_settings(
        &self,
        username: &str,
        update: PolicySettingsUpdate,
    ) -> veto_core::Result<Option<PolicySettings>> {
        let principal = self.principal(username)?;
        self.settings.update(principal.id, update)
    }

    pub fn configure_settings(
        &self,
        username: &str,
        update: PolicySettingsUpdate,
    ) -> veto_core::Result<PolicySettings> {
        let principal = self.principal(username)?;
        self.settings.configure(principal.id, update)
    }

    // ── Spend & history ────────────────────────────────────────

    pub fn cumulative_spend(&self, username: &str, period: SpendWindow) -> veto_core::Result<SpendSummary> {
        let principal = self.principal(username)?;
        let now = chrono::Utc::now();
        let spend = self.aggregator.cumulative_spend_at(principal.id, period, now)?;
        let pending = self.aggregator.pending_spend_at(principal.id, period, now)?;
        let limit = self.settings.get_or_create(principal.id)?.limit_for(period);
        Ok(SpendSummary {
            period,
            spend,
            pending,
            limit,
            remaining: (limit - spend).max(0.0),
        })
    }

    /// Newest first. `limit` defaults to the configured default and is
    /// capped at the configured maximum.
    pub fn history(
        &self,
        username: &str,
        limit: Option<usize>,
        status: Option<AuthorizationStatus>,
    ) -> veto_core::Result<Vec<AuthorizationRecord>> {
        let principal = self.principal(username)?;
        let limit = limit
            .unwrap_or(self.config.default_history_limit)
            .min(self.config.max_history_limit);
        self.audit.history(principal.id, limit, status)
    }

    /// Append a caller-built entry, e.g. replaying a decision made elsewhere.
    pub fn log_authorization(&self, username: &str, request: LogRequest) -> veto_core::Result<AuthorizationRecord> {
        let entry = request.into_entry()?;
        let principal = self.principal(username)?;
        self.locks
            .with_lock(principal.id, || self.audit.record(principal.id, entry))
    }

    /// Mark an approved action as carried out, so it counts towards spend.
    pub fn mark_executed(&self, username: &str, record: RecordId) -> veto_core::Result<AuthorizationRecord> {
        let principal = self.principal(username)?;
        self.locks
            .with_lock(principal.id, || self.audit.mark_executed(principal.id, record))
    }

    pub fn assess_risk(&self, input: &RiskInput) -> RiskAssessment {
        risk::assess(input)
    }
}
