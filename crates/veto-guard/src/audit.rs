use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use veto_core::{
    AuthorizationRecord, AuthorizationStatus, Decision, LedgerStore, NewAuthorization, PrincipalId,
    ProposedAction, RecordId,
};

/// Writes decisions to the ledger and reads them back.
#[derive(Clone)]
pub struct AuditLogger {
    ledger: Arc<dyn LedgerStore>,
}

impl AuditLogger {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Append a record. Fails only if the ledger does.
    pub fn record(&self, principal: PrincipalId, entry: NewAuthorization) -> veto_core::Result<AuthorizationRecord> {
        self.record_at(principal, entry, Utc::now())
    }

    pub fn record_at(
        &self,
        principal: PrincipalId,
        entry: NewAuthorization,
        now: DateTime<Utc>,
    ) -> veto_core::Result<AuthorizationRecord> {
        let record = entry.into_record(principal, now);
        self.ledger.append(&record)?;
        info!(
            record = %record.id,
            %principal,
            status = %record.status,
            amount = record.amount,
            action = %record.action_type,
            "authorization recorded"
        );
        Ok(record)
    }

    /// Log an engine decision. Approved decisions get a fresh
    /// authorization token, stored on the record.
    pub fn record_decision(
        &self,
        principal: PrincipalId,
        action: &ProposedAction,
        decision: &Decision,
    ) -> veto_core::Result<AuthorizationRecord> {
        let token = (decision.status == AuthorizationStatus::Approved)
            .then(|| Uuid::new_v4().simple().to_string());
        self.record(
            principal,
            NewAuthorization {
                agent_id: action.agent_id.clone(),
                action_type: action.action_type,
                amount: action.amount,
                category: Some(action.category.clone()),
                merchant: action.merchant.clone(),
                description: action.description.clone(),
                status: decision.status,
                reason: decision.reason(),
                risk_score: None,
                authorization_token: token,
            },
        )
    }

    /// Newest first, at most `limit` records.
    pub fn history(
        &self,
        principal: PrincipalId,
        limit: usize,
        status: Option<AuthorizationStatus>,
    ) -> veto_core::Result<Vec<AuthorizationRecord>> {
        self.ledger.recent(principal, limit, status)
    }

    pub fn mark_executed(&self, principal: PrincipalId, record: RecordId) -> veto_core::Result<AuthorizationRecord> {
        let updated = self.ledger.mark_executed(principal, record)?;
        info!(%record, %principal, amount = updated.amount, "authorization executed");
        Ok(updated)
    }
}
