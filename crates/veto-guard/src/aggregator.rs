use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use veto_core::{LedgerStore, PrincipalId, SpendEntry, SpendQuery, SpendWindow};

/// Spend totals for each rolling window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowTotals {
    pub daily: f64,
    pub weekly: f64,
    pub monthly: f64,
}

impl WindowTotals {
    pub fn get(&self, window: SpendWindow) -> f64 {
        match window {
            SpendWindow::Daily => self.daily,
            SpendWindow::Weekly => self.weekly,
            SpendWindow::Monthly => self.monthly,
        }
    }

    /// Bucket entries into every window ending at `now`.
    fn from_entries(entries: &[SpendEntry], now: DateTime<Utc>) -> Self {
        let mut totals = Self::default();
        for entry in entries {
            if entry.created_at >= SpendWindow::Daily.start(now) {
                totals.daily += entry.amount;
            }
            if entry.created_at >= SpendWindow::Weekly.start(now) {
                totals.weekly += entry.amount;
            }
            if entry.created_at >= SpendWindow::Monthly.start(now) {
                totals.monthly += entry.amount;
            }
        }
        totals
    }
}

/// A principal's spend as of one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpendSnapshot {
    /// Approved actions that were carried out.
    pub executed: WindowTotals,
    /// Approved actions not yet carried out. Zero unless requested.
    pub pending: WindowTotals,
}

impl SpendSnapshot {
    /// Spend counted against a window's ceiling.
    pub fn counted(&self, window: SpendWindow, include_pending: bool) -> f64 {
        let executed = self.executed.get(window);
        if include_pending {
            executed + self.pending.get(window)
        } else {
            executed
        }
    }
}

/// Sums approved spend over trailing windows from the ledger.
#[derive(Clone)]
pub struct SpendAggregator {
    ledger: Arc<dyn LedgerStore>,
}

impl SpendAggregator {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Approved and executed spend in `window`, ending now.
    pub fn cumulative_spend(&self, principal: PrincipalId, window: SpendWindow) -> veto_core::Result<f64> {
        self.cumulative_spend_at(principal, window, Utc::now())
    }

    pub fn cumulative_spend_at(
        &self,
        principal: PrincipalId,
        window: SpendWindow,
        now: DateTime<Utc>,
    ) -> veto_core::Result<f64> {
        let entries = self
            .ledger
            .spend_entries(&SpendQuery::executed(principal, window.start(now), now))?;
        let total = entries.iter().map(|e| e.amount).sum();
        debug!(%principal, %window, total, "cumulative spend");
        Ok(total)
    }

    /// Approved spend in `window` that has not been executed yet.
    pub fn pending_spend_at(
        &self,
        principal: PrincipalId,
        window: SpendWindow,
        now: DateTime<Utc>,
    ) -> veto_core::Result<f64> {
        let entries = self
            .ledger
            .spend_entries(&SpendQuery::pending(principal, window.start(now), now))?;
        Ok(entries.iter().map(|e| e.amount).sum())
    }

    /// All three windows from a single ledger read of the longest window.
    pub fn snapshot_at(
        &self,
        principal: PrincipalId,
        now: DateTime<Utc>,
        include_pending: bool,
    ) -> veto_core::Result<SpendSnapshot> {
        let since = SpendWindow::Monthly.start(now);
        let executed = self.ledger.spend_entries(&SpendQuery::executed(principal, since, now))?;
        let pending = if include_pending {
            self.ledger.spend_entries(&SpendQuery::pending(principal, since, now))?
        } else {
            Vec::new()
        };

        let snapshot = SpendSnapshot {
            executed: WindowTotals::from_entries(&executed, now),
            pending: WindowTotals::from_entries(&pending, now),
        };
        debug!(
            %principal,
            daily = snapshot.executed.daily,
            weekly = snapshot.executed.weekly,
            monthly = snapshot.executed.monthly,
            pending_daily = snapshot.pending.daily,
            "spend snapshot"
        );
        Ok(snapshot)
    }
}
