use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;
use veto_core::{
    AuthorizationRecord, AuthorizationStatus, LedgerStore, PolicySettings, PolicySettingsUpdate,
    Principal, PrincipalId, PrincipalStore, RecordId, SettingsStore, SpendEntry, SpendQuery,
    VetoError,
};

/// Process-local backend. Holds every port's state behind one lock, so
/// each call is atomic with respect to the others.
///
/// The ledger is indexed by record id and by principal: appends and record
/// lookups are O(1), and spend and history reads only visit the requesting
/// principal's records.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    principals: HashMap<String, Principal>,
    settings: HashMap<PrincipalId, PolicySettings>,
    /// Insertion order is append order.
    ledger: Vec<AuthorizationRecord>,
    /// Ledger position of every record.
    by_id: HashMap<RecordId, usize>,
    /// Ledger positions per principal, in append order.
    by_principal: HashMap<PrincipalId, Vec<usize>>,
}

impl State {
    fn principal_records(&self, principal_id: PrincipalId) -> impl Iterator<Item = (usize, &AuthorizationRecord)> {
        self.by_principal
            .get(&principal_id)
            .into_iter()
            .flatten()
            .map(|&i| (i, &self.ledger[i]))
    }

    fn record_index(&self, principal_id: PrincipalId, record_id: RecordId) -> Option<usize> {
        self.by_id
            .get(&record_id)
            .copied()
            .filter(|&i| self.ledger[i].principal_id == principal_id)
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ledger records across all principals.
    pub fn ledger_len(&self) -> usize {
        self.state.read().ledger.len()
    }
}

impl PrincipalStore for InMemoryStore {
    fn ensure_principal(&self, username: &str) -> veto_core::Result<Principal> {
        let mut state = self.state.write();
        let principal = state
            .principals
            .entry(username.to_string())
            .or_insert_with(|| Principal {
                id: Uuid::new_v4(),
                username: username.to_string(),
                created_at: Utc::now(),
            });
        Ok(principal.clone())
    }

    fn find_principal(&self, username: &str) -> veto_core::Result<Option<Principal>> {
        Ok(self.state.read().principals.get(username).cloned())
    }
}

impl SettingsStore for InMemoryStore {
    fn get_settings(&self, principal_id: PrincipalId) -> veto_core::Result<Option<PolicySettings>> {
        Ok(self.state.read().settings.get(&principal_id).cloned())
    }

    fn insert_settings_if_absent(&self, settings: &PolicySettings) -> veto_core::Result<PolicySettings> {
        let mut state = self.state.write();
        let stored = state
            .settings
            .entry(settings.principal_id)
            .or_insert_with(|| settings.clone());
        Ok(stored.clone())
    }

    fn update_settings(
        &self,
        principal_id: PrincipalId,
        update: &PolicySettingsUpdate,
        now: DateTime<Utc>,
    ) -> veto_core::Result<Option<PolicySettings>> {
        let mut state = self.state.write();
        Ok(state.settings.get_mut(&principal_id).map(|settings| {
            settings.apply(update, now);
            settings.clone()
        }))
    }
}

impl LedgerStore for InMemoryStore {
    fn append(&self, record: &AuthorizationRecord) -> veto_core::Result<()> {
        let mut state = self.state.write();
        if state.by_id.contains_key(&record.id) {
            return Err(VetoError::Storage(format!("duplicate record id {}", record.id)));
        }
        let index = state.ledger.len();
        state.ledger.push(record.clone());
        state.by_id.insert(record.id, index);
        state.by_principal.entry(record.principal_id).or_default().push(index);
        Ok(())
    }

    fn spend_entries(&self, query: &SpendQuery) -> veto_core::Result<Vec<SpendEntry>> {
        let state = self.state.read();
        let entries = state
            .principal_records(query.principal_id)
            .filter(|(_, r)| query.matches(r))
            .map(|(_, r)| SpendEntry {
                amount: r.amount,
                created_at: r.created_at,
            })
            .collect();
        Ok(entries)
    }

    fn recent(
        &self,
        principal_id: PrincipalId,
        limit: usize,
        status: Option<AuthorizationStatus>,
    ) -> veto_core::Result<Vec<AuthorizationRecord>> {
        let state = self.state.read();
        let mut matching: Vec<(usize, &AuthorizationRecord)> = state
            .principal_records(principal_id)
            .filter(|(_, r)| status.is_none_or(|s| r.status == s))
            .collect();
        // Newest first; later appends win ties.
        matching.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));
        Ok(matching.into_iter().take(limit).map(|(_, r)| r.clone()).collect())
    }

    fn get_record(
        &self,
        principal_id: PrincipalId,
        record_id: RecordId,
    ) -> veto_core::Result<Option<AuthorizationRecord>> {
        let state = self.state.read();
        Ok(state
            .record_index(principal_id, record_id)
            .map(|i| state.ledger[i].clone()))
    }

    fn mark_executed(
        &self,
        principal_id: PrincipalId,
        record_id: RecordId,
    ) -> veto_core::Result<AuthorizationRecord> {
        let mut state = self.state.write();
        let index = state
            .record_index(principal_id, record_id)
            .ok_or_else(|| VetoError::NotFound(format!("authorization record {record_id}")))?;
        let record = &mut state.ledger[index];
        record.check_executable()?;
        record.was_executed = true;
        Ok(record.clone())
    }
}
