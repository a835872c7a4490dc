//! Storage ports. The guard never talks to a database directly; backends
//! implement these traits and are injected as trait objects.

use chrono::{DateTime, Utc};

use crate::Result;
use crate::record::{AuthorizationRecord, SpendEntry, SpendQuery};
use crate::settings::{PolicySettings, PolicySettingsUpdate};
use crate::status::AuthorizationStatus;
use crate::types::{Principal, PrincipalId, RecordId};

/// Resolves usernames to principals.
pub trait PrincipalStore: Send + Sync {
    /// Idempotent get-or-create keyed by the unique username.
    fn ensure_principal(&self, username: &str) -> Result<Principal>;

    fn find_principal(&self, username: &str) -> Result<Option<Principal>>;
}

/// Per-principal policy settings. Backends must enforce one row per principal.
pub trait SettingsStore: Send + Sync {
    fn get_settings(&self, principal_id: PrincipalId) -> Result<Option<PolicySettings>>;

    /// Store `settings` unless a row for its principal already exists, then
    /// return whichever row is stored. Concurrent callers all observe the
    /// same row.
    fn insert_settings_if_absent(&self, settings: &PolicySettings) -> Result<PolicySettings>;

    /// Merge `update` into the stored row and set `updated_at = now`.
    /// Returns `None` when the principal has no settings row.
    fn update_settings(
        &self,
        principal_id: PrincipalId,
        update: &PolicySettingsUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<PolicySettings>>;
}

/// Append-only decision ledger.
pub trait LedgerStore: Send + Sync {
    fn append(&self, record: &AuthorizationRecord) -> Result<()>;

    /// Amount and timestamp of every record matching `query`.
    fn spend_entries(&self, query: &SpendQuery) -> Result<Vec<SpendEntry>>;

    /// Newest first, at most `limit` records, optionally restricted to one status.
    fn recent(
        &self,
        principal_id: PrincipalId,
        limit: usize,
        status: Option<AuthorizationStatus>,
    ) -> Result<Vec<AuthorizationRecord>>;

    fn get_record(&self, principal_id: PrincipalId, record_id: RecordId) -> Result<Option<AuthorizationRecord>>;

    /// Flip `was_executed` to true. Fails with `NotFound` for unknown records
    /// and `Validation` unless the record is APPROVED and not yet executed.
    fn mark_executed(&self, principal_id: PrincipalId, record_id: RecordId) -> Result<AuthorizationRecord>;
}
