use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use veto_core::{
    AuthorizationRecord, AuthorizationStatus, LedgerStore, PolicySettings, PolicySettingsUpdate,
    Principal, PrincipalId, PrincipalStore, RecordId, SettingsStore, SpendEntry, SpendQuery,
    VetoError,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS principals (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS policy_settings (
        id TEXT PRIMARY KEY,
        principal_id TEXT NOT NULL UNIQUE REFERENCES principals(id),
        single_transaction_limit REAL NOT NULL CHECK (single_transaction_limit >= 0),
        daily_limit REAL NOT NULL CHECK (daily_limit >= 0),
        weekly_limit REAL NOT NULL CHECK (weekly_limit >= 0),
        monthly_limit REAL NOT NULL CHECK (monthly_limit >= 0),
        require_approval_above REAL NOT NULL CHECK (require_approval_above >= 0),
        allowed_categories TEXT,
        blocked_categories TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS authorization_log (
        id TEXT PRIMARY KEY,
        principal_id TEXT NOT NULL REFERENCES principals(id),
        agent_id TEXT,
        action_type TEXT NOT NULL CHECK (action_type IN ('purchase', 'transfer', 'subscription')),
        amount REAL NOT NULL,
        category TEXT,
        merchant TEXT,
        description TEXT,
        status TEXT NOT NULL CHECK (status IN ('APPROVED', 'DENIED', 'CAUTION', 'REQUIRES_HUMAN_APPROVAL', 'ERROR')),
        reason TEXT NOT NULL,
        risk_score INTEGER,
        authorization_token TEXT,
        was_executed INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_authlog_spend
        ON authorization_log(principal_id, status, was_executed, created_at);
    CREATE INDEX IF NOT EXISTS idx_authlog_recent
        ON authorization_log(principal_id, created_at);

    CREATE TRIGGER IF NOT EXISTS authorization_log_no_delete
    BEFORE DELETE ON authorization_log
    BEGIN
        SELECT RAISE(ABORT, 'authorization_log is append-only');
    END;

    CREATE TRIGGER IF NOT EXISTS authorization_log_execute_only
    BEFORE UPDATE ON authorization_log
    WHEN OLD.status != 'APPROVED'
        OR OLD.was_executed != 0
        OR NEW.was_executed != 1
        OR NEW.id IS NOT OLD.id
        OR NEW.principal_id IS NOT OLD.principal_id
        OR NEW.agent_id IS NOT OLD.agent_id
        OR NEW.action_type IS NOT OLD.action_type
        OR NEW.amount IS NOT OLD.amount
        OR NEW.category IS NOT OLD.category
        OR NEW.merchant IS NOT OLD.merchant
        OR NEW.description IS NOT OLD.description
        OR NEW.status IS NOT OLD.status
        OR NEW.reason IS NOT OLD.reason
        OR NEW.risk_score IS NOT OLD.risk_score
        OR NEW.authorization_token IS NOT OLD.authorization_token
        OR NEW.created_at IS NOT OLD.created_at
    BEGIN
        SELECT RAISE(ABORT, 'authorization_log rows may only be marked executed');
    END;
";

const SETTINGS_COLUMNS: &str = "id, principal_id, single_transaction_limit, daily_limit, weekly_limit, \
     monthly_limit, require_approval_above, allowed_categories, blocked_categories, is_active, \
     created_at, updated_at";

const RECORD_COLUMNS: &str = "id, principal_id, agent_id, action_type, amount, category, merchant, \
     description, status, reason, risk_score, authorization_token, was_executed, created_at";

/// SQLite-backed implementation of every storage port.
///
/// One connection behind a mutex; each port call holds the lock for its
/// whole statement sequence.
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> veto_core::Result<Self> {
        info!(?path, "opening veto store");

        let conn = Connection::open(path).map_err(VetoError::storage)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(VetoError::storage)?;
        conn.execute_batch(SCHEMA).map_err(VetoError::storage)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> veto_core::Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    /// Get a reference to the raw database connection (for advanced queries).
    pub fn db(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.db.lock()
    }
}

// ── Principals ─────────────────────────────────────────────────

impl PrincipalStore for SqliteStore {
    fn ensure_principal(&self, username: &str) -> veto_core::Result<Principal> {
        let db = self.db.lock();
        let inserted = db
            .execute(
                "INSERT INTO principals (id, username, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(username) DO NOTHING",
                params![Uuid::new_v4().to_string(), username, ts(Utc::now())],
            )
            .map_err(VetoError::storage)?;
        if inserted > 0 {
            info!(username, "created principal");
        }
        query_principal(&db, username)?
            .ok_or_else(|| VetoError::Storage(format!("principal '{username}' vanished after insert")))
    }

    fn find_principal(&self, username: &str) -> veto_core::Result<Option<Principal>> {
        let db = self.db.lock();
        query_principal(&db, username)
    }
}

fn query_principal(db: &Connection, username: &str) -> veto_core::Result<Option<Principal>> {
    let row = db
        .query_row(
            "SELECT id, username, created_at FROM principals WHERE username = ?1",
            params![username],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()
        .map_err(VetoError::storage)?;

    row.map(|(id, username, created_at)| {
        Ok(Principal {
            id: parse_uuid(&id)?,
            username,
            created_at: parse_ts(&created_at)?,
        })
    })
    .transpose()
}

// ── Settings ───────────────────────────────────────────────────

impl SettingsStore for SqliteStore {
    fn get_settings(&self, principal_id: PrincipalId) -> veto_core::Result<Option<PolicySettings>> {
        let db = self.db.lock();
        query_settings(&db, principal_id)
    }

    fn insert_settings_if_absent(&self, settings: &PolicySettings) -> veto_core::Result<PolicySettings> {
        let db = self.db.lock();
        let inserted = db
            .execute(
                &format!(
                    "INSERT INTO policy_settings ({SETTINGS_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                     ON CONFLICT(principal_id) DO NOTHING"
                ),
                params![
                    settings.id.to_string(),
                    settings.principal_id.to_string(),
                    settings.single_transaction_limit,
                    settings.daily_limit,
                    settings.weekly_limit,
                    settings.monthly_limit,
                    settings.require_approval_above,
                    categories_to_json(&settings.allowed_categories)?,
                    categories_to_json(&settings.blocked_categories)?,
                    settings.is_active,
                    ts(settings.created_at),
                    ts(settings.updated_at),
                ],
            )
            .map_err(VetoError::storage)?;
        if inserted > 0 {
            info!(principal = %settings.principal_id, "created default policy settings");
        }
        query_settings(&db, settings.principal_id)?.ok_or_else(|| {
            VetoError::Storage(format!("settings for {} vanished after insert", settings.principal_id))
        })
    }

    fn update_settings(
        &self,
        principal_id: PrincipalId,
        update: &PolicySettingsUpdate,
        now: DateTime<Utc>,
    ) -> veto_core::Result<Option<PolicySettings>> {
        let mut db = self.db.lock();
        let tx = db.transaction().map_err(VetoError::storage)?;

        let Some(mut settings) = query_settings(&tx, principal_id)? else {
            return Ok(None);
        };
        settings.apply(update, now);

        tx.execute(
            "UPDATE policy_settings SET
                single_transaction_limit = ?2,
                daily_limit = ?3,
                weekly_limit = ?4,
                monthly_limit = ?5,
                require_approval_above = ?6,
                allowed_categories = ?7,
                blocked_categories = ?8,
                is_active = ?9,
                updated_at = ?10
             WHERE principal_id = ?1",
            params![
                principal_id.to_string(),
                settings.single_transaction_limit,
                settings.daily_limit,
                settings.weekly_limit,
                settings.monthly_limit,
                settings.require_approval_above,
                categories_to_json(&settings.allowed_categories)?,
                categories_to_json(&settings.blocked_categories)?,
                settings.is_active,
                ts(settings.updated_at),
            ],
        )
        .map_err(VetoError::storage)?;
        tx.commit().map_err(VetoError::storage)?;

        Ok(Some(settings))
    }
}

/// Raw settings row as stored.
struct SettingsRow {
    id: String,
    principal_id: String,
    single_transaction_limit: f64,
    daily_limit: f64,
    weekly_limit: f64,
    monthly_limit: f64,
    require_approval_above: f64,
    allowed_categories: Option<String>,
    blocked_categories: Option<String>,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl SettingsRow {
    fn into_settings(self) -> veto_core::Result<PolicySettings> {
        Ok(PolicySettings {
            id: parse_uuid(&self.id)?,
            principal_id: parse_uuid(&self.principal_id)?,
            single_transaction_limit: self.single_transaction_limit,
            daily_limit: self.daily_limit,
            weekly_limit: self.weekly_limit,
            monthly_limit: self.monthly_limit,
            require_approval_above: self.require_approval_above,
            allowed_categories: categories_from_json(self.allowed_categories)?,
            blocked_categories: categories_from_json(self.blocked_categories)?,
            is_active: self.is_active,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

fn query_settings(db: &Connection, principal_id: PrincipalId) -> veto_core::Result<Option<PolicySettings>> {
    db.query_row(
        &format!("SELECT {SETTINGS_COLUMNS} FROM policy_settings WHERE principal_id = ?1"),
        params![principal_id.to_string()],
        |row| {
            Ok(SettingsRow {
                id: row.get(0)?,
                principal_id: row.get(1)?,
                single_transaction_limit: row.get(2)?,
                daily_limit: row.get(3)?,
                weekly_limit: row.get(4)?,
                monthly_limit: row.get(5)?,
                require_approval_above: row.get(6)?,
                allowed_categories: row.get(7)?,
                blocked_categories: row.get(8)?,
                is_active: row.get(9)?,
                created_at: row.get(10)?,
                updated_at: row.get(11)?,
            })
        },
    )
    .optional()
    .map_err(VetoError::storage)?
    .map(SettingsRow::into_settings)
    .transpose()
}

// ── Ledger ─────────────────────────────────────────────────────

impl LedgerStore for SqliteStore {
    fn append(&self, record: &AuthorizationRecord) -> veto_core::Result<()> {
        let db = self.db.lock();
        db.execute(
            &format!(
                "INSERT INTO authorization_log ({RECORD_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                record.id.to_string(),
                record.principal_id.to_string(),
                record.agent_id,
                record.action_type.as_str(),
                record.amount,
                record.category,
                record.merchant,
                record.description,
                record.status.as_str(),
                record.reason,
                record.risk_score,
                record.authorization_token,
                record.was_executed,
                ts(record.created_at),
            ],
        )
        .map_err(VetoError::storage)?;
        Ok(())
    }

    fn spend_entries(&self, query: &SpendQuery) -> veto_core::Result<Vec<SpendEntry>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare_cached(
                "SELECT amount, created_at FROM authorization_log
                 WHERE principal_id = ?1
                   AND status = ?2
                   AND was_executed = ?3
                   AND created_at >= ?4
                   AND created_at <= ?5",
            )
            .map_err(VetoError::storage)?;

        let rows = stmt
            .query_map(
                params![
                    query.principal_id.to_string(),
                    query.status.as_str(),
                    query.executed,
                    ts(query.since),
                    ts(query.until),
                ],
                |row| Ok((row.get::<_, f64>(0)?, row.get::<_, String>(1)?)),
            )
            .map_err(VetoError::storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(VetoError::storage)?;

        debug!(principal = %query.principal_id, rows = rows.len(), "loaded spend entries");

        rows.into_iter()
            .map(|(amount, created_at)| {
                Ok(SpendEntry {
                    amount,
                    created_at: parse_ts(&created_at)?,
                })
            })
            .collect()
    }

    fn recent(
        &self,
        principal_id: PrincipalId,
        limit: usize,
        status: Option<AuthorizationStatus>,
    ) -> veto_core::Result<Vec<AuthorizationRecord>> {
        let db = self.db.lock();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = match status {
            Some(status) => {
                let mut stmt = db
                    .prepare(&format!(
                        "SELECT {RECORD_COLUMNS} FROM authorization_log
                         WHERE principal_id = ?1 AND status = ?2
                         ORDER BY created_at DESC, rowid DESC
                         LIMIT ?3"
                    ))
                    .map_err(VetoError::storage)?;
                stmt.query_map(params![principal_id.to_string(), status.as_str(), limit], record_row)
                    .map_err(VetoError::storage)?
                    .collect::<rusqlite::Result<Vec<_>>>()
            }
            None => {
                let mut stmt = db
                    .prepare(&format!(
                        "SELECT {RECORD_COLUMNS} FROM authorization_log
                         WHERE principal_id = ?1
                         ORDER BY created_at DESC, rowid DESC
                         LIMIT ?2"
                    ))
                    .map_err(VetoError::storage)?;
                stmt.query_map(params![principal_id.to_string(), limit], record_row)
                    .map_err(VetoError::storage)?
                    .collect::<rusqlite::Result<Vec<_>>>()
            }
        }
        .map_err(VetoError::storage)?;

        rows.into_iter().map(RecordRow::into_record).collect()
    }

    fn get_record(
        &self,
        principal_id: PrincipalId,
        record_id: RecordId,
    ) -> veto_core::Result<Option<AuthorizationRecord>> {
        let db = self.db.lock();
        query_record(&db, principal_id, record_id)
    }

    fn mark_executed(
        &self,
        principal_id: PrincipalId,
        record_id: RecordId,
    ) -> veto_core::Result<AuthorizationRecord> {
        let db = self.db.lock();
        let mut record = query_record(&db, principal_id, record_id)?
            .ok_or_else(|| VetoError::NotFound(format!("authorization record {record_id}")))?;
        record.check_executable()?;

        db.execute(
            "UPDATE authorization_log SET was_executed = 1
             WHERE id = ?1 AND status = 'APPROVED' AND was_executed = 0",
            params![record_id.to_string()],
        )
        .map_err(VetoError::storage)?;

        record.was_executed = true;
        Ok(record)
    }
}

/// Raw ledger row as stored.
struct RecordRow {
    id: String,
    principal_id: String,
    agent_id: Option<String>,
    action_type: String,
    amount: f64,
    category: Option<String>,
    merchant: Option<String>,
    description: Option<String>,
    status: String,
    reason: String,
    risk_score: Option<u8>,
    authorization_token: Option<String>,
    was_executed: bool,
    created_at: String,
}

fn record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        principal_id: row.get(1)?,
        agent_id: row.get(2)?,
        action_type: row.get(3)?,
        amount: row.get(4)?,
        category: row.get(5)?,
        merchant: row.get(6)?,
        description: row.get(7)?,
        status: row.get(8)?,
        reason: row.get(9)?,
        risk_score: row.get(10)?,
        authorization_token: row.get(11)?,
        was_executed: row.get(12)?,
        created_at: row.get(13)?,
    })
}

impl RecordRow {
    fn into_record(self) -> veto_core::Result<AuthorizationRecord> {
        let corrupt = |e: VetoError| VetoError::Storage(format!("corrupt ledger row {}: {}", self.id, e));
        Ok(AuthorizationRecord {
            id: parse_uuid(&self.id)?,
            principal_id: parse_uuid(&self.principal_id)?,
            agent_id: self.agent_id,
            action_type: self.action_type.parse().map_err(corrupt)?,
            amount: self.amount,
            category: self.category,
            merchant: self.merchant,
            description: self.description,
            status: self.status.parse().map_err(corrupt)?,
            reason: self.reason,
            risk_score: self.risk_score,
            authorization_token: self.authorization_token,
            was_executed: self.was_executed,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

fn query_record(
    db: &Connection,
    principal_id: PrincipalId,
    record_id: RecordId,
) -> veto_core::Result<Option<AuthorizationRecord>> {
    db.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM authorization_log WHERE id = ?1 AND principal_id = ?2"),
        params![record_id.to_string(), principal_id.to_string()],
        record_row,
    )
    .optional()
    .map_err(VetoError::storage)?
    .map(RecordRow::into_record)
    .transpose()
}

// ── Encoding helpers ───────────────────────────────────────────

/// Fixed-width UTC timestamps so that text comparison matches time order.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> veto_core::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VetoError::Storage(format!("invalid timestamp '{raw}': {e}")))
}

fn parse_uuid(raw: &str) -> veto_core::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| VetoError::Storage(format!("invalid id '{raw}': {e}")))
}

fn categories_to_json(set: &Option<BTreeSet<String>>) -> veto_core::Result<Option<String>> {
    set.as_ref()
        .map(|s| serde_json::to_string(s))
        .transpose()
        .map_err(VetoError::from)
}

fn categories_from_json(raw: Option<String>) -> veto_core::Result<Option<BTreeSet<String>>> {
    raw.map(|s| {
        serde_json::from_str::<BTreeSet<String>>(&s)
            .map_err(|e| VetoError::Storage(format!("invalid category list '{s}': {e}")))
    })
    .transpose()
}
