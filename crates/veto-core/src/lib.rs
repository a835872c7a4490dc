//! # veto-core
//!
//! Shared vocabulary for the Veto spending guard: authorization statuses,
//! policy settings, ledger records, decisions, and the storage ports every
//! backend implements.

pub mod decision;
pub mod error;
pub mod record;
pub mod settings;
pub mod status;
pub mod store;
pub mod types;

pub use decision::{Decision, ProposedAction, WITHIN_LIMITS};
pub use error::{Result, VetoError};
pub use record::{AuthorizationRecord, NewAuthorization, SpendEntry, SpendQuery};
pub use settings::{PolicyDefaults, PolicySettings, PolicySettingsUpdate};
pub use status::{AuthorizationStatus, RiskLevel};
pub use store::{LedgerStore, PrincipalStore, SettingsStore};
pub use types::*;
