//! # veto-guard
//!
//! Spending guardrails for autonomous agents. Before an agent buys,
//! transfers or subscribes, it asks the guard; the guard checks the
//! principal's policy settings and rolling spend, answers with a graded
//! decision, and logs that decision to an append-only ledger.
//!
//! ## Statuses
//!
//! | Status | Meaning |
//! |--------|---------|
//! | APPROVED | Proceed |
//! | CAUTION | Proceed, a soft limit was crossed |
//! | REQUIRES_HUMAN_APPROVAL | Ask the owner first |
//! | DENIED | Do not proceed |
//! | ERROR | The guard itself failed |
//!
//! Every check runs on every request and the most severe verdict wins.

pub mod aggregator;
pub mod audit;
pub mod engine;
pub mod guard;
pub mod locks;
pub mod risk;
pub mod settings;

pub use aggregator::{SpendAggregator, SpendSnapshot, WindowTotals};
pub use audit::AuditLogger;
pub use engine::{AuthorizationEngine, CheckContext, CheckVerdict, PolicyCheck};
pub use guard::{LogRequest, SpendSummary, VetoGuard};
pub use locks::PrincipalLocks;
pub use risk::{RiskAssessment, RiskInput};
pub use settings::SettingsManager;
