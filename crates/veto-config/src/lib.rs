//! # veto-config
//!
//! Configuration system for Veto. Reads from `veto.toml` and environment
//! variables, in that precedence order, and installs the tracing subscriber.

pub mod loader;
pub mod logging;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::VetoConfig;
pub use schema::{ConfigWarning, GuardConfig, LoggingConfig, StorageConfig, WarningSeverity};
