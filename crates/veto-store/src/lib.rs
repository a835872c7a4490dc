//! # veto-store
//!
//! Backends for the Veto storage ports:
//!
//! - **SqliteStore**: persistent, WAL-mode SQLite. Uniqueness and the
//!   ledger's append-only rule are enforced by the schema itself.
//! - **InMemoryStore**: process-local maps, for tests and embedding.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
