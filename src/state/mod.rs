//! Persistent state for the global stack.
//!
//! This module provides SQLite-backed storage for:
//!
//! - Options (key → string): the database root password, network subnets
//! - The applied-migrations record
//! - Site records (read by migrations)
//!
//! # Architecture
//!
//! State is persisted in a SQLite database (`<root>/db/state.db`) with WAL
//! mode enabled for crash recovery. An advisory lock file sits next to it so
//! a second concurrent process is at least warned about.
//!
//! # Example
//!
//! ```ignore
//! use global_services::state::{OptionStore, StateStore};
//!
//! let store = StateStore::open(&settings.state_db())?;
//! store.set("global-db", "s3cret")?;
//! assert_eq!(store.get("global-db")?.as_deref(), Some("s3cret"));
//! ```

mod sqlite;

pub use sqlite::{AppliedMigration, StateStore};

use crate::error::Result;

/// Option key holding the global database root password.
pub const DB_PASSWORD_KEY: &str = "global-db";
/// Option key holding the frontend network subnet.
pub const FRONTEND_SUBNET_KEY: &str = "global_frontend_network_subnet_ip";
/// Option key holding the backend network subnet.
pub const BACKEND_SUBNET_KEY: &str = "global_backend_network_subnet_ip";

/// Durable key/value option storage.
pub trait OptionStore {
    /// Look up a previously stored value.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}
