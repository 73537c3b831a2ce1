use super::OptionStore;
use crate::error::{Error, Result};
use crate::sites::{Site, SiteType};
use chrono::Utc;
use fs2::FileExt;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOCK_FILE_NAME: &str = ".lock";
const SCHEMA_VERSION: i32 = 2;

/// One row of the applied-migrations record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub identifier: String,
    pub name: String,
    pub applied_at: String,
}

/// SQLite-backed store for options, applied migrations and site records.
///
/// Holds an advisory file lock (`.lock` next to the database) for its
/// lifetime; the lock is released when dropped.
pub struct StateStore {
    db_path: PathBuf,
    conn: Connection,
    /// Advisory lock file handle - held to flag concurrent modifications.
    #[allow(dead_code)]
    lock_file: Option<std::fs::File>,
}

impl StateStore {
    /// Open (creating if needed) the store at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        let dir = db_path
            .parent()
            .ok_or_else(|| Error::Config(format!("Invalid state path {}", db_path.display())))?;
        std::fs::create_dir_all(dir)?;

        let lock_file = Self::try_acquire_lock(&dir.join(LOCK_FILE_NAME))?;
        let conn = Connection::open(db_path)?;

        // Configure WAL mode for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        let store = Self {
            db_path: db_path.to_path_buf(),
            conn,
            lock_file,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an ephemeral in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            db_path: PathBuf::from(":memory:"),
            conn,
            lock_file: None,
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Try to acquire an advisory file lock.
    ///
    /// Returns the lock file handle if successful, or None if another process
    /// holds the lock (with a warning logged).
    fn try_acquire_lock(lock_path: &Path) -> Result<Option<std::fs::File>> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| Error::Filesystem(format!("Failed to open lock file: {}", e)))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                let _ = file.set_len(0);
                let _ = writeln!(file, "{}", std::process::id());
                debug!("Acquired advisory lock on {:?}", lock_path);
                Ok(Some(file))
            }
            Err(e) => {
                let owner = std::fs::read_to_string(lock_path).unwrap_or_default();
                warn!(
                    "Another process (PID {}) holds {:?}: {}. Proceeding anyway, but concurrent changes to the global services are unsafe.",
                    owner.trim(),
                    lock_path,
                    e
                );
                Ok(None)
            }
        }
    }

    /// Create schema or bring an existing one up to date.
    fn initialize(&self) -> Result<()> {
        let schema_exists: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )?;

        if !schema_exists {
            debug!("Creating SQLite schema");
            self.create_schema()?;
        } else {
            self.run_schema_migrations()?;
        }
        Ok(())
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE options (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE migrations (
                identifier TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE sites (
                url TEXT PRIMARY KEY,
                site_type TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                db_host TEXT,
                cache_host TEXT,
                fs_path TEXT NOT NULL
            );
            "#,
        )?;

        self.conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Run database migrations to bring schema up to current version
    fn run_schema_migrations(&self) -> Result<()> {
        let current_version: i32 = self
            .conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get::<_, Option<i32>>(0)
            })?
            .unwrap_or(1);

        if current_version >= SCHEMA_VERSION {
            debug!(
                "Database schema is up to date (version {})",
                current_version
            );
            return Ok(());
        }

        info!(
            "Migrating database schema from version {} to {}",
            current_version, SCHEMA_VERSION
        );

        // v1 -> v2: site records moved into this database
        if current_version < 2 {
            self.conn.execute_batch(
                r#"
                BEGIN;
                CREATE TABLE IF NOT EXISTS sites (
                    url TEXT PRIMARY KEY,
                    site_type TEXT NOT NULL,
                    enabled INTEGER NOT NULL DEFAULT 1,
                    db_host TEXT,
                    cache_host TEXT,
                    fs_path TEXT NOT NULL
                );
                INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (2, datetime('now'));
                COMMIT;
                "#,
            )?;
        }
        Ok(())
    }

    // ========================================================================
    // Applied migrations
    // ========================================================================

    pub fn applied_migrations(&self) -> Result<Vec<AppliedMigration>> {
        let mut stmt = self.conn.prepare(
            "SELECT identifier, name, applied_at FROM migrations ORDER BY identifier",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AppliedMigration {
                identifier: row.get(0)?,
                name: row.get(1)?,
                applied_at: row.get(2)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }

    pub fn applied_identifiers(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .applied_migrations()?
            .into_iter()
            .map(|m| m.identifier)
            .collect())
    }

    /// Record a migration as applied. Recording twice is a no-op.
    pub fn record_migration(&self, identifier: &str, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO migrations (identifier, name, applied_at) VALUES (?1, ?2, ?3)",
            params![identifier, name, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ========================================================================
    // Sites
    // ========================================================================

    pub fn sites(&self) -> Result<Vec<Site>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, site_type, enabled, db_host, cache_host, fs_path FROM sites ORDER BY url",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut sites = Vec::new();
        for row in rows {
            let (url, site_type, enabled, db_host, cache_host, fs_path) = row?;
            sites.push(Site {
                url,
                site_type: site_type.parse::<SiteType>()?,
                enabled,
                db_host,
                cache_host,
                fs_path: PathBuf::from(fs_path),
            });
        }
        Ok(sites)
    }

    pub fn upsert_site(&self, site: &Site) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO sites (url, site_type, enabled, db_host, cache_host, fs_path)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(url) DO UPDATE SET
                site_type = excluded.site_type,
                enabled = excluded.enabled,
                db_host = excluded.db_host,
                cache_host = excluded.cache_host,
                fs_path = excluded.fs_path
            "#,
            params![
                site.url,
                site.site_type.as_str(),
                site.enabled,
                site.db_host,
                site.cache_host,
                site.fs_path.to_string_lossy(),
            ],
        )?;
        Ok(())
    }
}

impl OptionStore for StateStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM options WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::from)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO options (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (StateStore, TempDir) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = StateStore::open(&dir.path().join("db").join("state.db")).unwrap();
        (store, dir)
    }

    #[test]
    fn test_options_round_trip_and_overwrite() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.get("global-db").unwrap(), None);

        store.set("global-db", "first").unwrap();
        store.set("global-db", "second").unwrap();
        assert_eq!(store.get("global-db").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_record_migration_is_idempotent() {
        let store = StateStore::open_in_memory().unwrap();
        store.record_migration("20200101000000", "b").unwrap();
        store.record_migration("20190101000000", "a").unwrap();
        store.record_migration("20190101000000", "a").unwrap();

        let applied = store.applied_migrations().unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].identifier, "20190101000000");
        assert!(store.applied_identifiers().unwrap().contains("20200101000000"));
    }

    #[test]
    fn test_state_survives_reopen() {
        let (store, dir) = create_test_store();
        store.set("k", "v").unwrap();
        store.record_migration("1", "one").unwrap();
        drop(store);

        let reopened = StateStore::open(&dir.path().join("db").join("state.db")).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(reopened.applied_identifiers().unwrap().len(), 1);
    }

    #[test]
    fn test_v1_schema_gets_sites_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                r#"
                CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL);
                CREATE TABLE options (key TEXT PRIMARY KEY, value TEXT NOT NULL);
                CREATE TABLE migrations (identifier TEXT PRIMARY KEY, name TEXT NOT NULL, applied_at TEXT NOT NULL);
                INSERT INTO schema_version VALUES (1, datetime('now'));
                "#,
            )
            .unwrap();
        }

        let store = StateStore::open(&path).unwrap();
        assert!(store.sites().unwrap().is_empty());
    }

    #[test]
    fn test_sites_round_trip() {
        let store = StateStore::open_in_memory().unwrap();
        let site = Site {
            url: "a.test".to_string(),
            site_type: SiteType::Php,
            enabled: false,
            db_host: None,
            cache_host: Some("global-redis".to_string()),
            fs_path: PathBuf::from("/srv/a.test"),
        };
        store.upsert_site(&site).unwrap();
        store.upsert_site(&site).unwrap();

        assert_eq!(store.sites().unwrap(), vec![site]);
    }
}
