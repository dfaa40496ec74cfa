//! SQLite-based storage implementation for Souk.
//!
//! This crate provides a SQLite-based storage implementation of the
//! [`SoukStorageProvider`] trait. State is persisted to a file and survives restarts,
//! which makes it the backend for real deployments; [`SoukSqliteStorage::new_in_memory`]
//! gives a throwaway database with the same semantics for tests.
//!
//! # Atomicity
//!
//! Every operation runs on one connection guarded by a mutex. Multi-statement writes
//! (the summary and counter effect of a send, message appends) run inside a transaction,
//! and unread counters are updated with `count = count + 1` so increments are deltas
//! rather than read-modify-write.
//!
//! ```no_run
//! use souk_sqlite_storage::SoukSqliteStorage;
//!
//! let storage = SoukSqliteStorage::new("/path/to/souk.sqlite3")?;
//! # Ok::<(), souk_sqlite_storage::error::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;
use souk_storage_traits::{Backend, ChangeFeed, SoukStorageProvider, StorageChange};
use tokio::sync::broadcast;

mod conversations;
mod db;
pub mod error;
mod messages;
mod migrations;
pub mod validation;

use self::error::Error;

/// How long a statement waits on a lock held by another connection before
/// failing with `SQLITE_BUSY`
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A SQLite-based storage implementation for Souk.
///
/// Change notifications are only published after the write that produced them has
/// committed, so a subscriber that re-reads on notification always sees the change.
pub struct SoukSqliteStorage {
    /// The SQLite connection shared by all storage operations
    connection: Arc<Mutex<Connection>>,
    /// Announces committed writes
    changes: ChangeFeed,
}

impl std::fmt::Debug for SoukSqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoukSqliteStorage")
            .field("connection", &"Arc<Mutex<Connection>>")
            .finish()
    }
}

impl SoukSqliteStorage {
    /// Opens (or creates) the database at `file_path` and applies pending migrations.
    ///
    /// Parent directories are created if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or opened, or if a migration fails.
    pub fn new<P>(file_path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let file_path = file_path.as_ref();
        if let Some(parent) = file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut connection = Self::open_connection(file_path)?;
        migrations::run_migrations(&mut connection)?;

        tracing::debug!(path = %file_path.display(), "Opened SQLite storage");

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            changes: ChangeFeed::default(),
        })
    }

    /// Creates a new in-memory [`SoukSqliteStorage`].
    ///
    /// The database is discarded when the storage is dropped.
    pub fn new_in_memory() -> Result<Self, Error> {
        let mut connection = Connection::open_in_memory()?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::run_migrations(&mut connection)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            changes: ChangeFeed::default(),
        })
    }

    fn open_connection(file_path: &Path) -> Result<Connection, Error> {
        let conn = Connection::open(file_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Provides access to the underlying connection.
    ///
    /// A panic while holding the lock cannot leave a half-applied transaction behind
    /// (SQLite rolls it back when the `Transaction` is dropped), so a poisoned lock is
    /// recovered rather than propagated.
    pub(crate) fn with_connection<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&Connection) -> T,
    {
        let conn = self
            .connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&conn)
    }

    pub(crate) fn publish(&self, change: StorageChange) {
        self.changes.publish(change);
    }
}

impl SoukStorageProvider for SoukSqliteStorage {
    fn backend(&self) -> Backend {
        Backend::SQLite
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
