//! Shared SQLite connection handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::info;

use crate::error::StoreError;
use crate::schema;

/// Thread-safe SQLite connection handle.
///
/// Cloning is cheap and shares the underlying connection, so every request
/// can own its own handle while the store stays the only shared resource.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Open or create the database file at `path`, creating parent
    /// directories as needed.
    ///
    /// Only connection pragmas are applied; tables are created by
    /// [`crate::Storage::create_schema`].
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create {}: {e}", parent.display())))?;
        }
        let db = Self::configure(Connection::open(path)?, path.to_owned())?;
        info!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// Private in-memory database. Clones share it; nothing else can.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::configure(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    fn configure(conn: Connection, path: PathBuf) -> Result<Self, StoreError> {
        conn.execute_batch(schema::PRAGMAS)
            .map_err(|e| StoreError::Database(format!("pragmas: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Execute a closure with the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a closure inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken up front, so a read-then-write sequence in
    /// `f` cannot interleave with another writer. The transaction commits
    /// when `f` returns `Ok` and rolls back otherwise.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// File path, or `:memory:`.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
