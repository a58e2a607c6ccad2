//! SQLite metadata store for one working copy.
//!
//! Provides a [`Database`] handle with WAL-mode journaling, automatic schema
//! migrations, and typed query helpers for nodes, pristine texts, conflict
//! records, the root lock and the audit log.

pub mod queries;
pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

pub use queries::{AuditLogEntry, WcInfo, WcLockEntry};

/// Handle on the working-copy metadata database.
///
/// The inner connection is wrapped in a `Mutex` so that `Database` is
/// `Send + Sync`.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening working-copy database");

        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;

        debug!("database opened with WAL mode");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for testing).
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run all schema migrations to bring the database up to date.
    pub fn initialize(&self) -> Result<(), DatabaseError> {
        let conn = self.conn();
        schema::run_migrations(&conn)?;
        debug!("database schema is up to date");
        Ok(())
    }

    /// Obtain a lock on the underlying connection.
    ///
    /// A poisoned mutex is recovered rather than propagating the panic.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("database mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Execute a closure inside a SQLite transaction. If the closure returns
    /// `Ok`, the transaction is committed; otherwise it is rolled back.
    pub fn transaction<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory().expect("failed to create in-memory db");
        db.initialize().expect("failed to initialize schema");
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wc.db");
        let db = Database::new(&path).expect("failed to create file db");
        db.initialize().expect("failed to initialize schema");
        assert!(path.exists());
    }

    #[test]
    fn test_transaction_rollback() {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();

        let result: Result<(), DatabaseError> = db.transaction(|conn| {
            conn.execute(
                "INSERT INTO audit_log (action, path, details, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params!["test", "a", "rolled back", "2025-01-01T00:00:00Z"],
            )?;
            Err(DatabaseError::NotFound {
                entity: "test".into(),
                id: "forced".into(),
            })
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
