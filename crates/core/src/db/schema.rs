//! Working-copy metadata schema and migration runner.
//!
//! Migrations are simple SQL strings applied in order. The SQLite
//! `user_version` pragma tracks which migrations have already been applied.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
static MIGRATIONS: &[(u32, &str, &str)] = &[
    (
        1,
        "initial working-copy schema",
        r#"
        CREATE TABLE IF NOT EXISTS wc_info (
            id          INTEGER PRIMARY KEY CHECK (id = 1),
            repos_root  TEXT NOT NULL,
            repos_uuid  TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS nodes (
            path            TEXT PRIMARY KEY,
            parent          TEXT,
            kind            TEXT NOT NULL CHECK (kind IN ('file', 'dir', 'none')),
            schedule        TEXT NOT NULL DEFAULT 'normal'
                                 CHECK (schedule IN ('normal', 'add', 'delete', 'replace')),
            revision        INTEGER,
            repos_path      TEXT NOT NULL,
            checksum        TEXT,
            base_props      TEXT NOT NULL DEFAULT '{}',
            working_props   TEXT,
            lock_token      TEXT,
            lock_owner      TEXT,
            lock_comment    TEXT,
            lock_created_at TEXT,
            changelist      TEXT,
            copyfrom_url    TEXT,
            copyfrom_rev    INTEGER,
            depth           TEXT NOT NULL DEFAULT 'infinity',
            incomplete      INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes (parent);
        CREATE INDEX IF NOT EXISTS idx_nodes_changelist ON nodes (changelist);

        CREATE TABLE IF NOT EXISTS pristine (
            checksum    TEXT PRIMARY KEY,
            content     BLOB NOT NULL,
            size        INTEGER NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS text_conflicts (
            path        TEXT PRIMARY KEY,
            operation   TEXT NOT NULL,
            base_file   TEXT,
            mine_file   TEXT NOT NULL,
            theirs_file TEXT NOT NULL,
            left_rev    INTEGER,
            right_rev   INTEGER NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS prop_conflicts (
            path         TEXT NOT NULL,
            name         TEXT NOT NULL,
            operation    TEXT NOT NULL,
            base_value   TEXT,
            mine_value   TEXT,
            theirs_value TEXT,
            reject_file  TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            PRIMARY KEY (path, name)
        );

        CREATE TABLE IF NOT EXISTS tree_conflicts (
            path          TEXT PRIMARY KEY,
            victim_kind   TEXT NOT NULL,
            operation     TEXT NOT NULL,
            action        TEXT NOT NULL,
            reason        TEXT NOT NULL,
            left_version  TEXT,
            right_version TEXT,
            created_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS wc_lock (
            id          INTEGER PRIMARY KEY CHECK (id = 1),
            owner       TEXT NOT NULL,
            acquired_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            action      TEXT NOT NULL,
            path        TEXT,
            details     TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_log_created ON audit_log (created_at);
        "#,
    ),
];

/// Apply every migration newer than the stored schema version.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current = get_schema_version(conn)?;
    debug!(current_version = current, "checking schema version");

    for &(version, description, sql) in MIGRATIONS {
        if version > current {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied successfully");
        }
    }

    Ok(())
}

/// Version of the newest known migration.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|(v, _, _)| *v).unwrap_or(0)
}

fn get_schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<(), DatabaseError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}
