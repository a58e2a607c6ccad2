//! Typed query helpers for every table in the working-copy database.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::Database;
use crate::conflict::types::{
    ConflictAction, ConflictOperation, ConflictReason, ConflictVersion, PropertyConflict,
    TextConflict, TreeConflict,
};
use crate::errors::DatabaseError;
use crate::models::{
    self, CopyFrom, Depth, LockInfo, NodeKind, Properties, Schedule, WorkingNode,
};

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// The single row of `wc_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WcInfo {
    pub repos_root: String,
    pub repos_uuid: String,
    pub created_at: String,
}

/// Holder of the working-copy root lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WcLockEntry {
    pub owner: String,
    pub acquired_at: String,
}

/// A row from the `audit_log` table.
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    pub path: Option<String>,
    pub details: Option<String>,
    pub created_at: String,
}

const NODE_COLUMNS: &str = "path, kind, schedule, revision, repos_path, checksum, base_props,
     working_props, lock_token, lock_owner, lock_comment, lock_created_at, changelist,
     copyfrom_url, copyfrom_rev, depth, incomplete";

/// Raw `nodes` row before JSON columns are decoded.
struct NodeRow {
    path: String,
    kind: String,
    schedule: String,
    revision: Option<i64>,
    repos_path: String,
    checksum: Option<String>,
    base_props: String,
    working_props: Option<String>,
    lock_token: Option<String>,
    lock_owner: Option<String>,
    lock_comment: Option<String>,
    lock_created_at: Option<String>,
    changelist: Option<String>,
    copyfrom_url: Option<String>,
    copyfrom_rev: Option<i64>,
    depth: String,
    incomplete: bool,
}

impl NodeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            kind: row.get(1)?,
            schedule: row.get(2)?,
            revision: row.get(3)?,
            repos_path: row.get(4)?,
            checksum: row.get(5)?,
            base_props: row.get(6)?,
            working_props: row.get(7)?,
            lock_token: row.get(8)?,
            lock_owner: row.get(9)?,
            lock_comment: row.get(10)?,
            lock_created_at: row.get(11)?,
            changelist: row.get(12)?,
            copyfrom_url: row.get(13)?,
            copyfrom_rev: row.get(14)?,
            depth: row.get(15)?,
            incomplete: row.get(16)?,
        })
    }

    fn into_node(self) -> Result<WorkingNode, DatabaseError> {
        let corrupt = |detail: String| DatabaseError::Corrupt {
            entity: "node".into(),
            id: self.path.clone(),
            detail,
        };
        let base_props: Properties = serde_json::from_str(&self.base_props)
            .map_err(|e| corrupt(format!("base_props: {e}")))?;
        let working_props: Option<Properties> = match &self.working_props {
            Some(json) => Some(
                serde_json::from_str(json).map_err(|e| corrupt(format!("working_props: {e}")))?,
            ),
            None => None,
        };
        let depth = Depth::from_str_val(&self.depth)
            .ok_or_else(|| corrupt(format!("unknown depth '{}'", self.depth)))?;
        let lock = self.lock_token.map(|token| LockInfo {
            token,
            owner: self.lock_owner,
            comment: self.lock_comment,
            created_at: self.lock_created_at,
        });
        let copy_from = match (self.copyfrom_url, self.copyfrom_rev) {
            (Some(url), Some(revision)) => Some(CopyFrom { url, revision }),
            _ => None,
        };
        Ok(WorkingNode {
            kind: NodeKind::from_str_val(&self.kind),
            schedule: Schedule::from_str_val(&self.schedule),
            revision: self.revision,
            repos_path: self.repos_path,
            checksum: self.checksum,
            base_props,
            working_props,
            lock,
            changelist: self.changelist,
            copy_from,
            depth,
            incomplete: self.incomplete,
            path: self.path,
        })
    }
}

fn collect_nodes(rows: Vec<NodeRow>) -> Result<Vec<WorkingNode>, DatabaseError> {
    rows.into_iter().map(NodeRow::into_node).collect()
}

fn parent_of(path: &str) -> Option<&str> {
    crate::target::parent(path)
}

// ---------------------------------------------------------------------------
// Query implementations
// ---------------------------------------------------------------------------

impl Database {
    // -- wc_info ------------------------------------------------------------

    /// Record the repository this working copy belongs to.
    pub fn set_wc_info(&self, repos_root: &str, repos_uuid: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO wc_info (id, repos_root, repos_uuid, created_at) VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET repos_root = excluded.repos_root,
                                           repos_uuid = excluded.repos_uuid",
            params![repos_root, repos_uuid, now],
        )?;
        debug!(repos_root, repos_uuid, "stored working-copy info");
        Ok(())
    }

    pub fn get_wc_info(&self) -> Result<Option<WcInfo>, DatabaseError> {
        let conn = self.conn();
        let info = conn
            .query_row(
                "SELECT repos_root, repos_uuid, created_at FROM wc_info WHERE id = 1",
                [],
                |row| {
                    Ok(WcInfo {
                        repos_root: row.get(0)?,
                        repos_uuid: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    // -- nodes --------------------------------------------------------------

    /// Insert or replace the metadata of one node.
    pub fn upsert_node(&self, node: &WorkingNode) -> Result<(), DatabaseError> {
        let base_props = serde_json::to_string(&node.base_props)?;
        let working_props = match &node.working_props {
            Some(props) => Some(serde_json::to_string(props)?),
            None => None,
        };
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO nodes (path, parent, kind, schedule, revision, repos_path,
                 checksum, base_props, working_props, lock_token, lock_owner, lock_comment,
                 lock_created_at, changelist, copyfrom_url, copyfrom_rev, depth, incomplete)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                node.path,
                parent_of(&node.path),
                node.kind.to_string(),
                node.schedule.to_string(),
                node.revision,
                node.repos_path,
                node.checksum,
                base_props,
                working_props,
                node.lock.as_ref().map(|l| l.token.as_str()),
                node.lock.as_ref().and_then(|l| l.owner.as_deref()),
                node.lock.as_ref().and_then(|l| l.comment.as_deref()),
                node.lock.as_ref().and_then(|l| l.created_at.as_deref()),
                node.changelist,
                node.copy_from.as_ref().map(|c| c.url.as_str()),
                node.copy_from.as_ref().map(|c| c.revision),
                node.depth.to_string(),
                node.incomplete,
            ],
        )?;
        debug!(path = %node.path, schedule = %node.schedule, "stored node");
        Ok(())
    }

    /// Look up one node by relpath.
    pub fn get_node(&self, path: &str) -> Result<Option<WorkingNode>, DatabaseError> {
        let row = {
            let conn = self.conn();
            conn.query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE path = ?1"),
                params![path],
                NodeRow::from_row,
            )
            .optional()?
        };
        row.map(NodeRow::into_node).transpose()
    }

    /// Direct children of `path`, sorted by name.
    pub fn get_children(&self, path: &str) -> Result<Vec<WorkingNode>, DatabaseError> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM nodes WHERE parent = ?1 ORDER BY path"
            ))?;
            let rows = stmt
                .query_map(params![path], NodeRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        collect_nodes(rows)
    }

    /// `path` and everything below it, sorted by path.
    pub fn get_subtree(&self, path: &str) -> Result<Vec<WorkingNode>, DatabaseError> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM nodes
                 WHERE ?1 = '' OR path = ?1 OR substr(path, 1, length(?1) + 1) = ?1 || '/'
                 ORDER BY path"
            ))?;
            let rows = stmt
                .query_map(params![path], NodeRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        collect_nodes(rows)
    }

    /// Nodes assigned to the changelist `name`.
    pub fn get_changelist_members(&self, name: &str) -> Result<Vec<WorkingNode>, DatabaseError> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM nodes WHERE changelist = ?1 ORDER BY path"
            ))?;
            let rows = stmt
                .query_map(params![name], NodeRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        collect_nodes(rows)
    }

    /// Remove `path` and all its descendants from version control.
    pub fn delete_subtree(&self, path: &str) -> Result<usize, DatabaseError> {
        let removed = self.conn().execute(
            "DELETE FROM nodes
             WHERE ?1 = '' OR path = ?1 OR substr(path, 1, length(?1) + 1) = ?1 || '/'",
            params![path],
        )?;
        debug!(path, removed, "removed nodes");
        Ok(removed)
    }

    // -- pristine -----------------------------------------------------------

    /// Store a base text and return its checksum.
    pub fn put_pristine(&self, content: &[u8]) -> Result<String, DatabaseError> {
        let checksum = models::sha256_hex(content);
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT OR IGNORE INTO pristine (checksum, content, size, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![checksum, content, content.len() as i64, now],
        )?;
        Ok(checksum)
    }

    /// Fetch a base text by checksum.
    pub fn get_pristine(&self, checksum: &str) -> Result<Option<Vec<u8>>, DatabaseError> {
        let conn = self.conn();
        let content = conn
            .query_row(
                "SELECT content FROM pristine WHERE checksum = ?1",
                params![checksum],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content)
    }

    /// Drop base texts no node references any more.
    pub fn prune_pristines(&self) -> Result<usize, DatabaseError> {
        let removed = self.conn().execute(
            "DELETE FROM pristine
             WHERE checksum NOT IN (SELECT checksum FROM nodes WHERE checksum IS NOT NULL)",
            [],
        )?;
        debug!(removed, "pruned unreferenced pristine texts");
        Ok(removed)
    }

    // -- text_conflicts -----------------------------------------------------

    pub fn insert_text_conflict(
        &self,
        path: &str,
        conflict: &TextConflict,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO text_conflicts (path, operation, base_file, mine_file, theirs_file,
                 left_rev, right_rev, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                path,
                conflict.operation.to_string(),
                conflict.base_file,
                conflict.mine_file,
                conflict.theirs_file,
                conflict.left_rev,
                conflict.right_rev,
                now
            ],
        )?;
        debug!(path, "inserted text conflict");
        Ok(())
    }

    pub fn get_text_conflict(&self, path: &str) -> Result<Option<TextConflict>, DatabaseError> {
        let conn = self.conn();
        let conflict = conn
            .query_row(
                "SELECT operation, base_file, mine_file, theirs_file, left_rev, right_rev
                 FROM text_conflicts WHERE path = ?1",
                params![path],
                |row| {
                    let operation: String = row.get(0)?;
                    Ok(TextConflict {
                        operation: ConflictOperation::from_str_val(&operation),
                        base_file: row.get(1)?,
                        mine_file: row.get(2)?,
                        theirs_file: row.get(3)?,
                        left_rev: row.get(4)?,
                        right_rev: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(conflict)
    }

    pub fn delete_text_conflict(&self, path: &str) -> Result<bool, DatabaseError> {
        let n = self
            .conn()
            .execute("DELETE FROM text_conflicts WHERE path = ?1", params![path])?;
        Ok(n > 0)
    }

    // -- prop_conflicts -----------------------------------------------------

    pub fn insert_prop_conflict(
        &self,
        path: &str,
        conflict: &PropertyConflict,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO prop_conflicts (path, name, operation, base_value, mine_value,
                 theirs_value, reject_file, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                path,
                conflict.name,
                conflict.operation.to_string(),
                conflict.base_value,
                conflict.mine_value,
                conflict.theirs_value,
                conflict.reject_file,
                now
            ],
        )?;
        debug!(path, name = %conflict.name, "inserted property conflict");
        Ok(())
    }

    /// Every property conflict on `path`, ordered by property name.
    pub fn get_prop_conflicts(&self, path: &str) -> Result<Vec<PropertyConflict>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name, operation, base_value, mine_value, theirs_value, reject_file
             FROM prop_conflicts WHERE path = ?1 ORDER BY name",
        )?;
        let conflicts = stmt
            .query_map(params![path], |row| {
                let operation: String = row.get(1)?;
                Ok(PropertyConflict {
                    name: row.get(0)?,
                    operation: ConflictOperation::from_str_val(&operation),
                    base_value: row.get(2)?,
                    mine_value: row.get(3)?,
                    theirs_value: row.get(4)?,
                    reject_file: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(conflicts)
    }

    pub fn delete_prop_conflict(&self, path: &str, name: &str) -> Result<bool, DatabaseError> {
        let n = self.conn().execute(
            "DELETE FROM prop_conflicts WHERE path = ?1 AND name = ?2",
            params![path, name],
        )?;
        Ok(n > 0)
    }

    // -- tree_conflicts -----------------------------------------------------

    pub fn insert_tree_conflict(
        &self,
        path: &str,
        conflict: &TreeConflict,
    ) -> Result<(), DatabaseError> {
        let left = conflict
            .left
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let right = conflict
            .right
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO tree_conflicts (path, victim_kind, operation, action, reason,
                 left_version, right_version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                path,
                conflict.victim_kind.to_string(),
                conflict.operation.to_string(),
                conflict.action.to_string(),
                conflict.reason.to_string(),
                left,
                right,
                now
            ],
        )?;
        debug!(path, action = %conflict.action, reason = %conflict.reason, "inserted tree conflict");
        Ok(())
    }

    pub fn get_tree_conflict(&self, path: &str) -> Result<Option<TreeConflict>, DatabaseError> {
        let raw = {
            let conn = self.conn();
            conn.query_row(
                "SELECT victim_kind, operation, action, reason, left_version, right_version
                 FROM tree_conflicts WHERE path = ?1",
                params![path],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?
        };
        let Some((kind, operation, action, reason, left, right)) = raw else {
            return Ok(None);
        };
        let decode = |json: Option<String>| -> Result<Option<ConflictVersion>, DatabaseError> {
            json.map(|j| {
                serde_json::from_str(&j).map_err(|e| DatabaseError::Corrupt {
                    entity: "tree conflict".into(),
                    id: path.to_string(),
                    detail: e.to_string(),
                })
            })
            .transpose()
        };
        Ok(Some(TreeConflict {
            victim_kind: NodeKind::from_str_val(&kind),
            operation: ConflictOperation::from_str_val(&operation),
            action: ConflictAction::from_str_val(&action),
            reason: ConflictReason::from_str_val(&reason),
            left: decode(left)?,
            right: decode(right)?,
        }))
    }

    pub fn delete_tree_conflict(&self, path: &str) -> Result<bool, DatabaseError> {
        let n = self
            .conn()
            .execute("DELETE FROM tree_conflicts WHERE path = ?1", params![path])?;
        Ok(n > 0)
    }

    /// Paths with any stored conflict row at or below `root`, sorted.
    pub fn list_conflicted_paths(&self, root: &str) -> Result<Vec<String>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT path FROM (
                 SELECT path FROM text_conflicts
                 UNION SELECT path FROM prop_conflicts
                 UNION SELECT path FROM tree_conflicts)
             WHERE ?1 = '' OR path = ?1 OR substr(path, 1, length(?1) + 1) = ?1 || '/'
             ORDER BY path",
        )?;
        let paths = stmt
            .query_map(params![root], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(paths)
    }

    // -- wc_lock ------------------------------------------------------------

    /// Try to take the root lock. Returns the current holder if it is taken.
    pub fn acquire_wc_lock(&self, owner: &str) -> Result<Option<WcLockEntry>, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.transaction(|conn| {
            let existing = conn
                .query_row("SELECT owner, acquired_at FROM wc_lock WHERE id = 1", [], |row| {
                    Ok(WcLockEntry {
                        owner: row.get(0)?,
                        acquired_at: row.get(1)?,
                    })
                })
                .optional()?;
            if existing.is_some() {
                return Ok(existing);
            }
            conn.execute(
                "INSERT INTO wc_lock (id, owner, acquired_at) VALUES (1, ?1, ?2)",
                params![owner, now],
            )?;
            debug!(owner, "acquired working-copy lock");
            Ok(None)
        })
    }

    /// Release the root lock if `owner` holds it.
    pub fn release_wc_lock(&self, owner: &str) -> Result<bool, DatabaseError> {
        let n = self
            .conn()
            .execute("DELETE FROM wc_lock WHERE owner = ?1", params![owner])?;
        debug!(owner, released = n > 0, "released working-copy lock");
        Ok(n > 0)
    }

    /// Forcefully remove the root lock, returning the previous holder.
    pub fn break_wc_lock(&self) -> Result<Option<WcLockEntry>, DatabaseError> {
        self.transaction(|conn| {
            let existing = conn
                .query_row("SELECT owner, acquired_at FROM wc_lock WHERE id = 1", [], |row| {
                    Ok(WcLockEntry {
                        owner: row.get(0)?,
                        acquired_at: row.get(1)?,
                    })
                })
                .optional()?;
            conn.execute("DELETE FROM wc_lock", [])?;
            Ok(existing)
        })
    }

    // -- audit_log ----------------------------------------------------------

    pub fn insert_audit_log(
        &self,
        action: &str,
        path: Option<&str>,
        details: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO audit_log (action, path, details, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![action, path, details, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent audit entries first.
    pub fn list_audit_log(&self, limit: u32) -> Result<Vec<AuditLogEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, action, path, details, created_at FROM audit_log
             ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(AuditLogEntry {
                    id: row.get(0)?,
                    action: row.get(1)?,
                    path: row.get(2)?,
                    details: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
