//! The working copy: an on-disk tree plus its metadata store.
//!
//! [`WorkingCopy`] owns the root path, the [`Database`] in the admin area
//! and the invocation's [`WcConfig`]. It implements the local operations
//! (`add`, `delete`, `revert`, properties, changelists, lock tokens,
//! post-commit bookkeeping, `cleanup`) and the primitives the status classifier, the
//! conflict store and the driver build on.

pub mod lock;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::{WcConfig, ADMIN_DIR};
use crate::conflict::{ConflictKind, ConflictStore};
use crate::db::Database;
use crate::errors::{DatabaseError, WcError};
use crate::filter;
use crate::mergeinfo::Mergeinfo;
use crate::models::{
    self, Depth, LockInfo, NodeKind, Properties, Revnum, Schedule, WorkingNode, PROP_MERGEINFO,
};
use crate::status::IgnoreRules;
use crate::target;

pub use lock::WcLockGuard;

const DB_FILE: &str = "wc.db";

/// Handle on one working copy.
pub struct WorkingCopy {
    root: PathBuf,
    db: Database,
    config: WcConfig,
}

impl WorkingCopy {
    /// Initialise a new working copy at `root` bound to `repos_path` of the
    /// repository at `repos_root`. The root node starts at `revision`.
    pub fn create(
        root: &Path,
        repos_root: &str,
        repos_uuid: &str,
        repos_path: &str,
        revision: Revnum,
        config: WcConfig,
    ) -> Result<Self, WcError> {
        let admin = root.join(ADMIN_DIR);
        if admin.join(DB_FILE).exists() {
            return Err(WcError::AlreadyVersioned(root.display().to_string()));
        }
        std::fs::create_dir_all(&admin).map_err(|e| WcError::io(&admin, e))?;

        let db = Database::new(admin.join(DB_FILE))?;
        db.initialize()?;
        db.set_wc_info(repos_root, repos_uuid)?;

        let repos_path = format!("/{}", repos_path.trim_matches('/'));
        let mut root_node = WorkingNode::versioned("", NodeKind::Dir, repos_path, revision);
        root_node.depth = Depth::Infinity;
        db.upsert_node(&root_node)?;

        info!(root = %root.display(), repos_root, revision, "created working copy");
        Ok(Self {
            root: root.to_path_buf(),
            db,
            config,
        })
    }

    /// Open the working copy rooted at `root`.
    pub fn open(root: &Path, config: WcConfig) -> Result<Self, WcError> {
        let db_path = root.join(ADMIN_DIR).join(DB_FILE);
        if !db_path.is_file() {
            return Err(WcError::NotAWorkingCopy(root.to_path_buf()));
        }
        let db = Database::new(&db_path)?;
        db.initialize()?;
        debug!(root = %root.display(), "opened working copy");
        Ok(Self {
            root: root.to_path_buf(),
            db,
            config,
        })
    }

    /// Walk up from `path` to the nearest directory with an admin area.
    pub fn find_root(path: &Path) -> Option<PathBuf> {
        path.ancestors()
            .find(|p| p.join(ADMIN_DIR).join(DB_FILE).is_file())
            .map(Path::to_path_buf)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &WcConfig {
        &self.config
    }

    /// On-disk location of a relpath.
    pub fn abspath(&self, relpath: &str) -> PathBuf {
        if relpath.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relpath)
        }
    }

    /// Relpath of an on-disk path (absolute, or relative to the root).
    pub fn relpath(&self, path: &Path) -> Result<String, WcError> {
        Ok(target::relpath_from_fs(&self.root, path)?)
    }

    pub fn repos_root(&self) -> Result<String, WcError> {
        Ok(self
            .db
            .get_wc_info()?
            .map(|info| info.repos_root)
            .unwrap_or_default())
    }

    /// Take the exclusive root lock.
    pub fn lock(&self) -> Result<WcLockGuard<'_>, WcError> {
        WcLockGuard::acquire(&self.db, &self.root.display().to_string())
    }

    // -- node access --------------------------------------------------------

    pub fn node(&self, path: &str) -> Result<Option<WorkingNode>, WcError> {
        Ok(self.db.get_node(path)?)
    }

    /// The node at `path`, or [`WcError::NotVersioned`].
    pub fn require_node(&self, path: &str) -> Result<WorkingNode, WcError> {
        self.node(path)?
            .ok_or_else(|| WcError::NotVersioned(path.to_string()))
    }

    pub fn children(&self, path: &str) -> Result<Vec<WorkingNode>, WcError> {
        Ok(self.db.get_children(path)?)
    }

    pub fn subtree(&self, path: &str) -> Result<Vec<WorkingNode>, WcError> {
        Ok(self.db.get_subtree(path)?)
    }

    pub fn save_node(&self, node: &WorkingNode) -> Result<(), WcError> {
        Ok(self.db.upsert_node(node)?)
    }

    // -- content ------------------------------------------------------------

    /// Working file text, `None` if nothing is on disk.
    pub fn read_working(&self, path: &str) -> Result<Option<Vec<u8>>, WcError> {
        let abs = self.abspath(path);
        match std::fs::read(&abs) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WcError::io(abs, e)),
        }
    }

    /// Write a working file, creating missing parent directories.
    pub fn write_working(&self, path: &str, content: &[u8]) -> Result<(), WcError> {
        let abs = self.abspath(path);
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WcError::io(parent, e))?;
        }
        std::fs::write(&abs, content).map_err(|e| WcError::io(abs, e))
    }

    /// Base text of a file node (empty for added files without history).
    pub fn read_pristine(&self, node: &WorkingNode) -> Result<Vec<u8>, WcError> {
        let Some(checksum) = &node.checksum else {
            return Ok(Vec::new());
        };
        self.db.get_pristine(checksum)?.ok_or_else(|| {
            WcError::Database(DatabaseError::NotFound {
                entity: "pristine".into(),
                id: checksum.clone(),
            })
        })
    }

    /// Store `content` as the base text of `node`.
    pub fn install_pristine(&self, node: &mut WorkingNode, content: &[u8]) -> Result<(), WcError> {
        node.checksum = Some(self.db.put_pristine(content)?);
        Ok(())
    }

    /// `true` when the working file differs from its base text. Missing
    /// files and directories are never text-modified.
    pub fn text_modified(&self, node: &WorkingNode) -> Result<bool, WcError> {
        if node.kind != NodeKind::File {
            return Ok(false);
        }
        match self.read_working(&node.path)? {
            None => Ok(false),
            Some(bytes) => match &node.checksum {
                Some(checksum) => Ok(&models::sha256_hex(&bytes) != checksum),
                None => Ok(true),
            },
        }
    }

    /// Binary per `svn:mime-type`, or per the content sniff of `content`.
    pub fn is_binary(&self, node: &WorkingNode, content: &[u8]) -> bool {
        node.has_binary_mime_type() || models::looks_binary(content)
    }

    // -- add / delete -------------------------------------------------------

    /// Schedule `path` (and, for directories, its contents per `depth`) for
    /// addition. Returns the added relpaths in tree order.
    pub fn add(&self, path: &str, depth: Depth) -> Result<Vec<String>, WcError> {
        let path = target::normalize_relpath(path)?;
        let parent_path = target::parent(&path)
            .ok_or_else(|| WcError::AlreadyVersioned(self.root.display().to_string()))?;
        let parent = self.require_node(parent_path)?;
        if parent.is_deleted() || parent.kind != NodeKind::Dir {
            return Err(WcError::InvalidArgument(format!(
                "cannot add '{path}': parent '{parent_path}' is not a versioned directory"
            )));
        }
        let mut added = Vec::new();
        self.add_node(&path, &parent, depth, &mut added)?;
        for p in &added {
            self.db.insert_audit_log("add", Some(p), None)?;
        }
        info!(path = %path, count = added.len(), "scheduled for addition");
        Ok(added)
    }

    fn add_node(
        &self,
        path: &str,
        parent: &WorkingNode,
        depth: Depth,
        added: &mut Vec<String>,
    ) -> Result<(), WcError> {
        let kind = NodeKind::on_disk(&self.abspath(path));
        if kind == NodeKind::None {
            return Err(WcError::io(
                self.abspath(path),
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
            ));
        }
        let repos_path = format!(
            "{}/{}",
            parent.repos_path.trim_end_matches('/'),
            target::basename(path)
        );
        let mut node = match self.node(path)? {
            Some(existing) if existing.is_deleted() => {
                let mut node = existing;
                node.schedule = Schedule::Replace;
                node.kind = kind;
                node
            }
            Some(_) => return Err(WcError::AlreadyVersioned(path.to_string())),
            None => WorkingNode::added(path, kind, repos_path),
        };
        if kind == NodeKind::Dir {
            node.depth = depth;
        }
        self.save_node(&node)?;
        added.push(path.to_string());

        if kind != NodeKind::Dir || depth == Depth::Empty {
            return Ok(());
        }
        let ignores = IgnoreRules::for_dir(&self.config, node.props());
        for (name, child_kind) in self.list_disk(path)? {
            if ignores.is_ignored(&name) || !filter::depth_admits(depth, 1, child_kind) {
                continue;
            }
            let child_depth = if depth == Depth::Infinity {
                Depth::Infinity
            } else {
                Depth::Empty
            };
            let child = target::join(path, &name);
            if self.node(&child)?.is_some() {
                continue;
            }
            self.add_node(&child, &node, child_depth, added)?;
        }
        Ok(())
    }

    /// Entries of an on-disk directory, sorted, without the admin area.
    pub fn list_disk(&self, path: &str) -> Result<Vec<(String, NodeKind)>, WcError> {
        let abs = self.abspath(path);
        let entries = std::fs::read_dir(&abs).map_err(|e| WcError::io(&abs, e))?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| WcError::io(&abs, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if path.is_empty() && name == ADMIN_DIR {
                continue;
            }
            let kind = NodeKind::on_disk(&entry.path());
            out.push((name, kind));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    /// Schedule `path` for deletion. With `keep_local` the on-disk item
    /// stays. Additions are simply reverted. Locally modified files are
    /// only removed from disk when `keep_local` is set.
    pub fn delete(&self, path: &str, keep_local: bool) -> Result<(), WcError> {
        let path = target::normalize_relpath(path)?;
        if path.is_empty() {
            return Err(WcError::InvalidArgument(
                "cannot delete the working-copy root".into(),
            ));
        }
        let node = self.require_node(&path)?;
        let subtree = self.subtree(&path)?;

        if !keep_local {
            for n in &subtree {
                if !n.is_deleted() && self.text_modified(n)? && n.schedule == Schedule::Normal {
                    return Err(WcError::InvalidArgument(format!(
                        "'{}' has local modifications; delete with keep_local to preserve them",
                        n.path
                    )));
                }
            }
        }

        if node.schedule == Schedule::Add {
            self.db.delete_subtree(&path)?;
        } else {
            for mut n in subtree {
                if n.schedule == Schedule::Add {
                    self.db.delete_subtree(&n.path)?;
                    continue;
                }
                n.schedule = Schedule::Delete;
                n.changelist = None;
                self.save_node(&n)?;
            }
        }

        if !keep_local {
            let abs = self.abspath(&path);
            let result = match NodeKind::on_disk(&abs) {
                NodeKind::Dir => std::fs::remove_dir_all(&abs),
                NodeKind::File => std::fs::remove_file(&abs),
                NodeKind::None => Ok(()),
            };
            result.map_err(|e| WcError::io(&abs, e))?;
        }
        self.db.insert_audit_log("delete", Some(&path), None)?;
        info!(path = %path, keep_local, "scheduled for deletion");
        Ok(())
    }

    /// Undo local changes under `path` to `depth`. Base text and base
    /// properties come back, deleted items reappear and additions become
    /// unversioned again (their files stay on disk). Conflict records and
    /// their artifacts are dropped. Returns the reverted relpaths.
    pub fn revert(&self, path: &str, depth: Depth) -> Result<Vec<String>, WcError> {
        let path = target::normalize_relpath(path)?;
        self.require_node(&path)?;
        let store = ConflictStore::new(self);

        let mut reverted = Vec::new();
        for mut node in self.subtree(&path)? {
            let distance = target::depth_below(&path, &node.path).unwrap_or(0);
            if !filter::depth_admits(depth, distance, node.kind) {
                continue;
            }
            // Already dropped together with an added ancestor.
            if self.node(&node.path)?.is_none() {
                continue;
            }

            // Stale rows whose artifacts are gone go too.
            let mut kinds = vec![ConflictKind::Text, ConflictKind::Tree];
            kinds.extend(
                self.db
                    .get_prop_conflicts(&node.path)?
                    .into_iter()
                    .map(|c| ConflictKind::Property(c.name)),
            );
            let mut changed = !store.clear(&node.path, &kinds)?.is_empty();

            if node.schedule == Schedule::Add {
                self.db.delete_subtree(&node.path)?;
                self.db.insert_audit_log("revert", Some(&node.path), None)?;
                reverted.push(node.path);
                continue;
            }

            if node.schedule != Schedule::Normal || node.props_modified() {
                node.schedule = Schedule::Normal;
                node.working_props = None;
                changed = true;
            }
            let abs = self.abspath(&node.path);
            match node.kind {
                NodeKind::File => {
                    let missing = NodeKind::on_disk(&abs) == NodeKind::None;
                    if missing || self.text_modified(&node)? {
                        let pristine = self.read_pristine(&node)?;
                        self.write_working(&node.path, &pristine)?;
                        changed = true;
                    }
                }
                NodeKind::Dir if NodeKind::on_disk(&abs) == NodeKind::None => {
                    std::fs::create_dir_all(&abs).map_err(|e| WcError::io(&abs, e))?;
                    changed = true;
                }
                _ => {}
            }
            if changed {
                self.save_node(&node)?;
                self.db.insert_audit_log("revert", Some(&node.path), None)?;
                reverted.push(node.path);
            }
        }
        info!(path = %path, ?depth, count = reverted.len(), "reverted");
        Ok(reverted)
    }

    // -- properties ---------------------------------------------------------

    /// Set a working property. `svn:mergeinfo` values are validated and
    /// stored normalised.
    pub fn set_property(&self, path: &str, name: &str, value: &str) -> Result<(), WcError> {
        let value = if name == PROP_MERGEINFO {
            Mergeinfo::parse(value)?.to_string()
        } else {
            value.to_string()
        };
        self.update_props(path, |props| {
            props.insert(name.to_string(), value);
        })?;
        debug!(path, name, "property set");
        Ok(())
    }

    pub fn delete_property(&self, path: &str, name: &str) -> Result<(), WcError> {
        self.update_props(path, |props| {
            props.remove(name);
        })?;
        debug!(path, name, "property deleted");
        Ok(())
    }

    pub fn property(&self, path: &str, name: &str) -> Result<Option<String>, WcError> {
        Ok(self.require_node(path)?.props().get(name).cloned())
    }

    fn update_props(&self, path: &str, f: impl FnOnce(&mut Properties)) -> Result<(), WcError> {
        let mut node = self.require_node(path)?;
        if node.is_deleted() {
            return Err(WcError::InvalidArgument(format!(
                "'{path}' is scheduled for deletion"
            )));
        }
        let mut props = node.props().clone();
        f(&mut props);
        node.working_props = if props == node.base_props {
            None
        } else {
            Some(props)
        };
        self.save_node(&node)
    }

    /// Explicit mergeinfo of `path`, if it has any.
    pub fn mergeinfo(&self, path: &str) -> Result<Option<Mergeinfo>, WcError> {
        match self.require_node(path)?.props().get(PROP_MERGEINFO) {
            Some(text) => Ok(Some(Mergeinfo::parse(text)?)),
            None => Ok(None),
        }
    }

    /// Mergeinfo in effect for `path`: its own, or the nearest ancestor's
    /// inheritable ranges translated down to it. The flag is `true` when
    /// the value was inherited.
    pub fn effective_mergeinfo(&self, path: &str) -> Result<(Mergeinfo, bool), WcError> {
        if let Some(own) = self.mergeinfo(path)? {
            return Ok((own, false));
        }
        for ancestor in target::ancestors(path) {
            if let Some(mi) = self.mergeinfo(ancestor)? {
                let rel = target::skip_ancestor(ancestor, path).unwrap_or("");
                return Ok((mi.inherited_by(rel), true));
            }
        }
        Ok((Mergeinfo::new(), true))
    }

    // -- changelists & lock tokens ------------------------------------------

    /// Assign files to `changelist`, or remove them from any changelist
    /// with `None`. Directories are rejected.
    pub fn set_changelist(&self, paths: &[String], changelist: Option<&str>) -> Result<Vec<String>, WcError> {
        let mut changed = Vec::new();
        for path in paths {
            let mut node = self.require_node(path)?;
            if node.kind == NodeKind::Dir {
                return Err(WcError::InvalidArgument(format!(
                    "'{path}' is a directory; only files can be in a changelist"
                )));
            }
            if node.changelist.as_deref() == changelist {
                continue;
            }
            node.changelist = changelist.map(str::to_string);
            self.save_node(&node)?;
            changed.push(node.path);
        }
        info!(changelist = ?changelist, count = changed.len(), "changelist updated");
        Ok(changed)
    }

    /// Record a repository lock token on a file.
    pub fn set_lock(&self, path: &str, lock: Option<LockInfo>) -> Result<(), WcError> {
        let mut node = self.require_node(path)?;
        node.lock = lock;
        self.save_node(&node)
    }

    // -- commit & cleanup ---------------------------------------------------

    /// Post-commit bookkeeping for `paths` (and their subtrees): working
    /// text and properties become base, schedules are cleared, revisions
    /// bumped to `new_rev`, deleted nodes are removed. Refused while any
    /// affected path is conflicted.
    pub fn finalize_commit(&self, paths: &[String], new_rev: Revnum) -> Result<usize, WcError> {
        let mut nodes = Vec::new();
        for path in paths {
            let path = target::normalize_relpath(path)?;
            nodes.extend(self.subtree(&path)?);
        }
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        nodes.dedup_by(|a, b| a.path == b.path);

        for node in &nodes {
            if !self.db.list_conflicted_paths(&node.path)?.is_empty() {
                return Err(WcError::InvalidArgument(format!(
                    "'{}' remains in conflict",
                    node.path
                )));
            }
        }

        let mut committed = 0;
        for mut node in nodes {
            if node.is_deleted() {
                if self.node(&node.path)?.is_some() {
                    self.db.delete_subtree(&node.path)?;
                    committed += 1;
                }
                continue;
            }
            let modified = node.schedule != Schedule::Normal
                || node.props_modified()
                || self.text_modified(&node)?;
            if !modified {
                continue;
            }
            if node.kind == NodeKind::File {
                let text = self.read_working(&node.path)?.unwrap_or_default();
                self.install_pristine(&mut node, &text)?;
            }
            node.base_props = node.props().clone();
            node.working_props = None;
            node.schedule = Schedule::Normal;
            node.copy_from = None;
            node.revision = Some(new_rev);
            node.changelist = None;
            self.save_node(&node)?;
            committed += 1;
        }
        self.db.prune_pristines()?;
        info!(new_rev, committed, "commit finalised");
        Ok(committed)
    }

    /// Break a stale root lock and drop unreferenced base texts.
    pub fn cleanup(&self) -> Result<(), WcError> {
        if let Some(stale) = self.db.break_wc_lock()? {
            warn!(owner = %stale.owner, since = %stale.acquired_at, "broke stale working-copy lock");
            self.db.insert_audit_log(
                "lock_broken",
                None,
                Some(&format!("owner {} since {}", stale.owner, stale.acquired_at)),
            )?;
        }
        let pruned = self.db.prune_pristines()?;
        info!(pruned, "cleanup finished");
        Ok(())
    }
}
