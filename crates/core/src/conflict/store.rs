//! Persistent conflict records and their on-disk artifacts.
//!
//! Every text conflict owns up to three variant files beside the victim;
//! every node with property conflicts owns one `.prej` reject file. A
//! record counts as outstanding only while its artifacts exist, so a user
//! deleting the variants by hand also clears the conflict.

use tracing::{debug, info, warn};

use crate::errors::{ConflictError, WcError};
use crate::filter::PathFilter;
use crate::models::{NodeKind, Revnum};
use crate::target;
use crate::wc::WorkingCopy;

use super::types::{
    ConflictKind, ConflictOperation, ConflictRecord, PropertyConflict, TextConflict, TreeConflict,
};

/// Reject file name used for directory property conflicts.
const DIR_REJECT_FILE: &str = "dir_conflicts.prej";

/// The three texts of a text conflict.
#[derive(Debug, Clone, Copy)]
pub struct TextVariants<'a> {
    /// Common ancestor; `None` if the incoming change had no left side.
    pub base: Option<&'a [u8]>,
    pub mine: &'a [u8],
    pub theirs: &'a [u8],
}

/// Conflict store bound to one working copy.
pub struct ConflictStore<'a> {
    wc: &'a WorkingCopy,
}

impl<'a> ConflictStore<'a> {
    pub fn new(wc: &'a WorkingCopy) -> Self {
        Self { wc }
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Write the variant files beside `path` and record a text conflict.
    ///
    /// Refused with [`ConflictError::AlreadyConflicted`] if `path` already
    /// has an outstanding text conflict; existing variants are never
    /// overwritten.
    pub fn record_text_conflict(
        &self,
        path: &str,
        operation: ConflictOperation,
        variants: TextVariants<'_>,
        left_rev: Option<Revnum>,
        right_rev: Revnum,
    ) -> Result<TextConflict, WcError> {
        if let Some(existing) = self.wc.db().get_text_conflict(path)? {
            if self.any_artifact_exists(&existing) {
                return Err(ConflictError::AlreadyConflicted {
                    path: path.to_string(),
                    kind: "text".into(),
                }
                .into());
            }
            warn!(path, "dropping stale text conflict whose files are gone");
            self.wc.db().delete_text_conflict(path)?;
        }

        let left_label = left_rev.unwrap_or(0);
        let (mine_suffix, base_suffix, theirs_suffix) = match operation {
            ConflictOperation::Merge => (
                "working".to_string(),
                format!("merge-left.r{left_label}"),
                format!("merge-right.r{right_rev}"),
            ),
            ConflictOperation::Update | ConflictOperation::Switch => (
                "mine".to_string(),
                format!("r{left_label}"),
                format!("r{right_rev}"),
            ),
        };

        let mine_file = self.unique_variant_name(path, &mine_suffix);
        self.wc.write_working(&mine_file, variants.mine)?;
        let base_file = match variants.base {
            Some(base) => {
                let name = self.unique_variant_name(path, &base_suffix);
                self.wc.write_working(&name, base)?;
                Some(name)
            }
            None => None,
        };
        let theirs_file = self.unique_variant_name(path, &theirs_suffix);
        self.wc.write_working(&theirs_file, variants.theirs)?;

        let conflict = TextConflict {
            operation,
            base_file,
            mine_file,
            theirs_file,
            left_rev,
            right_rev,
        };
        self.wc.db().insert_text_conflict(path, &conflict)?;
        info!(path, %operation, "recorded text conflict");
        Ok(conflict)
    }

    /// Record a conflict on property `name` of `path` and rewrite the
    /// node's reject file. Each property is an independent record.
    pub fn record_property_conflict(
        &self,
        path: &str,
        name: &str,
        operation: ConflictOperation,
        base_value: Option<&str>,
        mine_value: Option<&str>,
        theirs_value: Option<&str>,
    ) -> Result<PropertyConflict, WcError> {
        let existing = self.active_prop_conflicts(path)?;
        if existing.iter().any(|c| c.name == name) {
            return Err(ConflictError::AlreadyConflicted {
                path: path.to_string(),
                kind: format!("property '{name}'"),
            }
            .into());
        }
        // Rows whose reject file vanished are stale.
        for stale in self.wc.db().get_prop_conflicts(path)? {
            if !existing.iter().any(|c| c.name == stale.name) {
                self.wc.db().delete_prop_conflict(path, &stale.name)?;
            }
        }

        let reject_file = match existing.first() {
            Some(c) => c.reject_file.clone(),
            None => self.reject_file_name(path)?,
        };
        let conflict = PropertyConflict {
            name: name.to_string(),
            operation,
            base_value: base_value.map(str::to_string),
            mine_value: mine_value.map(str::to_string),
            theirs_value: theirs_value.map(str::to_string),
            reject_file,
        };
        self.wc.db().insert_prop_conflict(path, &conflict)?;
        self.write_reject_file(path)?;
        info!(path, name, %operation, "recorded property conflict");
        Ok(conflict)
    }

    /// Attach a tree conflict to `path`. A path holds at most one.
    pub fn record_tree_conflict(&self, path: &str, conflict: &TreeConflict) -> Result<(), WcError> {
        if self.wc.db().get_tree_conflict(path)?.is_some() {
            return Err(ConflictError::AlreadyConflicted {
                path: path.to_string(),
                kind: "tree".into(),
            }
            .into());
        }
        self.wc.db().insert_tree_conflict(path, conflict)?;
        info!(path, description = %conflict.describe(), "recorded tree conflict");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Outstanding conflicts on `path`, or `None`.
    pub fn query(&self, path: &str) -> Result<Option<ConflictRecord>, WcError> {
        let text = self
            .wc
            .db()
            .get_text_conflict(path)?
            .filter(|c| self.any_artifact_exists(c));
        let record = ConflictRecord {
            path: path.to_string(),
            text,
            props: self.active_prop_conflicts(path)?,
            tree: self.wc.db().get_tree_conflict(path)?,
        };
        Ok((!record.is_empty()).then_some(record))
    }

    /// Every conflicted path the filter admits, in path order. Each call
    /// re-reads the store, so an interrupted enumeration can simply be
    /// started again.
    pub fn query_all(&self, filter: &PathFilter) -> Result<Vec<ConflictRecord>, WcError> {
        let mut records = Vec::new();
        for path in self.wc.db().list_conflicted_paths(&filter.target)? {
            let Some(record) = self.query(&path)? else {
                continue;
            };
            let node = self.wc.node(&path)?;
            let kind = match (&node, &record.tree) {
                (Some(n), _) => n.kind,
                (None, Some(tree)) => tree.victim_kind,
                (None, None) => NodeKind::on_disk(&self.wc.abspath(&path)),
            };
            let changelist = node.as_ref().and_then(|n| n.changelist.as_deref());
            if filter.admits(&path, kind, changelist) {
                records.push(record);
            }
        }
        debug!(target = %filter.target, count = records.len(), "enumerated conflicts");
        Ok(records)
    }

    /// The nearest path at or above `path` carrying a tree conflict.
    pub fn tree_conflicted_ancestor(&self, path: &str) -> Result<Option<String>, WcError> {
        if self.wc.db().get_tree_conflict(path)?.is_some() {
            return Ok(Some(path.to_string()));
        }
        for ancestor in target::ancestors(path) {
            if self.wc.db().get_tree_conflict(ancestor)?.is_some() {
                return Ok(Some(ancestor.to_string()));
            }
        }
        Ok(None)
    }

    // -----------------------------------------------------------------------
    // Clearing
    // -----------------------------------------------------------------------

    /// Remove the given conflict kinds from `path` together with their
    /// artifacts. Returns the kinds that were actually cleared.
    pub fn clear(&self, path: &str, kinds: &[ConflictKind]) -> Result<Vec<ConflictKind>, WcError> {
        let mut cleared = Vec::new();
        for kind in kinds {
            match kind {
                ConflictKind::Text => {
                    if let Some(conflict) = self.wc.db().get_text_conflict(path)? {
                        for file in conflict.artifacts() {
                            self.remove_artifact(file)?;
                        }
                        self.wc.db().delete_text_conflict(path)?;
                        cleared.push(kind.clone());
                    }
                }
                ConflictKind::Property(name) => {
                    let all = self.wc.db().get_prop_conflicts(path)?;
                    let Some(conflict) = all.iter().find(|c| &c.name == name) else {
                        continue;
                    };
                    self.wc.db().delete_prop_conflict(path, name)?;
                    if all.len() == 1 {
                        self.remove_artifact(&conflict.reject_file)?;
                    } else {
                        self.write_reject_file(path)?;
                    }
                    cleared.push(kind.clone());
                }
                ConflictKind::Tree => {
                    if self.wc.db().delete_tree_conflict(path)? {
                        cleared.push(kind.clone());
                    }
                }
            }
        }
        debug!(path, cleared = cleared.len(), "cleared conflicts");
        Ok(cleared)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn any_artifact_exists(&self, conflict: &TextConflict) -> bool {
        conflict
            .artifacts()
            .iter()
            .any(|f| self.wc.abspath(f).exists())
    }

    fn active_prop_conflicts(&self, path: &str) -> Result<Vec<PropertyConflict>, WcError> {
        Ok(self
            .wc
            .db()
            .get_prop_conflicts(path)?
            .into_iter()
            .filter(|c| self.wc.abspath(&c.reject_file).exists())
            .collect())
    }

    /// `<path>.<suffix>`, or `<path>.<n>.<suffix>` if that is taken.
    fn unique_variant_name(&self, path: &str, suffix: &str) -> String {
        let first = format!("{path}.{suffix}");
        if !self.wc.abspath(&first).exists() {
            return first;
        }
        (2..)
            .map(|n| format!("{path}.{n}.{suffix}"))
            .find(|candidate| !self.wc.abspath(candidate).exists())
            .unwrap_or(first)
    }

    fn reject_file_name(&self, path: &str) -> Result<String, WcError> {
        let is_dir = match self.wc.node(path)? {
            Some(node) => node.kind == NodeKind::Dir,
            None => NodeKind::on_disk(&self.wc.abspath(path)) == NodeKind::Dir,
        };
        if is_dir {
            Ok(target::join(path, DIR_REJECT_FILE))
        } else {
            Ok(self.unique_variant_name(path, "prej"))
        }
    }

    fn write_reject_file(&self, path: &str) -> Result<(), WcError> {
        let conflicts = self.wc.db().get_prop_conflicts(path)?;
        let Some(first) = conflicts.first() else {
            return Ok(());
        };
        let mut text = String::new();
        for c in &conflicts {
            text.push_str(&describe_prop_conflict(c));
        }
        self.wc.write_working(&first.reject_file, text.as_bytes())
    }

    fn remove_artifact(&self, relpath: &str) -> Result<(), WcError> {
        let abs = self.wc.abspath(relpath);
        match std::fs::remove_file(&abs) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WcError::io(abs, e)),
        }
    }
}

/// Human-readable reject-file section for one property conflict.
fn describe_prop_conflict(c: &PropertyConflict) -> String {
    let headline = match (&c.base_value, &c.mine_value, &c.theirs_value) {
        (None, Some(_), Some(_)) => format!(
            "Trying to add new property '{}'\nbut the property already exists.\n",
            c.name
        ),
        (Some(_), None, Some(_)) => format!(
            "Trying to change property '{}'\nbut the property has been locally deleted.\n",
            c.name
        ),
        (Some(_), Some(_), None) => format!(
            "Trying to delete property '{}'\nbut the local property value is different.\n",
            c.name
        ),
        _ => format!(
            "Trying to change property '{}'\nbut the local property value conflicts with the incoming change.\n",
            c.name
        ),
    };
    let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "(not set)".into());
    format!(
        "{headline}<<<<<<< (local property value)\n{}\n||||||| (incoming 'changed from' value)\n{}\n=======\n{}\n>>>>>>> (incoming 'changed to' value)\n\n",
        show(&c.mine_value),
        show(&c.base_value),
        show(&c.theirs_value),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WcConfig;
    use crate::conflict::types::{ConflictAction, ConflictReason};
    use crate::models::{Depth, WorkingNode};

    fn wc() -> (tempfile::TempDir, WorkingCopy) {
        let dir = tempfile::tempdir().unwrap();
        let wc = WorkingCopy::create(dir.path(), "file:///repo", "u", "trunk", 3, WcConfig::default())
            .unwrap();
        let node = WorkingNode::versioned("f.txt", NodeKind::File, "/trunk/f.txt", 3);
        wc.save_node(&node).unwrap();
        std::fs::write(dir.path().join("f.txt"), "merged\n").unwrap();
        (dir, wc)
    }

    fn variants() -> TextVariants<'static> {
        TextVariants {
            base: Some(b"base\n"),
            mine: b"mine\n",
            theirs: b"theirs\n",
        }
    }

    #[test]
    fn test_text_conflict_files_and_refusal() {
        let (dir, wc) = wc();
        let store = ConflictStore::new(&wc);
        let c = store
            .record_text_conflict("f.txt", ConflictOperation::Update, variants(), Some(3), 4)
            .unwrap();
        assert_eq!(c.mine_file, "f.txt.mine");
        assert_eq!(c.base_file.as_deref(), Some("f.txt.r3"));
        assert_eq!(c.theirs_file, "f.txt.r4");
        assert_eq!(std::fs::read(dir.path().join("f.txt.r4")).unwrap(), b"theirs\n");

        let err = store
            .record_text_conflict("f.txt", ConflictOperation::Update, variants(), Some(3), 5)
            .unwrap_err();
        assert!(matches!(err, WcError::Conflict(ConflictError::AlreadyConflicted { .. })));
        // the original variants are untouched
        assert_eq!(std::fs::read(dir.path().join("f.txt.mine")).unwrap(), b"mine\n");
    }

    #[test]
    fn test_merge_variant_names_are_unique() {
        let (dir, wc) = wc();
        std::fs::write(dir.path().join("f.txt.working"), "in the way").unwrap();
        let store = ConflictStore::new(&wc);
        let c = store
            .record_text_conflict("f.txt", ConflictOperation::Merge, variants(), Some(5), 9)
            .unwrap();
        assert_eq!(c.mine_file, "f.txt.2.working");
        assert_eq!(c.base_file.as_deref(), Some("f.txt.merge-left.r5"));
        assert_eq!(c.theirs_file, "f.txt.merge-right.r9");
    }

    #[test]
    fn test_record_exists_only_while_artifacts_exist() {
        let (dir, wc) = wc();
        let store = ConflictStore::new(&wc);
        store
            .record_text_conflict("f.txt", ConflictOperation::Update, variants(), Some(3), 4)
            .unwrap();
        assert!(store.query("f.txt").unwrap().is_some());
        for f in ["f.txt.mine", "f.txt.r3", "f.txt.r4"] {
            std::fs::remove_file(dir.path().join(f)).unwrap();
        }
        assert!(store.query("f.txt").unwrap().is_none());
        // a fresh conflict may now be recorded
        assert!(store
            .record_text_conflict("f.txt", ConflictOperation::Update, variants(), Some(4), 5)
            .is_ok());
    }

    #[test]
    fn test_property_conflicts_are_independent() {
        let (dir, wc) = wc();
        let store = ConflictStore::new(&wc);
        store
            .record_property_conflict("f.txt", "a", ConflictOperation::Update, Some("1"), Some("2"), Some("3"))
            .unwrap();
        store
            .record_property_conflict("f.txt", "b", ConflictOperation::Update, None, Some("x"), Some("y"))
            .unwrap();
        let prej = std::fs::read_to_string(dir.path().join("f.txt.prej")).unwrap();
        assert!(prej.contains("property 'a'"));
        assert!(prej.contains("Trying to add new property 'b'"));

        assert!(store
            .record_property_conflict("f.txt", "a", ConflictOperation::Update, None, None, None)
            .is_err());

        store.clear("f.txt", &[ConflictKind::Property("a".into())]).unwrap();
        let record = store.query("f.txt").unwrap().unwrap();
        assert_eq!(record.props.len(), 1);
        assert!(!std::fs::read_to_string(dir.path().join("f.txt.prej")).unwrap().contains("'a'"));

        store.clear("f.txt", &[ConflictKind::Property("b".into())]).unwrap();
        assert!(store.query("f.txt").unwrap().is_none());
        assert!(!dir.path().join("f.txt.prej").exists());
    }

    #[test]
    fn test_text_and_property_conflict_coexist() {
        let (_dir, wc) = wc();
        let store = ConflictStore::new(&wc);
        store
            .record_text_conflict("f.txt", ConflictOperation::Update, variants(), Some(3), 4)
            .unwrap();
        store
            .record_property_conflict("f.txt", "p", ConflictOperation::Update, Some("1"), Some("2"), Some("3"))
            .unwrap();
        let record = store.query("f.txt").unwrap().unwrap();
        assert_eq!(record.kinds(), vec![ConflictKind::Text, ConflictKind::Property("p".into())]);

        store.clear("f.txt", &[ConflictKind::Text]).unwrap();
        let record = store.query("f.txt").unwrap().unwrap();
        assert!(record.text.is_none());
        assert_eq!(record.props.len(), 1);
    }

    #[test]
    fn test_tree_conflicts_and_enumeration() {
        let (dir, wc) = wc();
        std::fs::create_dir_all(dir.path().join("d/e")).unwrap();
        wc.add("d", Depth::Infinity).unwrap();
        let store = ConflictStore::new(&wc);
        let tc = TreeConflict {
            victim_kind: NodeKind::Dir,
            operation: ConflictOperation::Update,
            action: ConflictAction::Delete,
            reason: ConflictReason::Edited,
            left: None,
            right: None,
        };
        store.record_tree_conflict("d", &tc).unwrap();
        assert!(store.record_tree_conflict("d", &tc).is_err());
        assert_eq!(store.tree_conflicted_ancestor("d/e/x").unwrap().as_deref(), Some("d"));
        assert!(store.tree_conflicted_ancestor("f.txt").unwrap().is_none());

        store
            .record_text_conflict("f.txt", ConflictOperation::Update, variants(), Some(3), 4)
            .unwrap();
        let all = store.query_all(&PathFilter::everything()).unwrap();
        let paths: Vec<_> = all.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["d", "f.txt"]);
        // restartable: a second pass yields the same sequence
        assert_eq!(store.query_all(&PathFilter::everything()).unwrap(), all);

        let only_root = store.query_all(&PathFilter::new("", Depth::Empty)).unwrap();
        assert!(only_root.is_empty());

        store.clear("d", &[ConflictKind::Tree]).unwrap();
        assert!(store.tree_conflicted_ancestor("d/e").unwrap().is_none());
    }
}
