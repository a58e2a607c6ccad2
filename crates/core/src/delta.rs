//! Tree deltas and the repository-side collaborators.
//!
//! A [`DeltaSource`] turns "what changed under this path between two
//! revisions" into an ordered list of [`DeltaOp`]s: depth-first, parent
//! before children, a directory's `CloseDir` after all of its children.
//! [`RemoteStatusSource`] answers the questions `status --show-updates`
//! asks. [`MemoryRepository`] implements both over an in-memory revisioned
//! tree; the CLI loads one from a JSON description.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::WcError;
use crate::models::{self, NodeKind, Properties, Revnum};
use crate::target;

// ---------------------------------------------------------------------------
// Delta operations
// ---------------------------------------------------------------------------

/// One step of a tree delta. Paths are relative to the delta anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DeltaOp {
    OpenDir {
        path: String,
    },
    /// A new node; directories are followed by their children and a
    /// `CloseDir`.
    Add {
        path: String,
        kind: NodeKind,
        content: Option<Vec<u8>>,
        props: Properties,
    },
    Delete {
        path: String,
        kind: NodeKind,
        /// Checksum of the deleted file on the left side.
        left_checksum: Option<String>,
    },
    TextDelta {
        path: String,
        /// Left-side text; `None` when the caller does not know it.
        left: Option<Vec<u8>>,
        right: Vec<u8>,
    },
    PropChange {
        path: String,
        name: String,
        left: Option<String>,
        right: Option<String>,
    },
    CloseDir {
        path: String,
    },
}

impl DeltaOp {
    pub fn path(&self) -> &str {
        match self {
            Self::OpenDir { path }
            | Self::Add { path, .. }
            | Self::Delete { path, .. }
            | Self::TextDelta { path, .. }
            | Self::PropChange { path, .. }
            | Self::CloseDir { path } => path,
        }
    }
}

/// An ordered delta between two revisions of one anchor path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeDelta {
    pub from_revision: Revnum,
    pub to_revision: Revnum,
    pub ops: Vec<DeltaOp>,
}

/// Source of tree deltas (the network layer in a full client).
pub trait DeltaSource {
    fn repos_root(&self) -> &str;

    fn youngest_revision(&self) -> Result<Revnum, WcError>;

    /// Delta turning `from_path@from` into `to_path@to`. An anchor that
    /// did not exist at `from` is diffed against an empty directory.
    fn open_delta(
        &self,
        from_path: &str,
        from: Revnum,
        to_path: &str,
        to: Revnum,
    ) -> Result<TreeDelta, WcError>;

    /// Delta of `repos_path` from `from` to `to`.
    fn open_tree_delta(
        &self,
        repos_path: &str,
        from: Revnum,
        to: Revnum,
    ) -> Result<TreeDelta, WcError> {
        self.open_delta(repos_path, from, repos_path, to)
    }
}

/// Repository state of one path at HEAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNodeInfo {
    pub kind: NodeKind,
    /// Last revision in which the node itself changed.
    pub last_changed_rev: Revnum,
    pub checksum: Option<String>,
    pub props: Properties,
}

/// Source of HEAD information for remote status.
pub trait RemoteStatusSource {
    fn head_revision(&self) -> Result<Revnum, WcError>;

    /// `None` if the path does not exist at HEAD.
    fn remote_node(&self, repos_path: &str) -> Result<Option<RemoteNodeInfo>, WcError>;

    /// Names of the children of a directory at HEAD.
    fn remote_children(&self, repos_path: &str) -> Result<Vec<String>, WcError>;
}

// ---------------------------------------------------------------------------
// In-memory repository
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RepoNode {
    kind: NodeKind,
    content: Option<Vec<u8>>,
    props: Properties,
}

type Tree = BTreeMap<String, RepoNode>;

/// One change in a JSON repository description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RepoChange {
    Mkdir { path: String },
    Put { path: String, content: String },
    Delete { path: String },
    SetProp { path: String, name: String, value: Option<String> },
}

/// JSON description of a whole repository history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoDescription {
    pub root_url: String,
    #[serde(default = "default_uuid")]
    pub uuid: String,
    /// Revision `n` applies `revisions[n - 1]` on top of revision `n - 1`.
    pub revisions: Vec<Vec<RepoChange>>,
}

fn default_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A revisioned tree held in memory. Revision 0 is an empty root.
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    root_url: String,
    uuid: String,
    revisions: Vec<Tree>,
}

/// Changes accumulated for the next revision.
pub struct Transaction {
    tree: Tree,
}

fn key(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn root_node() -> RepoNode {
    RepoNode {
        kind: NodeKind::Dir,
        content: None,
        props: Properties::new(),
    }
}

impl Transaction {
    /// Create a directory (and any missing parents).
    pub fn mkdir(&mut self, path: &str) -> &mut Self {
        let path = key(path);
        for ancestor in target::ancestors(&path).collect::<Vec<_>>() {
            self.tree.entry(ancestor.to_string()).or_insert_with(root_node);
        }
        self.tree.entry(path).or_insert_with(root_node);
        self
    }

    /// Create or overwrite a file, keeping existing properties.
    pub fn put(&mut self, path: &str, content: impl Into<Vec<u8>>) -> &mut Self {
        let path = key(path);
        if let Some(parent) = target::parent(&path) {
            self.mkdir(parent);
        }
        let props = self
            .tree
            .get(&path)
            .filter(|n| n.kind == NodeKind::File)
            .map(|n| n.props.clone())
            .unwrap_or_default();
        self.tree.insert(
            path,
            RepoNode {
                kind: NodeKind::File,
                content: Some(content.into()),
                props,
            },
        );
        self
    }

    /// Remove a node and its subtree.
    pub fn delete(&mut self, path: &str) -> &mut Self {
        let path = key(path);
        if !path.is_empty() {
            self.tree.retain(|p, _| !target::is_ancestor(&path, p));
        }
        self
    }

    pub fn set_prop(&mut self, path: &str, name: &str, value: Option<&str>) -> &mut Self {
        if let Some(node) = self.tree.get_mut(&key(path)) {
            match value {
                Some(v) => {
                    node.props.insert(name.to_string(), v.to_string());
                }
                None => {
                    node.props.remove(name);
                }
            }
        }
        self
    }

    fn apply(&mut self, change: &RepoChange) {
        match change {
            RepoChange::Mkdir { path } => {
                self.mkdir(path);
            }
            RepoChange::Put { path, content } => {
                self.put(path, content.as_bytes());
            }
            RepoChange::Delete { path } => {
                self.delete(path);
            }
            RepoChange::SetProp { path, name, value } => {
                self.set_prop(path, name, value.as_deref());
            }
        }
    }
}

impl MemoryRepository {
    pub fn new(root_url: impl Into<String>) -> Self {
        let mut empty = Tree::new();
        empty.insert(String::new(), root_node());
        Self {
            root_url: root_url.into(),
            uuid: default_uuid(),
            revisions: vec![empty],
        }
    }

    /// Build a repository from its JSON description.
    pub fn from_json(json: &str) -> Result<Self, WcError> {
        let desc: RepoDescription = serde_json::from_str(json)
            .map_err(|e| WcError::InvalidArgument(format!("repository description: {e}")))?;
        let mut repo = Self::new(desc.root_url);
        repo.uuid = desc.uuid;
        for changes in &desc.revisions {
            let mut tx = repo.transaction();
            for change in changes {
                tx.apply(change);
            }
            repo.commit(tx);
        }
        Ok(repo)
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn head(&self) -> Revnum {
        (self.revisions.len() - 1) as Revnum
    }

    /// Start a transaction on top of HEAD.
    pub fn transaction(&self) -> Transaction {
        Transaction {
            tree: self.revisions[self.revisions.len() - 1].clone(),
        }
    }

    /// Commit a transaction, returning the new revision number.
    pub fn commit(&mut self, tx: Transaction) -> Revnum {
        self.revisions.push(tx.tree);
        let rev = self.head();
        debug!(revision = rev, "committed revision to memory repository");
        rev
    }

    /// File text at `revision`, if the path is a file there.
    pub fn cat(&self, path: &str, revision: Revnum) -> Option<&[u8]> {
        self.tree(revision)
            .ok()?
            .get(&key(path))
            .and_then(|n| n.content.as_deref())
    }

    fn tree(&self, revision: Revnum) -> Result<&Tree, WcError> {
        usize::try_from(revision)
            .ok()
            .and_then(|r| self.revisions.get(r))
            .ok_or_else(|| WcError::Delta(format!("no such revision: {revision}")))
    }

    /// Nodes of `tree` below `anchor`, keyed relative to it.
    fn subtree<'a>(tree: &'a Tree, anchor: &str) -> BTreeMap<String, &'a RepoNode> {
        tree.iter()
            .filter_map(|(p, n)| target::skip_ancestor(anchor, p).map(|rel| (rel.to_string(), n)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Delta generation
// ---------------------------------------------------------------------------

struct DeltaBuilder<'a> {
    left: BTreeMap<String, &'a RepoNode>,
    right: BTreeMap<String, &'a RepoNode>,
    ops: Vec<DeltaOp>,
}

impl<'a> DeltaBuilder<'a> {
    fn children(map: &BTreeMap<String, &'a RepoNode>, dir: &str) -> Vec<String> {
        map.keys()
            .filter(|p| !p.is_empty() && target::parent(p) == Some(dir))
            .map(|p| target::basename(p).to_string())
            .collect()
    }

    fn prop_changes(&mut self, path: &str, left: &Properties, right: &Properties) {
        let names: std::collections::BTreeSet<&String> = left.keys().chain(right.keys()).collect();
        for name in names {
            let (l, r) = (left.get(name), right.get(name));
            if l != r {
                self.ops.push(DeltaOp::PropChange {
                    path: path.to_string(),
                    name: name.clone(),
                    left: l.cloned(),
                    right: r.cloned(),
                });
            }
        }
    }

    fn diff_dir(&mut self, dir: &str) {
        self.ops.push(DeltaOp::OpenDir {
            path: dir.to_string(),
        });
        let empty = Properties::new();
        let left_props = self.left.get(dir).map(|n| &n.props).unwrap_or(&empty).clone();
        let right_props = self.right.get(dir).map(|n| &n.props).unwrap_or(&empty).clone();
        self.prop_changes(dir, &left_props, &right_props);

        let mut names = Self::children(&self.left, dir);
        names.extend(Self::children(&self.right, dir));
        names.sort();
        names.dedup();

        for name in names {
            let path = target::join(dir, &name);
            let left = self.left.get(&path).copied();
            let right = self.right.get(&path).copied();
            match (left, right) {
                (Some(l), None) => self.delete(&path, l),
                (None, Some(r)) => self.add(&path, r),
                (Some(l), Some(r)) if l.kind != r.kind => {
                    self.delete(&path, l);
                    self.add(&path, r);
                }
                (Some(_), Some(r)) if r.kind == NodeKind::Dir => self.diff_dir(&path),
                (Some(l), Some(r)) => {
                    if l.content != r.content {
                        self.ops.push(DeltaOp::TextDelta {
                            path: path.clone(),
                            left: l.content.clone(),
                            right: r.content.clone().unwrap_or_default(),
                        });
                    }
                    self.prop_changes(&path, &l.props, &r.props);
                }
                (None, None) => {}
            }
        }

        self.ops.push(DeltaOp::CloseDir {
            path: dir.to_string(),
        });
    }

    fn delete(&mut self, path: &str, node: &RepoNode) {
        self.ops.push(DeltaOp::Delete {
            path: path.to_string(),
            kind: node.kind,
            left_checksum: node.content.as_deref().map(models::sha256_hex),
        });
    }

    fn add(&mut self, path: &str, node: &RepoNode) {
        self.ops.push(DeltaOp::Add {
            path: path.to_string(),
            kind: node.kind,
            content: node.content.clone(),
            props: node.props.clone(),
        });
        if node.kind == NodeKind::Dir {
            for name in Self::children(&self.right, path) {
                let child = target::join(path, &name);
                if let Some(n) = self.right.get(&child).copied() {
                    self.add(&child, n);
                }
            }
            self.ops.push(DeltaOp::CloseDir {
                path: path.to_string(),
            });
        }
    }
}

impl DeltaSource for MemoryRepository {
    fn repos_root(&self) -> &str {
        &self.root_url
    }

    fn youngest_revision(&self) -> Result<Revnum, WcError> {
        Ok(self.head())
    }

    fn open_delta(
        &self,
        from_path: &str,
        from: Revnum,
        to_path: &str,
        to: Revnum,
    ) -> Result<TreeDelta, WcError> {
        let (left_anchor, right_anchor) = (key(from_path), key(to_path));
        let right_tree = self.tree(to)?;
        match right_tree.get(&right_anchor) {
            Some(node) if node.kind == NodeKind::Dir => {}
            _ => {
                return Err(WcError::Delta(format!(
                    "'/{right_anchor}' is not a directory in revision {to}"
                )))
            }
        }
        let left_tree = self.tree(from)?;
        let left = match left_tree.get(&left_anchor) {
            Some(node) if node.kind == NodeKind::Dir => Self::subtree(left_tree, &left_anchor),
            _ => BTreeMap::new(),
        };
        let mut builder = DeltaBuilder {
            left,
            right: Self::subtree(right_tree, &right_anchor),
            ops: Vec::new(),
        };
        builder.diff_dir("");
        debug!(from = %left_anchor, to = %right_anchor, from_rev = from, to_rev = to, ops = builder.ops.len(), "built tree delta");
        Ok(TreeDelta {
            from_revision: from,
            to_revision: to,
            ops: builder.ops,
        })
    }
}

impl RemoteStatusSource for MemoryRepository {
    fn head_revision(&self) -> Result<Revnum, WcError> {
        Ok(self.head())
    }

    fn remote_node(&self, repos_path: &str) -> Result<Option<RemoteNodeInfo>, WcError> {
        let path = key(repos_path);
        let head = self.head();
        let Some(node) = self.tree(head)?.get(&path) else {
            return Ok(None);
        };
        let mut last_changed = head;
        for rev in (0..head).rev() {
            match self.tree(rev)?.get(&path) {
                Some(older) if older == node => last_changed = rev,
                _ => break,
            }
        }
        Ok(Some(RemoteNodeInfo {
            kind: node.kind,
            last_changed_rev: last_changed,
            checksum: node.content.as_deref().map(models::sha256_hex),
            props: node.props.clone(),
        }))
    }

    fn remote_children(&self, repos_path: &str) -> Result<Vec<String>, WcError> {
        let path = key(repos_path);
        let tree = self.tree(self.head())?;
        Ok(tree
            .keys()
            .filter(|p| !p.is_empty() && target::parent(p) == Some(path.as_str()))
            .map(|p| target::basename(p).to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> MemoryRepository {
        let mut repo = MemoryRepository::new("svn://example.com/repo");
        let mut tx = repo.transaction();
        tx.mkdir("trunk").put("trunk/a.txt", "one\n").put("trunk/d/b.txt", "two\n");
        repo.commit(tx);
        let mut tx = repo.transaction();
        tx.put("trunk/a.txt", "one!\n")
            .delete("trunk/d")
            .put("trunk/new.txt", "new\n")
            .set_prop("trunk", "svn:ignore", Some("*.log"));
        repo.commit(tx);
        repo
    }

    #[test]
    fn test_delta_orders_parents_first() {
        let repo = repo();
        let delta = repo.open_tree_delta("/trunk", 0, 1).unwrap();
        let paths: Vec<(&str, &str)> = delta
            .ops
            .iter()
            .map(|op| {
                let tag = match op {
                    DeltaOp::OpenDir { .. } => "open",
                    DeltaOp::Add { .. } => "add",
                    DeltaOp::CloseDir { .. } => "close",
                    _ => "other",
                };
                (tag, op.path())
            })
            .collect();
        assert_eq!(
            paths,
            vec![
                ("open", ""),
                ("add", "a.txt"),
                ("add", "d"),
                ("add", "d/b.txt"),
                ("close", "d"),
                ("close", ""),
            ]
        );
    }

    #[test]
    fn test_delta_modify_delete_propchange() {
        let repo = repo();
        let delta = repo.open_tree_delta("trunk", 1, 2).unwrap();
        assert!(delta.ops.contains(&DeltaOp::PropChange {
            path: "".into(),
            name: "svn:ignore".into(),
            left: None,
            right: Some("*.log".into()),
        }));
        assert!(delta.ops.contains(&DeltaOp::TextDelta {
            path: "a.txt".into(),
            left: Some(b"one\n".to_vec()),
            right: b"one!\n".to_vec(),
        }));
        assert!(delta
            .ops
            .iter()
            .any(|op| matches!(op, DeltaOp::Delete { path, kind: NodeKind::Dir, .. } if path == "d")));
        assert!(delta
            .ops
            .iter()
            .any(|op| matches!(op, DeltaOp::Add { path, .. } if path == "new.txt")));
    }

    #[test]
    fn test_same_revision_is_empty() {
        let repo = repo();
        let delta = repo.open_tree_delta("trunk", 2, 2).unwrap();
        assert_eq!(delta.ops.len(), 2);
        assert!(repo.open_tree_delta("nope", 0, 2).is_err());
    }

    #[test]
    fn test_remote_status() {
        let repo = repo();
        let info = repo.remote_node("/trunk/a.txt").unwrap().unwrap();
        assert_eq!(info.last_changed_rev, 2);
        assert_eq!(info.kind, NodeKind::File);
        assert!(repo.remote_node("/trunk/d").unwrap().is_none());
        assert_eq!(repo.remote_children("trunk").unwrap(), vec!["a.txt", "new.txt"]);
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "root_url": "file:///repo",
            "revisions": [
                [{"op": "mkdir", "path": "trunk"}, {"op": "put", "path": "trunk/f", "content": "x\n"}],
                [{"op": "set_prop", "path": "trunk/f", "name": "k", "value": "v"}]
            ]
        }"#;
        let repo = MemoryRepository::from_json(json).unwrap();
        assert_eq!(repo.head(), 2);
        assert_eq!(repo.cat("trunk/f", 2), Some(&b"x\n"[..]));
        assert!(MemoryRepository::from_json("{").is_err());
    }
}
