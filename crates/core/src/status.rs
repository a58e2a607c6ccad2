//! Status classification.
//!
//! [`classify`] projects one path's base, working and (optionally) remote
//! state into a [`StatusSnapshot`]. [`walk`] runs it over a filtered tree,
//! including unversioned and ignored entries found on disk and, when a
//! [`RemoteStatusSource`] is given, entries that only exist at HEAD.
//! Nothing here mutates the working copy.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WcConfig;
use crate::conflict::ConflictStore;
use crate::delta::RemoteStatusSource;
use crate::errors::WcError;
use crate::filter::PathFilter;
use crate::models::{LockInfo, NodeKind, Properties, Revnum, Schedule, WorkingNode, PROP_IGNORE};
use crate::target;
use crate::wc::WorkingCopy;

/// Status of the contents or the properties of a path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    None,
    Normal,
    Modified,
    Added,
    Deleted,
    Replaced,
    Conflicted,
    Missing,
    Incomplete,
    /// Brought in by an externals definition. Externals are not resolved
    /// by this engine, so the classifier never produces it.
    External,
    Ignored,
    Unversioned,
    /// Versioned as one kind, something of another kind on disk.
    Obstructed,
}

impl StatusKind {
    /// The status column letter.
    pub fn code(&self) -> char {
        match self {
            Self::None | Self::Normal => ' ',
            Self::Modified => 'M',
            Self::Added => 'A',
            Self::Deleted => 'D',
            Self::Replaced => 'R',
            Self::Conflicted => 'C',
            Self::Missing | Self::Incomplete => '!',
            Self::External => 'X',
            Self::Ignored => 'I',
            Self::Unversioned => '?',
            Self::Obstructed => '~',
        }
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Normal => "normal",
            Self::Modified => "modified",
            Self::Added => "added",
            Self::Deleted => "deleted",
            Self::Replaced => "replaced",
            Self::Conflicted => "conflicted",
            Self::Missing => "missing",
            Self::Incomplete => "incomplete",
            Self::External => "external",
            Self::Ignored => "ignored",
            Self::Unversioned => "unversioned",
            Self::Obstructed => "obstructed",
        };
        write!(f, "{s}")
    }
}

/// Status of a path at HEAD relative to its base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub kind: NodeKind,
    pub contents: StatusKind,
    pub properties: StatusKind,
    /// Last-changed revision at HEAD, if the path exists there.
    pub revision: Option<Revnum>,
}

impl RemoteStatus {
    /// `true` if an update would bring changes to this path.
    pub fn is_out_of_date(&self) -> bool {
        self.contents != StatusKind::None || self.properties != StatusKind::None
    }
}

/// The reportable status tuple for one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub path: String,
    pub kind: NodeKind,
    /// Combined status, as shown in the first column.
    pub node_status: StatusKind,
    pub contents: StatusKind,
    pub properties: StatusKind,
    pub lock: Option<LockInfo>,
    pub switched: bool,
    pub copied: bool,
    pub tree_conflicted: bool,
    pub changelist: Option<String>,
    pub revision: Option<Revnum>,
    pub remote: Option<RemoteStatus>,
}

impl StatusSnapshot {
    fn unversioned(path: &str, kind: NodeKind, status: StatusKind) -> Self {
        Self {
            path: path.to_string(),
            kind,
            node_status: status,
            contents: status,
            properties: StatusKind::None,
            lock: None,
            switched: false,
            copied: false,
            tree_conflicted: false,
            changelist: None,
            revision: None,
            remote: None,
        }
    }

    /// `true` for anything worth listing without `--verbose`.
    pub fn is_interesting(&self) -> bool {
        !matches!(self.node_status, StatusKind::Normal | StatusKind::Ignored | StatusKind::None)
            || self.properties == StatusKind::Modified
            || self.properties == StatusKind::Conflicted
            || self.lock.is_some()
            || self.switched
            || self.tree_conflicted
            || self.changelist.is_some()
            || self.remote.as_ref().is_some_and(RemoteStatus::is_out_of_date)
    }

    /// Fixed-width status columns: contents, props, (unused), copied,
    /// switched, lock, tree conflict.
    pub fn columns(&self) -> String {
        let first = match self.contents {
            StatusKind::Normal if self.tree_conflicted => 'C',
            other => other.code(),
        };
        let props = match self.properties {
            StatusKind::Modified | StatusKind::Conflicted => self.properties.code(),
            _ => ' ',
        };
        let flag = |b: bool, c: char| if b { c } else { ' ' };
        format!(
            "{}{}{}{}{}{}{}",
            first,
            props,
            ' ',
            flag(self.copied, '+'),
            flag(self.switched, 'S'),
            flag(self.lock.is_some(), 'K'),
            flag(self.tree_conflicted, 'C'),
        )
    }
}

// ---------------------------------------------------------------------------
// Ignore rules
// ---------------------------------------------------------------------------

/// Glob patterns deciding whether an unversioned name is ignored.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<String>,
}

impl IgnoreRules {
    /// Global ignores plus the `svn:ignore` lines of the directory's props.
    pub fn for_dir(config: &WcConfig, dir_props: &Properties) -> Self {
        let mut patterns = config.status.global_ignores.clone();
        if let Some(value) = dir_props.get(PROP_IGNORE) {
            patterns.extend(
                value
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string),
            );
        }
        Self { patterns }
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| glob_match::glob_match(p, name))
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify one path. `node` is its metadata (`None` if unversioned).
pub fn classify(
    wc: &WorkingCopy,
    path: &str,
    node: Option<&WorkingNode>,
    remote: Option<&dyn RemoteStatusSource>,
) -> Result<StatusSnapshot, WcError> {
    let on_disk = NodeKind::on_disk(&wc.abspath(path));

    let Some(node) = node else {
        let ignored = match target::parent(path) {
            Some(parent) => {
                let props = wc.node(parent)?.map(|n| n.props().clone()).unwrap_or_default();
                IgnoreRules::for_dir(wc.config(), &props).is_ignored(target::basename(path))
            }
            None => false,
        };
        let status = if on_disk == NodeKind::None {
            StatusKind::None
        } else if ignored {
            StatusKind::Ignored
        } else {
            StatusKind::Unversioned
        };
        let mut snap = StatusSnapshot::unversioned(path, on_disk, status);
        if let Some(source) = remote {
            snap.remote = remote_status(wc, path, None, source)?;
        }
        return Ok(snap);
    };

    let conflicts = ConflictStore::new(wc).query(path)?;

    let mut contents = if node.schedule == Schedule::Delete {
        StatusKind::Deleted
    } else if on_disk == NodeKind::None {
        StatusKind::Missing
    } else if on_disk != node.kind {
        StatusKind::Obstructed
    } else {
        match node.schedule {
            Schedule::Add => StatusKind::Added,
            Schedule::Replace => StatusKind::Replaced,
            _ if node.kind == NodeKind::Dir && dir_incomplete(wc, node)? => StatusKind::Incomplete,
            _ if wc.text_modified(node)? => StatusKind::Modified,
            _ => StatusKind::Normal,
        }
    };
    if conflicts.as_ref().is_some_and(|c| c.text.is_some())
        && matches!(contents, StatusKind::Normal | StatusKind::Modified)
    {
        contents = StatusKind::Conflicted;
    }

    let properties = if conflicts.as_ref().is_some_and(|c| !c.props.is_empty()) {
        StatusKind::Conflicted
    } else if node.props_modified() && node.schedule != Schedule::Delete {
        StatusKind::Modified
    } else if node.props().is_empty() {
        StatusKind::None
    } else {
        StatusKind::Normal
    };

    let tree_conflicted = conflicts.as_ref().is_some_and(|c| c.tree.is_some());
    let node_status = match contents {
        StatusKind::Normal if properties == StatusKind::Conflicted || tree_conflicted => {
            StatusKind::Conflicted
        }
        StatusKind::Normal if properties == StatusKind::Modified => StatusKind::Modified,
        other => other,
    };

    let remote = match remote {
        Some(source) => remote_status(wc, path, Some(node), source)?,
        None => None,
    };

    Ok(StatusSnapshot {
        path: path.to_string(),
        kind: node.kind,
        node_status,
        contents,
        properties,
        lock: node.lock.clone(),
        switched: is_switched(wc, node)?,
        copied: node.copy_from.is_some(),
        tree_conflicted,
        changelist: node.changelist.clone(),
        revision: node.revision,
        remote,
    })
}

/// A directory whose update was interrupted, or whose versioned children
/// are partly missing from disk.
fn dir_incomplete(wc: &WorkingCopy, node: &WorkingNode) -> Result<bool, WcError> {
    if node.incomplete {
        return Ok(true);
    }
    for child in wc.children(&node.path)? {
        if child.schedule == Schedule::Normal
            && NodeKind::on_disk(&wc.abspath(&child.path)) == NodeKind::None
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// A node is switched when its repository location is not the one its
/// parent's location implies.
fn is_switched(wc: &WorkingCopy, node: &WorkingNode) -> Result<bool, WcError> {
    let Some(parent_path) = target::parent(&node.path) else {
        return Ok(false);
    };
    if node.is_added() {
        return Ok(false);
    }
    let Some(parent) = wc.node(parent_path)? else {
        return Ok(false);
    };
    let expected = format!("{}/{}", parent.repos_path.trim_end_matches('/'), node.name());
    Ok(node.repos_path != expected)
}

fn remote_status(
    wc: &WorkingCopy,
    path: &str,
    node: Option<&WorkingNode>,
    source: &dyn RemoteStatusSource,
) -> Result<Option<RemoteStatus>, WcError> {
    let repos_path = match node {
        Some(n) => n.repos_path.clone(),
        None => {
            let Some(parent) = target::parent(path).map(|p| wc.node(p)).transpose()?.flatten()
            else {
                return Ok(None);
            };
            format!("{}/{}", parent.repos_path.trim_end_matches('/'), target::basename(path))
        }
    };
    let info = source.remote_node(&repos_path)?;
    let status = match (node.filter(|n| n.schedule != Schedule::Add), info) {
        (None, None) => return Ok(None),
        (None, Some(info)) => RemoteStatus {
            kind: info.kind,
            contents: StatusKind::Added,
            properties: StatusKind::None,
            revision: Some(info.last_changed_rev),
        },
        (Some(n), None) => RemoteStatus {
            kind: n.kind,
            contents: StatusKind::Deleted,
            properties: StatusKind::None,
            revision: None,
        },
        (Some(n), Some(info)) => {
            let newer = n.revision.is_some_and(|r| info.last_changed_rev > r);
            let contents = if info.kind != n.kind {
                StatusKind::Replaced
            } else if newer && n.kind == NodeKind::File && info.checksum != n.checksum {
                StatusKind::Modified
            } else {
                StatusKind::None
            };
            let properties = if info.props != n.base_props {
                StatusKind::Modified
            } else {
                StatusKind::None
            };
            RemoteStatus {
                kind: info.kind,
                contents,
                properties,
                revision: Some(info.last_changed_rev),
            }
        }
    };
    Ok(Some(status))
}

// ---------------------------------------------------------------------------
// Tree walk
// ---------------------------------------------------------------------------

/// Status of every path the filter admits, in tree order.
pub fn walk(
    wc: &WorkingCopy,
    filter: &PathFilter,
    remote: Option<&dyn RemoteStatusSource>,
) -> Result<Vec<StatusSnapshot>, WcError> {
    let mut out = Vec::new();
    let root = wc.node(&filter.target)?;
    let snap = classify(wc, &filter.target, root.as_ref(), remote)?;
    let descend = root.as_ref().is_some_and(|n| n.kind == NodeKind::Dir);
    if report(filter, &snap) {
        out.push(snap);
    }
    if let (true, Some(node)) = (descend, root) {
        walk_dir(wc, filter, &node, remote, &mut out)?;
    }
    debug!(target = %filter.target, entries = out.len(), "status walk finished");
    Ok(out)
}

fn report(filter: &PathFilter, snap: &StatusSnapshot) -> bool {
    if snap.node_status == StatusKind::None && snap.remote.is_none() {
        return false;
    }
    if filter.changelists.is_empty() {
        return true;
    }
    snap.kind != NodeKind::Dir && filter.in_changelists(snap.kind, snap.changelist.as_deref())
}

fn walk_dir(
    wc: &WorkingCopy,
    filter: &PathFilter,
    dir: &WorkingNode,
    remote: Option<&dyn RemoteStatusSource>,
    out: &mut Vec<StatusSnapshot>,
) -> Result<(), WcError> {
    if !filter.descends_into(&dir.path) {
        return Ok(());
    }

    let versioned = wc.children(&dir.path)?;
    let mut names: BTreeSet<String> = versioned.iter().map(|n| n.name().to_string()).collect();
    let on_disk = if NodeKind::on_disk(&wc.abspath(&dir.path)) == NodeKind::Dir {
        wc.list_disk(&dir.path)?
    } else {
        Vec::new()
    };
    names.extend(on_disk.iter().map(|(name, _)| name.clone()));
    if let Some(source) = remote {
        if !dir.is_added() {
            names.extend(source.remote_children(&dir.repos_path)?);
        }
    }

    for name in names {
        let path = target::join(&dir.path, &name);
        let node = versioned.iter().find(|n| n.name() == name);
        let kind = match node {
            Some(n) => n.kind,
            None => on_disk
                .iter()
                .find(|(n, _)| n == &name)
                .map(|(_, k)| *k)
                .unwrap_or(NodeKind::File),
        };
        if !filter.in_depth(&path, kind) {
            continue;
        }
        let snap = classify(wc, &path, node, remote)?;
        if report(filter, &snap) {
            out.push(snap);
        }
        if let Some(child) = node {
            if child.kind == NodeKind::Dir && filter.descends_into(&child.path) {
                walk_dir(wc, filter, child, remote, out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{ConflictOperation, TextVariants};
    use crate::delta::{DeltaSource, MemoryRepository};
    use crate::models::{Depth, PROP_MIME_TYPE};

    fn setup() -> (tempfile::TempDir, WorkingCopy) {
        let dir = tempfile::tempdir().unwrap();
        let wc = WorkingCopy::create(dir.path(), "file:///repo", "u", "trunk", 1, WcConfig::default())
            .unwrap();
        for (name, text) in [("a.txt", "a\n"), ("b.txt", "b\n")] {
            let mut node = WorkingNode::versioned(name, NodeKind::File, format!("/trunk/{name}"), 1);
            wc.install_pristine(&mut node, text.as_bytes()).unwrap();
            wc.save_node(&node).unwrap();
            std::fs::write(dir.path().join(name), text).unwrap();
        }
        (dir, wc)
    }

    fn status_of(wc: &WorkingCopy, path: &str) -> StatusSnapshot {
        let node = wc.node(path).unwrap();
        classify(wc, path, node.as_ref(), None).unwrap()
    }

    #[test]
    fn test_normal_modified_missing() {
        let (dir, wc) = setup();
        assert_eq!(status_of(&wc, "a.txt").node_status, StatusKind::Normal);

        std::fs::write(dir.path().join("a.txt"), "changed\n").unwrap();
        assert_eq!(status_of(&wc, "a.txt").contents, StatusKind::Modified);

        std::fs::remove_file(dir.path().join("b.txt")).unwrap();
        assert_eq!(status_of(&wc, "b.txt").contents, StatusKind::Missing);
        assert_eq!(status_of(&wc, "").contents, StatusKind::Incomplete);
    }

    #[test]
    fn test_unversioned_ignored_and_obstructed() {
        let (dir, wc) = setup();
        std::fs::write(dir.path().join("new.txt"), "n").unwrap();
        std::fs::write(dir.path().join("build.o"), "o").unwrap();
        std::fs::write(dir.path().join("notes.tmp"), "t").unwrap();
        wc.set_property("", PROP_IGNORE, "*.tmp\n").unwrap();

        assert_eq!(status_of(&wc, "new.txt").node_status, StatusKind::Unversioned);
        assert_eq!(status_of(&wc, "build.o").node_status, StatusKind::Ignored);
        assert_eq!(status_of(&wc, "notes.tmp").node_status, StatusKind::Ignored);

        std::fs::remove_file(dir.path().join("a.txt")).unwrap();
        std::fs::create_dir(dir.path().join("a.txt")).unwrap();
        assert_eq!(status_of(&wc, "a.txt").node_status, StatusKind::Obstructed);
    }

    #[test]
    fn test_schedules_and_props() {
        let (dir, wc) = setup();
        std::fs::write(dir.path().join("c.txt"), "c").unwrap();
        wc.add("c.txt", Depth::Empty).unwrap();
        assert_eq!(status_of(&wc, "c.txt").node_status, StatusKind::Added);

        wc.delete("b.txt", false).unwrap();
        let snap = status_of(&wc, "b.txt");
        assert_eq!(snap.node_status, StatusKind::Deleted);

        wc.set_property("a.txt", PROP_MIME_TYPE, "application/octet-stream").unwrap();
        let snap = status_of(&wc, "a.txt");
        assert_eq!(snap.contents, StatusKind::Normal);
        assert_eq!(snap.properties, StatusKind::Modified);
        assert_eq!(snap.node_status, StatusKind::Modified);
        assert_eq!(snap.columns(), " M     ");
    }

    #[test]
    fn test_conflicted_only_while_artifacts_exist() {
        let (dir, wc) = setup();
        let store = ConflictStore::new(&wc);
        store
            .record_text_conflict(
                "a.txt",
                ConflictOperation::Update,
                TextVariants {
                    base: Some(b"a\n"),
                    mine: b"m\n",
                    theirs: b"t\n",
                },
                Some(1),
                2,
            )
            .unwrap();
        assert_eq!(status_of(&wc, "a.txt").contents, StatusKind::Conflicted);
        for f in ["a.txt.mine", "a.txt.r1", "a.txt.r2"] {
            std::fs::remove_file(dir.path().join(f)).unwrap();
        }
        assert_eq!(status_of(&wc, "a.txt").contents, StatusKind::Normal);
    }

    #[test]
    fn test_switched() {
        let (_dir, wc) = setup();
        let mut node = wc.require_node("b.txt").unwrap();
        node.repos_path = "/branches/x/b.txt".into();
        wc.save_node(&node).unwrap();
        assert!(status_of(&wc, "b.txt").switched);
        assert!(!status_of(&wc, "a.txt").switched);
    }

    #[test]
    fn test_walk_with_filters() {
        let (dir, wc) = setup();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/x.txt"), "x").unwrap();
        wc.add("sub", Depth::Infinity).unwrap();
        std::fs::write(dir.path().join("loose.txt"), "l").unwrap();

        let all = walk(&wc, &PathFilter::everything(), None).unwrap();
        let paths: Vec<_> = all.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["", "a.txt", "b.txt", "loose.txt", "sub", "sub/x.txt"]);

        let files = walk(&wc, &PathFilter::new("", Depth::Files), None).unwrap();
        assert!(files.iter().all(|s| s.path != "sub" && s.path != "sub/x.txt"));

        wc.set_changelist(&["a.txt".to_string()], Some("cl")).unwrap();
        let cl = walk(
            &wc,
            &PathFilter::everything().with_changelists(vec!["cl".into()]),
            None,
        )
        .unwrap();
        let paths: Vec<_> = cl.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt"]);
    }

    #[test]
    fn test_remote_status() {
        let (_dir, wc) = setup();
        let mut repo = MemoryRepository::new("file:///repo");
        let mut tx = repo.transaction();
        tx.put("trunk/a.txt", "a\n").put("trunk/b.txt", "b\n");
        repo.commit(tx);
        let mut tx = repo.transaction();
        tx.put("trunk/a.txt", "a2\n").put("trunk/new.txt", "n\n").delete("trunk/b.txt");
        repo.commit(tx);
        assert_eq!(repo.youngest_revision().unwrap(), 2);

        let snaps = walk(&wc, &PathFilter::everything(), Some(&repo as &dyn RemoteStatusSource)).unwrap();
        let find = |p: &str| snaps.iter().find(|s| s.path == p).unwrap().remote.clone().unwrap();
        assert_eq!(find("a.txt").contents, StatusKind::Modified);
        assert_eq!(find("b.txt").contents, StatusKind::Deleted);
        assert_eq!(find("new.txt").contents, StatusKind::Added);
    }
}
