//! Domain model types shared by the metadata store, the status classifier and
//! the update/merge driver.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Revision numbers are plain signed integers; `-1` never appears in stored
/// nodes, absence is modelled with `Option`.
pub type Revnum = i64;

/// Versioned properties of one node, ordered by name.
pub type Properties = BTreeMap<String, String>;

/// Property holding merge-tracking metadata.
pub const PROP_MERGEINFO: &str = "svn:mergeinfo";
/// Property holding the MIME type used for binary detection.
pub const PROP_MIME_TYPE: &str = "svn:mime-type";
/// Directory property holding ignore patterns for its unversioned children.
pub const PROP_IGNORE: &str = "svn:ignore";

// ---------------------------------------------------------------------------
// Node kind
// ---------------------------------------------------------------------------

/// Kind of a node, either as versioned or as found on disk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Dir,
    None,
}

impl NodeKind {
    /// Parse a stored kind string.
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "file" => Self::File,
            "dir" => Self::Dir,
            _ => Self::None,
        }
    }

    /// Kind of whatever is on disk at `path` (symlinks are not followed).
    pub fn on_disk(path: &std::path::Path) -> Self {
        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => Self::Dir,
            Ok(_) => Self::File,
            Err(_) => Self::None,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Dir => write!(f, "dir"),
            Self::None => write!(f, "none"),
        }
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// Pending structural change recorded for the next commit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    Normal,
    Add,
    Delete,
    Replace,
}

impl Schedule {
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "add" => Self::Add,
            "delete" => Self::Delete,
            "replace" => Self::Replace,
            _ => Self::Normal,
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Add => write!(f, "add"),
            Self::Delete => write!(f, "delete"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

// ---------------------------------------------------------------------------
// Depth
// ---------------------------------------------------------------------------

/// How far below a directory an operation (or a sparse checkout) reaches.
///
/// Ordered from shallowest to deepest so that `min` picks the more
/// restrictive of two depths.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Depth {
    /// Only the target itself.
    Empty,
    /// The target and its file children.
    Files,
    /// The target and all immediate children, but not their contents.
    Immediates,
    /// Everything below the target.
    Infinity,
}

impl Depth {
    pub fn from_str_val(s: &str) -> Option<Self> {
        match s {
            "empty" => Some(Self::Empty),
            "files" => Some(Self::Files),
            "immediates" => Some(Self::Immediates),
            "infinity" => Some(Self::Infinity),
            _ => None,
        }
    }
}

impl std::fmt::Display for Depth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Files => write!(f, "files"),
            Self::Immediates => write!(f, "immediates"),
            Self::Infinity => write!(f, "infinity"),
        }
    }
}

impl std::str::FromStr for Depth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_val(s).ok_or_else(|| format!("unknown depth '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Locks and copy sources
// ---------------------------------------------------------------------------

/// A repository lock token held by this working copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockInfo {
    pub token: String,
    pub owner: Option<String>,
    pub comment: Option<String>,
    pub created_at: Option<String>,
}

/// Where a copied (added-with-history) node came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CopyFrom {
    pub url: String,
    pub revision: Revnum,
}

// ---------------------------------------------------------------------------
// Working node
// ---------------------------------------------------------------------------

/// One versioned path of the working copy.
///
/// `path` is relative to the working-copy root, `/`-separated, with the root
/// itself stored as the empty string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkingNode {
    pub path: String,
    pub kind: NodeKind,
    pub schedule: Schedule,
    /// Base revision; `None` for nodes scheduled for plain addition.
    pub revision: Option<Revnum>,
    /// Repository-relative path this node is bound to (e.g. `/trunk/a.txt`).
    pub repos_path: String,
    /// SHA-256 of the pristine text (files only).
    pub checksum: Option<String>,
    pub base_props: Properties,
    /// Working properties; `None` when identical to `base_props`.
    pub working_props: Option<Properties>,
    pub lock: Option<LockInfo>,
    pub changelist: Option<String>,
    pub copy_from: Option<CopyFrom>,
    /// Ambient depth of a directory in a sparse working copy.
    pub depth: Depth,
    /// A directory whose update was interrupted before all children arrived.
    pub incomplete: bool,
}

impl WorkingNode {
    /// A freshly checked-out node at `revision`.
    pub fn versioned(path: impl Into<String>, kind: NodeKind, repos_path: impl Into<String>, revision: Revnum) -> Self {
        Self {
            path: path.into(),
            kind,
            schedule: Schedule::Normal,
            revision: Some(revision),
            repos_path: repos_path.into(),
            checksum: None,
            base_props: Properties::new(),
            working_props: None,
            lock: None,
            changelist: None,
            copy_from: None,
            depth: Depth::Infinity,
            incomplete: false,
        }
    }

    /// A node scheduled for addition without history.
    pub fn added(path: impl Into<String>, kind: NodeKind, repos_path: impl Into<String>) -> Self {
        Self {
            schedule: Schedule::Add,
            revision: None,
            ..Self::versioned(path, kind, repos_path, 0)
        }
    }

    /// Effective working properties.
    pub fn props(&self) -> &Properties {
        self.working_props.as_ref().unwrap_or(&self.base_props)
    }

    /// `true` when the working properties differ from the base properties.
    pub fn props_modified(&self) -> bool {
        match &self.working_props {
            Some(working) => working != &self.base_props,
            None => false,
        }
    }

    /// Last path component (empty for the root).
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    pub fn is_added(&self) -> bool {
        matches!(self.schedule, Schedule::Add | Schedule::Replace)
    }

    pub fn is_deleted(&self) -> bool {
        self.schedule == Schedule::Delete
    }

    /// Binary according to the `svn:mime-type` property alone.
    pub fn has_binary_mime_type(&self) -> bool {
        self.props()
            .get(PROP_MIME_TYPE)
            .map(|m| !m.starts_with("text/"))
            .unwrap_or(false)
    }
}

/// Hex SHA-256 of `content`, the key of the pristine store.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// `true` if `content` looks binary (NUL byte in the first 8000 bytes).
pub fn looks_binary(content: &[u8]) -> bool {
    content.iter().take(8000).any(|b| *b == 0)
}
