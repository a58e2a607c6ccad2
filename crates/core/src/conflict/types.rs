//! Conflict record types: what collided, why, and where the variants live.

use serde::{Deserialize, Serialize};

use crate::models::{NodeKind, Revnum};

// ---------------------------------------------------------------------------
// Provenance enums
// ---------------------------------------------------------------------------

/// The working-copy operation that produced a conflict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConflictOperation {
    Update,
    Switch,
    Merge,
}

impl ConflictOperation {
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "switch" => Self::Switch,
            "merge" => Self::Merge,
            _ => Self::Update,
        }
    }
}

impl std::fmt::Display for ConflictOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Update => write!(f, "update"),
            Self::Switch => write!(f, "switch"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// What the incoming change tried to do to the victim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    Edit,
    Add,
    Delete,
}

impl ConflictAction {
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "add" => Self::Add,
            "delete" => Self::Delete,
            _ => Self::Edit,
        }
    }
}

impl std::fmt::Display for ConflictAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Edit => write!(f, "edit"),
            Self::Add => write!(f, "add"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Local state of the victim that made the incoming change collide.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    Edited,
    Obstructed,
    Deleted,
    Added,
    Missing,
    Unversioned,
}

impl ConflictReason {
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "obstructed" => Self::Obstructed,
            "deleted" => Self::Deleted,
            "added" => Self::Added,
            "missing" => Self::Missing,
            "unversioned" => Self::Unversioned,
            _ => Self::Edited,
        }
    }
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Edited => write!(f, "edited"),
            Self::Obstructed => write!(f, "obstructed"),
            Self::Deleted => write!(f, "deleted"),
            Self::Added => write!(f, "added"),
            Self::Missing => write!(f, "missing"),
            Self::Unversioned => write!(f, "unversioned"),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One side of a tree conflict: a node at a repository location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictVersion {
    pub repos_root: String,
    pub path_in_repos: String,
    pub peg_rev: Revnum,
    pub kind: NodeKind,
}

impl std::fmt::Display for ConflictVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}) {}{}@{}",
            self.kind, self.repos_root, self.path_in_repos, self.peg_rev
        )
    }
}

/// A text conflict. File names are relpaths from the working-copy root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextConflict {
    pub operation: ConflictOperation,
    /// Common ancestor text; `None` when the incoming change had no left side.
    pub base_file: Option<String>,
    pub mine_file: String,
    pub theirs_file: String,
    pub left_rev: Option<Revnum>,
    pub right_rev: Revnum,
}

impl TextConflict {
    /// All variant files that belong to this conflict.
    pub fn artifacts(&self) -> Vec<&str> {
        let mut files = Vec::with_capacity(3);
        if let Some(base) = &self.base_file {
            files.push(base.as_str());
        }
        files.push(&self.mine_file);
        files.push(&self.theirs_file);
        files
    }
}

/// A conflict on one property of a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropertyConflict {
    pub name: String,
    pub operation: ConflictOperation,
    pub base_value: Option<String>,
    pub mine_value: Option<String>,
    pub theirs_value: Option<String>,
    /// The `.prej` file describing every property conflict on the node.
    pub reject_file: String,
}

/// A structural conflict on a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeConflict {
    pub victim_kind: NodeKind,
    pub operation: ConflictOperation,
    pub action: ConflictAction,
    pub reason: ConflictReason,
    pub left: Option<ConflictVersion>,
    pub right: Option<ConflictVersion>,
}

impl TreeConflict {
    /// One-line human description, e.g. `local file edited, incoming file delete upon update`.
    pub fn describe(&self) -> String {
        format!(
            "local {} {}, incoming {} {} upon {}",
            self.victim_kind,
            self.reason,
            [&self.right, &self.left]
                .into_iter()
                .flatten()
                .map(|v| v.kind)
                .find(|k| *k != NodeKind::None)
                .unwrap_or(self.victim_kind),
            self.action,
            self.operation
        )
    }
}

/// Every outstanding conflict on one path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictRecord {
    pub path: String,
    pub text: Option<TextConflict>,
    pub props: Vec<PropertyConflict>,
    pub tree: Option<TreeConflict>,
}

impl ConflictRecord {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.props.is_empty() && self.tree.is_none()
    }

    pub fn kinds(&self) -> Vec<ConflictKind> {
        let mut kinds = Vec::new();
        if self.text.is_some() {
            kinds.push(ConflictKind::Text);
        }
        kinds.extend(self.props.iter().map(|p| ConflictKind::Property(p.name.clone())));
        if self.tree.is_some() {
            kinds.push(ConflictKind::Tree);
        }
        kinds
    }
}

/// Selector for `clear`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictKind {
    Text,
    /// A single property conflict by name.
    Property(String),
    Tree,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Property(name) => write!(f, "property '{name}'"),
            Self::Tree => write!(f, "tree"),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution choice
// ---------------------------------------------------------------------------

/// How an outstanding conflict should be resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictChoice {
    /// Restore the common ancestor text.
    Base,
    /// Keep the local side entirely.
    MineFull,
    /// Resolve only conflicting hunks to the local side.
    MineConflict,
    /// Take the incoming side entirely.
    TheirsFull,
    /// Resolve only conflicting hunks to the incoming side.
    TheirsConflict,
    /// Accept the current working file as the result.
    Merged,
    /// Leave the conflict in place.
    Postpone,
}

impl ConflictChoice {
    /// Parse a long name (`mine-full`) or the short prompt code (`mf`).
    pub fn from_str_val(s: &str) -> Option<Self> {
        match s {
            "base" | "b" => Some(Self::Base),
            "mine-full" | "mf" => Some(Self::MineFull),
            "mine-conflict" | "mc" => Some(Self::MineConflict),
            "theirs-full" | "tf" => Some(Self::TheirsFull),
            "theirs-conflict" | "tc" => Some(Self::TheirsConflict),
            "merged" | "working" | "r" => Some(Self::Merged),
            "postpone" | "p" => Some(Self::Postpone),
            _ => None,
        }
    }

    /// Short code used by the interactive prompt.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Base => "b",
            Self::MineFull => "mf",
            Self::MineConflict => "mc",
            Self::TheirsFull => "tf",
            Self::TheirsConflict => "tc",
            Self::Merged => "r",
            Self::Postpone => "p",
        }
    }

    /// `true` for choices that work hunk by hunk.
    pub fn is_per_hunk(&self) -> bool {
        matches!(self, Self::MineConflict | Self::TheirsConflict)
    }
}

impl std::fmt::Display for ConflictChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::MineFull => write!(f, "mine-full"),
            Self::MineConflict => write!(f, "mine-conflict"),
            Self::TheirsFull => write!(f, "theirs-full"),
            Self::TheirsConflict => write!(f, "theirs-conflict"),
            Self::Merged => write!(f, "merged"),
            Self::Postpone => write!(f, "postpone"),
        }
    }
}

impl std::str::FromStr for ConflictChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_val(s).ok_or_else(|| format!("unknown resolution '{s}'"))
    }
}
