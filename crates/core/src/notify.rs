//! Notification events emitted once per disposition.
//!
//! The core never formats output; it hands a [`Notification`] to a
//! [`NotificationSink`]. The CLI renders them as `U`/`G`/`C` lines, tests
//! collect them, and [`TracingSink`] turns them into log records.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{NodeKind, Revnum};

/// What happened to a path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotifyAction {
    UpdateAdd,
    UpdateDelete,
    UpdateUpdate,
    /// A local deletion was kept while the incoming one was a no-op.
    UpdateExists,
    Skip,
    TreeConflict,
    /// Mergeinfo was recorded on a path.
    MergeRecordInfo,
    Resolved,
    Add,
    Delete,
    /// The traversal finished; carries the target revision.
    Completed,
}

impl std::fmt::Display for NotifyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UpdateAdd => "update_add",
            Self::UpdateDelete => "update_delete",
            Self::UpdateUpdate => "update_update",
            Self::UpdateExists => "update_exists",
            Self::Skip => "skip",
            Self::TreeConflict => "tree_conflict",
            Self::MergeRecordInfo => "merge_record_info",
            Self::Resolved => "resolved",
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Outcome for the contents or the properties of a path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotifyState {
    Inapplicable,
    Unknown,
    Unchanged,
    Missing,
    Obstructed,
    Changed,
    Merged,
    Conflicted,
}

impl NotifyState {
    /// Single-letter code used in update output (`U`, `G`, `C`, or blank).
    pub fn code(&self) -> char {
        match self {
            Self::Changed => 'U',
            Self::Merged => 'G',
            Self::Conflicted => 'C',
            _ => ' ',
        }
    }
}

/// Why a path was skipped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Missing,
    Obstruction,
    AccessDenied,
    /// An ancestor (or the path itself) carries a tree conflict.
    TreeConflicted,
    /// The path still has an unresolved text or property conflict.
    RemainsInConflict,
    /// Outside the requested depth or changelists.
    OutOfScope,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Missing => "missing",
            Self::Obstruction => "obstruction",
            Self::AccessDenied => "access-denied",
            Self::TreeConflicted => "tree-conflicted",
            Self::RemainsInConflict => "remains-in-conflict",
            Self::OutOfScope => "out-of-scope",
        };
        write!(f, "{s}")
    }
}

/// One disposition event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub path: String,
    pub kind: NodeKind,
    pub action: NotifyAction,
    pub content_state: NotifyState,
    pub prop_state: NotifyState,
    pub skip_reason: Option<SkipReason>,
    pub revision: Option<Revnum>,
}

impl Notification {
    pub fn new(path: impl Into<String>, kind: NodeKind, action: NotifyAction) -> Self {
        Self {
            path: path.into(),
            kind,
            action,
            content_state: NotifyState::Inapplicable,
            prop_state: NotifyState::Inapplicable,
            skip_reason: None,
            revision: None,
        }
    }

    pub fn skip(path: impl Into<String>, kind: NodeKind, reason: SkipReason) -> Self {
        Self {
            skip_reason: Some(reason),
            ..Self::new(path, kind, NotifyAction::Skip)
        }
    }

    pub fn with_states(mut self, content: NotifyState, props: NotifyState) -> Self {
        self.content_state = content;
        self.prop_state = props;
        self
    }

    pub fn with_revision(mut self, revision: Revnum) -> Self {
        self.revision = Some(revision);
        self
    }
}

/// Receiver of disposition events.
pub trait NotificationSink {
    fn notify(&self, notification: &Notification);
}

/// Discards every event.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _notification: &Notification) {}
}

/// Stores every event; used by tests and by callers that render afterwards.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Notification>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Notification> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Events for one path, in emission order.
    pub fn for_path(&self, path: &str) -> Vec<Notification> {
        self.events().into_iter().filter(|n| n.path == path).collect()
    }
}

impl NotificationSink for CollectingSink {
    fn notify(&self, notification: &Notification) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification.clone());
    }
}

/// Logs every event at info level.
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, n: &Notification) {
        info!(
            path = %n.path,
            kind = %n.kind,
            action = %n.action,
            content = ?n.content_state,
            props = ?n.prop_state,
            skip_reason = ?n.skip_reason,
            "notification"
        );
    }
}
