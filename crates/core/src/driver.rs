//! Update, switch and merge: applying a tree delta to the working copy.
//!
//! Every operation follows the same shape: resolve the target, take the
//! working-copy lock, fetch a [`TreeDelta`] from the [`DeltaSource`] and walk
//! its operations in order. Each path ends the walk in one [`PathState`];
//! local changes are never silently overwritten; anything that cannot be
//! merged becomes a text, property or tree conflict and the walk continues
//! with the next path.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::cancel::CancellationToken;
use crate::config::WcConfig;
use crate::conflict::{
    ConflictAction, ConflictChoice, ConflictOperation, ConflictReason, ConflictResolver, ConflictStore,
    ConflictVersion, MergeLabels, Merger, TextVariants, TreeConflict,
};
use crate::delta::{DeltaOp, DeltaSource};
use crate::errors::{ConflictError, PathFailure, WcError};
use crate::filter::{self, PathFilter};
use crate::mergeinfo::{MergeRange, Mergeinfo};
use crate::models::{
    sha256_hex, looks_binary, CopyFrom, Depth, NodeKind, Properties, Revnum, Schedule, WorkingNode,
    PROP_MERGEINFO,
};
use crate::notify::{Notification, NotificationSink, NotifyAction, NotifyState, SkipReason};
use crate::target;
use crate::wc::WorkingCopy;

// ---------------------------------------------------------------------------
// Per-path outcome
// ---------------------------------------------------------------------------

/// Where a path ended up after a traversal. Conflicted states are sticky:
/// once a path is conflicted no later operation in the same walk moves it
/// back to a clean state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PathState {
    Untouched,
    Applied,
    Merged,
    Skipped,
    Conflicted,
    TreeConflicted,
}

impl PathState {
    pub fn is_conflicted(&self) -> bool {
        matches!(self, Self::Conflicted | Self::TreeConflicted)
    }

    /// Combine with a later outcome for the same path.
    pub fn advance(self, next: PathState) -> PathState {
        if self.is_conflicted() && !next.is_conflicted() {
            return self;
        }
        self.max(next)
    }

    fn from_notify(state: NotifyState) -> Self {
        match state {
            NotifyState::Conflicted => Self::Conflicted,
            NotifyState::Merged => Self::Merged,
            NotifyState::Changed => Self::Applied,
            _ => Self::Untouched,
        }
    }
}

impl std::fmt::Display for PathState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Untouched => "untouched",
            Self::Applied => "applied",
            Self::Merged => "merged",
            Self::Skipped => "skipped",
            Self::Conflicted => "conflicted",
            Self::TreeConflicted => "tree-conflicted",
        };
        write!(f, "{}", s)
    }
}

/// Summary of one update, switch or merge.
#[derive(Debug, Clone, Default)]
pub struct DriverReport {
    /// Revision the working copy was brought to (the right side of a merge).
    pub revision: Revnum,
    pub states: BTreeMap<String, PathState>,
    pub failures: Vec<PathFailure>,
    /// Ranges actually applied by a merge, in application order.
    pub merged_ranges: Vec<MergeRange>,
    /// Paths whose conflicts were cleared by the `accept` option.
    pub resolved: Vec<String>,
}

impl DriverReport {
    fn new(revision: Revnum) -> Self {
        Self {
            revision,
            ..Self::default()
        }
    }

    fn record(&mut self, path: &str, state: PathState) {
        let entry = self.states.entry(path.to_string()).or_insert(PathState::Untouched);
        *entry = entry.advance(state);
    }

    pub fn state(&self, path: &str) -> PathState {
        self.states.get(path).copied().unwrap_or(PathState::Untouched)
    }

    pub fn count(&self, state: PathState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }

    pub fn has_conflicts(&self) -> bool {
        self.states.values().any(PathState::is_conflicted)
    }

    /// Paths whose state is anything other than `Untouched`.
    pub fn touched(&self) -> impl Iterator<Item = (&str, PathState)> {
        self.states
            .iter()
            .filter(|(_, s)| **s != PathState::Untouched)
            .map(|(p, s)| (p.as_str(), *s))
    }
}

/// Scoping options shared by update, switch and merge.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub depth: Depth,
    pub changelists: Vec<String>,
    /// Resolve conflicts raised by this operation right away.
    pub accept: Option<ConflictChoice>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            depth: Depth::Infinity,
            changelists: Vec::new(),
            accept: None,
        }
    }
}

/// What to merge into the target.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Repository path of the merge source, e.g. `/branches/b`.
    pub source: String,
    pub range: MergeRange,
    /// Record the ranges as merged without touching content.
    pub record_only: bool,
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct MergeDriver<'a> {
    wc: &'a WorkingCopy,
    source: &'a dyn DeltaSource,
    sink: &'a dyn NotificationSink,
    cancel: CancellationToken,
}

impl<'a> MergeDriver<'a> {
    pub fn new(wc: &'a WorkingCopy, source: &'a dyn DeltaSource, sink: &'a dyn NotificationSink) -> Self {
        Self {
            wc,
            source,
            sink,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Create a working copy at `root` and populate it from `repos_path`.
    #[allow(clippy::too_many_arguments)]
    pub fn checkout(
        root: &Path,
        source: &dyn DeltaSource,
        repos_uuid: &str,
        repos_path: &str,
        revision: Option<Revnum>,
        depth: Depth,
        config: WcConfig,
        sink: &dyn NotificationSink,
    ) -> Result<(WorkingCopy, DriverReport), WcError> {
        let wc = WorkingCopy::create(root, source.repos_root(), repos_uuid, repos_path, 0, config)?;
        let mut root_node = wc.require_node("")?;
        root_node.depth = depth;
        wc.save_node(&root_node)?;
        let options = DriverOptions {
            depth,
            ..DriverOptions::default()
        };
        let report = MergeDriver::new(&wc, source, sink).update("", revision, &options)?;
        Ok((wc, report))
    }

    /// Bring `target` to `revision` (HEAD when `None`).
    #[instrument(skip(self, options))]
    pub fn update(
        &self,
        target: &str,
        revision: Option<Revnum>,
        options: &DriverOptions,
    ) -> Result<DriverReport, WcError> {
        let target = target::normalize_relpath(target)?;
        let node = self.wc.require_node(&target)?;
        let repos_path = node.repos_path.clone();
        self.run_update(&target, node, ConflictOperation::Update, &repos_path, &repos_path, revision, options)
    }

    /// Point directory `target` at `repos_path` and bring it to `revision`.
    #[instrument(skip(self, options))]
    pub fn switch(
        &self,
        target: &str,
        repos_path: &str,
        revision: Option<Revnum>,
        options: &DriverOptions,
    ) -> Result<DriverReport, WcError> {
        let target = target::normalize_relpath(target)?;
        let node = self.wc.require_node(&target)?;
        if node.kind != NodeKind::Dir {
            return Err(WcError::InvalidArgument(format!(
                "'{}' is not a directory; only directories can be switched",
                target
            )));
        }
        let new_path = format!("/{}", repos_path.trim_matches('/'));
        let old_path = node.repos_path.clone();
        self.run_update(&target, node, ConflictOperation::Switch, &old_path, &new_path, revision, options)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_update(
        &self,
        target: &str,
        node: WorkingNode,
        operation: ConflictOperation,
        old_repos: &str,
        new_repos: &str,
        revision: Option<Revnum>,
        options: &DriverOptions,
    ) -> Result<DriverReport, WcError> {
        if node.is_added() {
            return Err(WcError::InvalidArgument(format!(
                "'{}' is scheduled for addition and has no repository revision",
                target
            )));
        }
        let to = self.resolve_revision(revision)?;
        let _guard = self.wc.lock()?;

        // Mixed-revision subtrees are diffed from their oldest member; paths
        // already at a newer revision come out unchanged.
        let from = self
            .wc
            .subtree(target)?
            .iter()
            .filter(|n| !n.is_added())
            .filter_map(|n| n.revision)
            .min()
            .unwrap_or(0);

        let (anchor, left_anchor, right_anchor) = if node.kind == NodeKind::Dir {
            (target.to_string(), old_repos.to_string(), new_repos.to_string())
        } else {
            (
                target::parent(target).unwrap_or_default().to_string(),
                repos_parent(old_repos),
                repos_parent(new_repos),
            )
        };

        if operation == ConflictOperation::Switch && old_repos != new_repos {
            self.rewrite_repos_paths(target, old_repos, new_repos)?;
        }

        info!(%operation, from, to, anchor = %anchor, "applying tree delta");
        let delta = self.source.open_delta(&left_anchor, from, &right_anchor, to)?;
        let filter = PathFilter::new(target, options.depth).with_changelists(options.changelists.clone());
        let mut walk = Walk::new(
            self,
            filter,
            anchor,
            operation,
            Sides {
                left_repos: left_anchor,
                right_repos: right_anchor,
                left_rev: from,
                right_rev: to,
            },
            DriverReport::new(to),
        )?;
        walk.run(&delta.ops)?;
        let report = walk.into_report();
        self.finish(report, options, target, node.kind)
    }

    /// Merge `merge.range` of `merge.source` into `target`.
    #[instrument(skip(self, merge, options), fields(source = %merge.source))]
    pub fn merge(
        &self,
        target: &str,
        merge: &MergeOptions,
        options: &DriverOptions,
    ) -> Result<DriverReport, WcError> {
        let target = target::normalize_relpath(target)?;
        let node = self.wc.require_node(&target)?;
        if node.is_deleted() {
            return Err(WcError::InvalidArgument(format!(
                "'{}' is scheduled for deletion",
                target
            )));
        }
        let range = merge.range;
        if range.start == range.end || range.start.min(range.end) < 0 {
            return Err(WcError::InvalidArgument(format!(
                "invalid revision range {}:{}",
                range.start, range.end
            )));
        }
        let youngest = self.source.youngest_revision()?;
        if range.start.max(range.end) > youngest {
            return Err(WcError::InvalidArgument(format!(
                "no such revision {} (youngest is {})",
                range.start.max(range.end),
                youngest
            )));
        }

        let source = format!("/{}", merge.source.trim_matches('/'));
        let (anchor, source_anchor) = if node.kind == NodeKind::Dir {
            (target.clone(), source.clone())
        } else {
            if target::basename(&source) != node.name() {
                return Err(WcError::InvalidArgument(format!(
                    "cannot merge '{}' into file '{}' with a different name",
                    source, target
                )));
            }
            (
                target::parent(&target).unwrap_or_default().to_string(),
                repos_parent(&source),
            )
        };

        let _guard = self.wc.lock()?;
        let (pre_merge, _) = self.wc.effective_mergeinfo(&target)?;
        let ranges = pre_merge.remaining_ranges(&source, range);
        let mut report = DriverReport::new(range.end);
        if ranges.is_empty() {
            info!(%range, "requested range is already merged");
            return self.finish(report, options, &target, node.kind);
        }

        let filter = PathFilter::new(target.clone(), options.depth).with_changelists(options.changelists.clone());
        let mut applied = Vec::new();
        for sub in ranges {
            if !merge.record_only {
                info!(range = %sub, "merging range");
                let delta = self.source.open_tree_delta(&source_anchor, sub.start, sub.end)?;
                let mut walk = Walk::new(
                    self,
                    filter.clone(),
                    anchor.clone(),
                    ConflictOperation::Merge,
                    Sides {
                        left_repos: source_anchor.clone(),
                        right_repos: source_anchor.clone(),
                        left_rev: sub.start,
                        right_rev: sub.end,
                    },
                    report,
                )?;
                walk.run(&delta.ops)?;
                report = walk.into_report();
            }
            applied.push(sub);
            if report.has_conflicts() {
                warn!(range = %sub, "range produced conflicts; remaining ranges not merged");
                break;
            }
        }

        self.record_mergeinfo(&target, &source, &applied, &report)?;
        self.sink.notify(&Notification::new(&target, node.kind, NotifyAction::MergeRecordInfo));
        report.merged_ranges = applied;
        self.finish(report, options, &target, node.kind)
    }

    fn resolve_revision(&self, revision: Option<Revnum>) -> Result<Revnum, WcError> {
        let youngest = self.source.youngest_revision()?;
        match revision {
            None => Ok(youngest),
            Some(r) if (0..=youngest).contains(&r) => Ok(r),
            Some(r) => Err(WcError::InvalidArgument(format!(
                "no such revision {} (youngest is {})",
                r, youngest
            ))),
        }
    }

    fn rewrite_repos_paths(&self, target: &str, old: &str, new: &str) -> Result<(), WcError> {
        for mut node in self.wc.subtree(target)? {
            let Some(rest) = node.repos_path.strip_prefix(old) else {
                continue;
            };
            if !rest.is_empty() && !rest.starts_with('/') {
                continue;
            }
            node.repos_path = format!("{}{}", new, rest);
            self.wc.save_node(&node)?;
        }
        debug!(target, old, new, "rewrote repository paths for switch");
        Ok(())
    }

    /// Write the mergeinfo describing what this merge did.
    fn record_mergeinfo(
        &self,
        target: &str,
        source: &str,
        applied: &[MergeRange],
        report: &DriverReport,
    ) -> Result<(), WcError> {
        // Paths the merge skipped keep what they had before it.
        let mut pinned = Vec::new();
        for (path, state) in &report.states {
            if path == target || !matches!(state, PathState::Skipped | PathState::TreeConflicted) {
                continue;
            }
            let Some(node) = self.wc.node(path)? else {
                continue;
            };
            if node.is_deleted() || node.props().contains_key(PROP_MERGEINFO) {
                continue;
            }
            let (before, _) = self.wc.effective_mergeinfo(path)?;
            self.wc.set_property(path, PROP_MERGEINFO, &before.to_string())?;
            debug!(path = %path, "pinned mergeinfo of skipped path");
            pinned.push(path.clone());
        }

        for node in self.wc.subtree(target)? {
            if node.path == target || node.is_deleted() || pinned.contains(&node.path) {
                continue;
            }
            let Some(mut mi) = self.wc.mergeinfo(&node.path)? else {
                continue;
            };
            let rel = target::skip_ancestor(target, &node.path).unwrap_or("");
            let child_source = format!("{}/{}", source.trim_end_matches('/'), rel);
            for range in applied {
                mi.apply_range(&child_source, *range);
            }
            self.wc.set_property(&node.path, PROP_MERGEINFO, &mi.to_string())?;
        }

        let (mut mi, _) = self.wc.effective_mergeinfo(target)?;
        for range in applied {
            mi.apply_range(source, *range);
        }
        if mi.is_empty() && self.ancestor_mergeinfo(target)?.is_empty() {
            if self.wc.mergeinfo(target)?.is_some() {
                self.wc.delete_property(target, PROP_MERGEINFO)?;
            }
        } else {
            self.wc.set_property(target, PROP_MERGEINFO, &mi.to_string())?;
        }
        info!(target, mergeinfo = %mi, "recorded mergeinfo");
        Ok(())
    }

    fn ancestor_mergeinfo(&self, path: &str) -> Result<Mergeinfo, WcError> {
        for ancestor in target::ancestors(path) {
            if let Some(mi) = self.wc.mergeinfo(ancestor)? {
                let rel = target::skip_ancestor(ancestor, path).unwrap_or("");
                return Ok(mi.inherited_by(rel));
            }
        }
        Ok(Mergeinfo::new())
    }

    /// Apply `accept`, emit the completion event and surface per-path
    /// failures.
    fn finish(
        &self,
        mut report: DriverReport,
        options: &DriverOptions,
        target: &str,
        kind: NodeKind,
    ) -> Result<DriverReport, WcError> {
        if let Some(choice) = options.accept.filter(|c| *c != ConflictChoice::Postpone) {
            let conflicted: Vec<String> = report
                .states
                .iter()
                .filter(|(_, s)| s.is_conflicted())
                .map(|(p, _)| p.clone())
                .collect();
            for path in conflicted {
                match ConflictResolver::resolve(self.wc, &path, choice, self.sink) {
                    Ok(_) => report.resolved.push(path),
                    Err(WcError::Conflict(e @ ConflictError::InvalidChoice { .. })) => {
                        warn!(path = %path, error = %e, "conflict left in place");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        self.sink.notify(
            &Notification::new(target, kind, NotifyAction::Completed).with_revision(report.revision),
        );
        info!(
            revision = report.revision,
            touched = report.touched().count(),
            conflicts = report.states.values().filter(|s| s.is_conflicted()).count(),
            failures = report.failures.len(),
            "operation finished"
        );
        if !report.failures.is_empty() {
            return Err(WcError::Incomplete {
                failures: report.failures,
            });
        }
        Ok(report)
    }
}

/// Parent of a repository path, keeping the leading slash.
fn repos_parent(repos_path: &str) -> String {
    let trimmed = repos_path.trim_matches('/');
    format!("/{}", target::parent(trimmed).unwrap_or_default())
}

fn set_prop(props: &mut Properties, name: &str, value: Option<String>) {
    match value {
        Some(v) => {
            props.insert(name.to_string(), v);
        }
        None => {
            props.remove(name);
        }
    }
}

// ---------------------------------------------------------------------------
// Delta walk
// ---------------------------------------------------------------------------

/// Repository coordinates of both sides of the delta being applied.
struct Sides {
    left_repos: String,
    right_repos: String,
    left_rev: Revnum,
    right_rev: Revnum,
}

struct Walk<'d, 'a> {
    driver: &'d MergeDriver<'a>,
    store: ConflictStore<'a>,
    filter: PathFilter,
    anchor: String,
    operation: ConflictOperation,
    sides: Sides,
    repos_root: String,
    /// Subtrees no further operation may touch.
    blocked: Vec<String>,
    report: DriverReport,
}

impl<'d, 'a> Walk<'d, 'a> {
    fn new(
        driver: &'d MergeDriver<'a>,
        filter: PathFilter,
        anchor: String,
        operation: ConflictOperation,
        sides: Sides,
        report: DriverReport,
    ) -> Result<Self, WcError> {
        Ok(Self {
            driver,
            store: ConflictStore::new(driver.wc),
            filter,
            anchor,
            operation,
            sides,
            repos_root: driver.wc.repos_root()?,
            blocked: Vec::new(),
            report,
        })
    }

    fn into_report(self) -> DriverReport {
        self.report
    }

    fn wc(&self) -> &'a WorkingCopy {
        self.driver.wc
    }

    fn is_merge(&self) -> bool {
        self.operation == ConflictOperation::Merge
    }

    fn notify(&self, notification: Notification) {
        self.driver.sink.notify(&notification);
    }

    fn skip(&mut self, path: &str, kind: NodeKind, reason: SkipReason) {
        debug!(path, %reason, "skipped");
        self.notify(Notification::skip(path, kind, reason));
        self.report.record(path, PathState::Skipped);
    }

    fn is_blocked(&self, path: &str) -> bool {
        self.blocked.iter().any(|b| target::is_ancestor(b, path))
    }

    fn repos_path_of(&self, base: &str, path: &str) -> String {
        let rel = target::skip_ancestor(&self.anchor, path).unwrap_or("");
        if rel.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base.trim_end_matches('/'), rel)
        }
    }

    fn run(&mut self, ops: &[DeltaOp]) -> Result<(), WcError> {
        for op in ops {
            self.driver.cancel.check()?;
            let path = target::join(&self.anchor, op.path());
            if self.is_blocked(&path) {
                continue;
            }
            match self.apply(op, &path) {
                Ok(()) => {}
                Err(e) if e.is_fatal_for_traversal() => return Err(e),
                Err(WcError::Io { source, .. }) if source.kind() == std::io::ErrorKind::PermissionDenied => {
                    let kind = self.op_kind(op, &path);
                    self.skip(&path, kind, SkipReason::AccessDenied);
                    self.blocked.push(path);
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "could not apply change; continuing");
                    self.report.failures.push(PathFailure {
                        path: path.clone(),
                        message: e.to_string(),
                    });
                    self.report.record(&path, PathState::Skipped);
                    self.blocked.push(path);
                }
            }
        }
        Ok(())
    }

    fn op_kind(&self, op: &DeltaOp, path: &str) -> NodeKind {
        match op {
            DeltaOp::Add { kind, .. } | DeltaOp::Delete { kind, .. } => *kind,
            DeltaOp::OpenDir { .. } | DeltaOp::CloseDir { .. } => NodeKind::Dir,
            DeltaOp::TextDelta { .. } => NodeKind::File,
            DeltaOp::PropChange { .. } => self
                .wc()
                .node(path)
                .ok()
                .flatten()
                .map(|n| n.kind)
                .unwrap_or(NodeKind::File),
        }
    }

    fn apply(&mut self, op: &DeltaOp, path: &str) -> Result<(), WcError> {
        if let DeltaOp::CloseDir { .. } = op {
            return self.close_dir(path);
        }
        // Context the delta carries around the operation target.
        if target::depth_below(&self.filter.target, path).is_none() {
            return Ok(());
        }
        let kind = self.op_kind(op, path);

        // Ambient depth of a sparse parent directory.
        if path != self.filter.target {
            if let Some(parent) = target::parent(path).map(|p| self.wc().node(p)).transpose()?.flatten() {
                if parent.kind == NodeKind::Dir && !filter::depth_admits(parent.depth, 1, kind) {
                    if kind == NodeKind::Dir {
                        self.blocked.push(path.to_string());
                    }
                    return Ok(());
                }
            }
        }

        let node = self.wc().node(path)?;
        let changelist = node.as_ref().and_then(|n| n.changelist.clone());
        if !self.filter.admits(path, kind, changelist.as_deref()) {
            self.skip(path, kind, SkipReason::OutOfScope);
            if kind == NodeKind::Dir {
                self.blocked.push(path.to_string());
            }
            return Ok(());
        }

        if self.store.tree_conflicted_ancestor(path)?.is_some() {
            self.skip(path, kind, SkipReason::TreeConflicted);
            if matches!(op, DeltaOp::OpenDir { .. }) {
                self.blocked.push(path.to_string());
            }
            return Ok(());
        }

        match op {
            DeltaOp::OpenDir { .. } => self.open_dir(path, node),
            DeltaOp::Add { kind, content, props, .. } => self.add(path, node, *kind, content.as_deref(), props),
            DeltaOp::Delete { kind, left_checksum, .. } => self.delete(path, node, *kind, left_checksum.as_deref()),
            DeltaOp::TextDelta { left, right, .. } => self.text_delta(path, node, left.as_deref(), right),
            DeltaOp::PropChange { name, left, right, .. } => {
                self.prop_change(path, node, name, left.clone(), right.clone())
            }
            DeltaOp::CloseDir { .. } => Ok(()),
        }
    }

    /// The node an edit applies to, or why the edit has to be skipped.
    fn editable(&self, path: &str, node: Option<WorkingNode>, expected: Option<NodeKind>) -> Result<WorkingNode, SkipReason> {
        let node = match node {
            Some(n) if !n.is_deleted() => n,
            _ => return Err(SkipReason::Missing),
        };
        let on_disk = NodeKind::on_disk(&self.wc().abspath(path));
        if on_disk == NodeKind::None {
            return Err(SkipReason::Missing);
        }
        if on_disk != node.kind || expected.is_some_and(|k| k != node.kind) {
            return Err(SkipReason::Obstruction);
        }
        Ok(node)
    }

    // -- directories --------------------------------------------------------

    fn open_dir(&mut self, path: &str, node: Option<WorkingNode>) -> Result<(), WcError> {
        let mut node = match self.editable(path, node, Some(NodeKind::Dir)) {
            Ok(n) => n,
            Err(reason) => {
                self.skip(path, NodeKind::Dir, reason);
                self.blocked.push(path.to_string());
                return Ok(());
            }
        };
        if !self.is_merge() && !node.is_added() {
            node.incomplete = true;
            self.wc().save_node(&node)?;
        }
        Ok(())
    }

    /// Finish a directory: bump it and its untouched file children to the
    /// target revision and clear the incomplete flag.
    fn close_dir(&mut self, path: &str) -> Result<(), WcError> {
        if self.is_merge() {
            return Ok(());
        }
        let in_target = target::is_ancestor(&self.filter.target, path);
        if !in_target && !target::is_ancestor(path, &self.filter.target) {
            return Ok(());
        }
        let Some(mut dir) = self.wc().node(path)? else {
            return Ok(());
        };
        if dir.kind != NodeKind::Dir || dir.is_deleted() {
            return Ok(());
        }
        let to = self.sides.right_rev;

        for mut child in self.wc().children(path)? {
            if child.kind != NodeKind::File || child.is_added() || child.revision == Some(to) {
                continue;
            }
            if !self.filter.admits(&child.path, NodeKind::File, child.changelist.as_deref()) {
                continue;
            }
            if matches!(self.report.state(&child.path), PathState::Skipped | PathState::TreeConflicted) {
                continue;
            }
            if self.store.query(&child.path)?.is_some_and(|r| r.tree.is_some()) {
                continue;
            }
            child.revision = Some(to);
            self.wc().save_node(&child)?;
        }

        // A directory with a failed child stays incomplete so a re-run
        // fetches the child again.
        let failed_below = self.report.failures.iter().any(|f| target::is_ancestor(path, &f.path));
        if in_target
            && !failed_below
            && self.filter.in_depth(path, NodeKind::Dir)
            && !matches!(self.report.state(path), PathState::Skipped | PathState::TreeConflicted)
            && !dir.is_added()
        {
            dir.revision = Some(to);
            dir.incomplete = false;
            self.wc().save_node(&dir)?;
            debug!(path, revision = to, "directory complete");
        }
        Ok(())
    }

    // -- additions ------------------------------------------------------------

    fn add(
        &mut self,
        path: &str,
        node: Option<WorkingNode>,
        kind: NodeKind,
        content: Option<&[u8]>,
        props: &Properties,
    ) -> Result<(), WcError> {
        let abspath = self.wc().abspath(path);
        let on_disk = NodeKind::on_disk(&abspath);

        if let Some(existing) = node {
            if existing.is_added() {
                return self.tree_conflict(path, existing.kind, ConflictAction::Add, ConflictReason::Added, kind);
            }
            if existing.is_deleted() {
                return self.tree_conflict(path, existing.kind, ConflictAction::Add, ConflictReason::Deleted, kind);
            }
            if self.is_merge() || existing.kind != kind {
                return self.tree_conflict(path, existing.kind, ConflictAction::Add, ConflictReason::Obstructed, kind);
            }
            return self.readd_existing(path, existing, content, props);
        }

        if on_disk != NodeKind::None {
            return self.tree_conflict(path, on_disk, ConflictAction::Add, ConflictReason::Obstructed, kind);
        }

        let parent_path = target::parent(path).unwrap_or_default();
        let parent = self.wc().require_node(parent_path)?;
        let repos_path = format!("{}/{}", parent.repos_path.trim_end_matches('/'), target::basename(path));
        let text = content.unwrap_or_default();

        if kind == NodeKind::Dir {
            std::fs::create_dir(&abspath).map_err(|e| WcError::io(&abspath, e))?;
        } else {
            self.wc().write_working(path, text)?;
        }

        let mut new = if self.is_merge() {
            let mut n = WorkingNode::added(path, kind, repos_path);
            n.copy_from = Some(CopyFrom {
                url: format!("{}{}", self.repos_root, self.repos_path_of(&self.sides.right_repos, path)),
                revision: self.sides.right_rev,
            });
            n
        } else {
            let mut n = WorkingNode::versioned(path, kind, repos_path, self.sides.right_rev);
            n.incomplete = kind == NodeKind::Dir;
            n
        };
        new.base_props = props.clone();
        if kind == NodeKind::File {
            self.wc().install_pristine(&mut new, text)?;
        } else if self.filter.depth != Depth::Infinity {
            new.depth = Depth::Empty;
        }
        self.wc().save_node(&new)?;

        let prop_state = if props.is_empty() {
            NotifyState::Inapplicable
        } else {
            NotifyState::Changed
        };
        self.notify(Notification::new(path, kind, NotifyAction::UpdateAdd).with_states(NotifyState::Changed, prop_state));
        self.report.record(path, PathState::Applied);
        Ok(())
    }

    /// An update adding a node that is already versioned with the same kind
    /// (a mixed-revision subtree being caught up) becomes an edit.
    fn readd_existing(
        &mut self,
        path: &str,
        existing: WorkingNode,
        content: Option<&[u8]>,
        props: &Properties,
    ) -> Result<(), WcError> {
        let kind = existing.kind;
        let base_props = existing.base_props.clone();
        if kind == NodeKind::File {
            self.text_delta(path, Some(existing), None, content.unwrap_or_default())?;
        }
        let names: std::collections::BTreeSet<&String> = base_props.keys().chain(props.keys()).collect();
        for name in names {
            if base_props.get(name) != props.get(name) {
                let node = self.wc().node(path)?;
                self.prop_change(path, node, name, base_props.get(name).cloned(), props.get(name).cloned())?;
            }
        }
        Ok(())
    }

    // -- deletions ------------------------------------------------------------

    fn delete(
        &mut self,
        path: &str,
        node: Option<WorkingNode>,
        kind: NodeKind,
        left_checksum: Option<&str>,
    ) -> Result<(), WcError> {
        let Some(node) = node else {
            if self.is_merge() {
                return self.tree_conflict(path, kind, ConflictAction::Delete, ConflictReason::Missing, kind);
            }
            return Ok(());
        };
        if node.is_deleted() {
            if self.is_merge() {
                self.notify(Notification::new(path, node.kind, NotifyAction::UpdateExists));
            } else {
                self.wc().db().delete_subtree(path)?;
                self.notify(Notification::new(path, node.kind, NotifyAction::UpdateDelete));
            }
            self.report.record(path, PathState::Applied);
            return Ok(());
        }
        if node.is_added() {
            return self.tree_conflict(path, node.kind, ConflictAction::Delete, ConflictReason::Added, kind);
        }

        let abspath = self.wc().abspath(path);
        if NodeKind::on_disk(&abspath) == NodeKind::None {
            if self.is_merge() {
                return self.tree_conflict(path, node.kind, ConflictAction::Delete, ConflictReason::Missing, kind);
            }
            self.wc().db().delete_subtree(path)?;
            self.notify(Notification::new(path, node.kind, NotifyAction::UpdateDelete));
            self.report.record(path, PathState::Applied);
            return Ok(());
        }

        if self.has_local_changes(&node, left_checksum)? {
            return self.tree_conflict(path, node.kind, ConflictAction::Delete, ConflictReason::Edited, kind);
        }

        if self.is_merge() {
            self.wc().delete(path, false)?;
        } else {
            let removed = if node.kind == NodeKind::Dir {
                std::fs::remove_dir_all(&abspath)
            } else {
                std::fs::remove_file(&abspath)
            };
            removed.map_err(|e| WcError::io(&abspath, e))?;
            self.wc().db().delete_subtree(path)?;
        }
        self.notify(Notification::new(path, node.kind, NotifyAction::UpdateDelete));
        self.report.record(path, PathState::Applied);
        Ok(())
    }

    /// `true` if deleting `node` would lose anything the user did: edits,
    /// scheduling, conflicts or unversioned files inside a directory.
    fn has_local_changes(&self, node: &WorkingNode, left_checksum: Option<&str>) -> Result<bool, WcError> {
        if !self.wc().db().list_conflicted_paths(&node.path)?.is_empty() {
            return Ok(true);
        }
        let subtree = self.wc().subtree(&node.path)?;
        for n in &subtree {
            if n.schedule != Schedule::Normal || n.props_modified() {
                return Ok(true);
            }
            match n.kind {
                NodeKind::File => {
                    let modified = match left_checksum.filter(|_| self.is_merge() && n.path == node.path) {
                        Some(sum) => self
                            .wc()
                            .read_working(&n.path)?
                            .is_some_and(|text| sha256_hex(&text) != sum),
                        None => self.wc().text_modified(n)?,
                    };
                    if modified {
                        return Ok(true);
                    }
                }
                NodeKind::Dir => {
                    if NodeKind::on_disk(&self.wc().abspath(&n.path)) != NodeKind::Dir {
                        continue;
                    }
                    for (name, _) in self.wc().list_disk(&n.path)? {
                        let child = target::join(&n.path, &name);
                        if !subtree.iter().any(|v| v.path == child) {
                            return Ok(true);
                        }
                    }
                }
                NodeKind::None => {}
            }
        }
        Ok(false)
    }

    // -- text -----------------------------------------------------------------

    fn text_delta(
        &mut self,
        path: &str,
        node: Option<WorkingNode>,
        left: Option<&[u8]>,
        right: &[u8],
    ) -> Result<(), WcError> {
        let node = match self.editable(path, node, Some(NodeKind::File)) {
            Ok(n) => n,
            Err(reason) => {
                self.skip(path, NodeKind::File, reason);
                return Ok(());
            }
        };
        if self.store.query(path)?.is_some_and(|r| r.text.is_some()) {
            self.skip(path, NodeKind::File, SkipReason::RemainsInConflict);
            return Ok(());
        }
        let working = self.wc().read_working(path)?.unwrap_or_default();
        let outcome = if self.is_merge() {
            self.merge_text(&node, &working, left.unwrap_or_default(), right)?
        } else {
            self.update_text(node, &working, right)?
        };
        match outcome {
            Some(state) => {
                self.notify(
                    Notification::new(path, NodeKind::File, NotifyAction::UpdateUpdate)
                        .with_states(state, NotifyState::Inapplicable),
                );
                self.report.record(path, PathState::from_notify(state));
            }
            None => self.report.record(path, PathState::Untouched),
        }
        Ok(())
    }

    /// Fold the pristine-to-`right` change into the working file. The
    /// pristine becomes `right` whatever the outcome.
    fn update_text(&self, mut node: WorkingNode, working: &[u8], right: &[u8]) -> Result<Option<NotifyState>, WcError> {
        if node.checksum.as_deref() == Some(sha256_hex(right).as_str()) {
            return Ok(None);
        }
        let pristine = self.wc().read_pristine(&node)?;
        let old_rev = node.revision.unwrap_or(self.sides.left_rev);
        let to = self.sides.right_rev;

        let state = if working == pristine.as_slice() {
            self.wc().write_working(&node.path, right)?;
            NotifyState::Changed
        } else if self.wc().is_binary(&node, working) || looks_binary(right) || looks_binary(&pristine) {
            self.record_text_conflict(&node.path, &pristine, working, right, old_rev)?;
            NotifyState::Conflicted
        } else {
            let labels = MergeLabels::new(".mine", format!(".r{}", old_rev), format!(".r{}", to));
            let result = Merger::three_way_merge(&pristine, working, right, &self.wc().config().merge, &labels, None);
            if result.has_conflicts() {
                self.record_text_conflict(&node.path, &pristine, working, right, old_rev)?;
                self.wc().write_working(&node.path, &result.merged_content)?;
                NotifyState::Conflicted
            } else {
                self.wc().write_working(&node.path, &result.merged_content)?;
                NotifyState::Merged
            }
        };
        self.wc().install_pristine(&mut node, right)?;
        node.revision = Some(to);
        self.wc().save_node(&node)?;
        Ok(Some(state))
    }

    /// Fold the `left`-to-`right` change into the working file; the base is
    /// left alone.
    fn merge_text(&self, node: &WorkingNode, working: &[u8], left: &[u8], right: &[u8]) -> Result<Option<NotifyState>, WcError> {
        if working == right {
            return Ok(None);
        }
        let (left_rev, right_rev) = (self.sides.left_rev, self.sides.right_rev);
        if working == left {
            self.wc().write_working(&node.path, right)?;
            return Ok(Some(NotifyState::Changed));
        }
        if self.wc().is_binary(node, working) || looks_binary(right) || looks_binary(left) {
            self.record_text_conflict(&node.path, left, working, right, left_rev)?;
            return Ok(Some(NotifyState::Conflicted));
        }
        let labels = MergeLabels::new(
            ".working",
            format!(".merge-left.r{}", left_rev),
            format!(".merge-right.r{}", right_rev),
        );
        let result = Merger::three_way_merge(left, working, right, &self.wc().config().merge, &labels, None);
        if result.has_conflicts() {
            self.record_text_conflict(&node.path, left, working, right, left_rev)?;
            self.wc().write_working(&node.path, &result.merged_content)?;
            return Ok(Some(NotifyState::Conflicted));
        }
        self.wc().write_working(&node.path, &result.merged_content)?;
        Ok(Some(NotifyState::Merged))
    }

    fn record_text_conflict(&self, path: &str, base: &[u8], mine: &[u8], theirs: &[u8], left_rev: Revnum) -> Result<(), WcError> {
        self.store.record_text_conflict(
            path,
            self.operation,
            TextVariants {
                base: Some(base),
                mine,
                theirs,
            },
            Some(left_rev),
            self.sides.right_rev,
        )?;
        Ok(())
    }

    // -- properties -----------------------------------------------------------

    fn prop_change(
        &mut self,
        path: &str,
        node: Option<WorkingNode>,
        name: &str,
        left: Option<String>,
        right: Option<String>,
    ) -> Result<(), WcError> {
        let kind = node.as_ref().map(|n| n.kind).unwrap_or(NodeKind::File);
        let mut node = match self.editable(path, node, None) {
            Ok(n) => n,
            Err(reason) => {
                self.skip(path, kind, reason);
                return Ok(());
            }
        };
        if self.store.query(path)?.is_some_and(|r| r.props.iter().any(|p| p.name == name)) {
            self.skip(path, kind, SkipReason::RemainsInConflict);
            return Ok(());
        }

        let base = if self.is_merge() {
            left
        } else {
            node.base_props.get(name).cloned()
        };
        let mine = node.props().get(name).cloned();
        let theirs = right;
        let mut props = node.props().clone();

        let state = if base == theirs {
            None
        } else if mine == theirs {
            Some(NotifyState::Merged)
        } else if mine == base {
            set_prop(&mut props, name, theirs.clone());
            Some(NotifyState::Changed)
        } else if let Some(union) = union_mergeinfo(name, mine.as_deref(), theirs.as_deref()) {
            set_prop(&mut props, name, Some(union));
            Some(NotifyState::Merged)
        } else {
            self.store.record_property_conflict(
                path,
                name,
                self.operation,
                base.as_deref(),
                mine.as_deref(),
                theirs.as_deref(),
            )?;
            Some(NotifyState::Conflicted)
        };

        if !self.is_merge() {
            set_prop(&mut node.base_props, name, theirs);
        }
        node.working_props = if props == node.base_props { None } else { Some(props) };
        self.wc().save_node(&node)?;

        match state {
            Some(state) => {
                self.notify(
                    Notification::new(path, kind, NotifyAction::UpdateUpdate)
                        .with_states(NotifyState::Inapplicable, state),
                );
                self.report.record(path, PathState::from_notify(state));
            }
            None => self.report.record(path, PathState::Untouched),
        }
        Ok(())
    }

    // -- tree conflicts -------------------------------------------------------

    fn tree_conflict(
        &mut self,
        path: &str,
        victim_kind: NodeKind,
        action: ConflictAction,
        reason: ConflictReason,
        incoming_kind: NodeKind,
    ) -> Result<(), WcError> {
        let left_kind = if action == ConflictAction::Add {
            NodeKind::None
        } else {
            incoming_kind
        };
        let right_kind = if action == ConflictAction::Delete {
            NodeKind::None
        } else {
            incoming_kind
        };
        let conflict = TreeConflict {
            victim_kind,
            operation: self.operation,
            action,
            reason,
            left: Some(ConflictVersion {
                repos_root: self.repos_root.clone(),
                path_in_repos: self.repos_path_of(&self.sides.left_repos, path),
                peg_rev: self.sides.left_rev,
                kind: left_kind,
            }),
            right: Some(ConflictVersion {
                repos_root: self.repos_root.clone(),
                path_in_repos: self.repos_path_of(&self.sides.right_repos, path),
                peg_rev: self.sides.right_rev,
                kind: right_kind,
            }),
        };
        match self.store.record_tree_conflict(path, &conflict) {
            Ok(()) => {}
            Err(WcError::Conflict(ConflictError::AlreadyConflicted { .. })) => {
                self.skip(path, victim_kind, SkipReason::TreeConflicted);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        self.notify(Notification::new(path, victim_kind, NotifyAction::TreeConflict));
        self.report.record(path, PathState::TreeConflicted);
        Ok(())
    }
}

/// Union of two `svn:mergeinfo` values; `None` for any other property or
/// when either side does not parse.
fn union_mergeinfo(name: &str, mine: Option<&str>, theirs: Option<&str>) -> Option<String> {
    if name != PROP_MERGEINFO {
        return None;
    }
    let mut merged = Mergeinfo::parse(mine.unwrap_or_default()).ok()?;
    let incoming = Mergeinfo::parse(theirs.unwrap_or_default()).ok()?;
    merged.merge(&incoming);
    Some(merged.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::MemoryRepository;
    use crate::notify::{CollectingSink, NullSink};
    use tempfile::TempDir;

    const URL: &str = "svn://example.com/repo";

    fn repo() -> MemoryRepository {
        let mut repo = MemoryRepository::new(URL);
        let mut tx = repo.transaction();
        tx.mkdir("trunk")
            .put("trunk/a.txt", "alpha\n")
            .put("trunk/d/b.txt", "beta\n");
        repo.commit(tx);
        repo
    }

    fn checkout(repo: &MemoryRepository, dir: &TempDir) -> WorkingCopy {
        let (wc, _) = MergeDriver::checkout(
            dir.path(),
            repo,
            repo.uuid(),
            "/trunk",
            None,
            Depth::Infinity,
            WcConfig::default(),
            &CollectingSink::new(),
        )
        .unwrap();
        wc
    }

    #[test]
    fn test_path_state_is_sticky_once_conflicted() {
        assert_eq!(PathState::Untouched.advance(PathState::Merged), PathState::Merged);
        assert_eq!(PathState::Conflicted.advance(PathState::Applied), PathState::Conflicted);
        assert_eq!(PathState::Conflicted.advance(PathState::TreeConflicted), PathState::TreeConflicted);
        assert_eq!(PathState::Merged.advance(PathState::Untouched), PathState::Merged);
    }

    #[test]
    fn test_checkout_populates_tree() {
        let repo = repo();
        let dir = TempDir::new().unwrap();
        let wc = checkout(&repo, &dir);

        assert_eq!(wc.read_working("a.txt").unwrap().unwrap(), b"alpha\n");
        assert_eq!(wc.read_working("d/b.txt").unwrap().unwrap(), b"beta\n");
        for node in wc.subtree("").unwrap() {
            assert_eq!(node.revision, Some(1), "{}", node.path);
            assert!(!node.incomplete, "{}", node.path);
            assert!(!wc.text_modified(&node).unwrap());
        }
        assert_eq!(wc.require_node("d/b.txt").unwrap().repos_path, "/trunk/d/b.txt");
    }

    #[test]
    fn test_update_deletes_clean_and_conflicts_edited() {
        let mut repo = repo();
        let dir = TempDir::new().unwrap();
        let wc = checkout(&repo, &dir);
        wc.write_working("d/b.txt", b"local\n").unwrap();

        let mut tx = repo.transaction();
        tx.delete("trunk/a.txt").delete("trunk/d");
        repo.commit(tx);

        let sink = CollectingSink::new();
        let report = MergeDriver::new(&wc, &repo, &sink)
            .update("", None, &DriverOptions::default())
            .unwrap();

        assert_eq!(report.state("a.txt"), PathState::Applied);
        assert!(wc.node("a.txt").unwrap().is_none());
        assert!(!dir.path().join("a.txt").exists());

        assert_eq!(report.state("d"), PathState::TreeConflicted);
        assert_eq!(wc.read_working("d/b.txt").unwrap().unwrap(), b"local\n");
        let tree = ConflictStore::new(&wc).query("d").unwrap().unwrap().tree.unwrap();
        assert_eq!(tree.action, ConflictAction::Delete);
        assert_eq!(tree.reason, ConflictReason::Edited);
        assert_eq!(tree.describe(), "local dir edited, incoming dir delete upon update");
    }

    #[test]
    fn test_update_to_older_revision_and_back() {
        let mut repo = repo();
        let mut tx = repo.transaction();
        tx.put("trunk/a.txt", "alpha 2\n");
        repo.commit(tx);
        let dir = TempDir::new().unwrap();
        let wc = checkout(&repo, &dir);

        let driver = MergeDriver::new(&wc, &repo, &NullSink);
        driver.update("", Some(1), &DriverOptions::default()).unwrap();
        assert_eq!(wc.read_working("a.txt").unwrap().unwrap(), b"alpha\n");
        driver.update("", None, &DriverOptions::default()).unwrap();
        assert_eq!(wc.read_working("a.txt").unwrap().unwrap(), b"alpha 2\n");
        assert_eq!(wc.require_node("").unwrap().revision, Some(2));
    }

    #[test]
    fn test_update_rejects_unknown_revision() {
        let repo = repo();
        let dir = TempDir::new().unwrap();
        let wc = checkout(&repo, &dir);
        let err = MergeDriver::new(&wc, &repo, &NullSink)
            .update("", Some(9), &DriverOptions::default())
            .unwrap_err();
        assert!(matches!(err, WcError::InvalidArgument(_)));
    }

    #[test]
    fn test_property_update_merges_and_conflicts() {
        let mut repo = repo();
        let mut tx = repo.transaction();
        tx.set_prop("trunk/a.txt", "color", Some("red"));
        repo.commit(tx);
        let dir = TempDir::new().unwrap();
        let wc = checkout(&repo, &dir);

        wc.set_property("a.txt", "color", "blue").unwrap();
        let mut tx = repo.transaction();
        tx.set_prop("trunk/a.txt", "color", Some("green"));
        repo.commit(tx);

        let report = MergeDriver::new(&wc, &repo, &NullSink)
            .update("", None, &DriverOptions::default())
            .unwrap();
        assert_eq!(report.state("a.txt"), PathState::Conflicted);
        let node = wc.require_node("a.txt").unwrap();
        assert_eq!(node.base_props.get("color").map(String::as_str), Some("green"));
        assert_eq!(node.props().get("color").map(String::as_str), Some("blue"));
        assert!(dir.path().join("a.txt.prej").exists());
    }

    #[test]
    fn test_switch_rebinds_subtree() {
        let mut repo = repo();
        let mut tx = repo.transaction();
        tx.mkdir("branches/b/d").put("branches/b/d/b.txt", "branch beta\n");
        repo.commit(tx);
        let dir = TempDir::new().unwrap();
        let wc = checkout(&repo, &dir);

        MergeDriver::new(&wc, &repo, &NullSink)
            .switch("d", "/branches/b/d", None, &DriverOptions::default())
            .unwrap();
        assert_eq!(wc.read_working("d/b.txt").unwrap().unwrap(), b"branch beta\n");
        assert_eq!(wc.require_node("d/b.txt").unwrap().repos_path, "/branches/b/d/b.txt");
        assert_eq!(wc.require_node("d").unwrap().revision, Some(2));
    }

    #[test]
    fn test_merge_adds_with_history_and_records_mergeinfo() {
        let mut repo = repo();
        let mut tx = repo.transaction();
        tx.mkdir("branches");
        repo.commit(tx);
        let mut tx = repo.transaction();
        tx.put("branches/b/a.txt", "alpha\n").put("branches/b/d/b.txt", "beta\n");
        repo.commit(tx);
        let mut tx = repo.transaction();
        tx.put("branches/b/new.txt", "fresh\n");
        repo.commit(tx);

        let dir = TempDir::new().unwrap();
        let wc = checkout(&repo, &dir);
        let sink = CollectingSink::new();
        let report = MergeDriver::new(&wc, &repo, &sink)
            .merge(
                "",
                &MergeOptions {
                    source: "/branches/b".into(),
                    range: MergeRange::revisions(4, 4),
                    record_only: false,
                },
                &DriverOptions::default(),
            )
            .unwrap();

        assert_eq!(report.state("new.txt"), PathState::Applied);
        let node = wc.require_node("new.txt").unwrap();
        assert_eq!(node.schedule, Schedule::Add);
        assert_eq!(
            node.copy_from,
            Some(CopyFrom {
                url: format!("{}/branches/b/new.txt", URL),
                revision: 4
            })
        );
        assert_eq!(wc.property("", PROP_MERGEINFO).unwrap().as_deref(), Some("/branches/b:4"));
        assert!(sink
            .events()
            .iter()
            .any(|n| n.action == NotifyAction::MergeRecordInfo && n.path.is_empty()));
    }

    #[test]
    fn test_record_only_merge_leaves_content() {
        let mut repo = repo();
        let mut tx = repo.transaction();
        tx.put("branches/b/a.txt", "changed\n");
        repo.commit(tx);
        let dir = TempDir::new().unwrap();
        let wc = checkout(&repo, &dir);

        let report = MergeDriver::new(&wc, &repo, &NullSink)
            .merge(
                "",
                &MergeOptions {
                    source: "/branches/b".into(),
                    range: MergeRange::revisions(2, 2),
                    record_only: true,
                },
                &DriverOptions::default(),
            )
            .unwrap();
        assert_eq!(report.merged_ranges, vec![MergeRange::revisions(2, 2)]);
        assert_eq!(wc.read_working("a.txt").unwrap().unwrap(), b"alpha\n");
        assert_eq!(wc.property("", PROP_MERGEINFO).unwrap().as_deref(), Some("/branches/b:2"));
    }

    #[test]
    fn test_merge_rejects_empty_range() {
        let repo = repo();
        let dir = TempDir::new().unwrap();
        let wc = checkout(&repo, &dir);
        let err = MergeDriver::new(&wc, &repo, &NullSink)
            .merge(
                "",
                &MergeOptions {
                    source: "/trunk".into(),
                    range: MergeRange::new(1, 1),
                    record_only: false,
                },
                &DriverOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, WcError::InvalidArgument(_)));
    }

    #[test]
    fn test_accept_option_resolves_new_conflicts() {
        let mut repo = repo();
        let dir = TempDir::new().unwrap();
        let wc = checkout(&repo, &dir);
        wc.write_working("a.txt", b"mine\n").unwrap();
        let mut tx = repo.transaction();
        tx.put("trunk/a.txt", "theirs\n");
        repo.commit(tx);

        let options = DriverOptions {
            accept: Some(ConflictChoice::TheirsFull),
            ..DriverOptions::default()
        };
        let report = MergeDriver::new(&wc, &repo, &NullSink)
            .update("", None, &options)
            .unwrap();
        assert_eq!(report.resolved, vec!["a.txt".to_string()]);
        assert_eq!(wc.read_working("a.txt").unwrap().unwrap(), b"theirs\n");
        assert!(ConflictStore::new(&wc).query("a.txt").unwrap().is_none());
    }
}
