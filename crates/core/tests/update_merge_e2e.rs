//! End-to-end tests for update, merge and conflict resolution.
//!
//! These tests exercise the real `MergeDriver` with:
//! - An in-memory revisioned repository as the delta source
//! - Real working copies in temporary directories
//! - Real SQLite metadata stores
//!
//! No network I/O and no external tools.

use std::sync::Mutex;

use tempfile::TempDir;

use svnwc_core::cancel::CancellationToken;
use svnwc_core::config::WcConfig;
use svnwc_core::conflict::{
    ConflictAction, ConflictChoice, ConflictReason, ConflictResolver, ConflictStore, FixedChoice, NoTools,
};
use svnwc_core::delta::MemoryRepository;
use svnwc_core::driver::{DriverOptions, MergeDriver, MergeOptions, PathState};
use svnwc_core::errors::WcError;
use svnwc_core::mergeinfo::{MergeRange, Mergeinfo};
use svnwc_core::models::{Depth, PROP_MERGEINFO};
use svnwc_core::notify::{CollectingSink, Notification, NotificationSink, NotifyAction, NotifyState, NullSink, SkipReason};
use svnwc_core::status::{self, StatusKind};
use svnwc_core::wc::WorkingCopy;

const URL: &str = "svn://example.com/repo";

// ===========================================================================
// Helpers
// ===========================================================================

fn numbered_lines(count: usize, edits: &[(usize, &str)]) -> String {
    (1..=count)
        .map(|n| {
            edits
                .iter()
                .rev()
                .find(|(line, _)| *line == n)
                .map(|(_, text)| format!("{}\n", text))
                .unwrap_or_else(|| format!("line {}\n", n))
        })
        .collect()
}

fn commit_put(repo: &mut MemoryRepository, path: &str, content: &str) -> i64 {
    let mut tx = repo.transaction();
    tx.put(path, content.as_bytes());
    repo.commit(tx)
}

fn checkout_at(repo: &MemoryRepository, dir: &TempDir, repos_path: &str, revision: Option<i64>) -> WorkingCopy {
    let (wc, _) = MergeDriver::checkout(
        dir.path(),
        repo,
        repo.uuid(),
        repos_path,
        revision,
        Depth::Infinity,
        WcConfig::default(),
        &NullSink,
    )
    .unwrap();
    wc
}

fn text(wc: &WorkingCopy, path: &str) -> String {
    String::from_utf8(wc.read_working(path).unwrap().expect("working file")).unwrap()
}

fn update(wc: &WorkingCopy, repo: &MemoryRepository, revision: Option<i64>) -> svnwc_core::DriverReport {
    MergeDriver::new(wc, repo, &NullSink)
        .update("", revision, &DriverOptions::default())
        .unwrap()
}

/// Repository with `/trunk/a.txt`, `/trunk/c.txt` and `/trunk/d/b.txt` at r1.
fn small_repo() -> MemoryRepository {
    let mut repo = MemoryRepository::new(URL);
    let mut tx = repo.transaction();
    tx.mkdir("trunk")
        .put("trunk/a.txt", "alpha\n")
        .put("trunk/c.txt", "gamma\n")
        .put("trunk/d/b.txt", "beta\n");
    repo.commit(tx);
    repo
}

// ===========================================================================
// Update scenario
// ===========================================================================

#[test]
fn test_update_merges_then_conflicts_then_resolves_mine_conflict() {
    let mut repo = MemoryRepository::new(URL);
    let mut tx = repo.transaction();
    tx.mkdir("trunk").put("trunk/foo.txt", numbered_lines(60, &[]));
    repo.commit(tx);
    for n in 2..=10 {
        commit_put(&mut repo, &format!("trunk/filler{}.txt", n), "filler\n");
    }
    assert_eq!(repo.head(), 10);

    let dir = TempDir::new().unwrap();
    let wc = checkout_at(&repo, &dir, "/trunk", Some(10));
    wc.write_working("foo.txt", numbered_lines(60, &[(3, "line 3 local")]).as_bytes())
        .unwrap();

    // r11 edits a distant line: merged cleanly.
    commit_put(&mut repo, "trunk/foo.txt", &numbered_lines(60, &[(50, "line 50 remote")]));
    let sink = CollectingSink::new();
    let report = MergeDriver::new(&wc, &repo, &sink)
        .update("", Some(11), &DriverOptions::default())
        .unwrap();
    assert_eq!(report.state("foo.txt"), PathState::Merged);
    let events = sink.for_path("foo.txt");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].content_state.code(), 'G');
    assert_eq!(
        text(&wc, "foo.txt"),
        numbered_lines(60, &[(3, "line 3 local"), (50, "line 50 remote")])
    );
    assert!(ConflictStore::new(&wc).query("foo.txt").unwrap().is_none());

    // r12 edits the locally edited line: conflicted.
    commit_put(
        &mut repo,
        "trunk/foo.txt",
        &numbered_lines(60, &[(3, "line 3 remote"), (50, "line 50 remote")]),
    );
    let sink = CollectingSink::new();
    let report = MergeDriver::new(&wc, &repo, &sink)
        .update("", Some(12), &DriverOptions::default())
        .unwrap();
    assert_eq!(report.state("foo.txt"), PathState::Conflicted);
    assert_eq!(sink.for_path("foo.txt")[0].content_state, NotifyState::Conflicted);

    let record = ConflictStore::new(&wc).query("foo.txt").unwrap().expect("conflict record");
    let conflict = record.text.expect("text conflict");
    assert_eq!(conflict.mine_file, "foo.txt.mine");
    assert_eq!(conflict.base_file.as_deref(), Some("foo.txt.r11"));
    assert_eq!(conflict.theirs_file, "foo.txt.r12");
    for variant in ["foo.txt.mine", "foo.txt.r11", "foo.txt.r12"] {
        assert!(dir.path().join(variant).exists(), "{variant} missing");
    }
    let marked = text(&wc, "foo.txt");
    assert!(marked.contains("<<<<<<< .mine"));
    assert!(marked.contains(">>>>>>> .r12"));

    let status = status::walk(&wc, &svnwc_core::filter::PathFilter::everything(), None).unwrap();
    let foo = status.iter().find(|s| s.path == "foo.txt").unwrap();
    assert_eq!(foo.contents, StatusKind::Conflicted);

    ConflictResolver::resolve(&wc, "foo.txt", ConflictChoice::MineConflict, &NullSink).unwrap();
    assert_eq!(
        text(&wc, "foo.txt"),
        numbered_lines(60, &[(3, "line 3 local"), (50, "line 50 remote")])
    );
    assert!(ConflictStore::new(&wc).query("foo.txt").unwrap().is_none());
    assert!(!dir.path().join("foo.txt.mine").exists());
}

#[test]
fn test_update_to_same_revision_is_untouched() {
    let repo = small_repo();
    let dir = TempDir::new().unwrap();
    let wc = checkout_at(&repo, &dir, "/trunk", None);

    let sink = CollectingSink::new();
    let report = MergeDriver::new(&wc, &repo, &sink)
        .update("", Some(1), &DriverOptions::default())
        .unwrap();

    assert_eq!(report.touched().count(), 0);
    assert!(report.failures.is_empty());
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, NotifyAction::Completed);
    assert_eq!(events[0].revision, Some(1));
}

// ===========================================================================
// Merge
// ===========================================================================

/// Trunk and branch share `f.txt` at r1; r2..r10 each edit a separate
/// line on the branch (line `4 * rev`).
fn branch_repo() -> MemoryRepository {
    let mut repo = MemoryRepository::new(URL);
    let mut tx = repo.transaction();
    tx.put("trunk/f.txt", numbered_lines(40, &[]))
        .put("branches/b/f.txt", numbered_lines(40, &[]));
    repo.commit(tx);
    let mut edits: Vec<(usize, String)> = Vec::new();
    for rev in 2..=10usize {
        edits.push((rev * 4, format!("line {} from r{}", rev * 4, rev)));
        let borrowed: Vec<(usize, &str)> = edits.iter().map(|(l, t)| (*l, t.as_str())).collect();
        commit_put(&mut repo, "branches/b/f.txt", &numbered_lines(40, &borrowed));
    }
    repo
}

fn merge(wc: &WorkingCopy, repo: &MemoryRepository, range: MergeRange) -> Result<svnwc_core::DriverReport, WcError> {
    MergeDriver::new(wc, repo, &NullSink).merge(
        "",
        &MergeOptions {
            source: "/branches/b".into(),
            range,
            record_only: false,
        },
        &DriverOptions::default(),
    )
}

#[test]
fn test_merge_in_two_ranges_matches_single_range() {
    let repo = branch_repo();

    let split_dir = TempDir::new().unwrap();
    let split = checkout_at(&repo, &split_dir, "/trunk", None);
    merge(&split, &repo, MergeRange::revisions(2, 5)).unwrap();
    assert_eq!(split.property("", PROP_MERGEINFO).unwrap().as_deref(), Some("/branches/b:2-5"));
    merge(&split, &repo, MergeRange::revisions(6, 10)).unwrap();

    let whole_dir = TempDir::new().unwrap();
    let whole = checkout_at(&repo, &whole_dir, "/trunk", None);
    let report = merge(&whole, &repo, MergeRange::revisions(2, 10)).unwrap();
    assert_eq!(report.state("f.txt"), PathState::Applied);

    assert_eq!(text(&split, "f.txt"), text(&whole, "f.txt"));
    assert_eq!(text(&whole, "f.txt"), String::from_utf8(repo.cat("branches/b/f.txt", 10).unwrap().to_vec()).unwrap());
    assert_eq!(
        split.property("", PROP_MERGEINFO).unwrap(),
        whole.property("", PROP_MERGEINFO).unwrap()
    );
    assert_eq!(whole.property("", PROP_MERGEINFO).unwrap().as_deref(), Some("/branches/b:2-10"));
}

#[test]
fn test_merge_skips_already_merged_revisions() {
    let repo = branch_repo();
    let dir = TempDir::new().unwrap();
    let wc = checkout_at(&repo, &dir, "/trunk", None);

    merge(&wc, &repo, MergeRange::revisions(4, 6)).unwrap();
    let report = merge(&wc, &repo, MergeRange::revisions(2, 8)).unwrap();
    assert_eq!(
        report.merged_ranges,
        vec![MergeRange::revisions(2, 3), MergeRange::revisions(7, 8)]
    );
    assert_eq!(wc.property("", PROP_MERGEINFO).unwrap().as_deref(), Some("/branches/b:2-8"));

    let again = merge(&wc, &repo, MergeRange::revisions(2, 8)).unwrap();
    assert!(again.merged_ranges.is_empty());
    assert_eq!(again.touched().count(), 0);
}

#[test]
fn test_mergeinfo_ranges_coalesce_without_drift() {
    let mut mi = Mergeinfo::new();
    mi.apply_range("/branches/b", MergeRange::revisions(5, 5));
    mi.apply_range("/branches/b", MergeRange::revisions(6, 6));
    assert_eq!(mi.to_string(), "/branches/b:5-6");
    assert_eq!(mi.get("/branches/b").unwrap().ranges().len(), 1);

    let eraser = Mergeinfo::parse("/branches/b:6").unwrap();
    assert_eq!(mi.remove(&eraser).to_string(), "/branches/b:5");
}

#[test]
fn test_reverse_merge_removes_recorded_revision() {
    let repo = branch_repo();
    let dir = TempDir::new().unwrap();
    let wc = checkout_at(&repo, &dir, "/trunk", None);

    merge(&wc, &repo, MergeRange::revisions(2, 3)).unwrap();
    assert_eq!(wc.property("", PROP_MERGEINFO).unwrap().as_deref(), Some("/branches/b:2-3"));

    merge(&wc, &repo, MergeRange::revisions(3, 3).reversed()).unwrap();
    assert_eq!(wc.property("", PROP_MERGEINFO).unwrap().as_deref(), Some("/branches/b:2"));
    assert_eq!(
        text(&wc, "f.txt"),
        String::from_utf8(repo.cat("branches/b/f.txt", 2).unwrap().to_vec()).unwrap()
    );
}

#[test]
fn test_merge_pins_mergeinfo_on_skipped_paths() {
    let mut repo = MemoryRepository::new(URL);
    let mut tx = repo.transaction();
    tx.put("trunk/f.txt", "one\n")
        .put("trunk/sub/g.txt", "two\n")
        .put("branches/b/f.txt", "one\n")
        .put("branches/b/sub/g.txt", "two\n");
    repo.commit(tx);
    let mut tx = repo.transaction();
    tx.put("branches/b/f.txt", "one!\n").put("branches/b/sub/g.txt", "two!\n");
    repo.commit(tx);

    let dir = TempDir::new().unwrap();
    let wc = checkout_at(&repo, &dir, "/trunk", None);
    std::fs::remove_file(dir.path().join("sub/g.txt")).unwrap();

    let sink = CollectingSink::new();
    let report = MergeDriver::new(&wc, &repo, &sink)
        .merge(
            "",
            &MergeOptions {
                source: "/branches/b".into(),
                range: MergeRange::revisions(2, 2),
                record_only: false,
            },
            &DriverOptions::default(),
        )
        .unwrap();

    assert_eq!(report.state("sub/g.txt"), PathState::Skipped);
    assert_eq!(sink.for_path("sub/g.txt")[0].skip_reason, Some(SkipReason::Missing));
    assert_eq!(wc.property("", PROP_MERGEINFO).unwrap().as_deref(), Some("/branches/b:2"));
    assert_eq!(wc.property("sub/g.txt", PROP_MERGEINFO).unwrap().as_deref(), Some(""));
    assert_eq!(text(&wc, "f.txt"), "one!\n");
}

// ===========================================================================
// Conflicts
// ===========================================================================

fn conflicted_copy(repo: &MemoryRepository, dir: &TempDir) -> WorkingCopy {
    let wc = checkout_at(repo, dir, "/trunk", Some(1));
    wc.write_working("a.txt", b"alpha mine\n").unwrap();
    let report = update(&wc, repo, None);
    assert_eq!(report.state("a.txt"), PathState::Conflicted);
    wc
}

#[test]
fn test_postpone_then_theirs_full_matches_theirs_full() {
    let mut repo = small_repo();
    commit_put(&mut repo, "trunk/a.txt", "alpha theirs\n");

    let deferred_dir = TempDir::new().unwrap();
    let deferred = conflicted_copy(&repo, &deferred_dir);
    let cleared = ConflictResolver::resolve(&deferred, "a.txt", ConflictChoice::Postpone, &NullSink).unwrap();
    assert!(cleared.is_empty());
    assert!(ConflictStore::new(&deferred).query("a.txt").unwrap().is_some());
    ConflictResolver::resolve(&deferred, "a.txt", ConflictChoice::TheirsFull, &NullSink).unwrap();

    let direct_dir = TempDir::new().unwrap();
    let direct = conflicted_copy(&repo, &direct_dir);
    let chosen = ConflictResolver::resolve_interactive(
        &direct,
        "a.txt",
        &FixedChoice::new(ConflictChoice::TheirsFull),
        &NoTools,
        &NullSink,
    )
    .unwrap();
    assert_eq!(chosen, ConflictChoice::TheirsFull);

    assert_eq!(deferred.read_working("a.txt").unwrap(), direct.read_working("a.txt").unwrap());
    assert_eq!(text(&direct, "a.txt"), "alpha theirs\n");
}

#[test]
fn test_second_update_skips_path_remaining_in_conflict() {
    let mut repo = small_repo();
    commit_put(&mut repo, "trunk/a.txt", "alpha theirs\n");
    let dir = TempDir::new().unwrap();
    let wc = conflicted_copy(&repo, &dir);

    commit_put(&mut repo, "trunk/a.txt", "alpha theirs again\n");
    let sink = CollectingSink::new();
    let report = MergeDriver::new(&wc, &repo, &sink)
        .update("", None, &DriverOptions::default())
        .unwrap();
    assert_eq!(report.state("a.txt"), PathState::Skipped);
    assert_eq!(sink.for_path("a.txt")[0].skip_reason, Some(SkipReason::RemainsInConflict));
    let record = ConflictStore::new(&wc).query("a.txt").unwrap().unwrap();
    assert_eq!(record.text.unwrap().theirs_file, "a.txt.r2");
}

#[test]
fn test_unversioned_file_obstructing_add_becomes_tree_conflict() {
    let mut repo = small_repo();
    let dir = TempDir::new().unwrap();
    let wc = checkout_at(&repo, &dir, "/trunk", None);
    std::fs::write(dir.path().join("new.txt"), "precious\n").unwrap();
    commit_put(&mut repo, "trunk/new.txt", "incoming\n");

    let sink = CollectingSink::new();
    let report = MergeDriver::new(&wc, &repo, &sink)
        .update("", None, &DriverOptions::default())
        .unwrap();

    assert_eq!(report.state("new.txt"), PathState::TreeConflicted);
    assert_eq!(text(&wc, "new.txt"), "precious\n");
    assert!(wc.node("new.txt").unwrap().is_none());
    let tree = ConflictStore::new(&wc).query("new.txt").unwrap().unwrap().tree.unwrap();
    assert_eq!(tree.action, ConflictAction::Add);
    assert_eq!(tree.reason, ConflictReason::Obstructed);
    assert!(sink.for_path("new.txt").iter().any(|n| n.action == NotifyAction::TreeConflict));
}

#[test]
fn test_unversioned_dir_obstructing_add_blocks_descendants() {
    let mut repo = small_repo();
    let dir = TempDir::new().unwrap();
    let wc = checkout_at(&repo, &dir, "/trunk", None);
    std::fs::create_dir(dir.path().join("newdir")).unwrap();
    std::fs::write(dir.path().join("newdir/keep.txt"), "mine\n").unwrap();
    let mut tx = repo.transaction();
    tx.put("trunk/newdir/inner.txt", "incoming\n").put("trunk/newdir/deeper/x.txt", "x\n");
    repo.commit(tx);

    let sink = CollectingSink::new();
    let report = MergeDriver::new(&wc, &repo, &sink)
        .update("", None, &DriverOptions::default())
        .unwrap();

    assert_eq!(report.state("newdir"), PathState::TreeConflicted);
    assert_eq!(report.state("newdir/inner.txt"), PathState::Skipped);
    assert_eq!(
        sink.for_path("newdir/inner.txt")[0].skip_reason,
        Some(SkipReason::TreeConflicted)
    );
    assert!(!dir.path().join("newdir/inner.txt").exists());
    assert!(!dir.path().join("newdir/deeper").exists());
    assert_eq!(text(&wc, "newdir/keep.txt"), "mine\n");
    assert!(wc.node("newdir").unwrap().is_none());
}

#[test]
fn test_merge_delete_of_missing_path_is_tree_conflict() {
    let mut repo = MemoryRepository::new(URL);
    let mut tx = repo.transaction();
    tx.put("trunk/keep.txt", "k\n").put("branches/b/keep.txt", "k\n").put("branches/b/gone.txt", "g\n");
    repo.commit(tx);
    let mut tx = repo.transaction();
    tx.delete("branches/b/gone.txt");
    repo.commit(tx);

    let dir = TempDir::new().unwrap();
    let wc = checkout_at(&repo, &dir, "/trunk", None);
    let report = merge(&wc, &repo, MergeRange::revisions(2, 2)).unwrap();
    assert_eq!(report.state("gone.txt"), PathState::TreeConflicted);
    let tree = ConflictStore::new(&wc).query("gone.txt").unwrap().unwrap().tree.unwrap();
    assert_eq!(tree.reason, ConflictReason::Missing);

    ConflictResolver::resolve(&wc, "gone.txt", ConflictChoice::Merged, &NullSink).unwrap();
    assert!(ConflictStore::new(&wc).query("gone.txt").unwrap().is_none());
}

// ===========================================================================
// Scoping
// ===========================================================================

#[test]
fn test_depth_files_update_leaves_subdirectories_for_later() {
    let mut repo = small_repo();
    let dir = TempDir::new().unwrap();
    let wc = checkout_at(&repo, &dir, "/trunk", None);
    let mut tx = repo.transaction();
    tx.put("trunk/a.txt", "alpha 2\n").put("trunk/d/b.txt", "beta 2\n");
    repo.commit(tx);

    let sink = CollectingSink::new();
    let options = DriverOptions {
        depth: Depth::Files,
        ..DriverOptions::default()
    };
    MergeDriver::new(&wc, &repo, &sink).update("", None, &options).unwrap();
    assert_eq!(text(&wc, "a.txt"), "alpha 2\n");
    assert_eq!(text(&wc, "d/b.txt"), "beta\n");
    assert_eq!(sink.for_path("d")[0].skip_reason, Some(SkipReason::OutOfScope));
    assert_eq!(wc.require_node("d").unwrap().revision, Some(1));

    update(&wc, &repo, None);
    assert_eq!(text(&wc, "d/b.txt"), "beta 2\n");
    assert_eq!(wc.require_node("d").unwrap().revision, Some(2));
}

#[test]
fn test_changelist_update_touches_only_members() {
    let mut repo = small_repo();
    let dir = TempDir::new().unwrap();
    let wc = checkout_at(&repo, &dir, "/trunk", None);
    wc.set_changelist(&["a.txt".to_string()], Some("feature")).unwrap();
    let mut tx = repo.transaction();
    tx.put("trunk/a.txt", "alpha 2\n").put("trunk/c.txt", "gamma 2\n");
    repo.commit(tx);

    let options = DriverOptions {
        changelists: vec!["feature".into()],
        ..DriverOptions::default()
    };
    let report = MergeDriver::new(&wc, &repo, &NullSink).update("", None, &options).unwrap();
    assert_eq!(report.state("a.txt"), PathState::Applied);
    assert_eq!(report.state("c.txt"), PathState::Skipped);
    assert_eq!(text(&wc, "c.txt"), "gamma\n");
    assert_eq!(wc.require_node("c.txt").unwrap().revision, Some(1));
}

// ===========================================================================
// Failure handling
// ===========================================================================

/// Cancels the operation as soon as the first node is added.
struct CancelOnFirstAdd {
    token: CancellationToken,
    seen: Mutex<usize>,
}

impl NotificationSink for CancelOnFirstAdd {
    fn notify(&self, notification: &Notification) {
        if notification.action == NotifyAction::UpdateAdd {
            let mut seen = self.seen.lock().unwrap();
            *seen += 1;
            self.token.cancel();
        }
    }
}

#[test]
fn test_cancelled_update_leaves_recoverable_state() {
    let repo = small_repo();
    let dir = TempDir::new().unwrap();
    let wc = WorkingCopy::create(dir.path(), URL, repo.uuid(), "/trunk", 0, WcConfig::default()).unwrap();

    let token = CancellationToken::new();
    let sink = CancelOnFirstAdd {
        token: token.clone(),
        seen: Mutex::new(0),
    };
    let err = MergeDriver::new(&wc, &repo, &sink)
        .with_cancellation(token)
        .update("", None, &DriverOptions::default())
        .unwrap_err();
    assert!(matches!(err, WcError::Cancelled));
    assert_eq!(*sink.seen.lock().unwrap(), 1);

    let root = wc.require_node("").unwrap();
    let snapshot = status::classify(&wc, "", Some(&root), None).unwrap();
    assert_eq!(snapshot.contents, StatusKind::Incomplete);

    let report = update(&wc, &repo, None);
    assert!(report.failures.is_empty());
    assert_eq!(text(&wc, "a.txt"), "alpha\n");
    assert_eq!(text(&wc, "d/b.txt"), "beta\n");
    let root = wc.require_node("").unwrap();
    assert_eq!(root.revision, Some(1));
    assert!(!root.incomplete);
}

#[test]
fn test_path_failures_are_aggregated() {
    let mut repo = small_repo();
    let dir = TempDir::new().unwrap();
    let wc = checkout_at(&repo, &dir, "/trunk", None);
    let long_name = "n".repeat(300);
    let mut tx = repo.transaction();
    tx.put(&format!("trunk/{}", long_name), "too long\n").put("trunk/ok.txt", "fine\n");
    repo.commit(tx);

    let err = MergeDriver::new(&wc, &repo, &NullSink)
        .update("", None, &DriverOptions::default())
        .unwrap_err();
    match err {
        WcError::Incomplete { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].path, long_name);
        }
        other => panic!("expected Incomplete, got {other:?}"),
    }
    assert_eq!(text(&wc, "ok.txt"), "fine\n");
    let root = wc.require_node("").unwrap();
    assert!(root.incomplete);
    assert_eq!(root.revision, Some(1));
}

#[test]
fn test_second_traversal_is_refused_while_locked() {
    let repo = small_repo();
    let dir = TempDir::new().unwrap();
    let wc = checkout_at(&repo, &dir, "/trunk", None);

    let _held = wc.lock().unwrap();
    let err = MergeDriver::new(&wc, &repo, &NullSink)
        .update("", None, &DriverOptions::default())
        .unwrap_err();
    assert!(matches!(err, WcError::Locked { .. }));
}
