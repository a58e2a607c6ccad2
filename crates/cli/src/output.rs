//! Plain-text rendering of notifications and status.

use svnwc_core::models::NodeKind;
use svnwc_core::notify::{Notification, NotificationSink, NotifyAction, NotifyState};
use svnwc_core::status::StatusSnapshot;

use crate::style;

/// Prints one line per notification in the classic client layout.
#[derive(Default)]
pub struct PrintSink {
    /// `true` while printing a merge, which changes the completion line.
    merge: bool,
}

impl PrintSink {
    pub fn new() -> Self {
        Self { merge: false }
    }

    pub fn for_merge() -> Self {
        Self { merge: true }
    }

    fn render(&self, n: &Notification) -> Option<String> {
        let path = display_path(&n.path);
        let line = match n.action {
            NotifyAction::UpdateAdd => format!("A{}   {}", prop_code(n.prop_state), path),
            NotifyAction::UpdateDelete => format!("D    {}", path),
            NotifyAction::UpdateExists => format!("E    {}", path),
            NotifyAction::UpdateUpdate => {
                if n.content_state.code() == ' ' && prop_code(n.prop_state) == ' ' {
                    return None;
                }
                format!("{}{}   {}", n.content_state.code(), prop_code(n.prop_state), path)
            }
            NotifyAction::Skip => match n.skip_reason {
                Some(reason) => format!("Skipped '{}' -- {}", path, reason),
                None => format!("Skipped '{}'", path),
            },
            NotifyAction::TreeConflict => format!("   C {}", path),
            NotifyAction::MergeRecordInfo => {
                format!("--- Recording mergeinfo for merge into '{}':", path)
            }
            NotifyAction::Resolved => format!("Resolved conflicted state of '{}'", path),
            NotifyAction::Add => {
                let marker = if n.kind == NodeKind::Dir { "(dir)" } else { "" };
                format!("A         {} {}", path, marker).trim_end().to_string()
            }
            NotifyAction::Delete => format!("D         {}", path),
            NotifyAction::Completed => match (self.merge, n.revision) {
                (true, _) => return None,
                (false, Some(rev)) => format!("At revision {}.", rev),
                (false, None) => return None,
            },
        };
        Some(line)
    }
}

impl NotificationSink for PrintSink {
    fn notify(&self, notification: &Notification) {
        if let Some(line) = self.render(notification) {
            let conflicted = notification.content_state == NotifyState::Conflicted
                || notification.prop_state == NotifyState::Conflicted
                || notification.action == NotifyAction::TreeConflict;
            if conflicted {
                println!("{}", style::conflicted(&line));
            } else {
                println!("{}", line);
            }
        }
    }
}

fn prop_code(state: NotifyState) -> char {
    state.code()
}

/// The root is shown as `.`.
pub fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "."
    } else {
        path
    }
}

/// One status line: the seven status columns, optional remote marker and
/// revision, then the path.
pub fn status_line(snap: &StatusSnapshot, verbose: bool, show_updates: bool) -> String {
    let mut line = snap.columns();
    if show_updates {
        let out_of_date = snap.remote.as_ref().is_some_and(|r| r.is_out_of_date());
        line.push_str(if out_of_date { " * " } else { "   " });
    } else {
        line.push(' ');
    }
    if verbose || show_updates {
        let rev = snap
            .revision
            .map(|r| r.to_string())
            .unwrap_or_else(|| if snap.node_status.code() == '?' { String::new() } else { "-".into() });
        line.push_str(&format!("{:>8}   ", rev));
    }
    line.push_str(display_path(&snap.path));
    if let Some(cl) = &snap.changelist {
        line.push_str(&format!("  {}", style::dim(&format!("[{}]", cl))));
    }
    line
}
