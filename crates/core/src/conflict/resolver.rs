//! Conflict resolution policy.
//!
//! [`ConflictResolver::resolve`] applies one [`ConflictChoice`] to every
//! outstanding conflict on a path; [`ConflictResolver::resolve_kinds`]
//! narrows it to some of them. [`ConflictResolver::resolve_interactive`]
//! drives the same operation through a prompt loop; a non-interactive run
//! is that loop fed by a [`FixedChoice`] prompter.

use std::cell::Cell;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::errors::{ConflictError, WcError};
use crate::filter::PathFilter;
use crate::models;
use crate::notify::{Notification, NotificationSink, NotifyAction, NotifyState};
use crate::wc::WorkingCopy;

use super::merger::{ConflictSide, MergeLabels, Merger};
use super::store::ConflictStore;
use super::types::{ConflictChoice, ConflictKind, ConflictRecord, TextConflict};

/// Stateless resolution operations.
pub struct ConflictResolver;

impl ConflictResolver {
    /// Resolve every conflict on `path` with `choice`. Returns the kinds
    /// cleared (empty for `postpone`).
    pub fn resolve(
        wc: &WorkingCopy,
        path: &str,
        choice: ConflictChoice,
        sink: &dyn NotificationSink,
    ) -> Result<Vec<ConflictKind>, WcError> {
        let record = ConflictStore::new(wc)
            .query(path)?
            .ok_or_else(|| ConflictError::NotFound(path.to_string()))?;
        Self::resolve_kinds(wc, path, &record.kinds(), choice, sink)
    }

    /// Resolve only the listed conflict kinds on `path`; the others stay
    /// recorded. Kinds the path does not have are ignored.
    pub fn resolve_kinds(
        wc: &WorkingCopy,
        path: &str,
        kinds: &[ConflictKind],
        choice: ConflictChoice,
        sink: &dyn NotificationSink,
    ) -> Result<Vec<ConflictKind>, WcError> {
        let store = ConflictStore::new(wc);
        let record = store
            .query(path)?
            .ok_or_else(|| ConflictError::NotFound(path.to_string()))?;
        let selected: Vec<ConflictKind> = record
            .kinds()
            .into_iter()
            .filter(|k| kinds.contains(k))
            .collect();
        if selected.is_empty() {
            return Err(ConflictError::NotFound(path.to_string()).into());
        }
        Self::validate_choice(wc, &record, &selected, choice)?;

        if choice == ConflictChoice::Postpone {
            debug!(path, "conflict postponed");
            return Ok(Vec::new());
        }

        if let Some(text) = &record.text {
            if selected.contains(&ConflictKind::Text) {
                Self::resolve_text(wc, path, text, choice)?;
            }
        }
        for prop in &record.props {
            if !selected.contains(&ConflictKind::Property(prop.name.clone())) {
                continue;
            }
            let value = match choice {
                ConflictChoice::Base => prop.base_value.clone(),
                ConflictChoice::MineFull => prop.mine_value.clone(),
                ConflictChoice::TheirsFull => prop.theirs_value.clone(),
                _ => continue,
            };
            match value {
                Some(v) => wc.set_property(path, &prop.name, &v)?,
                None => wc.delete_property(path, &prop.name)?,
            }
        }

        let cleared = store.clear(path, &selected)?;
        wc.db()
            .insert_audit_log("resolve", Some(path), Some(&choice.to_string()))?;
        let kind = wc
            .node(path)?
            .map(|n| n.kind)
            .or_else(|| record.tree.as_ref().map(|t| t.victim_kind))
            .unwrap_or(models::NodeKind::None);
        sink.notify(
            &Notification::new(path, kind, NotifyAction::Resolved)
                .with_states(NotifyState::Unchanged, NotifyState::Unchanged),
        );
        info!(path, %choice, cleared = cleared.len(), "conflict resolved");
        Ok(cleared)
    }

    /// Resolve every conflicted path the filter admits. Returns the number
    /// of paths resolved.
    pub fn resolve_all(
        wc: &WorkingCopy,
        filter: &PathFilter,
        choice: ConflictChoice,
        sink: &dyn NotificationSink,
    ) -> Result<usize, WcError> {
        let mut resolved = 0;
        for record in ConflictStore::new(wc).query_all(filter)? {
            if !Self::resolve(wc, &record.path, choice, sink)?.is_empty() {
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    /// Reject choices that do not apply to the selected kinds before
    /// anything is touched.
    fn validate_choice(
        wc: &WorkingCopy,
        record: &ConflictRecord,
        selected: &[ConflictKind],
        choice: ConflictChoice,
    ) -> Result<(), WcError> {
        let invalid = |detail: &str| -> WcError {
            ConflictError::InvalidChoice {
                path: record.path.clone(),
                choice: choice.to_string(),
                detail: detail.to_string(),
            }
            .into()
        };
        if selected.contains(&ConflictKind::Tree)
            && !matches!(
                choice,
                ConflictChoice::Merged | ConflictChoice::MineFull | ConflictChoice::Postpone
            )
        {
            return Err(invalid(
                "tree conflicts can only be resolved to the working state (merged, mine-full) or postponed",
            ));
        }
        if choice.is_per_hunk() {
            if selected.iter().any(|k| matches!(k, ConflictKind::Property(_))) {
                return Err(invalid("property conflicts have no conflicting hunks"));
            }
            if !selected.contains(&ConflictKind::Text) {
                return Err(invalid("no text conflict to resolve hunk by hunk"));
            }
            if Self::is_binary(wc, &record.path)? {
                return Err(invalid("binary files have no conflicting hunks"));
            }
        }
        Ok(())
    }

    fn is_binary(wc: &WorkingCopy, path: &str) -> Result<bool, WcError> {
        let Some(node) = wc.node(path)? else {
            return Ok(false);
        };
        let content = wc.read_working(path)?.unwrap_or_default();
        Ok(wc.is_binary(&node, &content))
    }

    fn resolve_text(
        wc: &WorkingCopy,
        path: &str,
        text: &TextConflict,
        choice: ConflictChoice,
    ) -> Result<(), WcError> {
        let read = |file: &str| -> Result<Vec<u8>, WcError> {
            wc.read_working(file)?.ok_or_else(|| {
                ConflictError::MissingVariant {
                    path: path.to_string(),
                    file: PathBuf::from(file),
                }
                .into()
            })
        };
        let base = || -> Result<Vec<u8>, WcError> {
            match &text.base_file {
                Some(f) => read(f),
                None => Ok(Vec::new()),
            }
        };
        let content = match choice {
            ConflictChoice::Base => base()?,
            ConflictChoice::MineFull => read(&text.mine_file)?,
            ConflictChoice::TheirsFull => read(&text.theirs_file)?,
            ConflictChoice::MineConflict | ConflictChoice::TheirsConflict => {
                let side = if choice == ConflictChoice::MineConflict {
                    ConflictSide::Mine
                } else {
                    ConflictSide::Theirs
                };
                let labels = MergeLabels::new(&text.mine_file, "base", &text.theirs_file);
                Merger::three_way_merge(
                    &base()?,
                    &read(&text.mine_file)?,
                    &read(&text.theirs_file)?,
                    &wc.config().merge,
                    &labels,
                    Some(side),
                )
                .merged_content
            }
            ConflictChoice::Merged | ConflictChoice::Postpone => return Ok(()),
        };
        wc.write_working(path, &content)
    }

    // -----------------------------------------------------------------------
    // Interactive loop
    // -----------------------------------------------------------------------

    /// Prompt until a resolution is chosen for `path`, then apply it.
    pub fn resolve_interactive(
        wc: &WorkingCopy,
        path: &str,
        prompter: &dyn Prompter,
        tools: &dyn ExternalTools,
        sink: &dyn NotificationSink,
    ) -> Result<ConflictChoice, WcError> {
        let record = ConflictStore::new(wc)
            .query(path)?
            .ok_or_else(|| ConflictError::NotFound(path.to_string()))?;
        let options = Self::options_for(wc, &record)?;
        let summary = Self::summary(&record);

        loop {
            let answer = prompter.ask(path, &summary, &options)?;
            let answer = answer.trim();
            let command = options
                .iter()
                .find(|o| o.code == answer)
                .map(|o| o.command);
            let Some(command) = command else {
                prompter.show(&format!("Unrecognized option '{answer}'."));
                continue;
            };
            match command {
                PromptCommand::Choose(choice) => {
                    Self::resolve(wc, path, choice, sink)?;
                    return Ok(choice);
                }
                PromptCommand::DiffFull => {
                    let Some(text) = &record.text else { continue };
                    let base = match &text.base_file {
                        Some(f) => wc.read_working(f)?.unwrap_or_default(),
                        None => Vec::new(),
                    };
                    let merged = wc.read_working(path)?.unwrap_or_default();
                    prompter.show(&Merger::unified_diff(&base, &merged));
                }
                PromptCommand::Edit => {
                    let current = wc.read_working(path)?.unwrap_or_default();
                    let edited = tools.run_editor(&current)?;
                    wc.write_working(path, &edited)?;
                    debug!(path, "merged file edited");
                }
                PromptCommand::Launch => {
                    let Some(text) = &record.text else { continue };
                    let Some(base) = text.base_file.as_deref() else { continue };
                    let remains = tools.run_merge_tool(
                        &wc.abspath(base),
                        &wc.abspath(&text.mine_file),
                        &wc.abspath(&text.theirs_file),
                        &wc.abspath(path),
                    )?;
                    if !remains {
                        Self::resolve(wc, path, ConflictChoice::Merged, sink)?;
                        return Ok(ConflictChoice::Merged);
                    }
                    prompter.show("The merge tool reports the file remains in conflict.");
                }
                PromptCommand::Help => {
                    let lines: Vec<String> = options
                        .iter()
                        .map(|o| format!("  ({}) {}", o.code, o.label))
                        .collect();
                    prompter.show(&lines.join("\n"));
                }
            }
        }
    }

    /// The options that apply to a conflict record.
    pub fn options_for(wc: &WorkingCopy, record: &ConflictRecord) -> Result<Vec<PromptOption>, WcError> {
        use ConflictChoice::*;

        let mut options = vec![PromptOption::new("p", "postpone", PromptCommand::Choose(Postpone))];
        if record.tree.is_some() {
            options.push(PromptOption::new("mf", "keep the working state", PromptCommand::Choose(MineFull)));
            options.push(PromptOption::new("r", "accept the working state as resolved", PromptCommand::Choose(Merged)));
        } else {
            let per_hunk = record.text.is_some()
                && record.props.is_empty()
                && !Self::is_binary(wc, &record.path)?;
            if record.text.is_some() {
                options.push(PromptOption::new("df", "show all changes made to the merged file", PromptCommand::DiffFull));
                options.push(PromptOption::new("e", "change the merged file in an editor", PromptCommand::Edit));
            }
            if record.text.as_ref().is_some_and(|t| t.base_file.is_some()) {
                options.push(PromptOption::new("l", "launch an external merge tool", PromptCommand::Launch));
            }
            options.push(PromptOption::new("r", "accept the merged version", PromptCommand::Choose(Merged)));
            options.push(PromptOption::new("b", "restore the base version", PromptCommand::Choose(Base)));
            if per_hunk {
                options.push(PromptOption::new("mc", "my side of conflicting hunks", PromptCommand::Choose(MineConflict)));
                options.push(PromptOption::new("tc", "their side of conflicting hunks", PromptCommand::Choose(TheirsConflict)));
            }
            options.push(PromptOption::new("mf", "my version of the whole file", PromptCommand::Choose(MineFull)));
            options.push(PromptOption::new("tf", "their version of the whole file", PromptCommand::Choose(TheirsFull)));
        }
        options.push(PromptOption::new("s", "show all options", PromptCommand::Help));
        Ok(options)
    }

    fn summary(record: &ConflictRecord) -> String {
        let mut parts = Vec::new();
        if record.text.is_some() {
            parts.push("text conflict".to_string());
        }
        for p in &record.props {
            parts.push(format!("conflict on property '{}'", p.name));
        }
        if let Some(tree) = &record.tree {
            parts.push(format!("tree conflict: {}", tree.describe()));
        }
        parts.join("; ")
    }
}

// ---------------------------------------------------------------------------
// Prompt collaborators
// ---------------------------------------------------------------------------

/// What a prompt answer asks the loop to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptCommand {
    Choose(ConflictChoice),
    DiffFull,
    Edit,
    Launch,
    Help,
}

/// One entry of the prompt menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOption {
    pub code: &'static str,
    pub label: &'static str,
    pub command: PromptCommand,
}

impl PromptOption {
    fn new(code: &'static str, label: &'static str, command: PromptCommand) -> Self {
        Self {
            code,
            label,
            command,
        }
    }
}

/// Source of answers for the resolution loop.
pub trait Prompter {
    /// Ask how to resolve `path`; returns the raw answer (an option code).
    fn ask(&self, path: &str, summary: &str, options: &[PromptOption]) -> Result<String, WcError>;

    /// Display informational text (diffs, help, warnings).
    fn show(&self, text: &str);
}

/// Runs the user's editor and merge tool.
pub trait ExternalTools {
    /// Edit `content` and return the result.
    fn run_editor(&self, content: &[u8]) -> Result<Vec<u8>, WcError>;

    /// Run a three-way merge tool writing into `merged`. Returns `true`
    /// when the file remains in conflict.
    fn run_merge_tool(
        &self,
        base: &std::path::Path,
        mine: &std::path::Path,
        theirs: &std::path::Path,
        merged: &std::path::Path,
    ) -> Result<bool, WcError>;
}

/// A prompter that answers with one pre-supplied choice. Asked twice, the
/// choice did not apply, and it fails instead of looping.
pub struct FixedChoice {
    choice: ConflictChoice,
    asked: Cell<bool>,
}

impl FixedChoice {
    pub fn new(choice: ConflictChoice) -> Self {
        Self {
            choice,
            asked: Cell::new(false),
        }
    }
}

impl Prompter for FixedChoice {
    fn ask(&self, path: &str, _summary: &str, _options: &[PromptOption]) -> Result<String, WcError> {
        if self.asked.replace(true) {
            return Err(ConflictError::InvalidChoice {
                path: path.to_string(),
                choice: self.choice.to_string(),
                detail: "not applicable to this conflict".into(),
            }
            .into());
        }
        Ok(self.choice.code().to_string())
    }

    fn show(&self, text: &str) {
        debug!(text, "prompt output");
    }
}

/// Tool runner for contexts without an editor or merge tool.
pub struct NoTools;

impl ExternalTools for NoTools {
    fn run_editor(&self, _content: &[u8]) -> Result<Vec<u8>, WcError> {
        Err(ConflictError::ToolFailed("no editor configured".into()).into())
    }

    fn run_merge_tool(
        &self,
        _base: &std::path::Path,
        _mine: &std::path::Path,
        _theirs: &std::path::Path,
        _merged: &std::path::Path,
    ) -> Result<bool, WcError> {
        Err(ConflictError::ToolFailed("no merge tool configured".into()).into())
    }
}
