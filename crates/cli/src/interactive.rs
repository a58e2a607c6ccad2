//! Terminal collaborators for interactive conflict resolution.

use std::io::Write;
use std::path::Path;
use std::process::Command;

use dialoguer::Input;
use tracing::debug;

use svnwc_core::conflict::resolver::{ExternalTools, PromptOption, Prompter};
use svnwc_core::errors::{ConflictError, WcError};

use crate::style;

/// Asks on the terminal with a one-line text answer.
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn ask(&self, path: &str, summary: &str, options: &[PromptOption]) -> Result<String, WcError> {
        println!();
        println!("{}", style::warn(&format!("Conflict discovered in '{}'.", path)));
        if !summary.is_empty() {
            println!("{}", style::dim(summary));
        }
        let menu: Vec<String> = options
            .iter()
            .map(|o| format!("({}) {}", o.code, o.label))
            .collect();
        println!("Select: {}", menu.join(", "));

        let answer: String = Input::new()
            .with_prompt("Your choice")
            .interact_text()
            .map_err(|e| ConflictError::ToolFailed(format!("prompt failed: {}", e)))?;
        Ok(answer.trim().to_string())
    }

    fn show(&self, text: &str) {
        println!("{}", text);
    }
}

/// Runs the configured editor and merge tool through `sh`.
pub struct ProcessTools {
    editor: Option<String>,
    merge_tool: Option<String>,
}

impl ProcessTools {
    pub fn new(editor: Option<String>, merge_tool: Option<String>) -> Self {
        Self { editor, merge_tool }
    }
}

impl ExternalTools for ProcessTools {
    fn run_editor(&self, content: &[u8]) -> Result<Vec<u8>, WcError> {
        let editor = self
            .editor
            .as_deref()
            .ok_or_else(|| ConflictError::ToolFailed("no editor configured".into()))?;

        // Removed when dropped, on every return path.
        let mut scratch = tempfile::Builder::new()
            .prefix("svnwc-edit-")
            .suffix(".tmp")
            .tempfile()
            .map_err(|e| WcError::io(std::env::temp_dir(), e))?;
        scratch
            .write_all(content)
            .map_err(|e| WcError::io(scratch.path(), e))?;
        scratch.flush().map_err(|e| WcError::io(scratch.path(), e))?;
        if !shell(editor, &[scratch.path()])? {
            return Err(ConflictError::ToolFailed(format!("editor '{}' failed", editor)).into());
        }
        // Read back by path: editors may replace the file instead of
        // writing through our handle.
        std::fs::read(scratch.path()).map_err(|e| WcError::io(scratch.path(), e))
    }

    fn run_merge_tool(
        &self,
        base: &Path,
        mine: &Path,
        theirs: &Path,
        merged: &Path,
    ) -> Result<bool, WcError> {
        let tool = self
            .merge_tool
            .as_deref()
            .ok_or_else(|| ConflictError::ToolFailed("no merge tool configured".into()))?;
        let resolved = shell(tool, &[base, theirs, mine, merged])?;
        Ok(!resolved)
    }
}

/// Run `command` with `args` as positional parameters. Returns `true` on a
/// zero exit status.
fn shell(command: &str, args: &[&Path]) -> Result<bool, WcError> {
    let quoted: Vec<String> = (1..=args.len()).map(|i| format!("\"${}\"", i)).collect();
    let script = format!("{} {}", command, quoted.join(" "));
    debug!(script = %script, "running external tool");
    let status = Command::new("sh")
        .arg("-c")
        .arg(&script)
        .arg("sh")
        .args(args)
        .status()
        .map_err(|e| ConflictError::ToolFailed(format!("failed to start '{}': {}", command, e)))?;
    Ok(status.success())
}
