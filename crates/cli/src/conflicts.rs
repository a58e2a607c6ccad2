//! `conflicts` and `resolve` subcommands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use console::Term;
use dialoguer::Confirm;

use svnwc_core::conflict::{ConflictChoice, ConflictRecord, ConflictResolver, ConflictStore};
use svnwc_core::filter::PathFilter;
use svnwc_core::models::Depth;

use crate::interactive::{DialoguerPrompter, ProcessTools};
use crate::output::{display_path, PrintSink};
use crate::{style, Ctx};

fn records(ctx: &Ctx, paths: &[PathBuf], depth: Depth) -> Result<Vec<ConflictRecord>> {
    let store = ConflictStore::new(&ctx.wc);
    let mut out = Vec::new();
    for target in ctx.relpaths(paths)? {
        let filter = PathFilter::new(target, depth);
        out.extend(store.query_all(&filter).context("failed to list conflicts")?);
    }
    out.dedup_by(|a, b| a.path == b.path);
    Ok(out)
}

/// List outstanding conflicts.
pub fn cmd_list(ctx: &Ctx, paths: &[PathBuf], depth: Depth) -> Result<()> {
    let conflicts = records(ctx, paths, depth)?;

    if conflicts.is_empty() {
        println!();
        println!("{}", style::success("No outstanding conflicts"));
        println!();
        return Ok(());
    }

    println!();
    println!(
        "{}",
        style::header(&format!("Conflicted paths ({})", conflicts.len()))
    );
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Path", "Kind", "Operation", "Details"]);

    for record in &conflicts {
        if let Some(text) = &record.text {
            table.add_row(vec![
                Cell::new(display_path(&record.path)),
                Cell::new("text"),
                Cell::new(text.operation.to_string()),
                Cell::new(text.artifacts().join(", ")),
            ]);
        }
        for prop in &record.props {
            table.add_row(vec![
                Cell::new(display_path(&record.path)),
                Cell::new(format!("property '{}'", prop.name)),
                Cell::new(prop.operation.to_string()),
                Cell::new(&prop.reject_file),
            ]);
        }
        if let Some(tree) = &record.tree {
            table.add_row(vec![
                Cell::new(display_path(&record.path)),
                Cell::new("tree"),
                Cell::new(tree.operation.to_string()),
                Cell::new(tree.describe()),
            ]);
        }
    }

    println!("{}", table);
    println!();

    Ok(())
}

/// Resolve conflicts on `paths`, non-interactively when `accept` is given.
pub fn cmd_resolve(
    ctx: &Ctx,
    paths: &[PathBuf],
    accept: Option<ConflictChoice>,
    depth: Depth,
) -> Result<()> {
    let sink = PrintSink::new();
    let interactive = Term::stdout().is_term();

    let choice = match accept {
        Some(choice) => Some(choice),
        None if interactive => None,
        None => {
            let fallback = ctx.wc.config().default_accept();
            println!(
                "{}",
                style::warn(&format!("not a terminal; using configured choice '{}'", fallback))
            );
            Some(fallback)
        }
    };

    let conflicts = records(ctx, paths, depth)?;
    if conflicts.is_empty() {
        println!("{}", style::dim("Nothing to resolve."));
        return Ok(());
    }

    match choice {
        Some(choice) => {
            if interactive && conflicts.len() > 1 && choice != ConflictChoice::Postpone {
                let proceed = Confirm::new()
                    .with_prompt(format!(
                        "Resolve {} conflicted paths with '{}'?",
                        conflicts.len(),
                        choice
                    ))
                    .default(true)
                    .interact()
                    .context("confirmation prompt failed")?;
                if !proceed {
                    println!("{}", style::dim("Aborted."));
                    return Ok(());
                }
            }
            let mut resolved = 0;
            for record in &conflicts {
                let cleared = ConflictResolver::resolve(&ctx.wc, &record.path, choice, &sink)
                    .with_context(|| {
                        format!("failed to resolve '{}'", display_path(&record.path))
                    })?;
                if !cleared.is_empty() {
                    resolved += 1;
                }
            }
            println!(
                "{}",
                style::success(&format!("{} of {} paths resolved", resolved, conflicts.len()))
            );
        }
        None => {
            let config = ctx.wc.config();
            let tools = ProcessTools::new(
                config.resolve.editor.clone(),
                config.resolve.merge_tool.clone(),
            );
            let mut postponed = 0;
            for record in &conflicts {
                let chosen = ConflictResolver::resolve_interactive(
                    &ctx.wc,
                    &record.path,
                    &DialoguerPrompter,
                    &tools,
                    &sink,
                )
                .with_context(|| format!("failed to resolve '{}'", display_path(&record.path)))?;
                if chosen == ConflictChoice::Postpone {
                    postponed += 1;
                }
            }
            if postponed > 0 {
                println!(
                    "{}",
                    style::warn(&format!("{} conflicted paths postponed", postponed))
                );
            }
        }
    }
    Ok(())
}
