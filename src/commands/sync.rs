use anyhow::Result;
use icsync_core::sync::{ActionKind, SyncEngine, SyncOptions};
use icsync_core::SyncConfig;
use owo_colors::OwoColorize;

use crate::render::Render;
use crate::utils::tui;

/// Above this many changes, only counts are shown unless verbose.
const COMPACT_THRESHOLD: usize = 10;

pub async fn run(config: SyncConfig, dry_run: bool, full: bool, verbose: bool, json: bool) -> Result<()> {
    let label = format!("📅 {}", config.calendar_name);
    let engine = SyncEngine::from_config(config)?;
    let options = SyncOptions {
        dry_run,
        full_resync: full,
    };

    let spinner = (!json).then(|| tui::create_spinner(label.clone()));
    let result = engine.run(options).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let result = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{label}");

    let changes: Vec<_> = result
        .actions
        .iter()
        .filter(|a| verbose || a.kind != ActionKind::Unchanged)
        .collect();
    if verbose || changes.len() <= COMPACT_THRESHOLD {
        for action in changes {
            println!("   {}", action.render());
        }
    }

    for error in &result.errors {
        println!("   {}", error.render());
    }

    println!("\n{}", result.render());
    if dry_run && result.has_changes() {
        println!("{}", "Dry run: nothing was written".dimmed());
    }

    if !result.errors.is_empty() {
        anyhow::bail!("{} events failed to sync", result.errors.len());
    }

    Ok(())
}
