use anyhow::Result;
use chrono::{DateTime, Utc};
use icsync_core::state::StateStore;
use icsync_core::SyncConfig;
use owo_colors::OwoColorize;

use crate::render::Render;

pub fn run(config: SyncConfig, limit: usize) -> Result<()> {
    let ledger = config.ledger_path()?;
    if !ledger.exists() {
        println!("{}", "Never synced".dimmed());
        return Ok(());
    }

    let state = StateStore::open(&ledger)?;

    println!("📅 {}", config.calendar_name);
    println!("   Feed:     {}", config.source_url);
    println!("   Ledger:   {} ({} events)", ledger.display(), state.record_count()?);

    match state.last_successful_run()? {
        Some(run) => {
            let at = run.completed_at.unwrap_or(run.started_at);
            println!("   Last sync: {}", ago(at).green());
        }
        None => println!("   Last sync: {}", "never succeeded".yellow()),
    }

    let runs = state.recent_runs(limit)?;
    if !runs.is_empty() {
        println!("\nRecent runs:");
        for run in runs {
            println!("   {}", run.render());
        }
    }

    Ok(())
}

/// "3h 12m ago"
fn ago(at: DateTime<Utc>) -> String {
    let elapsed = (Utc::now() - at).to_std().unwrap_or_default();
    let rounded = std::time::Duration::from_secs(elapsed.as_secs() / 60 * 60);
    if rounded.is_zero() {
        "just now".to_string()
    } else {
        format!("{} ago", humantime::format_duration(rounded))
    }
}
