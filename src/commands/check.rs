use anyhow::Result;
use icsync_core::state::StateStore;
use icsync_core::SyncConfig;
use owo_colors::OwoColorize;

pub fn run(config: SyncConfig) -> Result<()> {
    let ledger = config.ledger_path()?;
    if !ledger.exists() {
        println!("{}", "No ledger yet".dimmed());
        return Ok(());
    }

    let state = StateStore::open(&ledger)?;
    state.integrity_check()?;

    println!("{} {}", "✓".green(), ledger.display());
    Ok(())
}
