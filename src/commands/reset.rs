use anyhow::Result;
use icsync_core::state::{StateStore, SyncLock};
use icsync_core::SyncConfig;
use owo_colors::OwoColorize;

pub fn run(config: SyncConfig) -> Result<()> {
    let ledger = config.ledger_path()?;
    if !ledger.exists() {
        println!("{}", "Nothing to reset".dimmed());
        return Ok(());
    }

    let _lock = SyncLock::acquire(&ledger)?;
    let state = StateStore::open(&ledger)?;
    let forgotten = state.record_count()?;
    state.reset()?;

    println!(
        "Forgot {} synced events. The next sync re-adopts existing calendar entries.",
        forgotten.green()
    );
    Ok(())
}
