use std::path::Path;

use anyhow::Result;
use icsync_core::SyncConfig;
use owo_colors::OwoColorize;

pub fn run(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        anyhow::bail!("Config already exists at {}", config_path.display());
    }

    SyncConfig::create_template(config_path)?;

    println!("Created {}", config_path.display().green());
    println!("Set source_url and calendar_name, then run: icsync sync");
    Ok(())
}
