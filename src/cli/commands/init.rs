//! Initialize command.

use console::style;

use super::helpers::open_store;
use crate::config::Settings;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    open_store(settings).await?;

    println!(
        "{} Initialized marketcrawl database at {}",
        style("✓").green(),
        settings.database_path().display()
    );

    Ok(())
}
