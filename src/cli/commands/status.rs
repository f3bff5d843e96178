//! Status command.

use console::style;

use super::helpers::open_store;
use crate::config::Settings;
use crate::repository::ExtensionStore;

/// Print record counts.
pub async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    if !settings.database_exists() {
        println!(
            "{} No database at {}. Run 'marketcrawl init' first.",
            style("!").yellow(),
            settings.database_path().display()
        );
        return Ok(());
    }

    let ctx = open_store(settings).await?;
    let counts = ctx.extensions().counts().await?;

    println!("{}", style("Extensions").bold());
    println!("  Database: {}", settings.database_path().display());
    println!("  Total:    {}", counts.total);
    println!("  Archived: {}", style(counts.archived).green());
    println!("  Pending:  {}", style(counts.pending).yellow());

    Ok(())
}
