//! CLI parser and dispatch to command-specific modules.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "marketcrawl")]
#[command(about = "Extension marketplace crawler and page archiver")]
#[command(version)]
pub struct Cli {
    /// Target directory or database file (overrides config file).
    /// Can be a directory containing marketcrawl.db or a .db file directly.
    #[arg(long, short = 't', global = true)]
    target: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Options shared by commands that crawl listings.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct CrawlArgs {
    /// Replace metadata of extensions that are already stored
    #[arg(long)]
    overwrite: bool,

    /// Only crawl these categories (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,

    /// Attempts per detail page
    #[arg(long)]
    fetch_attempts: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Discover extensions and store their metadata
    Discover {
        #[command(flatten)]
        crawl: CrawlArgs,
    },

    /// Save the pages of stored extensions that are not archived yet
    Archive {
        /// Directory to save extension pages into
        save_path: PathBuf,
    },

    /// Discover extensions, then archive everything pending
    Run {
        /// Directory to save extension pages into
        save_path: PathBuf,

        #[command(flatten)]
        crawl: CrawlArgs,
    },

    /// Show record counts
    Status,
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
        target: cli.target,
    };
    let (mut settings, _config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Init => commands::init::cmd_init(&settings).await,
        Commands::Discover { crawl } => {
            crawl.apply(&mut settings);
            commands::discover::cmd_discover(&settings).await
        }
        Commands::Archive { save_path } => {
            commands::archive::cmd_archive(&settings, &save_path).await
        }
        Commands::Run { save_path, crawl } => {
            crawl.apply(&mut settings);
            commands::run::cmd_run(&settings, &save_path).await
        }
        Commands::Status => commands::status::cmd_status(&settings).await,
    }
}

impl CrawlArgs {
    fn apply(&self, settings: &mut crate::config::Settings) {
        if self.overwrite {
            settings.crawl.refresh_policy = crate::repository::RefreshPolicy::Overwrite;
        }
        if !self.categories.is_empty() {
            settings.crawl.categories = self.categories.clone();
        }
        if let Some(attempts) = self.fetch_attempts {
            settings.crawl.fetch_attempts = attempts;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_archive_requires_save_path() {
        let err = Cli::try_parse_from(["marketcrawl", "archive"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_crawl_args_apply() {
        let cli = Cli::try_parse_from([
            "marketcrawl",
            "run",
            "out",
            "--overwrite",
            "--category",
            "Themes",
            "--fetch-attempts",
            "3",
        ])
        .unwrap();

        let Commands::Run { save_path, crawl } = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(save_path, PathBuf::from("out"));

        let mut settings = crate::config::Settings::default();
        crawl.apply(&mut settings);
        assert_eq!(
            settings.crawl.refresh_policy,
            crate::repository::RefreshPolicy::Overwrite
        );
        assert_eq!(settings.crawl.categories, vec!["Themes"]);
        assert_eq!(settings.crawl.fetch_attempts, 3);
    }
}
