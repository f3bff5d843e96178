//! Configuration management for marketcrawl using the prefer crate.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::browser::BrowserEngineConfig;
use crate::scrapers::CrawlConfig;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "marketcrawl.db";

/// Config file basenames looked for next to the data directory.
const CONFIG_BASENAMES: &[&str] = &["marketcrawl", "config"];
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    /// Set via DATABASE_URL env var.
    pub database_url: Option<String>,
    pub browser: BrowserEngineConfig,
    pub crawl: CrawlConfig,
}

impl Default for Settings {
    fn default() -> Self {
        // Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("marketcrawl");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            browser: BrowserEngineConfig::default(),
            crawl: CrawlConfig::default(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    /// Get the full path to the database file.
    pub fn database_path(&self) -> PathBuf {
        match self.database_url {
            Some(ref url) => PathBuf::from(crate::repository::util::sqlite_path(url)),
            None => self.data_dir.join(&self.database_filename),
        }
    }

    /// Check if the database appears to be initialized.
    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Ensure the data directory (and the database's directory) exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory {}: {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })?;

        if let Some(parent) = self.database_path().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        Ok(())
    }
}

/// Configuration file model. Every field is optional; unset fields keep the
/// defaults from [`Settings`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default)]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub browser: Option<BrowserEngineConfig>,
    #[serde(default)]
    pub crawl: Option<CrawlConfig>,
    /// Path the config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers marketcrawl config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("marketcrawl").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("{}", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// The format is chosen by file extension and defaults to JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// The config file's directory, if it was loaded from a file.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref browser) = self.browser {
            settings.browser = browser.clone();
            if let Some(ref exe) = browser.executable {
                let exe = exe.to_string_lossy();
                settings.browser.executable = Some(self.resolve_path(&exe, base_dir));
            }
        }
        if let Some(ref crawl) = self.crawl {
            settings.crawl = crawl.clone();
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Data directory or database file (--target flag).
    pub target: Option<PathBuf>,
}

/// Where `--target` points: a data directory plus the database inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub data_dir: PathBuf,
    pub database_filename: String,
}

impl ResolvedTarget {
    /// A `.db`/`.sqlite`/`.sqlite3` path (or an existing file) names the database
    /// itself; anything else is a data directory.
    pub fn from_path(path: &Path) -> Self {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(path)
        };

        let is_db_file = path
            .extension()
            .is_some_and(|ext| ext == "db" || ext == "sqlite" || ext == "sqlite3")
            || path.is_file();

        if is_db_file {
            let database_filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(DEFAULT_DATABASE_FILENAME)
                .to_string();
            let data_dir = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            Self {
                data_dir,
                database_filename,
            }
        } else {
            Self {
                data_dir: path,
                database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            }
        }
    }
}

/// Look for a config file in the data directory.
fn find_config_next_to_db(data_dir: &Path) -> Option<PathBuf> {
    CONFIG_BASENAMES.iter().find_map(|basename| {
        CONFIG_EXTENSIONS
            .iter()
            .map(|ext| data_dir.join(format!("{}.{}", basename, ext)))
            .find(|path| path.exists())
    })
}

/// Load config from file sources.
async fn load_file_config(options: &LoadOptions, target: Option<&ResolvedTarget>) -> Config {
    // Priority 1: Explicit --config flag
    if let Some(ref config_path) = options.config_path {
        return match Config::load_from_path(config_path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}", e);
                Config::default()
            }
        };
    }

    // Priority 2: Config next to the target database
    if let Some(target) = target {
        if let Some(config_path) = find_config_next_to_db(&target.data_dir) {
            tracing::debug!("Found config next to data dir: {}", config_path.display());
            if let Ok(config) = Config::load_from_path(&config_path).await {
                return config;
            }
        }
    }

    // Priority 3: Auto-discover via prefer
    Config::load().await
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let target = options.target.as_deref().map(ResolvedTarget::from_path);
    let config = load_file_config(&options, target.as_ref()).await;

    let mut settings = Settings::default();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = if options.use_cwd {
        cwd
    } else {
        config.base_dir().unwrap_or(cwd)
    };

    config.apply_to_settings(&mut settings, &base_dir);

    // --target takes precedence over the config file
    if let Some(target) = target {
        settings.data_dir = target.data_dir;
        settings.database_filename = target.database_filename;
    }

    // DATABASE_URL environment variable takes highest precedence
    if let Some(database_url) = std::env::var("DATABASE_URL")
        .ok()
        .filter(|s| !s.is_empty())
    {
        tracing::debug!("Using DATABASE_URL from environment: {}", database_url);
        settings.database_url = Some(database_url);
    }

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RefreshPolicy;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("marketcrawl.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "data"

[browser]
headless = false

[crawl]
categories = ["Themes"]
batch_size = 10
refresh_policy = "overwrite"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, dir.path());
        assert_eq!(settings.data_dir, dir.path().join("data"));
        assert!(!settings.browser.headless);
        assert_eq!(settings.crawl.categories, vec!["Themes"]);
        assert_eq!(settings.crawl.batch_size, 10);
        assert_eq!(settings.crawl.max_scrolls, 100);
        assert_eq!(settings.crawl.refresh_policy, RefreshPolicy::Overwrite);
    }

    #[tokio::test]
    async fn test_load_yaml_and_json() {
        let dir = tempdir().unwrap();
        let yaml = dir.path().join("c.yaml");
        std::fs::write(&yaml, "database: other.db\ncrawl:\n  stall_limit: 5\n").unwrap();
        let config = Config::load_from_path(&yaml).await.unwrap();
        assert_eq!(config.database.as_deref(), Some("other.db"));
        assert_eq!(config.crawl.unwrap().stall_limit, 5);

        let json = dir.path().join("c.json");
        std::fs::write(&json, r#"{"crawl": {"fetch_attempts": 3}}"#).unwrap();
        let config = Config::load_from_path(&json).await.unwrap();
        assert_eq!(config.crawl.unwrap().fetch_attempts, 3);
    }

    #[tokio::test]
    async fn test_load_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "crawl = [").unwrap();
        assert!(Config::load_from_path(&path).await.is_err());
    }

    #[test]
    fn test_resolved_target() {
        let dir = tempdir().unwrap();

        let db = ResolvedTarget::from_path(&dir.path().join("crawl.db"));
        assert_eq!(db.data_dir, dir.path());
        assert_eq!(db.database_filename, "crawl.db");

        let data = ResolvedTarget::from_path(dir.path());
        assert_eq!(data.data_dir, dir.path());
        assert_eq!(data.database_filename, DEFAULT_DATABASE_FILENAME);
    }

    #[test]
    fn test_database_url() {
        let mut settings = Settings::with_data_dir(PathBuf::from("/data"));
        assert_eq!(settings.database_url(), "sqlite:/data/marketcrawl.db");

        settings.database_url = Some("sqlite:/elsewhere/x.db".into());
        assert_eq!(settings.database_url(), "sqlite:/elsewhere/x.db");
        assert_eq!(settings.database_path(), PathBuf::from("/elsewhere/x.db"));
    }

    #[test]
    fn test_find_config_next_to_db() {
        let dir = tempdir().unwrap();
        assert_eq!(find_config_next_to_db(dir.path()), None);

        std::fs::write(dir.path().join("config.yaml"), "").unwrap();
        std::fs::write(dir.path().join("marketcrawl.json"), "{}").unwrap();
        assert_eq!(
            find_config_next_to_db(dir.path()),
            Some(dir.path().join("marketcrawl.json"))
        );
    }
}
