//! Configuration management for the harvester.
//!
//! Provides TOML-based configuration with platform-specific paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use crate::types::CrawlTarget;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/bhunaksha/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Portal location and the ancestor selection to crawl
    pub portal: PortalConfig,
    /// Worker pool, retry and timeout settings
    pub crawler: CrawlerConfig,
    /// Browser session settings
    pub browser: BrowserConfig,
    /// Output and log locations
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load configuration from the platform config directory, falling back
    /// to defaults if not found.
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// if the file does not exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `BHUNAKSHA_CONFIG`: Read the config file from this path instead
    /// - `BHUNAKSHA_WORKERS`: Override the worker count
    /// - `BHUNAKSHA_DISTRICT_INDEX` / `BHUNAKSHA_TALUKA_INDEX`: Override the target
    /// - `BHUNAKSHA_HEADLESS`: Override browser headless mode (true/false)
    /// - `BHUNAKSHA_DATA_DIR`: Override the output root
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = match std::env::var("BHUNAKSHA_CONFIG") {
            Ok(path) => Self::load_from(Path::new(&path))?,
            Err(_) => Self::load()?,
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(workers) = lookup("BHUNAKSHA_WORKERS").and_then(|v| v.parse().ok()) {
            self.crawler.workers = workers;
            tracing::debug!("Override crawler.workers from env: {}", workers);
        }

        if let Some(index) = lookup("BHUNAKSHA_DISTRICT_INDEX").and_then(|v| v.parse().ok()) {
            self.portal.district_index = index;
            tracing::debug!("Override portal.district_index from env: {}", index);
        }

        if let Some(index) = lookup("BHUNAKSHA_TALUKA_INDEX").and_then(|v| v.parse().ok()) {
            self.portal.taluka_index = index;
            tracing::debug!("Override portal.taluka_index from env: {}", index);
        }

        if let Some(headless) = lookup("BHUNAKSHA_HEADLESS").and_then(|v| v.parse().ok()) {
            self.browser.headless = headless;
            tracing::debug!("Override browser.headless from env: {}", headless);
        }

        if let Some(dir) = lookup("BHUNAKSHA_DATA_DIR") {
            tracing::debug!("Override output.data_dir from env: {}", dir);
            self.output.data_dir = PathBuf::from(dir);
        }
    }

    /// Reject values the crawler cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        let checks = [
            ("crawler.workers", self.crawler.workers == 0),
            ("crawler.select_attempts", self.crawler.select_attempts == 0),
            ("crawler.detail_wait_attempts", self.crawler.detail_wait_attempts == 0),
            ("crawler.page_load_timeout_secs", self.crawler.page_load_timeout_secs == 0),
            ("crawler.level_timeout_secs", self.crawler.level_timeout_secs == 0),
            ("crawler.detail_timeout_secs", self.crawler.detail_timeout_secs == 0),
            ("crawler.map_timeout_secs", self.crawler.map_timeout_secs == 0),
            ("browser.launch_attempts", self.browser.launch_attempts == 0),
        ];

        match checks.iter().find(|(_, invalid)| *invalid) {
            Some((field, _)) => Err(ConfigError::InvalidValue {
                field: (*field).to_string(),
                reason: "must be greater than zero".to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("in", "bhunaksha", "bhunaksha").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// The ancestor selection this configuration crawls.
    #[must_use]
    pub fn target(&self) -> CrawlTarget {
        CrawlTarget {
            district_index: self.portal.district_index,
            taluka_index: self.portal.taluka_index,
        }
    }
}

/// Portal location and target selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Entry page of the cadastral map portal
    pub url: String,
    /// District option index (0 is the placeholder)
    pub district_index: usize,
    /// Taluka option index (0 is the placeholder)
    pub taluka_index: usize,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            url: "https://mahabhunakasha.mahabhumi.gov.in/27/index.html".to_string(),
            district_index: 1,
            taluka_index: 7,
        }
    }
}

/// Worker pool, retry and timeout settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Number of parallel workers
    pub workers: usize,
    /// Attempt budget for interactive option selection
    pub select_attempts: u32,
    /// Attempt budget for the detail panel change wait
    pub detail_wait_attempts: u32,
    /// Fixed sleep between retry attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Bound on the first page load (hours, the portal is slow)
    pub page_load_timeout_secs: u64,
    /// Bound on each dropdown population wait
    pub level_timeout_secs: u64,
    /// Bound on each detail panel update
    pub detail_timeout_secs: u64,
    /// Bound on the map layer appearing after a village is chosen
    pub map_timeout_secs: u64,
    /// Pause after committing the state level before reading categories
    pub category_settle_ms: u64,
    /// Polling interval for every bounded wait
    pub poll_interval_ms: u64,
    /// Derive the work list from a cached discovery when one exists
    pub reuse_discovery: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 6,
            select_attempts: 3,
            detail_wait_attempts: 1,
            retry_delay_ms: 1000,
            page_load_timeout_secs: 3600,
            level_timeout_secs: 20,
            detail_timeout_secs: 20,
            map_timeout_secs: 20,
            category_settle_ms: 5000,
            poll_interval_ms: 250,
            reuse_discovery: true,
        }
    }
}

impl CrawlerConfig {
    /// Sleep between retry attempts.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Bound on the first page load.
    #[must_use]
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    /// Bound on dropdown population.
    #[must_use]
    pub fn level_timeout(&self) -> Duration {
        Duration::from_secs(self.level_timeout_secs)
    }

    /// Bound on detail panel updates.
    #[must_use]
    pub fn detail_timeout(&self) -> Duration {
        Duration::from_secs(self.detail_timeout_secs)
    }

    /// Bound on the map layer check.
    #[must_use]
    pub fn map_timeout(&self) -> Duration {
        Duration::from_secs(self.map_timeout_secs)
    }

    /// Pause after the state level.
    #[must_use]
    pub fn category_settle(&self) -> Duration {
        Duration::from_millis(self.category_settle_ms)
    }

    /// Polling interval for bounded waits.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Browser session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Attempts to launch a browser before giving up on an item
    pub launch_attempts: u32,
    /// Explicit browser executable, otherwise auto-detected
    pub executable: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            launch_attempts: 3,
            executable: None,
        }
    }
}

/// Output and log locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root under which `{district}/{taluka}/{village}.csv` files are written
    pub data_dir: PathBuf,
    /// Root for per-item log files
    pub log_dir: PathBuf,
    /// Combined aggregate table written by the categorization pass
    pub aggregate_csv: PathBuf,
    /// District folder to aggregate; defaults to the discovered district
    pub aggregate_root: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            log_dir: PathBuf::from("logs"),
            aggregate_csv: PathBuf::from("district_data.csv"),
            aggregate_root: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.crawler.workers, 6);
        assert_eq!(config.crawler.select_attempts, 3);
        assert_eq!(config.crawler.detail_wait_attempts, 1);
        assert_eq!(config.crawler.page_load_timeout(), Duration::from_secs(3600));
        assert!(config.browser.headless);
        assert_eq!(config.target().taluka_index, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[portal]"));
        assert!(toml_str.contains("[crawler]"));
        assert!(toml_str.contains("[output]"));

        let parsed: AppConfig = toml::from_str(&toml_str).expect("parse serialized config");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("config.toml");

        let mut config = AppConfig::default();
        config.crawler.workers = 2;
        config.portal.district_index = 4;
        let contents = toml::to_string_pretty(&config).expect("serialize config");
        fs::write(&config_path, contents).expect("write config file");

        let loaded = AppConfig::load_from(&config_path).expect("load config");
        assert_eq!(loaded.crawler.workers, 2);
        assert_eq!(loaded.portal.district_index, 4);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let tmp = TempDir::new().expect("create temp dir");
        let loaded = AppConfig::load_from(&tmp.path().join("absent.toml")).expect("load");
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BHUNAKSHA_WORKERS", "3"),
            ("BHUNAKSHA_DISTRICT_INDEX", "2"),
            ("BHUNAKSHA_TALUKA_INDEX", "5"),
            ("BHUNAKSHA_HEADLESS", "false"),
            ("BHUNAKSHA_DATA_DIR", "/tmp/harvest"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|key| vars.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.crawler.workers, 3);
        assert_eq!(config.target(), CrawlTarget { district_index: 2, taluka_index: 5 });
        assert!(!config.browser.headless);
        assert_eq!(config.output.data_dir, PathBuf::from("/tmp/harvest"));
    }

    #[test]
    fn test_env_override_ignores_unparseable_values() {
        let mut config = AppConfig::default();
        config.apply_env(|key| (key == "BHUNAKSHA_WORKERS").then(|| "many".to_string()));
        assert_eq!(config.crawler.workers, 6);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = AppConfig::default();
        config.crawler.workers = 0;
        let err = config.validate().expect_err("zero workers rejected");
        assert!(err.to_string().contains("crawler.workers"));
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[portal]
district_index = 3

[crawler]
workers = 2
"#;

        let config: AppConfig = toml::from_str(toml_str).expect("parse partial config");
        assert_eq!(config.portal.district_index, 3);
        assert_eq!(config.crawler.workers, 2);
        // These should be defaults
        assert_eq!(config.portal.taluka_index, 7);
        assert_eq!(config.crawler.level_timeout_secs, 20);
        assert!(config.browser.headless);
    }
}
