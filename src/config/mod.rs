//! Configuration management for the relist crawler
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Every value has a default, so an empty
//! environment yields a runnable configuration apart from the source URL.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
///
/// Sections missing from a TOML file fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP and listing source configuration
    pub crawler: CrawlerConfig,

    /// Discovery and recrawl timing
    pub schedule: ScheduleConfig,

    /// Journal and run-id locations
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Crawler-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// First search-results page of the listing source
    pub source_url: String,

    /// Fixed user agent; a rotating pool is used when unset
    pub user_agent: Option<String>,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Retries for transient HTTP failures
    pub max_retries: u32,

    /// Ceiling on raw page requests per second
    pub requests_per_second: u32,

    /// Search-result pages followed per discovery run
    pub max_listing_pages: usize,
}

/// Scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Pause between discovery runs
    pub discovery_period_secs: u64,

    /// Age after which a fetched item is due again
    pub recrawl_period_secs: u64,

    /// Items selected per detail batch
    pub batch_size: usize,

    /// Pause when no item is due
    pub recheck_delay_secs: u64,

    /// Spacing unit of the staged delay in front of detail fetches
    pub base_interval_ms: u64,

    /// Overwrite title/price/etc. when a known item is discovered again
    pub refresh_discovered_fields: bool,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the journal and run-id files
    pub data_dir: PathBuf,

    /// Journal file name, relative to `data_dir`
    pub journal_file: String,

    /// Run-id file name, relative to `data_dir`
    pub run_id_file: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let source_url =
            std::env::var("RELIST_SOURCE_URL").unwrap_or(defaults.crawler.source_url);

        let user_agent = std::env::var("RELIST_USER_AGENT").ok();

        let data_dir = std::env::var("RELIST_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage.data_dir);

        Ok(Self {
            crawler: CrawlerConfig {
                source_url,
                user_agent,
                request_timeout_secs: env_parse("RELIST_REQUEST_TIMEOUT")
                    .unwrap_or(defaults.crawler.request_timeout_secs),
                max_retries: env_parse("RELIST_MAX_RETRIES")
                    .unwrap_or(defaults.crawler.max_retries),
                requests_per_second: env_parse("RELIST_RATE_LIMIT")
                    .unwrap_or(defaults.crawler.requests_per_second),
                max_listing_pages: env_parse("RELIST_MAX_LISTING_PAGES")
                    .unwrap_or(defaults.crawler.max_listing_pages),
            },
            schedule: ScheduleConfig {
                discovery_period_secs: env_parse("RELIST_DISCOVERY_PERIOD")
                    .unwrap_or(defaults.schedule.discovery_period_secs),
                recrawl_period_secs: env_parse("RELIST_RECRAWL_PERIOD")
                    .unwrap_or(defaults.schedule.recrawl_period_secs),
                batch_size: env_parse("RELIST_BATCH_SIZE")
                    .unwrap_or(defaults.schedule.batch_size),
                recheck_delay_secs: env_parse("RELIST_RECHECK_DELAY")
                    .unwrap_or(defaults.schedule.recheck_delay_secs),
                base_interval_ms: env_parse("RELIST_BASE_INTERVAL_MS")
                    .unwrap_or(defaults.schedule.base_interval_ms),
                refresh_discovered_fields: env_parse("RELIST_REFRESH_DISCOVERED_FIELDS")
                    .unwrap_or(defaults.schedule.refresh_discovered_fields),
            },
            storage: StorageConfig {
                data_dir,
                ..defaults.storage
            },
            logging: LoggingConfig {
                level: std::env::var("RELIST_LOG_LEVEL").unwrap_or(defaults.logging.level),
                format: std::env::var("RELIST_LOG_FORMAT").unwrap_or(defaults.logging.format),
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.crawler.source_url.trim().is_empty() {
            anyhow::bail!("source_url must be set");
        }

        url::Url::parse(&self.crawler.source_url)
            .with_context(|| format!("source_url is not a valid URL: {}", self.crawler.source_url))?;

        if self.crawler.requests_per_second == 0 {
            anyhow::bail!("requests_per_second must be greater than 0");
        }

        if self.crawler.max_listing_pages == 0 {
            anyhow::bail!("max_listing_pages must be greater than 0");
        }

        if self.schedule.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }

        if self.schedule.base_interval_ms == 0 {
            anyhow::bail!("base_interval_ms must be greater than 0");
        }

        if self.schedule.discovery_period_secs == 0
            || self.schedule.recrawl_period_secs == 0
            || self.schedule.recheck_delay_secs == 0
        {
            anyhow::bail!(
                "discovery_period_secs, recrawl_period_secs and recheck_delay_secs must be greater than 0"
            );
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler.request_timeout_secs)
    }

    /// Full path of the journal file
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.journal_file)
    }

    /// Full path of the run-id file
    #[must_use]
    pub fn run_id_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.run_id_file)
    }
}

impl ScheduleConfig {
    #[must_use]
    pub fn discovery_period(&self) -> Duration {
        Duration::from_secs(self.discovery_period_secs)
    }

    #[must_use]
    pub fn recrawl_period(&self) -> Duration {
        Duration::from_secs(self.recrawl_period_secs)
    }

    #[must_use]
    pub fn recheck_delay(&self) -> Duration {
        Duration::from_secs(self.recheck_delay_secs)
    }

    #[must_use]
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            discovery_period_secs: 15 * 60,
            recrawl_period_secs: 24 * 60 * 60,
            batch_size: 10,
            recheck_delay_secs: 60,
            base_interval_ms: 500,
            refresh_discovered_fields: false,
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            source_url: String::from(
                "https://vancouver.craigslist.org/d/apartments-housing-for-rent/search/apa",
            ),
            user_agent: None,
            request_timeout_secs: 30,
            max_retries: 2,
            requests_per_second: 2,
            max_listing_pages: 1,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            journal_file: String::from("journal.jsonl"),
            run_id_file: String::from("last-run"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}
