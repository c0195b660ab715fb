//! # Killfeed Server Configuration
//!
//! Settings are resolved in layers, each overriding the one before:
//!
//! 1.  built-in defaults;
//! 2.  the JSON config file (`server_killfeed.conf`, camelCase keys);
//! 3.  environment variables and CLI flags (clap reads both).
//!
//! A `.env` file, if present, is loaded into the environment first. A missing
//! or unparsable config file is reported back to the caller and skipped.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lib_common::ingestors::PollerSettings;
use lib_common::killboard::apicall::{DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE};
use lib_common::killboard::KillboardOptions;

const DEFAULT_CONFIG_FILE: &str = "server_killfeed.conf";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CACHE_SIZE: usize = 50;
const DEFAULT_SEEN_CAPACITY: usize = 10_000;
const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;
const DEFAULT_LOG_DIR: &str = "./logs";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Albion Online live killboard relay", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "PORT", help = "Port to listen on for HTTP and WebSocket clients.")]
    pub port: Option<u16>,

    #[clap(long, env = "KILLFEED_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "KILLFEED_UPSTREAM_URL", help = "Base URL of the game-info API.")]
    pub upstream_base_url: Option<String>,

    #[clap(long, env = "KILLFEED_PAGE_SIZE", help = "Records requested per poll.")]
    pub page_size: Option<u32>,

    #[clap(long, env = "KILLFEED_POLL_INTERVAL_SECS", help = "Seconds between the end of one poll and the start of the next.")]
    pub poll_interval_secs: Option<u64>,

    #[clap(long, env = "KILLFEED_REQUEST_TIMEOUT_SECS", help = "Timeout in seconds for one upstream request.")]
    pub request_timeout_secs: Option<u64>,

    #[clap(long, env = "KILLFEED_MAX_RETRIES", help = "Retries on transient upstream failures within one poll.")]
    pub max_retries: Option<u32>,

    #[clap(long, env = "KILLFEED_CACHE_SIZE", help = "Number of recent kills kept for the snapshot.")]
    pub cache_size: Option<usize>,

    #[clap(long, env = "KILLFEED_SEEN_CAPACITY", help = "Number of kill ids remembered for deduplication.")]
    pub seen_capacity: Option<usize>,

    #[clap(long, env = "KILLFEED_SUBSCRIBER_BUFFER", help = "Frames queued per live client before new ones are dropped.")]
    pub subscriber_buffer: Option<usize>,

    #[clap(long, env = "KILLFEED_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "KILLFEED_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error). RUST_LOG wins if set.")]
    pub log_level: Option<String>,
}

impl Config {
    /// Built-in values for every field.
    fn defaults() -> Config {
        Config {
            port: Some(DEFAULT_PORT),
            config_path: None,
            upstream_base_url: Some(DEFAULT_BASE_URL.to_string()),
            page_size: Some(DEFAULT_PAGE_SIZE),
            poll_interval_secs: Some(DEFAULT_POLL_INTERVAL_SECS),
            request_timeout_secs: Some(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: Some(0),
            cache_size: Some(DEFAULT_CACHE_SIZE),
            seen_capacity: Some(DEFAULT_SEEN_CAPACITY),
            subscriber_buffer: Some(DEFAULT_SUBSCRIBER_BUFFER),
            log_dir: Some(PathBuf::from(DEFAULT_LOG_DIR)),
            log_level: Some(DEFAULT_LOG_LEVEL.to_string()),
        }
    }

    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            upstream_base_url: other.upstream_base_url.or(self.upstream_base_url),
            page_size: other.page_size.or(self.page_size),
            poll_interval_secs: other.poll_interval_secs.or(self.poll_interval_secs),
            request_timeout_secs: other.request_timeout_secs.or(self.request_timeout_secs),
            max_retries: other.max_retries.or(self.max_retries),
            cache_size: other.cache_size.or(self.cache_size),
            seen_capacity: other.seen_capacity.or(self.seen_capacity),
            subscriber_buffer: other.subscriber_buffer.or(self.subscriber_buffer),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }
}

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A size or duration that must be positive was zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// The seen-set could forget ids that are still on the current page.
    /// A page is recorded newest first, so up to two pages of ids can be
    /// inserted after one that is still listed upstream.
    #[error("seenCapacity ({seen}) must be at least twice pageSize ({page})")]
    SeenBelowPage {
        /// Configured seen capacity.
        seen: usize,
        /// Configured page size.
        page: u32,
    },
}

/// What happened to the config file during loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// File found and merged.
    Loaded(PathBuf),
    /// No file at this path.
    Missing(PathBuf),
    /// File present but unreadable or not valid JSON; skipped.
    Rejected { path: PathBuf, reason: String },
}

/// Fully resolved, validated settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub upstream_base_url: String,
    pub page_size: u32,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub cache_size: usize,
    pub seen_capacity: usize,
    pub subscriber_buffer: usize,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub file_source: FileSource,
}

impl Settings {
    /// Options for the upstream client.
    pub fn killboard_options(&self) -> KillboardOptions {
        KillboardOptions {
            base_url: self.upstream_base_url.clone(),
            page_size: self.page_size,
            timeout: self.request_timeout,
            max_retries: self.max_retries,
        }
    }

    /// Options for the poll loop.
    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            interval: self.poll_interval,
            seen_capacity: self.seen_capacity,
        }
    }
}

/// Loads `.env`, parses the command line and environment, and resolves.
pub fn load_config() -> Result<Settings, ConfigError> {
    // A missing .env is the normal case.
    let _ = dotenvy::dotenv();
    resolve(Config::parse())
}

/// Layers defaults, the config file and `cli` (flags plus env), then validates.
pub fn resolve(cli: Config) -> Result<Settings, ConfigError> {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let (file_config, file_source) = read_config_file(&config_file_path);

    let merged = Config::defaults()
        .merge(file_config.unwrap_or_default())
        .merge(cli);

    validate(merged, file_source)
}

fn read_config_file(path: &Path) -> (Option<Config>, FileSource) {
    if !path.exists() {
        return (None, FileSource::Missing(path.to_path_buf()));
    }

    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str::<Config>(&text).map_err(|e| e.to_string()));

    match parsed {
        Ok(config) => (Some(config), FileSource::Loaded(path.to_path_buf())),
        Err(reason) => (
            None,
            FileSource::Rejected {
                path: path.to_path_buf(),
                reason,
            },
        ),
    }
}

fn validate(config: Config, file_source: FileSource) -> Result<Settings, ConfigError> {
    // Every field is already Some after merging over the defaults.
    let page_size = config.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    let poll_interval_secs = config.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
    let request_timeout_secs = config.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    let cache_size = config.cache_size.unwrap_or(DEFAULT_CACHE_SIZE);
    let seen_capacity = config.seen_capacity.unwrap_or(DEFAULT_SEEN_CAPACITY);
    let subscriber_buffer = config.subscriber_buffer.unwrap_or(DEFAULT_SUBSCRIBER_BUFFER);

    for (name, value) in [
        ("pageSize", u64::from(page_size)),
        ("pollIntervalSecs", poll_interval_secs),
        ("requestTimeoutSecs", request_timeout_secs),
        ("cacheSize", cache_size as u64),
        ("seenCapacity", seen_capacity as u64),
        ("subscriberBuffer", subscriber_buffer as u64),
    ] {
        if value == 0 {
            return Err(ConfigError::Zero(name));
        }
    }

    if (seen_capacity as u64) < 2 * u64::from(page_size) {
        return Err(ConfigError::SeenBelowPage {
            seen: seen_capacity,
            page: page_size,
        });
    }

    Ok(Settings {
        port: config.port.unwrap_or(DEFAULT_PORT),
        upstream_base_url: config
            .upstream_base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        page_size,
        poll_interval: Duration::from_secs(poll_interval_secs),
        request_timeout: Duration::from_secs(request_timeout_secs),
        max_retries: config.max_retries.unwrap_or_default(),
        cache_size,
        seen_capacity,
        subscriber_buffer,
        log_dir: config.log_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
        log_level: config.log_level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        file_source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli_with_file(path: &Path) -> Config {
        Config {
            config_path: Some(path.to_path_buf()),
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults_apply_without_file_or_flags() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.conf");

        let settings = resolve(cli_with_file(&missing)).unwrap();
        assert_eq!(settings.port, 5000);
        assert_eq!(settings.upstream_base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.page_size, 20);
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.max_retries, 0);
        assert_eq!(settings.cache_size, 50);
        assert_eq!(settings.seen_capacity, 10_000);
        assert_eq!(settings.subscriber_buffer, 256);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.file_source, FileSource::Missing(missing));
    }

    #[test]
    fn test_file_overrides_defaults_and_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 7000, "cacheSize": 10, "pollIntervalSecs": 2}}"#).unwrap();

        let cli = Config {
            port: Some(8000),
            ..cli_with_file(file.path())
        };
        let settings = resolve(cli).unwrap();

        assert_eq!(settings.port, 8000);
        assert_eq!(settings.cache_size, 10);
        assert_eq!(settings.poll_interval, Duration::from_secs(2));
        assert_eq!(settings.file_source, FileSource::Loaded(file.path().to_path_buf()));
    }

    #[test]
    fn test_unparsable_file_is_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json at all").unwrap();

        let settings = resolve(cli_with_file(file.path())).unwrap();
        assert_eq!(settings.port, 5000);
        assert!(matches!(settings.file_source, FileSource::Rejected { .. }));
    }

    #[test]
    fn test_zero_sizes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Config {
            cache_size: Some(0),
            ..cli_with_file(&dir.path().join("none.conf"))
        };
        assert_eq!(resolve(cli).unwrap_err(), ConfigError::Zero("cacheSize"));

        let cli = Config {
            poll_interval_secs: Some(0),
            ..cli_with_file(&dir.path().join("none.conf"))
        };
        assert_eq!(resolve(cli).unwrap_err(), ConfigError::Zero("pollIntervalSecs"));
    }

    #[test]
    fn test_seen_capacity_must_cover_two_pages() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Config {
            page_size: Some(50),
            seen_capacity: Some(99),
            ..cli_with_file(&dir.path().join("none.conf"))
        };
        assert_eq!(
            resolve(cli).unwrap_err(),
            ConfigError::SeenBelowPage { seen: 99, page: 50 }
        );

        let cli = Config {
            page_size: Some(50),
            seen_capacity: Some(100),
            ..cli_with_file(&dir.path().join("none.conf"))
        };
        assert_eq!(resolve(cli).unwrap().seen_capacity, 100);
    }

    #[test]
    fn test_flags_parse_from_command_line() {
        let cli = Config::try_parse_from([
            "server_killfeed",
            "--port",
            "6001",
            "--page-size",
            "30",
            "--upstream-base-url",
            "http://127.0.0.1:9/api/",
        ])
        .unwrap();

        assert_eq!(cli.port, Some(6001));
        assert_eq!(cli.page_size, Some(30));
        assert_eq!(cli.upstream_base_url.as_deref(), Some("http://127.0.0.1:9/api/"));
    }

    #[test]
    fn test_settings_feed_library_options() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Config {
            request_timeout_secs: Some(3),
            max_retries: Some(2),
            seen_capacity: Some(500),
            ..cli_with_file(&dir.path().join("none.conf"))
        };
        let settings = resolve(cli).unwrap();

        let options = settings.killboard_options();
        assert_eq!(options.timeout, Duration::from_secs(3));
        assert_eq!(options.max_retries, 2);
        assert_eq!(options.page_size, 20);
        assert_eq!(settings.poller_settings().seen_capacity, 500);
    }
}
