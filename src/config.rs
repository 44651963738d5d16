//! Configuration types for photon-updater
//!
//! All settings are read once at startup into an explicit [`Config`] value that
//! is then handed to each component. Nothing reads the environment after that.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Default host serving the Photon database dumps
pub const DEFAULT_BASE_URL: &str = "https://r2.koalasec.org/public";

/// Update strategy selected through `UPDATE_STRATEGY`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStrategy {
    /// Stage and extract in the temp dir only, then swap (default)
    #[default]
    Sequential,
    /// Keep the old index live while the new one is staged next to it
    Parallel,
    /// Never run scheduled updates
    Disabled,
}

impl UpdateStrategy {
    /// Parse the `UPDATE_STRATEGY` value (case-insensitive)
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SEQUENTIAL" => Ok(UpdateStrategy::Sequential),
            "PARALLEL" => Ok(UpdateStrategy::Parallel),
            "DISABLED" => Ok(UpdateStrategy::Disabled),
            other => Err(Error::config(
                "UPDATE_STRATEGY",
                format!("invalid update strategy '{other}', expected SEQUENTIAL, PARALLEL or DISABLED"),
            )),
        }
    }

    /// Name as written in the environment
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStrategy::Sequential => "SEQUENTIAL",
            UpdateStrategy::Parallel => "PARALLEL",
            UpdateStrategy::Disabled => "DISABLED",
        }
    }
}

/// Dataset selection and transfer settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Region selector, `None` means the full planet dump
    #[serde(default)]
    pub region: Option<String>,

    /// Explicit archive URL, overrides region based URL resolution
    #[serde(default)]
    pub file_url: Option<String>,

    /// Dump host (default: "https://r2.koalasec.org/public")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Dump format version embedded in archive names (default: "0.7OS")
    #[serde(default = "default_dataset_version")]
    pub dataset_version: String,

    /// Skip downloading and verifying the `.md5` companion file
    #[serde(default)]
    pub skip_checksum: bool,

    /// Bytes written between two checkpoint saves (default: 1 MiB)
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_bytes: u64,

    /// Time between two throughput log lines (default: 10 seconds)
    #[serde(default = "default_progress_log_interval", with = "duration_serde")]
    pub progress_log_interval: Duration,

    /// Connect timeout for archive requests (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Maximum silence between two body reads (default: 60 seconds)
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// Timeout for HEAD probes (default: 5 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            region: None,
            file_url: None,
            base_url: default_base_url(),
            dataset_version: default_dataset_version(),
            skip_checksum: false,
            checkpoint_interval_bytes: default_checkpoint_interval(),
            progress_log_interval: default_progress_log_interval(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            probe_timeout: default_probe_timeout(),
        }
    }
}

/// Retry configuration for transient transport failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of transfer attempts, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between attempts (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Disk space estimation factors
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskSpaceConfig {
    /// Extracted size as a percentage of the archive size (default: 163)
    #[serde(default = "default_extraction_ratio_percent")]
    pub extraction_ratio_percent: u64,

    /// Informational parallel-mode total as a percentage of the archive size (default: 170)
    #[serde(default = "default_parallel_total_percent")]
    pub parallel_total_percent: u64,
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            extraction_ratio_percent: default_extraction_ratio_percent(),
            parallel_total_percent: default_parallel_total_percent(),
        }
    }
}

/// Filesystem layout of the container
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base data directory (default: "/photon/data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl PathsConfig {
    /// Directory holding the published index
    pub fn photon_data_dir(&self) -> PathBuf {
        self.data_dir.join("photon_data")
    }

    /// Staging directory for archives and extraction
    pub fn temp_dir(&self) -> PathBuf {
        self.data_dir.join("temp")
    }

    /// Elasticsearch/OpenSearch node directory inside the published index
    pub fn node_dir(&self) -> PathBuf {
        self.photon_data_dir().join("node_1")
    }
}

/// Notification configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Webhook URLs receiving status messages
    #[serde(default)]
    pub webhook_urls: Vec<String>,

    /// Timeout per webhook request (default: 10 seconds)
    #[serde(default = "default_webhook_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_urls: Vec::new(),
            timeout: default_webhook_timeout(),
        }
    }
}

/// Main configuration for the updater
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Strategy used for forced and scheduled updates
    #[serde(default)]
    pub strategy: UpdateStrategy,

    /// Interval between scheduled updates, as written (default: "30d")
    #[serde(default = "default_update_interval")]
    pub update_interval: String,

    /// Run an update at startup even if an index exists
    #[serde(default)]
    pub force_update: bool,

    /// Download an index at startup when none exists (default: true)
    #[serde(default = "default_true")]
    pub initial_download: bool,

    /// Log level name (default: "INFO")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Dataset selection and transfer settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry settings for transfers
    #[serde(default)]
    pub retry: RetryConfig,

    /// Disk space estimation factors
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,

    /// Container filesystem layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// Notification settings
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: UpdateStrategy::default(),
            update_interval: default_update_interval(),
            force_update: false,
            initial_download: true,
            log_level: default_log_level(),
            download: DownloadConfig::default(),
            retry: RetryConfig::default(),
            disk_space: DiskSpaceConfig::default(),
            paths: PathsConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl Config {
    /// Build the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    ///
    /// Unset variables fall back to defaults. Values that cannot be parsed are
    /// reported as configuration errors naming the variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str, default: bool| get(key).map(|v| parse_bool(&v)).unwrap_or(default);

        let mut config = Config {
            force_update: flag("FORCE_UPDATE", false),
            initial_download: flag("INITIAL_DOWNLOAD", true),
            ..Default::default()
        };

        if let Some(value) = get("UPDATE_STRATEGY") {
            config.strategy = UpdateStrategy::parse(&value)?;
        }
        if let Some(value) = get("UPDATE_INTERVAL") {
            config.update_interval = value.trim().to_string();
        }
        if let Some(value) = get("LOG_LEVEL") {
            config.log_level = value.trim().to_string();
        }

        config.download.region = get("REGION").map(|v| v.trim().to_string());
        config.download.file_url = get("FILE_URL").map(|v| v.trim().to_string());
        config.download.skip_checksum = flag("SKIP_MD5_CHECK", false);
        if let Some(value) = get("BASE_URL") {
            config.download.base_url = value.trim().trim_end_matches('/').to_string();
        }

        if let Some(value) = get("DOWNLOAD_MAX_RETRIES") {
            config.retry.max_attempts = value.trim().parse().map_err(|_| {
                Error::config(
                    "DOWNLOAD_MAX_RETRIES",
                    format!("'{value}' is not a non-negative integer"),
                )
            })?;
        }

        if let Some(value) = get("DATA_DIR") {
            config.paths.data_dir = PathBuf::from(value.trim());
        }

        if let Some(value) = get("NOTIFY_URLS") {
            config.notifications.webhook_urls = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(config)
    }

    /// Parsed scheduler interval
    pub fn update_interval(&self) -> Result<Duration> {
        parse_interval(&self.update_interval)
    }

    /// Check settings that can be verified without network access
    ///
    /// Region resolvability is checked separately by the caller, which owns
    /// the region catalogue.
    pub fn validate(&self) -> Result<()> {
        self.update_interval()?;

        if self.retry.max_attempts == 0 {
            return Err(Error::config(
                "DOWNLOAD_MAX_RETRIES",
                "at least one download attempt is required",
            ));
        }

        url::Url::parse(&self.download.base_url)
            .map_err(|e| Error::config("BASE_URL", format!("invalid URL: {e}")))?;

        if let Some(file_url) = &self.download.file_url {
            url::Url::parse(file_url)
                .map_err(|e| Error::config("FILE_URL", format!("invalid URL: {e}")))?;
        }

        for webhook in &self.notifications.webhook_urls {
            url::Url::parse(webhook)
                .map_err(|e| Error::config("NOTIFY_URLS", format!("invalid URL '{webhook}': {e}")))?;
        }

        Ok(())
    }
}

/// Map a `LOG_LEVEL` name to a tracing filter directive
///
/// Accepts tracing names as well as the classic `WARNING`/`CRITICAL`
/// spellings; anything unrecognized falls back to `info`.
pub fn log_directive(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" | "fatal" => "error",
        "off" => "off",
        _ => "info",
    }
}

/// Parse a boolean environment value (`true`, `1`, `t`, case-insensitive)
pub fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "t")
}

/// Parse an update interval such as `30d`, `12h`, `15m` or plain seconds
pub fn parse_interval(value: &str) -> Result<Duration> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(interval_pattern);

    let invalid = || {
        Error::config(
            "UPDATE_INTERVAL",
            format!("invalid interval '{value}', expected a number followed by d, h, m or s"),
        )
    };

    let caps = pattern.captures(value).ok_or_else(invalid)?;
    let amount: u64 = caps[1].parse().map_err(|_| invalid())?;
    let unit_secs = match caps[2].to_ascii_lowercase().as_str() {
        "d" => 86_400,
        "h" => 3_600,
        "m" => 60,
        _ => 1,
    };

    let secs = amount.checked_mul(unit_secs).ok_or_else(invalid)?;
    if secs == 0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs(secs))
}

#[allow(clippy::unwrap_used)]
fn interval_pattern() -> Regex {
    Regex::new(r"^(?i)\s*(\d+)\s*([dhms]?)\s*$").unwrap()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_dataset_version() -> String {
    "0.7OS".to_string()
}

fn default_checkpoint_interval() -> u64 {
    1024 * 1024
}

fn default_progress_log_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_extraction_ratio_percent() -> u64 {
    163
}

fn default_parallel_total_percent() -> u64 {
    170
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/photon/data")
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_update_interval() -> String {
    "30d".to_string()
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();

        assert_eq!(config.strategy, UpdateStrategy::Sequential);
        assert_eq!(config.update_interval, "30d");
        assert!(!config.force_update);
        assert!(config.initial_download);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.download.base_url, DEFAULT_BASE_URL);
        assert!(!config.download.skip_checksum);
        assert_eq!(config.download.checkpoint_interval_bytes, 1024 * 1024);
        assert_eq!(config.paths.data_dir, PathBuf::from("/photon/data"));
        assert!(config.notifications.webhook_urls.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn environment_values_override_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("UPDATE_STRATEGY", "parallel"),
            ("UPDATE_INTERVAL", "12h"),
            ("REGION", " Germany "),
            ("FORCE_UPDATE", "T"),
            ("DOWNLOAD_MAX_RETRIES", "5"),
            ("BASE_URL", "https://mirror.example.com/dumps/"),
            ("SKIP_MD5_CHECK", "1"),
            ("INITIAL_DOWNLOAD", "false"),
            ("DATA_DIR", "/srv/photon"),
            ("NOTIFY_URLS", "https://a.example.com/hook, ,https://b.example.com/hook"),
        ]))
        .unwrap();

        assert_eq!(config.strategy, UpdateStrategy::Parallel);
        assert_eq!(config.update_interval().unwrap(), Duration::from_secs(12 * 3600));
        assert_eq!(config.download.region.as_deref(), Some("Germany"));
        assert!(config.force_update);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.download.base_url, "https://mirror.example.com/dumps");
        assert!(config.download.skip_checksum);
        assert!(!config.initial_download);
        assert_eq!(config.paths.temp_dir(), PathBuf::from("/srv/photon/temp"));
        assert_eq!(
            config.paths.node_dir(),
            PathBuf::from("/srv/photon/photon_data/node_1")
        );
        assert_eq!(config.notifications.webhook_urls.len(), 2);
    }

    #[test]
    fn blank_values_are_treated_as_unset() {
        let config = Config::from_lookup(lookup_from(&[("REGION", "  "), ("FILE_URL", "")])).unwrap();

        assert!(config.download.region.is_none());
        assert!(config.download.file_url.is_none());
    }

    #[test]
    fn invalid_strategy_names_the_variable() {
        let err = Config::from_lookup(lookup_from(&[("UPDATE_STRATEGY", "rolling")])).unwrap_err();

        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("UPDATE_STRATEGY")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn non_numeric_retries_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[("DOWNLOAD_MAX_RETRIES", "three")])).unwrap_err();
        assert!(err.to_string().contains("three"));
    }

    #[test]
    fn zero_retries_fail_validation() {
        let config = Config::from_lookup(lookup_from(&[("DOWNLOAD_MAX_RETRIES", "0")])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_urls_fail_validation() {
        let config = Config::from_lookup(lookup_from(&[("FILE_URL", "not a url")])).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "FILE_URL"));
    }

    #[test]
    fn parse_bool_accepts_the_documented_spellings() {
        for value in ["true", "TRUE", "1", "t", " T "] {
            assert!(parse_bool(value), "{value} should be true");
        }
        for value in ["false", "0", "yes", "", "f"] {
            assert!(!parse_bool(value), "{value} should be false");
        }
    }

    #[test]
    fn log_levels_map_to_directives() {
        assert_eq!(log_directive("INFO"), "info");
        assert_eq!(log_directive("WARNING"), "warn");
        assert_eq!(log_directive("Critical"), "error");
        assert_eq!(log_directive("debug"), "debug");
        assert_eq!(log_directive("chatty"), "info");
    }

    #[test]
    fn parse_interval_units() {
        assert_eq!(parse_interval("30d").unwrap(), Duration::from_secs(30 * 86_400));
        assert_eq!(parse_interval("12h").unwrap(), Duration::from_secs(12 * 3_600));
        assert_eq!(parse_interval("15M").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_interval("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_interval("3600").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn parse_interval_rejects_garbage() {
        for value in ["", "d", "1w", "-5m", "0h", "1.5d"] {
            assert!(parse_interval(value).is_err(), "{value} should be rejected");
        }
    }

    #[test]
    fn strategy_round_trips_through_its_name() {
        for strategy in [
            UpdateStrategy::Sequential,
            UpdateStrategy::Parallel,
            UpdateStrategy::Disabled,
        ] {
            assert_eq!(UpdateStrategy::parse(strategy.as_str()).unwrap(), strategy);
        }
    }

    #[test]
    fn config_default_survives_json_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(back.strategy, config.strategy);
        assert_eq!(back.download.base_url, config.download.base_url);
        assert_eq!(back.retry.initial_delay, config.retry.initial_delay);
        assert_eq!(back.paths.data_dir, config.paths.data_dir);
    }
}
