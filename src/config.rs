//! Configuration types for edms-crawler
//!
//! A [`Config`] is built once at process start (usually via [`Config::from_env`])
//! and handed by reference to every component constructor. Nothing below this
//! module reads the environment.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// DMS endpoint and protocol settings
#[derive(Clone, Serialize, Deserialize)]
pub struct DmsConfig {
    /// URL of the service port (login, locate)
    pub service_url: String,

    /// URL of the object port (open stream, read, release)
    pub object_url: String,

    /// DMS account name
    pub username: String,

    /// DMS account password
    pub password: String,

    /// Target library searched by locate calls (default: "RTA_MAIN")
    #[serde(default = "default_library")]
    pub library: String,

    /// Login context sent with the login record (default: "RTA_MAIN")
    #[serde(default = "default_library")]
    pub login_context: String,

    /// Network tag sent with the login record (default: 0)
    #[serde(default)]
    pub network: i32,

    /// Version selector criterion (default: "%VERSION_TO_INDEX")
    #[serde(default = "default_version_selector")]
    pub version_selector: String,

    /// Bytes requested per chunk read (default: 65536)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Upper bound for a single remote call (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Largest document accepted before the read loop aborts (default: 512 MiB)
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,

    /// SOAP service namespace, also the SOAPAction prefix (default: "http://tempuri.org/")
    #[serde(default = "default_soap_namespace")]
    pub soap_namespace: String,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            service_url: String::new(),
            object_url: String::new(),
            username: String::new(),
            password: String::new(),
            library: default_library(),
            login_context: default_library(),
            network: 0,
            version_selector: default_version_selector(),
            chunk_size: default_chunk_size(),
            request_timeout: default_request_timeout(),
            max_document_bytes: default_max_document_bytes(),
            soap_namespace: default_soap_namespace(),
        }
    }
}

impl std::fmt::Debug for DmsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmsConfig")
            .field("service_url", &self.service_url)
            .field("object_url", &self.object_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("library", &self.library)
            .field("login_context", &self.login_context)
            .field("network", &self.network)
            .field("version_selector", &self.version_selector)
            .field("chunk_size", &self.chunk_size)
            .field("request_timeout", &self.request_timeout)
            .field("max_document_bytes", &self.max_document_bytes)
            .field("soap_namespace", &self.soap_namespace)
            .finish()
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Captioning service settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaptionConfig {
    /// Upload endpoint
    pub url: String,

    /// Request timeout (default: 120 seconds)
    #[serde(default = "default_caption_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Multipart field carrying the image (default: "image_file")
    #[serde(default = "default_file_field")]
    pub file_field: String,

    /// Content type declared for the image part (default: "application/octet-stream")
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Retry policy for transient failures (default: 2 retries)
    #[serde(default = "default_caption_retry")]
    pub retry: RetryConfig,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: default_caption_timeout(),
            file_field: default_file_field(),
            content_type: default_content_type(),
            retry: default_caption_retry(),
        }
    }
}

/// Batch driver settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Pending documents fetched per batch (default: 100)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches when running periodically (default: 10 minutes)
    #[serde(default = "default_interval", with = "duration_serde")]
    pub interval: Duration,

    /// Documents retrieved at the same time (default: 1, strictly sequential)
    ///
    /// Every in-flight retrieval owns its own content/stream handle pair.
    /// Keep this small: the DMS's own concurrency limits are unknown.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_retrievals: usize,

    /// Log in again after this many consecutive transport-level failures
    /// (None = never; the session is assumed valid for the whole run)
    #[serde(default)]
    pub reauth_after_failures: Option<u32>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            interval: default_interval(),
            max_concurrent_retrievals: default_max_concurrent(),
            reauth_after_failures: None,
        }
    }
}

/// Data storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./edms.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Log output settings (used by the binary only)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Append log lines to this file in addition to stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Filter directive when RUST_LOG is unset (default: "info")
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            filter: default_log_filter(),
        }
    }
}

/// Main configuration for the crawler
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// DMS endpoint and protocol settings
    pub dms: DmsConfig,

    /// Captioning service settings
    pub caption: CaptionConfig,

    /// Batch driver settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Data storage settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Build a configuration from process environment variables
    ///
    /// Required: `DMS_SERVICE_URL`, `DMS_OBJECT_URL`, `DMS_USER`, `DMS_PASSWORD`,
    /// `IMAGE_PROCESSING_URL`. Everything else falls back to defaults.
    /// The result is validated before it is returned.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::config(key, format!("{key} is not set")))
        };

        let mut config = Config {
            dms: DmsConfig {
                service_url: required("DMS_SERVICE_URL")?,
                object_url: required("DMS_OBJECT_URL")?,
                username: required("DMS_USER")?,
                password: required("DMS_PASSWORD")?,
                ..Default::default()
            },
            caption: CaptionConfig {
                url: required("IMAGE_PROCESSING_URL")?,
                ..Default::default()
            },
            ..Default::default()
        };

        if let Some(library) = lookup("DMS_LIBRARY") {
            config.dms.login_context = library.clone();
            config.dms.library = library;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "DMS_REQUEST_TIMEOUT_SECS")? {
            config.dms.request_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            config.persistence.database_path = PathBuf::from(path);
        }
        if let Some(size) = parse_var(&lookup, "BATCH_SIZE")? {
            config.batch.batch_size = size;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CRAWL_INTERVAL_SECS")? {
            config.batch.interval = Duration::from_secs(secs);
        }
        if let Some(workers) = parse_var(&lookup, "MAX_CONCURRENT_RETRIEVALS")? {
            config.batch.max_concurrent_retrievals = workers;
        }
        if let Some(threshold) = parse_var(&lookup, "REAUTH_AFTER_FAILURES")? {
            config.batch.reauth_after_failures = Some(threshold);
        }
        if let Some(path) = lookup("LOG_FILE") {
            config.logging.log_file = Some(PathBuf::from(path));
        }
        if let Some(filter) = lookup("LOG_FILTER") {
            config.logging.filter = filter;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check settings that would otherwise fail deep inside a batch
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("dms.service_url", &self.dms.service_url),
            ("dms.object_url", &self.dms.object_url),
            ("caption.url", &self.caption.url),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::config(key, format!("invalid URL '{value}': {e}")))?;
        }
        if self.dms.username.is_empty() || self.dms.password.is_empty() {
            return Err(Error::config(
                "dms.username",
                "DMS username and password are required",
            ));
        }
        if self.dms.chunk_size == 0 {
            return Err(Error::config(
                "dms.chunk_size",
                "chunk size must be greater than zero",
            ));
        }
        if self.dms.request_timeout.is_zero() {
            return Err(Error::config(
                "dms.request_timeout",
                "a request timeout is required",
            ));
        }
        if self.batch.batch_size == 0 {
            return Err(Error::config(
                "batch.batch_size",
                "batch size must be greater than zero",
            ));
        }
        if self.batch.max_concurrent_retrievals == 0 {
            return Err(Error::config(
                "batch.max_concurrent_retrievals",
                "at least one retrieval worker is required",
            ));
        }
        if self.batch.reauth_after_failures == Some(0) {
            return Err(Error::config(
                "batch.reauth_after_failures",
                "re-authentication threshold must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::config(key, format!("invalid value '{raw}': {e}"))),
    }
}

fn default_true() -> bool {
    true
}

fn default_library() -> String {
    "RTA_MAIN".into()
}

fn default_version_selector() -> String {
    "%VERSION_TO_INDEX".into()
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_document_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_soap_namespace() -> String {
    "http://tempuri.org/".into()
}

fn default_max_attempts() -> u32 {
    5
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

fn default_caption_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_file_field() -> String {
    "image_file".into()
}

fn default_content_type() -> String {
    "application/octet-stream".into()
}

fn default_caption_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(30),
        ..Default::default()
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_interval() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_max_concurrent() -> usize {
    1
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./edms.db")
}

fn default_log_filter() -> String {
    "info".into()
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
