use crate::crawler::{
    DEFAULT_BASE_DELAY_MS, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_JITTER_MS,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT_SECS,
};
use crate::subject::EntityType;
use crate::ConfigResult;
use serde::Deserialize;
use std::path::PathBuf;

/// User-Agent sent when the configuration does not name one
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36 Edg/113.0.1774.57";

/// Main configuration structure for the collector
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub request: RequestConfig,
    pub endpoints: EndpointConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Parses the configured entity type
    pub fn entity_type(&self) -> ConfigResult<EntityType> {
        self.crawler.entity_type.parse()
    }
}

/// Crawl target and fetch behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Entity type to collect (anime, book, music, game, real)
    #[serde(rename = "type")]
    pub entity_type: String,

    /// First ranking page to scan (1-based, inclusive)
    pub start: u32,

    /// Last ranking page to scan (inclusive)
    pub end: u32,

    /// Number of subjects fetched and flushed together
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Width of the concurrent fetch pool
    pub concurrency: usize,

    /// Attempts per URL before it is written to the failure log
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Fixed part of the delay between attempts (milliseconds)
    #[serde(rename = "retry-base-delay-ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound of the random part of the delay between attempts (milliseconds)
    #[serde(rename = "retry-jitter-ms")]
    pub retry_jitter_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            entity_type: "music".to_string(),
            start: 1,
            end: 50,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_BASE_DELAY_MS,
            retry_jitter_ms: DEFAULT_JITTER_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Request identification
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// API access token, sent as a bearer token when present
    #[serde(rename = "access-token")]
    pub access_token: Option<String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            access_token: None,
        }
    }
}

/// Remote endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL of the HTML site hosting the ranking pages
    #[serde(rename = "site-url")]
    pub site_url: String,

    /// Base URL of the JSON API serving `/subjects/{id}`
    #[serde(rename = "api-url")]
    pub api_url: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            site_url: "https://bgm.tv".to_string(),
            api_url: "https://api.bgm.tv/v0".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving checkpoints, the record table and the failure log
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,

    /// Failure log path, relative paths resolve inside `data_dir`
    #[serde(rename = "failure-log")]
    pub failure_log: PathBuf,

    /// Top-level detail keys removed before flattening
    #[serde(rename = "drop-fields")]
    pub drop_fields: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            failure_log: PathBuf::from("failed_urls.txt"),
            drop_fields: Vec::new(),
        }
    }
}

impl OutputConfig {
    /// Resolved location of the failure log
    pub fn failure_log_path(&self) -> PathBuf {
        if self.failure_log.is_absolute() {
            self.failure_log.clone()
        } else {
            self.data_dir.join(&self.failure_log)
        }
    }
}
