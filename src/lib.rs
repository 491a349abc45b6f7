//! Bangumi collector: a resumable catalogue harvester
//!
//! This crate discovers subject identifiers from the paginated ranking pages of
//! a catalogue site, fetches every subject's detail record from its JSON API in
//! fixed-size batches, flattens the nested fields into table rows, and rewrites
//! the collected table to disk after every batch so an interrupted run never
//! leaves a half-written file behind.

pub mod config;
pub mod crawler;
pub mod storage;
pub mod subject;

use thiserror::Error;

/// Main error type for collector operations
///
/// Only configuration and persistence problems surface as this type.
/// Per-item fetch and parse failures are absorbed by the crawler and end up
/// as missing rows plus a failure-log line.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid header value for {name}: {message}")]
    Header { name: String, message: String },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to replace {path}: {source}")]
    Persist {
        path: String,
        source: std::io::Error,
    },

    #[error("Malformed checkpoint {path}: {message}")]
    Checkpoint { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown entity type '{0}' (expected one of: anime, book, music, game, real)")]
    UnknownEntityType(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, CollectError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, DetailCollector, Fetcher, RankScanner, RunSummary};
pub use storage::{FailureSink, FileFailureSink, IdentifierStore, RecordTable};
pub use subject::{flatten, EntityType, FlatRecord, SubjectId};
