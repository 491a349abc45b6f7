//! Configuration module for the collector
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and merging command-line overrides on top of them. Every key has a default,
//! so a run works without any file at all.
//!
//! # Example
//!
//! ```no_run
//! use bangumi_collector::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("collector.toml")).unwrap();
//! println!("Batch size: {}", config.crawler.batch_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, EndpointConfig, OutputConfig, RequestConfig, DEFAULT_USER_AGENT,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, resolve_config, ConfigOverrides};
pub use validation::validate;
