use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Command-line values that take precedence over the configuration file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub entity_type: Option<String>,
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub user_agent: Option<String>,
    pub access_token: Option<String>,
    pub data_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Writes every override that is set into `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(entity_type) = &self.entity_type {
            config.crawler.entity_type = entity_type.clone();
        }
        if let Some(start) = self.start {
            config.crawler.start = start;
        }
        if let Some(end) = self.end {
            config.crawler.end = end;
        }
        if let Some(user_agent) = &self.user_agent {
            config.request.user_agent = user_agent.clone();
        }
        if let Some(token) = &self.access_token {
            config.request.access_token = Some(token.clone());
        }
        if let Some(data_dir) = &self.data_dir {
            config.output.data_dir = data_dir.clone();
        }
    }
}

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use bangumi_collector::config::load_config;
///
/// let config = load_config(Path::new("collector.toml")).unwrap();
/// println!("Collecting {} pages {}..={}", config.crawler.entity_type, config.crawler.start, config.crawler.end);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = parse_config_file(path)?;
    validate(&config)?;
    Ok(config)
}

/// Reads and parses a configuration file without validating it
fn parse_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so runs can be matched to the configuration that
/// produced them.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Builds the effective configuration for a run
///
/// Starts from the file at `path` (or the defaults when no file is given),
/// applies the command-line overrides, then validates the result.
///
/// # Returns
///
/// * `Ok((Config, Option<String>))` - The configuration and, when a file was read, its hash
/// * `Err(ConfigError)` - Failed to load, parse, or validate
pub fn resolve_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<(Config, Option<String>), ConfigError> {
    let (mut config, hash) = match path {
        Some(path) => (parse_config_file(path)?, Some(compute_config_hash(path)?)),
        None => (Config::default(), None),
    };

    overrides.apply(&mut config);
    validate(&config)?;

    Ok((config, hash))
}
