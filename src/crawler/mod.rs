//! Crawler module for ranking scans and detail collection
//!
//! This module contains the network-facing logic, including:
//! - HTTP fetching with a bounded pool, retry and backoff
//! - Ranking page parsing and identifier extraction
//! - Batched detail collection with per-batch persistence
//! - Overall run coordination

mod coordinator;
mod detail;
mod fetcher;
mod parser;
mod rank;

pub use coordinator::{Coordinator, RunPlan, RunSummary};
pub use detail::{plan_batches, DetailCollector, RecordError, DEFAULT_BATCH_SIZE};
pub use fetcher::{
    build_http_client, FetchFailure, FetchOutcome, Fetcher, RetryPolicy, DEFAULT_BASE_DELAY_MS,
    DEFAULT_CONCURRENCY, DEFAULT_JITTER_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT_SECS,
};
pub use parser::{extract_subject_ids, COVER_SELECTOR};
pub use rank::RankScanner;

use crate::config::Config;
use crate::CollectError;
use url::Url;

/// Runs a complete collection
///
/// This is the main entry point for a run. It will:
/// 1. Validate the configuration and create the data directory
/// 2. Reuse the identifier checkpoint, or scan the ranking pages
/// 3. Collect detail records batch by batch
///
/// # Arguments
///
/// * `config` - The collector configuration
/// * `fresh` - Rescan the ranking pages even when a checkpoint exists
///
/// # Returns
///
/// * `Ok(RunSummary)` - Collection finished
/// * `Err(CollectError)` - Configuration or persistence failure
pub async fn collect(config: Config, fresh: bool) -> Result<RunSummary, CollectError> {
    Coordinator::new(config)?.run(fresh).await
}

/// Parses a base URL so that relative joins append to its path
///
/// `https://api.example.com/v0` joined with `subjects/1` must give
/// `https://api.example.com/v0/subjects/1`, which needs a trailing slash.
pub(crate) fn base_url(raw: &str) -> Result<Url, CollectError> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
