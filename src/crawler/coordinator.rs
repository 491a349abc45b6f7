//! Collection coordinator - run orchestration
//!
//! This module wires the pieces of a run together:
//! - Validating the configuration and preparing the data directory
//! - Reusing an identifier checkpoint or scanning the ranking pages
//! - Driving the batched detail collection
//! - Reporting a summary of the run

use crate::config::{validate, Config};
use crate::crawler::rank::ranking_page_url;
use crate::crawler::{
    base_url, build_http_client, DetailCollector, Fetcher, RankScanner, RetryPolicy,
};
use crate::storage::{CheckpointKey, FailureSink, FileFailureSink, IdentifierStore};
use crate::subject::{EntityType, SubjectId};
use crate::CollectError;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// What a run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub entity_type: EntityType,
    /// Identifiers handed to the detail collector
    pub identifiers: usize,
    /// True when identifiers came from an existing checkpoint
    pub checkpoint_reused: bool,
    /// Rows in the persisted table
    pub records: usize,
    /// URLs written to the failure log during this run
    pub failures: usize,
    pub table_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// What a run would do, computed without network access or writes
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub entity_type: EntityType,
    pub checkpoint: CheckpointKey,
    pub checkpoint_path: PathBuf,
    pub checkpoint_exists: bool,
    pub page_urls: Vec<Url>,
    pub table_path: PathBuf,
    pub failure_log: PathBuf,
}

impl RunPlan {
    /// Resolves the plan for `config`
    ///
    /// # Returns
    ///
    /// * `Ok(RunPlan)` - The configuration is valid
    /// * `Err(CollectError)` - Validation failed
    pub fn from_config(config: &Config) -> Result<Self, CollectError> {
        validate(config)?;
        let entity_type = config.entity_type()?;
        let data_dir = &config.output.data_dir;

        let checkpoint = CheckpointKey::new(entity_type, config.crawler.start, config.crawler.end);
        let store = IdentifierStore::new(data_dir);

        let site = base_url(&config.endpoints.site_url)?;
        let page_urls = (config.crawler.start..=config.crawler.end)
            .map(|page| ranking_page_url(&site, entity_type, page))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            entity_type,
            checkpoint,
            checkpoint_path: store.path(&checkpoint),
            checkpoint_exists: store.exists(&checkpoint),
            page_urls,
            table_path: table_path(data_dir, entity_type),
            failure_log: config.output.failure_log_path(),
        })
    }
}

/// Location of the record table for an entity type
pub fn table_path(data_dir: &Path, entity_type: EntityType) -> PathBuf {
    data_dir.join(format!("{}_infos.csv", entity_type))
}

/// Main collection coordinator structure
pub struct Coordinator {
    config: Config,
    entity_type: EntityType,
    failures: Arc<FileFailureSink>,
    scanner: RankScanner,
    collector: DetailCollector,
    store: IdentifierStore,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// Validates the configuration and creates the data directory. Nothing
    /// touches the network until `run` is called.
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CollectError)` - Invalid configuration or unusable data directory
    pub fn new(config: Config) -> Result<Self, CollectError> {
        validate(&config)?;
        let entity_type = config.entity_type()?;

        let data_dir = config.output.data_dir.clone();
        std::fs::create_dir_all(&data_dir)?;

        let failures = Arc::new(FileFailureSink::new(config.output.failure_log_path()));
        let sink: Arc<dyn FailureSink> = failures.clone();

        let crawler = &config.crawler;
        let client = build_http_client(&config.request, Duration::from_secs(crawler.timeout_secs))?;
        let policy = RetryPolicy::new(
            crawler.max_retries,
            Duration::from_millis(crawler.retry_base_delay_ms),
            Duration::from_millis(crawler.retry_jitter_ms),
        );
        let fetcher = Arc::new(Fetcher::new(client, policy, crawler.concurrency, sink));

        let store = IdentifierStore::new(&data_dir);
        let scanner = RankScanner::new(
            Arc::clone(&fetcher),
            &config.endpoints.site_url,
            store.clone(),
        )?;
        let collector = DetailCollector::new(
            fetcher,
            &config.endpoints.api_url,
            crawler.batch_size,
            table_path(&data_dir, entity_type),
        )?
        .with_drop_fields(config.output.drop_fields.clone());

        Ok(Self {
            config,
            entity_type,
            failures,
            scanner,
            collector,
            store,
        })
    }

    /// Runs the collection
    ///
    /// 1. Loads identifiers from the checkpoint for this exact page range, or
    ///    scans the ranking pages when there is none (or `fresh` is set)
    /// 2. Collects detail records batch by batch
    pub async fn run(&self, fresh: bool) -> Result<RunSummary, CollectError> {
        let started_at = Utc::now();
        let failures_before = self.failures.recorded_count();

        let (identifiers, checkpoint_reused) = self.resolve_identifiers(fresh).await?;
        tracing::info!(
            "Collecting {} {} subjects in batches of {}",
            identifiers.len(),
            self.entity_type,
            self.config.crawler.batch_size
        );

        let table = self.collector.collect(&identifiers).await?;

        let summary = RunSummary {
            entity_type: self.entity_type,
            identifiers: identifiers.len(),
            checkpoint_reused,
            records: table.len(),
            failures: self.failures.recorded_count() - failures_before,
            table_path: self.collector.output_path().to_path_buf(),
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            "Run finished: {} of {} subjects collected, {} failed URLs logged to {}",
            summary.records,
            summary.identifiers,
            summary.failures,
            self.failures.path().display()
        );

        Ok(summary)
    }

    async fn resolve_identifiers(&self, fresh: bool) -> Result<(Vec<SubjectId>, bool), CollectError> {
        let crawler = &self.config.crawler;
        let key = CheckpointKey::new(self.entity_type, crawler.start, crawler.end);

        if !fresh && self.store.exists(&key) {
            let identifiers = self.store.load(&key)?;
            tracing::info!(
                "Reusing {} identifiers from {}",
                identifiers.len(),
                self.store.path(&key).display()
            );
            return Ok((identifiers, true));
        }

        if fresh {
            tracing::info!("Fresh run: rescanning ranking pages");
        }

        let identifiers = self
            .scanner
            .scan(self.entity_type, crawler.start, crawler.end)
            .await?;
        Ok((identifiers.into_iter().collect(), false))
    }
}
