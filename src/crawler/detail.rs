//! Detail record collection
//!
//! Identifiers are processed in fixed-size batches. Each batch is fetched
//! concurrently, flattened, appended to the running table, and the whole
//! table is written to disk before the next batch starts. A crash therefore
//! loses at most the batch in flight.

use crate::crawler::{base_url, Fetcher};
use crate::storage::RecordTable;
use crate::subject::{flatten, FlatRecord, FlattenError, SubjectId};
use crate::{CollectError, ConfigError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Default number of subjects per batch
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Why one fetched body did not become a row
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected record shape: {0}")]
    Schema(#[from] FlattenError),
}

/// Splits identifiers into consecutive batches of `batch_size`
///
/// Every identifier lands in exactly one batch; only the last batch may be
/// shorter. A batch size of 0 is treated as 1.
pub fn plan_batches(identifiers: &[SubjectId], batch_size: usize) -> std::slice::Chunks<'_, SubjectId> {
    identifiers.chunks(batch_size.max(1))
}

/// Fetches, flattens and persists subject detail records
pub struct DetailCollector {
    fetcher: Arc<Fetcher>,
    api_url: Url,
    batch_size: usize,
    drop_fields: Vec<String>,
    output_path: PathBuf,
}

impl DetailCollector {
    /// Creates a collector writing its table to `output_path`
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Shared fetcher (its pool width bounds each batch)
    /// * `api_url` - Base URL of the detail API
    /// * `batch_size` - Subjects per fetch-and-flush cycle
    /// * `output_path` - CSV file rewritten after every batch
    pub fn new(
        fetcher: Arc<Fetcher>,
        api_url: &str,
        batch_size: usize,
        output_path: impl Into<PathBuf>,
    ) -> Result<Self, CollectError> {
        Ok(Self {
            fetcher,
            api_url: base_url(api_url)?,
            batch_size: batch_size.max(1),
            drop_fields: Vec::new(),
            output_path: output_path.into(),
        })
    }

    /// Removes the given top-level keys from every record before flattening
    pub fn with_drop_fields(mut self, fields: Vec<String>) -> Self {
        self.drop_fields = fields;
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Detail API URL for one subject
    ///
    /// The identifier is pushed as a single percent-encoded path segment, so
    /// a token such as `a/b` or `..` from an edited checkpoint stays under
    /// `subjects/`.
    pub fn detail_url(&self, id: &SubjectId) -> Result<Url, CollectError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| ConfigError::InvalidUrl(format!("{} cannot be a base URL", self.api_url)))?
            .pop_if_empty()
            .push("subjects")
            .push(id.as_str());
        Ok(url)
    }

    /// Collects every identifier, flushing the table after each batch
    ///
    /// Subjects whose fetch failed permanently, or whose body cannot be
    /// flattened, are left out of the table. Within a batch, rows keep the
    /// order of `identifiers` regardless of which request finished first.
    ///
    /// # Returns
    ///
    /// * `Ok(RecordTable)` - All rows collected in this run
    /// * `Err(CollectError)` - A URL could not be built or the table could not be written
    pub async fn collect(&self, identifiers: &[SubjectId]) -> Result<RecordTable, CollectError> {
        let mut table = RecordTable::new();
        let total_batches = identifiers.len().div_ceil(self.batch_size);

        for (batch, chunk) in plan_batches(identifiers, self.batch_size).enumerate() {
            let urls = chunk
                .iter()
                .map(|id| self.detail_url(id).map(String::from))
                .collect::<Result<Vec<_>, _>>()?;

            let mut outcomes = self.fetcher.fetch_all(urls).await;
            outcomes.sort_by_key(|outcome| outcome.index);

            for outcome in outcomes {
                let Ok(body) = outcome.result else {
                    continue;
                };
                match self.parse_record(&body) {
                    Ok(record) => table.push(record),
                    Err(e) => tracing::warn!("Skipping {}: {}", outcome.url, e),
                }
            }

            table.persist(&self.output_path)?;
            tracing::info!(
                "Collected {} records so far (batch {}/{})",
                table.len(),
                batch + 1,
                total_batches
            );
        }

        if total_batches == 0 {
            table.persist(&self.output_path)?;
            tracing::info!("No identifiers to collect");
        }

        Ok(table)
    }

    /// Parses and flattens one detail body
    pub fn parse_record(&self, body: &str) -> Result<FlatRecord, RecordError> {
        let mut raw: Value = serde_json::from_str(body)?;
        if let Value::Object(fields) = &mut raw {
            fields.retain(|key, _| !self.drop_fields.contains(key));
        }
        Ok(flatten(raw)?)
    }
}
