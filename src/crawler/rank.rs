//! Ranking page scanner
//!
//! Walks `{site}/{type}/browser?sort=rank&page=N` for every page of the
//! requested range, collects subject identifiers into a set, and checkpoints
//! the set through the identifier store.

use crate::crawler::parser::extract_subject_ids;
use crate::crawler::{base_url, Fetcher};
use crate::storage::{CheckpointKey, IdentifierStore};
use crate::subject::{EntityType, SubjectId};
use crate::{CollectError, ConfigError};
use std::collections::BTreeSet;
use std::sync::Arc;
use url::Url;

/// Builds `{site}/{type}/browser?sort=rank&page={page}`
///
/// `site` must be a base URL as produced by `base_url`.
pub(crate) fn ranking_page_url(
    site: &Url,
    entity_type: EntityType,
    page: u32,
) -> Result<Url, CollectError> {
    let mut url = site.join(&format!("{}/browser", entity_type))?;
    url.query_pairs_mut()
        .append_pair("sort", "rank")
        .append_pair("page", &page.to_string());
    Ok(url)
}

/// Collects subject identifiers from ranking pages
pub struct RankScanner {
    fetcher: Arc<Fetcher>,
    site_url: Url,
    store: IdentifierStore,
}

impl RankScanner {
    /// Creates a scanner for the site at `site_url`
    ///
    /// # Returns
    ///
    /// * `Ok(RankScanner)` - Ready to scan
    /// * `Err(CollectError)` - `site_url` is not a valid base URL
    pub fn new(
        fetcher: Arc<Fetcher>,
        site_url: &str,
        store: IdentifierStore,
    ) -> Result<Self, CollectError> {
        Ok(Self {
            fetcher,
            site_url: base_url(site_url)?,
            store,
        })
    }

    /// URL of one ranking page
    pub fn page_url(&self, entity_type: EntityType, page: u32) -> Result<Url, CollectError> {
        ranking_page_url(&self.site_url, entity_type, page)
    }

    /// Scans pages `start_page..=end_page` and checkpoints the result
    ///
    /// Pages are fetched one at a time. The scan stops at the first page that
    /// cannot be fetched at all, since later pages are assumed to be equally
    /// unreachable. Whatever was collected up to that point is saved under
    /// `(entity_type, start_page, end_page)`.
    ///
    /// # Returns
    ///
    /// * `Ok(BTreeSet<SubjectId>)` - The de-duplicated identifiers
    /// * `Err(CollectError)` - Invalid page range or the checkpoint could not be written
    pub async fn scan(
        &self,
        entity_type: EntityType,
        start_page: u32,
        end_page: u32,
    ) -> Result<BTreeSet<SubjectId>, CollectError> {
        if start_page < 1 || start_page > end_page {
            return Err(ConfigError::Validation(format!(
                "invalid page range {}..={}",
                start_page, end_page
            ))
            .into());
        }

        let mut identifiers = BTreeSet::new();

        for page in start_page..=end_page {
            let url = self.page_url(entity_type, page)?;
            let outcome = self.fetcher.fetch(url.as_str()).await;

            let html = match outcome.result {
                Ok(html) => html,
                Err(failure) => {
                    tracing::warn!(
                        "Stopping {} ranking scan at page {}: {}",
                        entity_type,
                        page,
                        failure
                    );
                    break;
                }
            };

            let before = identifiers.len();
            identifiers.extend(extract_subject_ids(&html));
            tracing::info!(
                "Ranking page {}/{}: {} new identifiers ({} total)",
                page,
                end_page,
                identifiers.len() - before,
                identifiers.len()
            );
        }

        let key = CheckpointKey::new(entity_type, start_page, end_page);
        let ordered: Vec<SubjectId> = identifiers.iter().cloned().collect();
        self.store.save(&key, &ordered)?;

        Ok(identifiers)
    }
}
