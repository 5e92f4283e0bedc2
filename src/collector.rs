use crate::fetch::FeedTransport;
use crate::storage::Storage;
use crate::types::{FetchOutcome, Item, ItemState, PipelineError, Result, Source};
use chrono::Utc;
use feed_rs::parser;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Default cap on entries processed per fetch, bounding the work one
/// cycle can take regardless of feed size.
pub const DEFAULT_MAX_ENTRIES_PER_FETCH: usize = 10;

/// Derives the stable identity for an upstream entry from its canonical
/// id or link. Content never participates, so an edited entry keeps its
/// identity and a re-fetched one never duplicates.
pub fn derive_identity(guid_or_link: &str) -> String {
    let digest = Sha256::digest(guid_or_link.as_bytes());
    format!("{digest:x}")
}

/// Fetches feed sources, deduplicates entries and creates new items.
/// Failures are recorded per source and reported as outcomes; nothing
/// escapes `fetch_source` as an error.
pub struct FeedCollector {
    storage: Arc<dyn Storage>,
    transport: Arc<dyn FeedTransport>,
    max_entries: usize,
}

impl FeedCollector {
    pub fn new(storage: Arc<dyn Storage>, transport: Arc<dyn FeedTransport>) -> Self {
        Self {
            storage,
            transport,
            max_entries: DEFAULT_MAX_ENTRIES_PER_FETCH,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Fetches one source. Skips inactive or unknown sources without
    /// touching their error counter; on failure increments it by one and
    /// reports the message; on success commits the new items and the
    /// counter reset as one unit.
    pub async fn fetch_source(&self, source_id: Uuid) -> FetchOutcome {
        let source = match self.storage.get_source(source_id).await {
            Ok(Some(source)) => source,
            Ok(None) => {
                warn!("source {} does not exist, skipping", source_id);
                return FetchOutcome::skipped(source_id, "source not found");
            }
            Err(e) => return FetchOutcome::error(source_id, e.to_string()),
        };

        if !source.is_active {
            debug!("source {} ({}) is inactive, skipping", source_id, source.name);
            return FetchOutcome::skipped(source_id, "source is inactive");
        }

        info!("fetching source: {} ({})", source.name, source.url);

        let new_items = match self.collect_new_items(&source).await {
            Ok(items) => items,
            Err(e) => return self.report_failure(&source, e).await,
        };

        let count = new_items.len();
        if let Err(e) = self.storage.commit_fetch_success(source_id, &new_items).await {
            return self.report_failure(&source, e).await;
        }

        info!("source {} yielded {} new items", source.name, count);
        FetchOutcome::success(source_id, count)
    }

    /// Fetches every active source, isolating failures per source: one
    /// source erroring never aborts the rest.
    pub async fn fetch_all_active(&self) -> Result<Vec<FetchOutcome>> {
        let sources = self.storage.list_active_sources().await?;
        info!("fetching {} active sources", sources.len());

        let mut outcomes = Vec::with_capacity(sources.len());
        for source in sources {
            outcomes.push(self.fetch_source(source.id).await);
        }
        Ok(outcomes)
    }

    async fn collect_new_items(&self, source: &Source) -> Result<Vec<Item>> {
        let feed_url = Url::parse(&source.url)?;
        let body = self.transport.fetch(feed_url.as_str()).await?;
        let feed = parser::parse(body.as_bytes())
            .map_err(|e| PipelineError::Parse(format!("failed to parse feed: {e}")))?;

        let mut new_items = Vec::new();
        let mut seen_in_batch = HashSet::new();

        for entry in feed.entries.into_iter().take(self.max_entries) {
            let link = entry.links.first().map(|l| l.href.clone());
            let guid_or_link = if !entry.id.is_empty() {
                entry.id.clone()
            } else {
                match &link {
                    Some(link) => link.clone(),
                    None => {
                        debug!("entry without id or link, skipping");
                        continue;
                    }
                }
            };

            let identity = derive_identity(&guid_or_link);
            if !seen_in_batch.insert(identity.clone()) {
                debug!("duplicate entry within feed: {}", guid_or_link);
                continue;
            }
            if self.storage.item_exists(&identity).await? {
                continue;
            }

            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string());
            let body = entry
                .content
                .and_then(|c| c.body)
                .or_else(|| entry.summary.map(|s| s.content))
                .unwrap_or_default();
            let published_at = entry
                .published
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);
            let now = Utc::now();

            debug!("new item: {}", title);
            new_items.push(Item {
                id: Uuid::new_v4(),
                identity,
                title,
                body,
                url: link.unwrap_or_else(|| guid_or_link.clone()),
                source_id: source.id,
                source_name: source.name.clone(),
                published_at,
                created_at: now,
                updated_at: now,
                relevance: None,
                sentiment: None,
                state: ItemState::New,
                language: "en".to_string(),
                summary: None,
            });
        }

        Ok(new_items)
    }

    async fn report_failure(&self, source: &Source, error: PipelineError) -> FetchOutcome {
        warn!("fetch failed for source {}: {}", source.name, error);
        if let Err(e) = self.storage.record_fetch_failure(source.id).await {
            warn!("could not record fetch failure for {}: {}", source.name, e);
        }
        FetchOutcome::error(source.id, error.to_string())
    }
}
