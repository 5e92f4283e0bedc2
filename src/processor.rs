use crate::analyzer::ContentAnalyzer;
use crate::storage::Storage;
use crate::types::{Item, ItemState, ProcessOutcome, Result, ScoreUpdate};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Scores batches of items against the active keyword snapshot and
/// advances their lifecycle state. Each invocation commits its score
/// updates as one unit; a mid-batch failure leaves no partial writes.
pub struct BatchProcessor {
    storage: Arc<dyn Storage>,
    occurrence_cap: u32,
    /// Cached analyzer snapshot. Rebuilt on first use and whenever it is
    /// invalidated; never mutated in place, always swapped wholesale.
    analyzer: Mutex<Option<Arc<ContentAnalyzer>>>,
}

impl BatchProcessor {
    pub fn new(storage: Arc<dyn Storage>, occurrence_cap: u32) -> Self {
        Self {
            storage,
            occurrence_cap,
            analyzer: Mutex::new(None),
        }
    }

    /// Returns the cached analyzer, building one from the current active
    /// keywords if none is cached.
    async fn analyzer_snapshot(&self) -> Result<Arc<ContentAnalyzer>> {
        let mut slot = self.analyzer.lock().await;
        if let Some(analyzer) = slot.as_ref() {
            return Ok(Arc::clone(analyzer));
        }

        let keywords = self.storage.list_active_keywords().await?;
        let analyzer = Arc::new(ContentAnalyzer::from_keywords(&keywords, self.occurrence_cap));
        info!("built analyzer snapshot with {} keywords", analyzer.keyword_count());
        *slot = Some(Arc::clone(&analyzer));
        Ok(analyzer)
    }

    /// Drops the cached analyzer so the next use rebuilds it from the
    /// current keyword table.
    async fn invalidate_analyzer(&self) {
        let mut slot = self.analyzer.lock().await;
        *slot = None;
    }

    /// Scores up to `limit` items in `new` state and advances them to
    /// `scored`, committing the whole batch as one unit.
    pub async fn process_pending(&self, limit: usize) -> ProcessOutcome {
        match self.score_batch(ItemState::New, limit, false).await {
            Ok(count) => {
                if count == 0 {
                    info!("no pending items found");
                } else {
                    info!("processed {} pending items", count);
                }
                ProcessOutcome::success(count)
            }
            Err(e) => {
                error!("processing pending items failed: {}", e);
                ProcessOutcome::error(e.to_string())
            }
        }
    }

    /// Re-scores up to `limit` already-scored items against a fresh
    /// keyword snapshot, picking up any keyword edits. Idempotent while
    /// the keyword table is unchanged.
    pub async fn reevaluate(&self, limit: usize) -> ProcessOutcome {
        self.invalidate_analyzer().await;
        match self.score_batch(ItemState::Scored, limit, true).await {
            Ok(count) => {
                info!("reevaluated {} items", count);
                ProcessOutcome::success(count)
            }
            Err(e) => {
                error!("reevaluation failed: {}", e);
                ProcessOutcome::error(e.to_string())
            }
        }
    }

    /// Re-scores a single item against a fresh keyword snapshot,
    /// regardless of its current state.
    pub async fn reevaluate_item(&self, item_id: Uuid) -> ProcessOutcome {
        self.invalidate_analyzer().await;

        let result: Result<Option<()>> = async {
            let analyzer = self.analyzer_snapshot().await?;
            let item = match self.storage.get_item(item_id).await? {
                Some(item) => item,
                None => return Ok(None),
            };
            let update = self.score_item(&analyzer, &item, true);
            self.storage.apply_score_updates(&[update]).await?;
            Ok(Some(()))
        }
        .await;

        match result {
            Ok(Some(())) => ProcessOutcome::success(1),
            Ok(None) => ProcessOutcome::error(format!("item not found: {item_id}")),
            Err(e) => {
                error!("reevaluating item {} failed: {}", item_id, e);
                ProcessOutcome::error(e.to_string())
            }
        }
    }

    async fn score_batch(&self, state: ItemState, limit: usize, log_delta: bool) -> Result<usize> {
        let items = self.storage.list_items_by_state(state, limit).await?;
        if items.is_empty() {
            return Ok(0);
        }

        let analyzer = self.analyzer_snapshot().await?;

        let updates: Vec<ScoreUpdate> = items
            .iter()
            .map(|item| self.score_item(&analyzer, item, log_delta))
            .collect();

        self.storage.apply_score_updates(&updates).await?;
        Ok(updates.len())
    }

    fn score_item(&self, analyzer: &ContentAnalyzer, item: &Item, log_delta: bool) -> ScoreUpdate {
        let analysis = analyzer.analyze(&item.title, &item.body);

        if log_delta {
            let old_relevance = item.relevance.unwrap_or(0.0);
            let old_sentiment = item.sentiment.unwrap_or(0.0);
            if old_relevance != analysis.relevance || old_sentiment != analysis.sentiment {
                debug!(
                    "item {} rescored: relevance {:.2} -> {:.2}, sentiment {:.2} -> {:.2}",
                    item.id, old_relevance, analysis.relevance, old_sentiment, analysis.sentiment
                );
            }
        }

        ScoreUpdate {
            item_id: item.id,
            relevance: analysis.relevance,
            sentiment: analysis.sentiment,
            state: ItemState::Scored,
        }
    }
}
