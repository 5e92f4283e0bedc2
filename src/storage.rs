use crate::types::{
    Item, ItemState, Keyword, PipelineError, PipelineStats, Result, ScoreUpdate, Source,
    SourceHealth,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Storage surface the pipeline consumes. Concrete engines live behind
/// this trait; the pipeline never sees their schema.
///
/// `commit_fetch_success` and `apply_score_updates` are all-or-nothing at
/// the granularity the implementation supports: a failure must not leave
/// a partially applied batch behind.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_source(&self, id: Uuid) -> Result<Option<Source>>;

    /// Active sources in creation order.
    async fn list_active_sources(&self) -> Result<Vec<Source>>;

    async fn add_source(&self, source: Source) -> Result<()>;

    /// Records a successful fetch: inserts the new items, resets the
    /// source's error counter to zero and stamps `last_fetched`, as one
    /// unit. Items whose identity already exists are left untouched.
    async fn commit_fetch_success(&self, source_id: Uuid, items: &[Item]) -> Result<()>;

    /// Records a failed fetch: increments the source's error counter by
    /// one. Existing items are untouched.
    async fn record_fetch_failure(&self, source_id: Uuid) -> Result<()>;

    async fn item_exists(&self, identity: &str) -> Result<bool>;

    async fn get_item(&self, id: Uuid) -> Result<Option<Item>>;

    /// Up to `limit` items in the given state, in ingestion order.
    async fn list_items_by_state(&self, state: ItemState, limit: usize) -> Result<Vec<Item>>;

    /// Applies a batch of score updates as one unit. Every referenced
    /// item must exist; otherwise nothing is applied.
    async fn apply_score_updates(&self, updates: &[ScoreUpdate]) -> Result<()>;

    /// Active keywords in insertion order.
    async fn list_active_keywords(&self) -> Result<Vec<Keyword>>;

    async fn add_keyword(&self, keyword: Keyword) -> Result<()>;

    async fn stats(&self) -> Result<PipelineStats>;
}

#[derive(Default)]
struct MemoryInner {
    sources: Vec<Source>,
    items: Vec<Item>,
    identities: HashSet<String>,
    keywords: Vec<Keyword>,
}

/// In-memory storage. One mutex over all tables makes every trait call
/// atomic, which is what the commit contracts require. Used by the test
/// suite and the no-database demo mode.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        let inner = self.inner.lock().await;
        Ok(inner.sources.iter().find(|s| s.id == id).cloned())
    }

    async fn list_active_sources(&self) -> Result<Vec<Source>> {
        let inner = self.inner.lock().await;
        Ok(inner.sources.iter().filter(|s| s.is_active).cloned().collect())
    }

    async fn add_source(&self, source: Source) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.sources.push(source);
        Ok(())
    }

    async fn commit_fetch_success(&self, source_id: Uuid, items: &[Item]) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let position = inner
            .sources
            .iter()
            .position(|s| s.id == source_id)
            .ok_or(PipelineError::SourceNotFound { id: source_id })?;

        for item in items {
            if inner.identities.contains(&item.identity) {
                continue;
            }
            inner.identities.insert(item.identity.clone());
            inner.items.push(item.clone());
        }

        let source = &mut inner.sources[position];
        source.error_count = 0;
        source.last_fetched = Some(Utc::now());
        Ok(())
    }

    async fn record_fetch_failure(&self, source_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let source = inner
            .sources
            .iter_mut()
            .find(|s| s.id == source_id)
            .ok_or(PipelineError::SourceNotFound { id: source_id })?;
        source.error_count += 1;
        Ok(())
    }

    async fn item_exists(&self, identity: &str) -> Result<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.identities.contains(identity))
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<Item>> {
        let inner = self.inner.lock().await;
        Ok(inner.items.iter().find(|i| i.id == id).cloned())
    }

    async fn list_items_by_state(&self, state: ItemState, limit: usize) -> Result<Vec<Item>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .items
            .iter()
            .filter(|i| i.state == state)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn apply_score_updates(&self, updates: &[ScoreUpdate]) -> Result<()> {
        let mut inner = self.inner.lock().await;

        // Validate the whole batch before touching anything.
        for update in updates {
            if !inner.items.iter().any(|i| i.id == update.item_id) {
                return Err(PipelineError::Storage(format!(
                    "score update references unknown item {}",
                    update.item_id
                )));
            }
        }

        let now = Utc::now();
        for update in updates {
            if let Some(item) = inner.items.iter_mut().find(|i| i.id == update.item_id) {
                item.relevance = Some(update.relevance);
                item.sentiment = Some(update.sentiment);
                item.state = update.state;
                item.updated_at = now;
            }
        }
        Ok(())
    }

    async fn list_active_keywords(&self) -> Result<Vec<Keyword>> {
        let inner = self.inner.lock().await;
        Ok(inner.keywords.iter().filter(|k| k.is_active).cloned().collect())
    }

    async fn add_keyword(&self, keyword: Keyword) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner
            .keywords
            .iter()
            .any(|k| k.is_active && keyword.is_active && k.term == keyword.term)
        {
            return Err(PipelineError::Storage(format!(
                "active keyword already exists: {}",
                keyword.term
            )));
        }
        inner.keywords.push(keyword);
        Ok(())
    }

    async fn stats(&self) -> Result<PipelineStats> {
        let inner = self.inner.lock().await;
        let now = Utc::now();
        Ok(PipelineStats {
            active_sources: inner.sources.iter().filter(|s| s.is_active).count(),
            unhealthy_sources: inner
                .sources
                .iter()
                .filter(|s| s.is_active && s.health(now) == SourceHealth::Unhealthy)
                .count(),
            new_items: inner.items.iter().filter(|i| i.state == ItemState::New).count(),
            scored_items: inner.items.iter().filter(|i| i.state == ItemState::Scored).count(),
        })
    }
}
