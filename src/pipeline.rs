use crate::collector::FeedCollector;
use crate::config::Settings;
use crate::fetch::FeedTransport;
use crate::processor::BatchProcessor;
use crate::scheduler::{JobFn, Scheduler};
use crate::storage::Storage;
use crate::types::{
    FetchOutcome, FetchStatus, PipelineError, PipelineStats, ProcessOutcome, ProcessStatus, Result,
};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

pub const COLLECT_JOB: &str = "collect-feeds";
pub const PROCESS_JOB: &str = "process-pending";

/// Wires storage, collector, processor and scheduler into one explicit
/// context. Constructed at process start, torn down at shutdown; there
/// are no module-level singletons behind it.
pub struct NewsPipeline {
    storage: Arc<dyn Storage>,
    collector: Arc<FeedCollector>,
    processor: Arc<BatchProcessor>,
    scheduler: Scheduler,
    settings: Settings,
}

impl NewsPipeline {
    pub fn new(
        storage: Arc<dyn Storage>,
        transport: Arc<dyn FeedTransport>,
        settings: Settings,
    ) -> Self {
        let collector = Arc::new(
            FeedCollector::new(Arc::clone(&storage), transport)
                .with_max_entries(settings.max_entries_per_fetch),
        );
        let processor = Arc::new(BatchProcessor::new(
            Arc::clone(&storage),
            settings.occurrence_cap,
        ));

        Self {
            storage,
            collector,
            processor,
            scheduler: Scheduler::new(),
            settings,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Triggers collection across every active source; per-source
    /// failures come back as outcomes, not errors.
    pub async fn collect_all(&self) -> Result<Vec<FetchOutcome>> {
        self.collector.fetch_all_active().await
    }

    pub async fn collect_source(&self, source_id: Uuid) -> FetchOutcome {
        self.collector.fetch_source(source_id).await
    }

    /// Triggers pending-item processing; `limit` falls back to the
    /// configured batch size.
    pub async fn process_pending(&self, limit: Option<usize>) -> ProcessOutcome {
        let limit = limit.unwrap_or(self.settings.processing_batch_size);
        self.processor.process_pending(limit).await
    }

    /// Triggers re-evaluation of already-scored items against the
    /// current keyword table.
    pub async fn reevaluate(&self, limit: Option<usize>) -> ProcessOutcome {
        let limit = limit.unwrap_or(self.settings.reevaluation_batch_size);
        self.processor.reevaluate(limit).await
    }

    pub async fn reevaluate_item(&self, item_id: Uuid) -> ProcessOutcome {
        self.processor.reevaluate_item(item_id).await
    }

    pub async fn stats(&self) -> Result<PipelineStats> {
        self.storage.stats().await
    }

    /// Registers the standard collection and processing jobs on the
    /// scheduler. Collection runs immediately on startup; processing
    /// waits out its first interval so collection gets a head start.
    pub async fn register_default_jobs(&self) -> Result<()> {
        let collector = Arc::clone(&self.collector);
        let collect_job: JobFn = Arc::new(move || {
            let collector = Arc::clone(&collector);
            async move {
                let outcomes = collector.fetch_all_active().await?;
                let failed = outcomes
                    .iter()
                    .filter(|o| o.status == FetchStatus::Error)
                    .count();
                let new_items: usize = outcomes.iter().map(|o| o.new_items).sum();
                info!(
                    "collection cycle finished: {} sources, {} new items, {} failed",
                    outcomes.len(),
                    new_items,
                    failed
                );
                Ok(())
            }
            .boxed()
        });
        self.scheduler
            .add_task(
                COLLECT_JOB,
                collect_job,
                Duration::from_secs(self.settings.collection_interval_secs),
                true,
            )
            .await?;

        let processor = Arc::clone(&self.processor);
        let batch_size = self.settings.processing_batch_size;
        let process_job: JobFn = Arc::new(move || {
            let processor = Arc::clone(&processor);
            async move {
                let outcome = processor.process_pending(batch_size).await;
                match outcome.status {
                    ProcessStatus::Success => Ok(()),
                    ProcessStatus::Error => Err(PipelineError::Scheduler(
                        outcome
                            .message
                            .unwrap_or_else(|| "processing failed".to_string()),
                    )),
                }
            }
            .boxed()
        });
        self.scheduler
            .add_task(
                PROCESS_JOB,
                process_job,
                Duration::from_secs(self.settings.processing_interval_secs),
                false,
            )
            .await?;

        Ok(())
    }

    pub async fn start(&self) {
        self.scheduler.start().await;
    }

    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }
}
