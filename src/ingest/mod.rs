//! Ingestion pipeline: fetch pages, embed items, persist once.
//!
//! [`Ingestor::ingest_range`] runs a fixed pool of page workers that pull
//! [`PageTask`]s from a shared queue. Each fetched record becomes an item task
//! whose embedding request waits on a semaphore shared by every page. Page
//! outcomes flow over a bounded channel to a single aggregation task, and the
//! aggregated batch is written with one [`RecordSink::insert_many`] call.
//!
//! Fetch failures drop a page and embedding failures drop an item; both are
//! logged and only reduce yield. A persist failure or an expired deadline is
//! returned to the caller and nothing from the run is visible.

mod queue;

pub use queue::{PageQueue, PageTask};

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::anime::store::{IngestRun, RecordSink};
use crate::anime::types::Anime;
use crate::catalog::{CatalogFetcher, CatalogRecord};
use crate::config::IngestConfig;
use crate::embedding::{model_marker, EmbeddingProvider};
use crate::error::{Error, Result};

/// Concurrency and deadline knobs for one ingestion call.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Size of the page worker pool.
    pub page_concurrency: usize,
    /// Maximum embedding requests in flight across all pages.
    pub embed_concurrency: usize,
    /// Capacity of the page-outcome channel feeding the aggregator.
    pub queue_capacity: usize,
    /// Bound on fetching, embedding and aggregation together.
    pub deadline: Duration,
}

impl From<&IngestConfig> for IngestOptions {
    fn from(config: &IngestConfig) -> Self {
        Self {
            page_concurrency: config.page_concurrency.max(1),
            embed_concurrency: config.embed_concurrency.max(1),
            queue_capacity: config.queue_capacity.max(1),
            deadline: config.deadline(),
        }
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

/// Outcome of an ingestion call. `inserted` is the success count.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: String,
    pub start_page: u32,
    pub end_page: u32,
    pub per_page: u32,
    pub pages: usize,
    pub fetched: usize,
    pub failed_pages: usize,
    pub failed_items: usize,
    pub inserted: usize,
}

/// What one page worker reports for one page.
#[derive(Debug)]
struct PageOutcome {
    page: u32,
    fetched: usize,
    records: Vec<Anime>,
    failed_items: usize,
    fetch_failed: bool,
}

impl PageOutcome {
    fn fetch_failed(page: u32) -> Self {
        Self {
            page,
            fetched: 0,
            records: Vec::new(),
            failed_items: 0,
            fetch_failed: true,
        }
    }
}

/// Global batch built by the aggregation task.
#[derive(Debug, Default)]
struct Aggregate {
    batch: Vec<Anime>,
    count: usize,
    pages: usize,
    fetched: usize,
    failed_pages: usize,
    failed_items: usize,
}

impl Aggregate {
    fn absorb(&mut self, outcome: PageOutcome) {
        self.pages += 1;
        self.fetched += outcome.fetched;
        self.failed_items += outcome.failed_items;
        if outcome.fetch_failed {
            self.failed_pages += 1;
        }
        self.count += outcome.records.len();
        self.batch.extend(outcome.records);
    }
}

/// Collaborators shared by every worker of a run.
struct Pipeline {
    fetcher: Arc<dyn CatalogFetcher>,
    provider: Arc<dyn EmbeddingProvider>,
    embed_permits: Arc<Semaphore>,
}

/// Drives catalog → embedding → storage ingestion.
pub struct Ingestor {
    fetcher: Arc<dyn CatalogFetcher>,
    provider: Arc<dyn EmbeddingProvider>,
    sink: Arc<dyn RecordSink>,
    options: IngestOptions,
}

impl Ingestor {
    pub fn new(
        fetcher: Arc<dyn CatalogFetcher>,
        provider: Arc<dyn EmbeddingProvider>,
        sink: Arc<dyn RecordSink>,
        options: IngestOptions,
    ) -> Self {
        Self {
            fetcher,
            provider,
            sink,
            options,
        }
    }

    /// Ingest the inclusive page range `[start_page, end_page]` concurrently.
    ///
    /// An empty range, or pages that yield nothing, skip the persist call and
    /// report zero. Returns `Error::Persist` if the bulk write fails and
    /// `Error::Timeout` if the deadline expires before aggregation completes.
    pub async fn ingest_range(
        &self,
        start_page: u32,
        end_page: u32,
        per_page: u32,
    ) -> Result<IngestReport> {
        let run_id = uuid::Uuid::now_v7().to_string();
        let queue = Arc::new(PageQueue::new(start_page, end_page, per_page));
        tracing::info!(
            run_id = %run_id,
            start_page,
            end_page,
            per_page,
            pages = queue.len(),
            "starting concurrent ingestion"
        );

        let deadline = self.options.deadline;
        let aggregate = tokio::time::timeout(deadline, self.gather(queue))
            .await
            .map_err(|_| {
                tracing::error!(run_id = %run_id, ?deadline, "ingestion deadline exceeded, nothing persisted");
                Error::Timeout(deadline)
            })?;

        self.persist(run_id, start_page, end_page, per_page, aggregate)
            .await
    }

    /// Ingest a single page with sequential embedding.
    ///
    /// Unlike [`Self::ingest_range`], a fetch failure is returned, since there
    /// are no sibling pages to isolate it from. Item failures are still dropped.
    pub async fn ingest_page(&self, page: u32, per_page: u32) -> Result<IngestReport> {
        let run_id = uuid::Uuid::now_v7().to_string();
        tracing::info!(run_id = %run_id, page, per_page, "starting single-page ingestion");

        let deadline = self.options.deadline;
        let aggregate = tokio::time::timeout(deadline, async {
            let records = self.fetcher.fetch(page, per_page).await?;
            let mut outcome = PageOutcome {
                page,
                fetched: records.len(),
                records: Vec::with_capacity(records.len()),
                failed_items: 0,
                fetch_failed: false,
            };
            for record in records {
                match embed_record(self.provider.as_ref(), record).await {
                    Some(anime) => outcome.records.push(anime),
                    None => outcome.failed_items += 1,
                }
            }
            let mut aggregate = Aggregate::default();
            aggregate.absorb(outcome);
            Ok::<_, Error>(aggregate)
        })
        .await
        .map_err(|_| Error::Timeout(deadline))??;

        self.persist(run_id, page, page, per_page, aggregate).await
    }

    /// Fan out over the page queue and fan in through the aggregator.
    async fn gather(&self, queue: Arc<PageQueue>) -> Aggregate {
        let pipeline = Arc::new(Pipeline {
            fetcher: Arc::clone(&self.fetcher),
            provider: Arc::clone(&self.provider),
            embed_permits: Arc::new(Semaphore::new(self.options.embed_concurrency)),
        });

        let (results_tx, results_rx) = mpsc::channel(self.options.queue_capacity);
        let aggregator = tokio::spawn(aggregate(results_rx));

        let workers_wanted = self.options.page_concurrency.min(queue.len());
        let mut workers = JoinSet::new();
        for _ in 0..workers_wanted {
            workers.spawn(page_worker(
                Arc::clone(&pipeline),
                Arc::clone(&queue),
                results_tx.clone(),
            ));
        }
        // The channel closes once every worker has dropped its sender.
        drop(results_tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "page worker terminated abnormally");
            }
        }

        match aggregator.await {
            Ok(aggregate) => aggregate,
            Err(e) => {
                tracing::error!(error = %e, "aggregation task failed, discarding batch");
                Aggregate::default()
            }
        }
    }

    async fn persist(
        &self,
        run_id: String,
        start_page: u32,
        end_page: u32,
        per_page: u32,
        aggregate: Aggregate,
    ) -> Result<IngestReport> {
        let mut report = IngestReport {
            run_id,
            start_page,
            end_page,
            per_page,
            pages: aggregate.pages,
            fetched: aggregate.fetched,
            failed_pages: aggregate.failed_pages,
            failed_items: aggregate.failed_items,
            inserted: 0,
        };

        if aggregate.batch.is_empty() {
            tracing::info!(run_id = %report.run_id, "no valid anime to insert");
            return Ok(report);
        }

        let run = IngestRun {
            run_id: report.run_id.clone(),
            start_page,
            end_page,
            per_page,
            fetched: aggregate.fetched,
            failed_pages: aggregate.failed_pages,
            failed_items: aggregate.failed_items,
            embedding_model: model_marker(self.provider.as_ref()),
        };
        let count = aggregate.count;
        self.sink.insert_many(aggregate.batch, &run).await.map_err(|e| {
            tracing::error!(run_id = %run.run_id, error = %e, "bulk insert failed");
            match e {
                Error::Persist(_) => e,
                other => Error::Persist(other.to_string()),
            }
        })?;

        report.inserted = count;
        tracing::info!(
            run_id = %report.run_id,
            inserted = report.inserted,
            failed_pages = report.failed_pages,
            failed_items = report.failed_items,
            "successfully inserted anime entries"
        );
        Ok(report)
    }
}

/// Drain page outcomes until every producer is gone.
async fn aggregate(mut results: mpsc::Receiver<PageOutcome>) -> Aggregate {
    let mut aggregate = Aggregate::default();
    while let Some(outcome) = results.recv().await {
        tracing::debug!(
            page = outcome.page,
            records = outcome.records.len(),
            "page aggregated"
        );
        aggregate.absorb(outcome);
    }
    aggregate
}

async fn page_worker(
    pipeline: Arc<Pipeline>,
    queue: Arc<PageQueue>,
    results: mpsc::Sender<PageOutcome>,
) {
    while let Some(task) = queue.next() {
        let outcome = process_page(&pipeline, task).await;
        if results.send(outcome).await.is_err() {
            tracing::warn!(page = task.page, "aggregator closed, stopping page worker");
            break;
        }
    }
}

/// Fetch one page and embed its records concurrently.
async fn process_page(pipeline: &Arc<Pipeline>, task: PageTask) -> PageOutcome {
    let records = match pipeline.fetcher.fetch(task.page, task.per_page).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(page = task.page, error = %e, "error fetching page, skipping");
            return PageOutcome::fetch_failed(task.page);
        }
    };

    let fetched = records.len();
    let mut items = JoinSet::new();
    for record in records {
        let pipeline = Arc::clone(pipeline);
        items.spawn(async move {
            // Closed semaphore means the run is being torn down.
            let _permit = pipeline.embed_permits.acquire().await.ok()?;
            embed_record(pipeline.provider.as_ref(), record).await
        });
    }

    let mut records = Vec::with_capacity(fetched);
    let mut failed_items = 0usize;
    while let Some(joined) = items.join_next().await {
        match joined {
            Ok(Some(anime)) => records.push(anime),
            Ok(None) => failed_items += 1,
            Err(e) => {
                tracing::error!(page = task.page, error = %e, "item task terminated abnormally");
                failed_items += 1;
            }
        }
    }

    tracing::debug!(
        page = task.page,
        fetched,
        embedded = records.len(),
        failed_items,
        "page processed"
    );
    PageOutcome {
        page: task.page,
        fetched,
        records,
        failed_items,
        fetch_failed: false,
    }
}

/// Embed one record and assemble it. `None` means the item was dropped.
async fn embed_record(provider: &dyn EmbeddingProvider, record: CatalogRecord) -> Option<Anime> {
    match provider.embed(&record.embedding_text()).await {
        Ok(embedding) => Some(Anime::assemble(record, embedding)),
        Err(e) => {
            tracing::warn!(anime_id = record.id, error = %e, "embedding error, dropping item");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_counts_match_batch() {
        let mut agg = Aggregate::default();
        agg.absorb(PageOutcome {
            page: 1,
            fetched: 3,
            records: vec![
                Anime::assemble(CatalogRecord::default(), vec![1.0]),
                Anime::assemble(CatalogRecord::default(), vec![1.0]),
            ],
            failed_items: 1,
            fetch_failed: false,
        });
        agg.absorb(PageOutcome::fetch_failed(2));

        assert_eq!(agg.count, agg.batch.len());
        assert_eq!(agg.count, 2);
        assert_eq!(agg.pages, 2);
        assert_eq!(agg.fetched, 3);
        assert_eq!(agg.failed_pages, 1);
        assert_eq!(agg.failed_items, 1);
    }

    #[test]
    fn options_from_config_clamp_zero() {
        let config = IngestConfig {
            page_concurrency: 0,
            embed_concurrency: 0,
            queue_capacity: 0,
            deadline_secs: 5,
        };
        let options = IngestOptions::from(&config);
        assert_eq!(options.page_concurrency, 1);
        assert_eq!(options.embed_concurrency, 1);
        assert_eq!(options.queue_capacity, 1);
        assert_eq!(options.deadline, Duration::from_secs(5));
    }
}
