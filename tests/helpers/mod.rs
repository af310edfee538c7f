#![allow(dead_code)]

use anirec::anime::store::{IngestRun, RecordSink};
use anirec::anime::types::Anime;
use anirec::catalog::{CatalogFetcher, CatalogRecord, Title};
use anirec::embedding::EmbeddingProvider;
use anirec::ingest::IngestOptions;
use anirec::{Error, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Vector width used throughout the integration tests.
pub const DIMS: usize = 4;

/// Marker that makes [`FakeProvider`] fail when it appears in the text.
pub const FAIL_MARKER: &str = "FAIL";

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    anirec::db::open_memory_database(DIMS).unwrap()
}

/// A catalog record with the given id and romaji title.
pub fn record(id: i64, romaji: &str) -> CatalogRecord {
    CatalogRecord {
        id,
        title: Title {
            romaji: romaji.to_string(),
            english: String::new(),
        },
        description: format!("description of {romaji}"),
        genres: vec!["Action".into()],
        average_score: 50 + id,
        ..Default::default()
    }
}

/// `count` records for `page`, with ids `page * 100 + i`.
pub fn page_of(page: u32, count: usize) -> Vec<CatalogRecord> {
    (0..count)
        .map(|i| {
            let id = i64::from(page) * 100 + i as i64;
            record(id, &format!("Show {id}"))
        })
        .collect()
}

/// Deterministic unit vector: a spike at `seed % DIMS` plus a small tail.
pub fn spike(seed: usize) -> Vec<f32> {
    let mut v = vec![0.05f32; DIMS];
    v[seed % DIMS] = 1.0;
    v
}

/// Options with a generous deadline for tests that are not about timeouts.
pub fn options(page_concurrency: usize, embed_concurrency: usize) -> IngestOptions {
    IngestOptions {
        page_concurrency,
        embed_concurrency,
        queue_capacity: 4,
        deadline: Duration::from_secs(30),
    }
}

pub fn test_run(run_id: &str) -> IngestRun {
    IngestRun {
        run_id: run_id.to_string(),
        start_page: 1,
        end_page: 1,
        per_page: 10,
        fetched: 0,
        failed_pages: 0,
        failed_items: 0,
        embedding_model: "fake/test-model".to_string(),
    }
}

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Catalog source serving canned pages. Unknown pages are empty.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<u32, std::result::Result<Vec<CatalogRecord>, String>>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page: u32, records: Vec<CatalogRecord>) -> Self {
        self.pages.insert(page, Ok(records));
        self
    }

    pub fn with_failing_page(mut self, page: u32) -> Self {
        self.pages.insert(page, Err(format!("page {page} unavailable")));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl CatalogFetcher for FakeFetcher {
    async fn fetch(&self, page: u32, _per_page: u32) -> Result<Vec<CatalogRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.pages.get(&page) {
            Some(Ok(records)) => Ok(records.clone()),
            Some(Err(message)) => Err(Error::Upstream(message.clone())),
            None => Ok(Vec::new()),
        }
    }
}

/// Embedding provider returning deterministic vectors. Fails for any text
/// containing [`FAIL_MARKER`] and tracks peak concurrency.
#[derive(Default)]
pub struct FakeProvider {
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn peak_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// The vector this provider returns for `text`.
    pub fn vector_for(text: &str) -> Vec<f32> {
        spike(text.bytes().map(usize::from).sum())
    }
}

#[async_trait]
impl EmbeddingProvider for FakeProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if text.contains(FAIL_MARKER) {
            return Err(Error::Embedding("fake provider rejected text".into()));
        }
        Ok(Self::vector_for(text))
    }

    fn name(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "test-model"
    }
}

/// Sink that records every batch it receives, optionally failing instead.
#[derive(Default)]
pub struct RecordingSink {
    pub batches: Mutex<Vec<(Vec<Anime>, IngestRun)>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn only_batch(&self) -> (Vec<Anime>, IngestRun) {
        let batches = self.batches.lock().unwrap();
        assert_eq!(batches.len(), 1, "expected exactly one bulk write");
        batches[0].clone()
    }
}

#[async_trait]
impl RecordSink for RecordingSink {
    async fn insert_many(&self, batch: Vec<Anime>, run: &IngestRun) -> Result<usize> {
        if self.fail {
            return Err(Error::Persist("store rejected the batch".into()));
        }
        let len = batch.len();
        self.batches.lock().unwrap().push((batch, run.clone()));
        Ok(len)
    }
}
