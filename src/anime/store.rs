//! Write path: one transaction per ingested batch.
//!
//! [`insert_batch`] writes every record of a batch, its vector index entry and
//! the run's audit row, or nothing. [`RecordSink`] is the seam the ingestion
//! orchestrator persists through; [`SqliteStore`] implements it over a shared
//! connection.

use async_trait::async_trait;
use rusqlite::{params, Connection, Transaction};
use serde::Serialize;
use std::sync::{Arc, Mutex};

use super::embedding_to_bytes;
use super::types::Anime;
use crate::db::{migrations, schema};
use crate::error::{Error, Result};

/// Audit metadata recorded alongside a persisted batch.
#[derive(Debug, Clone, Serialize)]
pub struct IngestRun {
    /// UUID v7 (time-sortable) run identifier.
    pub run_id: String,
    pub start_page: u32,
    pub end_page: u32,
    pub per_page: u32,
    /// Records returned by the catalog source across all pages.
    pub fetched: usize,
    pub failed_pages: usize,
    pub failed_items: usize,
    /// `provider/model` marker of the embeddings in this batch.
    pub embedding_model: String,
}

/// Destination of the single bulk write at the end of an ingestion run.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist the whole batch atomically. Returns the number of records written.
    async fn insert_many(&self, batch: Vec<Anime>, run: &IngestRun) -> Result<usize>;
}

/// [`RecordSink`] over the SQLite catalog store.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordSink for SqliteStore {
    async fn insert_many(&self, batch: Vec<Anime>, run: &IngestRun) -> Result<usize> {
        let db = Arc::clone(&self.db);
        let run = run.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| Error::Persist(format!("database lock poisoned: {e}")))?;
            insert_batch(&mut conn, &batch, &run).map_err(|e| match e {
                Error::Persist(_) => e,
                other => Error::Persist(other.to_string()),
            })
        })
        .await
        .map_err(|e| Error::Persist(format!("persist task failed: {e}")))?
    }
}

/// Write a batch in a single transaction: audit row, records, index entries.
///
/// Embeddings whose length differs from the index width are stored on the row
/// but not indexed. Returns the number of records written.
pub fn insert_batch(conn: &mut Connection, batch: &[Anime], run: &IngestRun) -> Result<usize> {
    let tx = conn.transaction()?;
    let indexed_dims = schema::vector_dimensions(&tx)?;

    insert_run(&tx, run, batch.len())?;

    let mut unindexed = 0usize;
    for anime in batch {
        let row_id = insert_anime(&tx, anime, &run.run_id)?;
        match &anime.embedding {
            Some(embedding) if embedding.len() == indexed_dims => {
                insert_vec(&tx, row_id, embedding)?;
            }
            Some(_) => unindexed += 1,
            None => {}
        }
    }

    match migrations::get_embedding_model(&tx)? {
        None => migrations::set_embedding_model(&tx, &run.embedding_model)?,
        Some(stored) if stored != run.embedding_model => {
            tracing::warn!(
                stored = %stored,
                batch = %run.embedding_model,
                "batch embedded with a different model than the stored corpus"
            );
        }
        Some(_) => {}
    }

    tx.commit()?;

    if unindexed > 0 {
        tracing::warn!(
            unindexed,
            indexed_dims,
            "embeddings with mismatched width were stored but not indexed"
        );
    }
    Ok(batch.len())
}

fn insert_run(tx: &Transaction, run: &IngestRun, inserted: usize) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO ingest_runs (run_id, start_page, end_page, per_page, fetched, inserted, \
         failed_pages, failed_items, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            run.run_id,
            run.start_page,
            run.end_page,
            run.per_page,
            run.fetched as i64,
            inserted as i64,
            run.failed_pages as i64,
            run.failed_items as i64,
            now,
        ],
    )?;
    Ok(())
}

/// Insert one record row. Returns the row id shared with the vector index.
fn insert_anime(tx: &Transaction, anime: &Anime, run_id: &str) -> Result<i64> {
    let r = &anime.record;
    let now = chrono::Utc::now().to_rfc3339();
    let genres = serde_json::to_string(&r.genres)
        .map_err(|e| Error::Persist(format!("failed to encode genres: {e}")))?;
    let studios = serde_json::to_string(&r.studios)
        .map_err(|e| Error::Persist(format!("failed to encode studios: {e}")))?;
    let embedding = anime.embedding.as_deref().map(embedding_to_bytes);

    tx.execute(
        "INSERT INTO anime (anime_id, title_romaji, title_english, description, genres, \
         average_score, episodes, duration, season, season_year, status, source, studios, \
         cover_image, embedding, ingest_run, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            r.id,
            r.title.romaji,
            r.title.english,
            r.description,
            genres,
            r.average_score,
            r.episodes,
            r.duration,
            r.season,
            r.season_year,
            r.status,
            r.source,
            studios,
            r.cover_image.large,
            embedding,
            run_id,
            now,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn insert_vec(tx: &Transaction, row_id: i64, embedding: &[f32]) -> Result<()> {
    tx.execute(
        "INSERT INTO anime_vec (rowid, embedding) VALUES (?1, ?2)",
        params![row_id, embedding_to_bytes(embedding)],
    )?;
    Ok(())
}
