//! Anime catalog ingestion and semantic recommendations.
//!
//! anirec pulls popularity-ordered pages from the AniList catalog, embeds each
//! title with a text-embedding service, and stores the enriched records in
//! SQLite in one transaction per run. Recommendations come from either an
//! exhaustive in-process cosine ranking or the sqlite-vec index.
//!
//! | Provider | Kind | Default model |
//! |----------|------|---------------|
//! | **gemini** | Hosted (`embedContent`) | `gemini-embedding-001` |
//! | **ollama** | Local (`/api/embeddings`) | `nomic-embed-text` |
//!
//! # Architecture
//!
//! - **Ingestion**: a fixed pool of page workers, semaphore-bounded embedding
//!   requests, one aggregation task, one bulk insert
//! - **Storage**: SQLite with [sqlite-vec](https://github.com/asg017/sqlite-vec)
//!   for the indexed vector search
//! - **Ranking**: brute-force cosine similarity over the stored corpus
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`catalog`]: Catalog record shape and the AniList page fetcher
//! - [`embedding`]: Embedding provider trait and the Gemini / Ollama clients
//! - [`ingest`]: Concurrent fetch → embed → persist orchestration
//! - [`anime`]: Persisted records: bulk write, lookups, vector search, ranking
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`error`]: Error taxonomy shared by the library

pub mod anime;
pub mod catalog;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod ingest;

pub use error::{Error, Result};
