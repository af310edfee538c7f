pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) the catalog database at the given path, with sqlite-vec
/// loaded, schema initialized and migrations applied.
///
/// `dimensions` sizes the vector index when the database is first created.
pub fn open_database(path: impl AsRef<Path>, dimensions: usize) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    load_sqlite_vec();

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    schema::init_schema(&conn, dimensions).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;

    let indexed = schema::vector_dimensions(&conn)?;
    if indexed != dimensions {
        tracing::warn!(
            indexed,
            configured = dimensions,
            "vector index width differs from configured embedding dimensions; \
             mismatched vectors are stored but not indexed"
        );
    }

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database with schema and migrations applied.
pub fn open_memory_database(dimensions: usize) -> Result<Connection> {
    load_sqlite_vec();
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn, dimensions).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Snapshot of database state for the `doctor` command.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub schema_version: u32,
    pub sqlite_vec_version: String,
    pub vector_dimensions: usize,
    pub embedding_model: Option<String>,
    pub anime_count: i64,
    pub embedded_count: i64,
    pub indexed_count: i64,
    pub ingest_run_count: i64,
    pub integrity_ok: bool,
    pub integrity_details: String,
}

/// Run `PRAGMA integrity_check` and gather row counts.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let count = |sql: &str| -> rusqlite::Result<i64> { conn.query_row(sql, [], |r| r.get(0)) };

    let integrity_details: String =
        conn.query_row("PRAGMA integrity_check", [], |r| r.get(0))?;

    Ok(HealthReport {
        schema_version: migrations::get_schema_version(conn)?,
        sqlite_vec_version: conn.query_row("SELECT vec_version()", [], |r| r.get(0))?,
        vector_dimensions: schema::vector_dimensions(conn)?,
        embedding_model: migrations::get_embedding_model(conn)?,
        anime_count: count("SELECT COUNT(*) FROM anime")?,
        embedded_count: count("SELECT COUNT(*) FROM anime WHERE embedding IS NOT NULL")?,
        indexed_count: count("SELECT COUNT(*) FROM anime_vec")?,
        ingest_run_count: count("SELECT COUNT(*) FROM ingest_runs")?,
        integrity_ok: integrity_details == "ok",
        integrity_details,
    })
}
