//! SQL DDL for the catalog store.
//!
//! Defines the `anime` table, the `anime_vec` (vec0) index and `schema_meta`.
//! All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Persisted catalog records. Re-ingestion appends new rows, so the catalog id
-- is indexed but not unique.
CREATE TABLE IF NOT EXISTS anime (
    row_id INTEGER PRIMARY KEY AUTOINCREMENT,
    anime_id INTEGER NOT NULL,
    title_romaji TEXT NOT NULL DEFAULT '',
    title_english TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    genres TEXT NOT NULL DEFAULT '[]',
    average_score INTEGER NOT NULL DEFAULT 0,
    episodes INTEGER NOT NULL DEFAULT 0,
    duration INTEGER NOT NULL DEFAULT 0,
    season TEXT NOT NULL DEFAULT '',
    season_year INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL DEFAULT '',
    studios TEXT NOT NULL DEFAULT '[]',
    cover_image TEXT NOT NULL DEFAULT '',
    embedding BLOB,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_anime_anime_id ON anime(anime_id);
CREATE INDEX IF NOT EXISTS idx_anime_score ON anime(average_score);
CREATE INDEX IF NOT EXISTS idx_anime_romaji ON anime(title_romaji COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_anime_english ON anime(title_english COLLATE NOCASE);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// vec0 DDL, sized to the configured embedding width. Rows share their rowid
/// with `anime.row_id`.
fn vec_table_sql(dimensions: usize) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS anime_vec USING vec0(\n    \
         embedding float[{dimensions}] distance_metric=cosine\n);"
    )
}

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
///
/// The vector width is fixed the first time the vec0 table is created and
/// recorded in `schema_meta` under `vector_dimensions`.
pub fn init_schema(conn: &Connection, dimensions: usize) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(&vec_table_sql(dimensions))?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('vector_dimensions', ?1)",
        [dimensions.to_string()],
    )?;

    Ok(())
}

/// Width of the `anime_vec` index as recorded at creation time.
pub fn vector_dimensions(conn: &Connection) -> rusqlite::Result<usize> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'vector_dimensions'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<usize>().unwrap_or(0))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, 4).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"anime".to_string()));
        assert!(tables.contains(&"anime_vec".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));

        let version: String = conn
            .query_row("SELECT vec_version()", [], |r| r.get(0))
            .unwrap();
        assert!(!version.is_empty());
    }

    #[test]
    fn schema_is_idempotent() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, 4).unwrap();
        init_schema(&conn, 4).unwrap();
    }

    #[test]
    fn vector_dimensions_fixed_on_first_init() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, 4).unwrap();
        init_schema(&conn, 8).unwrap();
        assert_eq!(vector_dimensions(&conn).unwrap(), 4);
    }
}
