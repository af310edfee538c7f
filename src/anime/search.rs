//! Read path: catalog lookups and the delegated vector search.

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{Anime, ScoredAnime};
use super::{bytes_to_embedding, embedding_to_bytes};
use crate::catalog::{CatalogRecord, CoverImage, Title};
use crate::db::schema;
use crate::error::{Error, Result};

const SELECT_COLUMNS: &str = "anime_id, title_romaji, title_english, description, genres, \
     average_score, episodes, duration, season, season_year, status, source, studios, \
     cover_image, embedding";

/// Highest `k` a vec0 KNN query accepts.
pub const MAX_KNN_CANDIDATES: usize = 4096;

/// Decode a JSON string-array column. A malformed value is a conversion error.
fn json_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Build an [`Anime`] from a row selected with [`SELECT_COLUMNS`] (offset 0).
fn row_to_anime(row: &Row<'_>) -> rusqlite::Result<Anime> {
    let embedding: Option<Vec<u8>> = row.get(14)?;
    Ok(Anime {
        record: CatalogRecord {
            id: row.get(0)?,
            title: Title {
                romaji: row.get(1)?,
                english: row.get(2)?,
            },
            description: row.get(3)?,
            genres: json_list(row, 4)?,
            average_score: row.get(5)?,
            episodes: row.get(6)?,
            duration: row.get(7)?,
            season: row.get(8)?,
            season_year: row.get(9)?,
            status: row.get(10)?,
            source: row.get(11)?,
            studios: json_list(row, 12)?,
            cover_image: CoverImage {
                large: row.get(13)?,
            },
        },
        embedding: embedding.map(|b| bytes_to_embedding(&b)),
    })
}

/// Every stored record in insertion order, embeddings included. This is the
/// corpus the in-process ranker scores.
pub fn list_all(conn: &Connection) -> Result<Vec<Anime>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM anime ORDER BY row_id"
    ))?;
    let rows = stmt
        .query_map([], row_to_anime)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Case-insensitive exact match on either title variant. Returns the most
/// recently ingested match.
pub fn find_by_name(conn: &Connection, name: &str) -> Result<Anime> {
    conn.query_row(
        &format!(
            "SELECT {SELECT_COLUMNS} FROM anime \
             WHERE title_romaji = ?1 COLLATE NOCASE OR title_english = ?1 COLLATE NOCASE \
             ORDER BY row_id DESC LIMIT 1"
        ),
        params![name.trim()],
        row_to_anime,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("no anime titled {name:?}")))
}

/// One uniformly random stored record.
pub fn random(conn: &Connection) -> Result<Anime> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM anime ORDER BY RANDOM() LIMIT 1"),
        [],
        row_to_anime,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound("no anime stored".into()))
}

/// Highest average score first, at most `limit` records.
pub fn top_rated(conn: &Connection, limit: usize) -> Result<Vec<Anime>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM anime ORDER BY average_score DESC, row_id LIMIT ?1"
    ))?;
    let rows = stmt
        .query_map(params![limit as i64], row_to_anime)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Delegated similarity search over the sqlite-vec index.
///
/// Pulls `num_candidates` nearest rows by cosine distance (capped at
/// [`MAX_KNN_CANDIDATES`]), scores each as `1 - distance`, and returns the
/// best `limit` in descending score order. A query whose width differs from
/// the index returns no results.
pub fn vector_search(
    conn: &Connection,
    query_embedding: &[f32],
    num_candidates: usize,
    limit: usize,
) -> Result<Vec<ScoredAnime>> {
    let indexed_dims = schema::vector_dimensions(conn)?;
    if query_embedding.len() != indexed_dims {
        tracing::warn!(
            query_dims = query_embedding.len(),
            indexed_dims,
            "query width does not match vector index"
        );
        return Ok(Vec::new());
    }
    if num_candidates == 0 || limit == 0 {
        return Ok(Vec::new());
    }
    let num_candidates = num_candidates.min(MAX_KNN_CANDIDATES);

    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS}, knn.distance FROM ( \
             SELECT rowid, distance FROM anime_vec \
             WHERE embedding MATCH ?1 AND k = ?2 \
         ) knn JOIN anime ON anime.row_id = knn.rowid \
         ORDER BY knn.distance"
    ))?;
    let mut results = stmt
        .query_map(
            params![embedding_to_bytes(query_embedding), num_candidates as i64],
            |row| {
                let distance: f64 = row.get(15)?;
                Ok(ScoredAnime {
                    anime: row_to_anime(row)?,
                    score: (1.0 - distance) as f32,
                })
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(limit);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anime::store::{insert_batch, IngestRun};
    use crate::db;

    fn record(id: i64, romaji: &str, english: &str, score: i64) -> CatalogRecord {
        CatalogRecord {
            id,
            title: Title {
                romaji: romaji.into(),
                english: english.into(),
            },
            genres: vec!["Drama".into(), "Drama".into()],
            studios: vec!["MAPPA".into()],
            average_score: score,
            ..Default::default()
        }
    }

    fn seeded_db() -> Connection {
        let mut conn = db::open_memory_database(2).unwrap();
        let batch = vec![
            Anime::assemble(record(1, "Shingeki no Kyojin", "Attack on Titan", 85), vec![1.0, 0.0]),
            Anime::assemble(record(2, "Death Note", "Death Note", 84), vec![0.0, 1.0]),
            Anime::assemble(record(3, "Sousou no Frieren", "Frieren", 91), vec![0.9, 0.1]),
        ];
        let run = IngestRun {
            run_id: uuid::Uuid::now_v7().to_string(),
            start_page: 1,
            end_page: 1,
            per_page: 3,
            fetched: 3,
            failed_pages: 0,
            failed_items: 0,
            embedding_model: "test/model".into(),
        };
        insert_batch(&mut conn, &batch, &run).unwrap();
        conn
    }

    #[test]
    fn list_all_round_trips_fields() {
        let conn = seeded_db();
        let all = list_all(&conn).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].record.title.english, "Attack on Titan");
        assert_eq!(all[0].record.genres, vec!["Drama", "Drama"]);
        assert_eq!(all[0].record.studios, vec!["MAPPA"]);
        assert_eq!(all[2].embedding, Some(vec![0.9, 0.1]));
    }

    #[test]
    fn find_by_name_is_case_insensitive() {
        let conn = seeded_db();
        let found = find_by_name(&conn, "attack on titan").unwrap();
        assert_eq!(found.record.id, 1);
        let found = find_by_name(&conn, "SOUSOU NO FRIEREN").unwrap();
        assert_eq!(found.record.id, 3);
    }

    #[test]
    fn find_by_name_not_found() {
        let conn = seeded_db();
        assert!(matches!(
            find_by_name(&conn, "Naruto"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn random_on_empty_store_is_not_found() {
        let conn = db::open_memory_database(2).unwrap();
        assert!(matches!(random(&conn), Err(Error::NotFound(_))));
        let conn = seeded_db();
        assert!(random(&conn).is_ok());
    }

    #[test]
    fn top_rated_orders_by_score() {
        let conn = seeded_db();
        let top = top_rated(&conn, 2).unwrap();
        let ids: Vec<i64> = top.iter().map(|a| a.record.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn vector_search_ranks_by_cosine() {
        let conn = seeded_db();
        let results = vector_search(&conn, &[1.0, 0.0], 100, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].anime.record.id, 1);
        assert_eq!(results[1].anime.record.id, 3);
        assert!((results[0].score - 1.0).abs() < 1e-5);
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn vector_search_caps_oversized_candidate_pool() {
        let conn = seeded_db();
        let results = vector_search(&conn, &[1.0, 0.0], 5000, 5000).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].anime.record.id, 1);
    }

    #[test]
    fn corrupt_genre_column_is_an_error() {
        let conn = seeded_db();
        conn.execute("UPDATE anime SET genres = 'not json' WHERE anime_id = 2", [])
            .unwrap();
        let err = list_all(&conn).unwrap_err();
        assert!(matches!(
            err,
            Error::Database(rusqlite::Error::FromSqlConversionFailure(4, _, _))
        ));
    }

    #[test]
    fn vector_search_skips_mismatched_query() {
        let conn = seeded_db();
        assert!(vector_search(&conn, &[1.0, 0.0, 0.0], 100, 2).unwrap().is_empty());
    }
}
