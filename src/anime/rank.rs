//! In-process similarity ranker.
//!
//! Exhaustive cosine scan over the loaded corpus: O(corpus × dimensions) per
//! query. The index-backed counterpart is [`super::search::vector_search`].

use super::types::{Anime, ScoredAnime};
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};

/// Cosine similarity in single precision.
///
/// Returns `None` when the lengths differ, a vector is empty, or either
/// magnitude is zero, so callers never see NaN or infinity.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    let sim = dot / (norm_a * norm_b);
    sim.is_finite().then(|| sim.clamp(-1.0, 1.0))
}

/// Score `corpus` against an already-embedded query and keep the best `k`.
///
/// Records without an embedding, with a different width, or with a zero
/// vector are skipped. Ties keep corpus order. `k` larger than the number of
/// scored records returns all of them.
pub fn rank_by_embedding(query: &[f32], corpus: Vec<Anime>, k: usize) -> Vec<ScoredAnime> {
    let mut scored: Vec<ScoredAnime> = corpus
        .into_iter()
        .filter_map(|anime| {
            let score = anime
                .embedding
                .as_deref()
                .and_then(|emb| cosine_similarity(query, emb))?;
            Some(ScoredAnime { anime, score })
        })
        .collect();

    // sort_by is stable: equal scores stay in corpus order
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    scored
}

/// Embed `query` and rank `corpus` against it.
///
/// A query embedding failure is a [`Error::Ranking`]. An empty result is not
/// an error.
pub async fn recommend(
    provider: &dyn EmbeddingProvider,
    query: &str,
    corpus: Vec<Anime>,
    k: usize,
) -> Result<Vec<ScoredAnime>> {
    let query_embedding = provider
        .embed(query)
        .await
        .map_err(|e| Error::Ranking(format!("failed to embed query: {e}")))?;

    let corpus_len = corpus.len();
    let results = rank_by_embedding(&query_embedding, corpus, k);
    if results.is_empty() {
        tracing::info!(corpus_len, "no comparable records for query");
    } else {
        tracing::debug!(corpus_len, returned = results.len(), "ranked corpus");
    }
    Ok(results)
}
