//! Persisted and scored record shapes.
//!
//! [`Anime`] is a catalog record with its embedding attached (the unit of the
//! bulk write). [`ScoredAnime`] pairs one with a similarity score during
//! ranking and search.

use serde::Serialize;

use crate::catalog::CatalogRecord;

/// A catalog record as persisted, with an optional embedding.
///
/// The embedding is `None` only for rows written without one; the ingestion
/// pipeline drops items whose embedding failed rather than storing them bare.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anime {
    #[serde(flatten)]
    pub record: CatalogRecord,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl Anime {
    /// Record assembler: attach an embedding to a fetched catalog record.
    pub fn assemble(record: CatalogRecord, embedding: Vec<f32>) -> Self {
        Self {
            record,
            embedding: Some(embedding),
        }
    }

    /// Embedding length, or `None` when no embedding is attached.
    pub fn dimensions(&self) -> Option<usize> {
        self.embedding.as_ref().map(Vec::len)
    }
}

/// A record paired with its similarity to a query, in `[-1, 1]` for cosine
/// scores.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredAnime {
    #[serde(flatten)]
    pub anime: Anime,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Title;

    #[test]
    fn assemble_keeps_record_fields() {
        let record = CatalogRecord {
            id: 5114,
            title: Title {
                romaji: "Hagane no Renkinjutsushi: FULLMETAL ALCHEMIST".into(),
                english: "Fullmetal Alchemist: Brotherhood".into(),
            },
            studios: vec!["bones".into()],
            ..Default::default()
        };
        let anime = Anime::assemble(record.clone(), vec![0.1, 0.2, 0.3]);
        assert_eq!(anime.record, record);
        assert_eq!(anime.dimensions(), Some(3));
    }

    #[test]
    fn serialized_form_omits_embedding() {
        let anime = Anime::assemble(CatalogRecord::default(), vec![1.0; 8]);
        let scored = ScoredAnime { anime, score: 0.75 };
        let json = serde_json::to_value(&scored).unwrap();
        assert!(json.get("embedding").is_none());
        assert_eq!(json["score"], 0.75);
        assert!(json.get("title").is_some());
    }
}
