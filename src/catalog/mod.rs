//! Catalog source: record shape and the page fetcher seam.
//!
//! [`CatalogFetcher`] is implemented by [`anilist::AniListClient`] in production
//! and by in-memory fakes in tests.

pub mod anilist;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Primary (romanized) and localized title variants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    #[serde(default)]
    pub romaji: String,
    #[serde(default)]
    pub english: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverImage {
    #[serde(default)]
    pub large: String,
}

/// One record as delivered by the catalog source. Missing upstream values are
/// flattened to their zero value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRecord {
    pub id: i64,
    pub title: Title,
    pub description: String,
    pub genres: Vec<String>,
    pub average_score: i64,
    pub episodes: i64,
    pub duration: i64,
    pub season: String,
    pub season_year: i64,
    pub status: String,
    pub source: String,
    pub studios: Vec<String>,
    pub cover_image: CoverImage,
}

impl CatalogRecord {
    /// Text sent to the embedding provider: both title variants, the
    /// description, then the genre tags, space separated.
    pub fn embedding_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.title.romaji,
            self.title.english,
            self.description,
            self.genres.join(" ")
        )
    }
}

/// Retrieves one page of catalog records.
///
/// `page` and `per_page` are 1-based and must be at least 1. Implementations
/// make exactly one outbound request per call and never retry.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    async fn fetch(&self, page: u32, per_page: u32) -> Result<Vec<CatalogRecord>>;
}
