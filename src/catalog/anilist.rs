//! AniList GraphQL catalog client.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CatalogFetcher, CatalogRecord, CoverImage, Title};
use crate::config::CatalogConfig;
use crate::error::{Error, Result};

const PAGE_QUERY: &str = r#"
query ($page: Int, $perPage: Int) {
  Page(page: $page, perPage: $perPage) {
    media(type: ANIME, sort: POPULARITY_DESC) {
      id
      title { romaji english }
      description
      genres
      averageScore
      episodes
      duration
      season
      seasonYear
      status
      source
      studios { nodes { name } }
      coverImage { large }
    }
  }
}"#;

/// Fetches popularity-ordered anime pages from the AniList GraphQL API.
#[derive(Clone)]
pub struct AniListClient {
    client: Client,
    endpoint: String,
}

impl AniListClient {
    pub fn new(config: &CatalogConfig) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .context("failed to build catalog HTTP client")?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl CatalogFetcher for AniListClient {
    async fn fetch(&self, page: u32, per_page: u32) -> Result<Vec<CatalogRecord>> {
        if page == 0 || per_page == 0 {
            return Err(Error::Upstream(format!(
                "invalid page request: page={page} per_page={per_page}"
            )));
        }

        let request = GraphQlRequest {
            query: PAGE_QUERY,
            variables: PageVariables { page, per_page },
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(Error::from_catalog_request)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(Error::from_catalog_request)?;
        if !status.is_success() {
            return Err(Error::Upstream(format!("anilist returned HTTP {status}: {body}")));
        }

        let records = parse_page(&body)?;
        tracing::debug!(page, per_page, count = records.len(), "fetched catalog page");
        Ok(records)
    }
}

/// Decode a GraphQL page response body into catalog records.
pub(crate) fn parse_page(body: &str) -> Result<Vec<CatalogRecord>> {
    let envelope: GraphQlResponse = serde_json::from_str(body)
        .map_err(|e| Error::Upstream(format!("malformed anilist response: {e}")))?;

    if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        return Err(Error::Upstream(format!(
            "anilist query failed: {}",
            messages.join("; ")
        )));
    }

    let media = envelope
        .data
        .ok_or_else(|| Error::Upstream("anilist response has no data".into()))?
        .page
        .media;

    Ok(media.into_iter().map(MediaNode::into_record).collect())
}

#[derive(Serialize)]
struct GraphQlRequest {
    query: &'static str,
    variables: PageVariables,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageVariables {
    page: u32,
    per_page: u32,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<PageData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct PageData {
    #[serde(rename = "Page")]
    page: MediaPage,
}

#[derive(Deserialize)]
struct MediaPage {
    #[serde(default)]
    media: Vec<MediaNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaNode {
    id: i64,
    title: Option<MediaTitle>,
    description: Option<String>,
    #[serde(default)]
    genres: Option<Vec<String>>,
    average_score: Option<i64>,
    episodes: Option<i64>,
    duration: Option<i64>,
    season: Option<String>,
    season_year: Option<i64>,
    status: Option<String>,
    source: Option<String>,
    studios: Option<StudioConnection>,
    cover_image: Option<MediaCover>,
}

#[derive(Deserialize)]
struct MediaTitle {
    romaji: Option<String>,
    english: Option<String>,
}

#[derive(Deserialize)]
struct StudioConnection {
    #[serde(default)]
    nodes: Vec<StudioNode>,
}

#[derive(Deserialize)]
struct StudioNode {
    name: String,
}

#[derive(Deserialize)]
struct MediaCover {
    large: Option<String>,
}

impl MediaNode {
    fn into_record(self) -> CatalogRecord {
        let title = self.title.map_or_else(Title::default, |t| Title {
            romaji: t.romaji.unwrap_or_default(),
            english: t.english.unwrap_or_default(),
        });
        let studios = self
            .studios
            .map(|s| s.nodes.into_iter().map(|n| n.name).collect())
            .unwrap_or_default();
        CatalogRecord {
            id: self.id,
            title,
            description: self.description.unwrap_or_default(),
            genres: self.genres.unwrap_or_default(),
            average_score: self.average_score.unwrap_or_default(),
            episodes: self.episodes.unwrap_or_default(),
            duration: self.duration.unwrap_or_default(),
            season: self.season.unwrap_or_default(),
            season_year: self.season_year.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
            source: self.source.unwrap_or_default(),
            studios,
            cover_image: CoverImage {
                large: self
                    .cover_image
                    .and_then(|c| c.large)
                    .unwrap_or_default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_BODY: &str = r#"{
      "data": {
        "Page": {
          "media": [
            {
              "id": 16498,
              "title": { "romaji": "Shingeki no Kyojin", "english": "Attack on Titan" },
              "description": "Several hundred years ago...",
              "genres": ["Action", "Drama", "Fantasy"],
              "averageScore": 85,
              "episodes": 25,
              "duration": 24,
              "season": "SPRING",
              "seasonYear": 2013,
              "status": "FINISHED",
              "source": "MANGA",
              "studios": { "nodes": [{ "name": "Wit Studio" }, { "name": "Pony Canyon" }] },
              "coverImage": { "large": "https://img.example/aot.jpg" }
            },
            {
              "id": 1,
              "title": { "romaji": "Cowboy Bebop", "english": null },
              "description": null,
              "genres": null,
              "averageScore": null,
              "episodes": null,
              "duration": null,
              "season": null,
              "seasonYear": null,
              "status": null,
              "source": null,
              "studios": null,
              "coverImage": null
            }
          ]
        }
      }
    }"#;

    #[test]
    fn parse_page_flattens_studios() {
        let records = parse_page(PAGE_BODY).unwrap();
        assert_eq!(records.len(), 2);

        let aot = &records[0];
        assert_eq!(aot.id, 16498);
        assert_eq!(aot.title.english, "Attack on Titan");
        assert_eq!(aot.studios, vec!["Wit Studio", "Pony Canyon"]);
        assert_eq!(aot.season_year, 2013);
        assert_eq!(aot.cover_image.large, "https://img.example/aot.jpg");
    }

    #[test]
    fn parse_page_defaults_null_fields() {
        let records = parse_page(PAGE_BODY).unwrap();
        let bebop = &records[1];
        assert_eq!(bebop.title.romaji, "Cowboy Bebop");
        assert_eq!(bebop.title.english, "");
        assert!(bebop.genres.is_empty());
        assert!(bebop.studios.is_empty());
        assert_eq!(bebop.episodes, 0);
    }

    #[test]
    fn parse_page_rejects_malformed_body() {
        let err = parse_page("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }

    #[test]
    fn parse_page_surfaces_graphql_errors() {
        let body = r#"{"data": null, "errors": [{"message": "Too Many Requests."}]}"#;
        let err = parse_page(body).unwrap_err();
        assert!(err.to_string().contains("Too Many Requests."));
    }

    #[test]
    fn parse_page_accepts_empty_page() {
        let body = r#"{"data": {"Page": {"media": []}}}"#;
        assert!(parse_page(body).unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_rejects_page_zero_without_network() {
        let client = AniListClient::new(&CatalogConfig {
            endpoint: "http://127.0.0.1:9".into(),
            timeout_secs: 1,
        })
        .unwrap();
        let err = client.fetch(0, 10).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }
}
