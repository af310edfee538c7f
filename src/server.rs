//! HTTP surface over the catalog: lookups, recommendations, ingestion.
//!
//! [`setup_shared_state`] wires the database, embedding provider, catalog
//! client and ingestor; [`serve_http`] mounts the `/v1/anime` routes on it.

use anirec::anime::search;
use anirec::anime::store::SqliteStore;
use anirec::anime::types::ScoredAnime;
use anirec::anime::{rank, types::Anime};
use anirec::catalog::anilist::AniListClient;
use anirec::catalog::{CatalogFetcher, CatalogRecord};
use anirec::config::AppConfig;
use anirec::db;
use anirec::embedding::{self, EmbeddingProvider};
use anirec::ingest::{IngestOptions, IngestReport, Ingestor};
use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Everything a command or request handler needs, shared behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub provider: Arc<dyn EmbeddingProvider>,
    pub fetcher: Arc<dyn CatalogFetcher>,
    pub ingestor: Arc<Ingestor>,
    pub config: Arc<AppConfig>,
}

/// Shared setup: open DB, create embedding provider and catalog client,
/// check the stored model marker.
pub fn setup_shared_state(config: AppConfig) -> Result<AppState> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path, config.embedding.dimensions)?;
    tracing::info!(db = %db_path.display(), "database ready");

    let provider: Arc<dyn EmbeddingProvider> =
        Arc::from(embedding::create_provider(&config.embedding)?);
    let marker = embedding::model_marker(provider.as_ref());
    if let Ok(Some(stored)) = db::migrations::get_embedding_model(&conn) {
        if stored != marker {
            tracing::warn!(
                stored = %stored,
                configured = %marker,
                "embedding model changed; stored vectors will not be comparable with new queries"
            );
        }
    }
    tracing::info!(provider = %marker, "embedding provider ready");

    let fetcher: Arc<dyn CatalogFetcher> = Arc::new(AniListClient::new(&config.catalog)?);
    let db = Arc::new(Mutex::new(conn));
    let ingestor = Arc::new(Ingestor::new(
        Arc::clone(&fetcher),
        Arc::clone(&provider),
        Arc::new(SqliteStore::new(Arc::clone(&db))),
        IngestOptions::from(&config.ingest),
    ));

    Ok(AppState {
        db,
        provider,
        fetcher,
        ingestor,
        config: Arc::new(config),
    })
}

impl AppState {
    /// Run a blocking closure against the shared connection.
    pub async fn with_db<T, F>(&self, f: F) -> anirec::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> anirec::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| anirec::Error::Persist(format!("database lock poisoned: {e}")))?;
            f(&conn)
        })
        .await
        .map_err(|e| anirec::Error::Persist(format!("database task failed: {e}")))?
    }

    /// Brute-force recommendation over the whole stored corpus.
    pub async fn recommend(&self, query: &str, k: usize) -> anirec::Result<Vec<ScoredAnime>> {
        let corpus = self.with_db(search::list_all).await?;
        rank::recommend(self.provider.as_ref(), query, corpus, k).await
    }

    /// Index-backed recommendation through sqlite-vec.
    pub async fn recommend_indexed(
        &self,
        query: &str,
        limit: usize,
    ) -> anirec::Result<Vec<ScoredAnime>> {
        let query_embedding = self
            .provider
            .embed(query)
            .await
            .map_err(|e| anirec::Error::Ranking(format!("failed to embed query: {e}")))?;
        let num_candidates = self.config.retrieval.num_candidates.max(limit);
        self.with_db(move |conn| {
            search::vector_search(conn, &query_embedding, num_candidates, limit)
        })
        .await
    }
}

/// Start the HTTP server and block until ctrl-c.
pub async fn serve_http(config: AppConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = setup_shared_state(config)?;

    let anime_routes = Router::new()
        .route("/", get(anime_by_name))
        .route("/recommend", get(recommend))
        .route("/new-recommend", get(new_recommend))
        .route("/list", get(anime_list))
        .route("/random", get(random_anime))
        .route("/top-rated", get(top_rated))
        .route("/graphql", get(catalog_titles))
        .route("/insert", get(insert_page))
        .route("/insertconcurrent", get(insert_concurrent));

    let app = Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1/anime", anime_routes)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening at http://{bind_addr}/v1/anime");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}

// ── Error mapping ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

pub struct ApiError(StatusCode, String);

/// HTTP status for a library error. Request-parameter problems never reach
/// here; axum's `Query` rejection and [`bad_request`] answer those with 400.
fn status_for(err: &anirec::Error) -> StatusCode {
    use anirec::Error;
    match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Transport(_) | Error::Upstream(_) | Error::Embedding(_) | Error::Ranking(_) => {
            StatusCode::BAD_GATEWAY
        }
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::Persist(_) | Error::Database(_) | Error::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<anirec::Error> for ApiError {
    fn from(err: anirec::Error) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        ApiError(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { message: self.1 })).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError(StatusCode::BAD_REQUEST, message.into())
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[derive(Deserialize)]
struct NameParams {
    name: String,
}

async fn anime_by_name(
    State(state): State<AppState>,
    Query(params): Query<NameParams>,
) -> ApiResult<CatalogRecord> {
    if params.name.trim().is_empty() {
        return Err(bad_request("Missing name parameter"));
    }
    let anime = state
        .with_db(move |conn| search::find_by_name(conn, &params.name))
        .await?;
    Ok(Json(anime.record))
}

async fn anime_list(State(state): State<AppState>) -> ApiResult<Vec<CatalogRecord>> {
    let all = state.with_db(search::list_all).await?;
    Ok(Json(into_records(all)))
}

async fn random_anime(State(state): State<AppState>) -> ApiResult<CatalogRecord> {
    let anime = state.with_db(search::random).await?;
    Ok(Json(anime.record))
}

#[derive(Deserialize)]
struct LimitParams {
    limit: usize,
}

async fn top_rated(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Vec<CatalogRecord>> {
    let top = state
        .with_db(move |conn| search::top_rated(conn, params.limit))
        .await?;
    Ok(Json(into_records(top)))
}

#[derive(Deserialize)]
struct RecommendParams {
    query: String,
    k: Option<usize>,
}

async fn recommend(
    State(state): State<AppState>,
    Query(params): Query<RecommendParams>,
) -> ApiResult<Vec<ScoredAnime>> {
    if params.query.trim().is_empty() {
        return Err(bad_request("Missing query parameter"));
    }
    let k = params.k.unwrap_or(state.config.retrieval.default_k);
    Ok(Json(state.recommend(&params.query, k).await?))
}

async fn new_recommend(
    State(state): State<AppState>,
    Query(params): Query<RecommendParams>,
) -> ApiResult<Vec<ScoredAnime>> {
    if params.query.trim().is_empty() {
        return Err(bad_request("Missing query parameter"));
    }
    let limit = params.k.unwrap_or(state.config.retrieval.search_limit);
    Ok(Json(state.recommend_indexed(&params.query, limit).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageParams {
    page: u32,
    per_page: u32,
}

async fn catalog_titles(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Vec<String>> {
    let records = state.fetcher.fetch(params.page, params.per_page).await?;
    Ok(Json(records.into_iter().map(|r| r.title.romaji).collect()))
}

#[derive(Serialize)]
struct InsertResponse {
    status: &'static str,
    message: &'static str,
    count: usize,
    report: IngestReport,
}

impl From<IngestReport> for InsertResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            status: "success",
            message: "Animes inserted successfully",
            count: report.inserted,
            report,
        }
    }
}

async fn insert_page(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<InsertResponse> {
    let report = state
        .ingestor
        .ingest_page(params.page, params.per_page)
        .await?;
    Ok(Json(report.into()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RangeParams {
    start_page: u32,
    end_page: u32,
    per_page: u32,
}

async fn insert_concurrent(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> ApiResult<InsertResponse> {
    let report = state
        .ingestor
        .ingest_range(params.start_page, params.end_page, params.per_page)
        .await?;
    Ok(Json(report.into()))
}

fn into_records(anime: Vec<Anime>) -> Vec<CatalogRecord> {
    anime.into_iter().map(|a| a.record).collect()
}
