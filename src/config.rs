use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
    pub embedding: EmbeddingConfig,
    pub ingest: IngestConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CatalogConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"gemini"` (hosted) or `"ollama"` (local).
    pub provider: String,
    /// Empty means the provider's default model.
    pub model: String,
    /// Empty means the provider's default endpoint.
    pub base_url: String,
    pub api_key: Option<String>,
    /// Width of the indexed vector column. Vectors of any other length are
    /// stored but not indexed. Zero means the provider's default width.
    pub dimensions: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub page_concurrency: usize,
    pub embed_concurrency: usize,
    pub queue_capacity: usize,
    pub deadline_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_k: usize,
    pub num_candidates: usize,
    pub search_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            catalog: CatalogConfig::default(),
            embedding: EmbeddingConfig::default(),
            ingest: IngestConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_app_dir()
            .join("anime.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://graphql.anilist.co".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            model: String::new(),
            base_url: String::new(),
            api_key: None,
            dimensions: 0,
            timeout_secs: 60,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            page_concurrency: 4,
            embed_concurrency: 16,
            queue_capacity: 16,
            deadline_secs: 60,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            num_candidates: 100,
            search_limit: 5,
        }
    }
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Model, endpoint and vector width a provider uses unless configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderDefaults {
    pub model: &'static str,
    pub base_url: &'static str,
    pub dimensions: usize,
}

impl ProviderDefaults {
    /// Defaults for a known provider name.
    pub fn for_provider(provider: &str) -> Option<Self> {
        match provider {
            "gemini" => Some(Self {
                model: "gemini-embedding-001",
                base_url: "https://generativelanguage.googleapis.com/v1beta",
                dimensions: 3072,
            }),
            "ollama" => Some(Self {
                model: "nomic-embed-text",
                base_url: "http://localhost:11434/api/embeddings",
                dimensions: 768,
            }),
            _ => None,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Fill unset `model`, `base_url` and `dimensions` from the selected
    /// provider's defaults. Explicit values are kept. Unknown providers are
    /// left untouched.
    pub fn apply_provider_defaults(&mut self) {
        let Some(defaults) = ProviderDefaults::for_provider(&self.provider) else {
            return;
        };
        if self.model.is_empty() {
            self.model = defaults.model.to_string();
        }
        if self.base_url.is_empty() {
            self.base_url = defaults.base_url.to_string();
        }
        if self.dimensions == 0 {
            self.dimensions = defaults.dimensions;
        }
    }

    /// Copy of this config with provider defaults applied.
    pub fn resolved(&self) -> Self {
        let mut config = self.clone();
        config.apply_provider_defaults();
        config
    }
}

impl IngestConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// Returns `~/.anirec/`
pub fn default_app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".anirec")
}

/// Returns the default config file path: `~/.anirec/config.toml`
pub fn default_config_path() -> PathBuf {
    default_app_dir().join("config.toml")
}

impl AppConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.embedding.apply_provider_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// `ANIREC_DB`, `ANIREC_LOG_LEVEL`, `ANIREC_PROVIDER`, plus the provider
    /// variables `GEMINI_API_KEY`, `OLLAMA_URL` and `OLLAMA_MODEL`.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ANIREC_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("ANIREC_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("ANIREC_PROVIDER") {
            self.embedding.provider = val;
        }
        if let Ok(val) = std::env::var("GEMINI_API_KEY") {
            self.embedding.api_key = Some(val);
        }
        if self.embedding.provider == "ollama" {
            if let Ok(val) = std::env::var("OLLAMA_URL") {
                self.embedding.base_url = val;
            }
            if let Ok(val) = std::env::var("OLLAMA_MODEL") {
                self.embedding.model = val;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.ingest.page_concurrency > 0,
            "ingest.page_concurrency must be at least 1"
        );
        anyhow::ensure!(
            self.ingest.embed_concurrency > 0,
            "ingest.embed_concurrency must be at least 1"
        );
        anyhow::ensure!(
            self.ingest.queue_capacity > 0,
            "ingest.queue_capacity must be at least 1"
        );
        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be at least 1"
        );
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.embedding.provider, "ollama");
        assert_eq!(config.retrieval.default_k, 5);
        assert_eq!(config.retrieval.num_candidates, 100);
        assert!(config.storage.db_path.ends_with("anime.db"));

        let mut config = config;
        config.embedding.apply_provider_defaults();
        assert_eq!(config.embedding.model, "nomic-embed-text");
        assert_eq!(config.embedding.dimensions, 768);
        config.validate().unwrap();
    }

    #[test]
    fn provider_choice_alone_selects_its_defaults() {
        let mut config = AppConfig::default();
        config.embedding.provider = "gemini".into();
        config.embedding.apply_provider_defaults();

        assert_eq!(config.embedding.model, "gemini-embedding-001");
        assert_eq!(config.embedding.dimensions, 3072);
        assert_eq!(
            config.embedding.base_url,
            "https://generativelanguage.googleapis.com/v1beta"
        );
        config.validate().unwrap();
    }

    #[test]
    fn explicit_embedding_values_survive_defaults() {
        let toml_str = r#"
[embedding]
provider = "gemini"
model = "text-embedding-004"
dimensions = 768
"#;
        let mut config: AppConfig = toml::from_str(toml_str).unwrap();
        config.embedding.apply_provider_defaults();

        assert_eq!(config.embedding.model, "text-embedding-004");
        assert_eq!(config.embedding.dimensions, 768);
        assert_eq!(
            config.embedding.base_url,
            "https://generativelanguage.googleapis.com/v1beta"
        );
    }

    #[test]
    fn provider_in_config_file_picks_gemini_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[embedding]\nprovider = \"gemini\"\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.embedding.model, "gemini-embedding-001");
        assert_eq!(config.embedding.dimensions, 3072);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
db_path = "/tmp/test.db"

[embedding]
provider = "gemini"
model = "gemini-embedding-001"
dimensions = 3072

[ingest]
page_concurrency = 2
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.embedding.provider, "gemini");
        assert_eq!(config.embedding.dimensions, 3072);
        assert_eq!(config.ingest.page_concurrency, 2);
        // defaults still apply for unset fields
        assert_eq!(config.ingest.embed_concurrency, 16);
        assert_eq!(config.catalog.endpoint, "https://graphql.anilist.co");
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = AppConfig::default();
        config.ingest.page_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        std::env::set_var("ANIREC_DB", "/tmp/override.db");
        std::env::set_var("ANIREC_LOG_LEVEL", "trace");
        std::env::set_var("OLLAMA_MODEL", "mxbai-embed-large");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.embedding.model, "mxbai-embed-large");

        // Clean up
        std::env::remove_var("ANIREC_DB");
        std::env::remove_var("ANIREC_LOG_LEVEL");
        std::env::remove_var("OLLAMA_MODEL");
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/var/db.sqlite"), PathBuf::from("/var/db.sqlite"));
    }
}
