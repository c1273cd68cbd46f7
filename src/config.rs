//! Configuration module for the PortOps assistant.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `PORTOPS_` and use double
//! underscores to separate nested levels:
//! - `PORTOPS_RETRIEVAL__TOP_K=8` sets `retrieval.top_k`
//! - `PORTOPS_PATHS__RAW_DOCS=/srv/sops` sets `paths.raw_docs`
//! - `PORTOPS_STORE__BACKEND=chroma` sets `store.backend`
//!
//! `EMBEDDING_MODEL` overrides `embedding.model` regardless of prefix.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::documents::{ChunkingConfig, IdStrategy};

/// Directory holding the workspace settings file.
pub const CONFIG_DIR: &str = ".portops";

/// Settings file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

/// Environment variable that overrides the embedding model identifier.
pub const EMBEDDING_MODEL_ENV: &str = "EMBEDDING_MODEL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("settings file not found: {}. Run 'portops init' to create one", .0.display())]
    NotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("configuration file already exists at {0}. Use --force to overwrite")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Source and destination locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Chunking and top-k settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Vector store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Embedding model settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chat completion settings
    #[serde(default)]
    pub chat: ChatConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathsConfig {
    /// Directory scanned for SOP documents
    #[serde(default = "default_raw_docs")]
    pub raw_docs: PathBuf,

    /// Directory holding the persistent vector index
    #[serde(default = "default_vectorstore")]
    pub vectorstore: PathBuf,

    /// Descend into subdirectories of `raw_docs`
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    /// Maximum chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Number of snippets returned per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// How chunk ids are generated
    #[serde(default)]
    pub id_strategy: IdStrategy,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    /// Snapshot files under `paths.vectorstore`
    #[default]
    Local,
    /// Remote Chroma server over its REST API
    Chroma,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// 1 - cosine similarity
    #[default]
    Cosine,
    /// Squared euclidean distance
    L2,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Collection name shared by ingestion and retrieval
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Base URL of the Chroma server
    #[serde(default = "default_chroma_url")]
    pub chroma_url: String,

    /// Chroma tenant
    #[serde(default = "default_chroma_tenant")]
    pub chroma_tenant: String,

    /// Chroma database within the tenant
    #[serde(default = "default_chroma_database")]
    pub chroma_database: String,

    /// Distance metric used by the local backend
    #[serde(default)]
    pub distance: DistanceMetric,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// Model identifier (overridden by `EMBEDDING_MODEL`)
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Texts embedded per model call
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Show a progress bar while the model downloads
    #[serde(default = "default_true")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChatConfig {
    /// Chat completion model name
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// OpenAI-compatible API root
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// HTTP timeout for one completion call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Ground answers in retrieved snippets by default
    #[serde(default = "default_true")]
    pub use_rag: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for all targets
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides (e.g. `ingest = "debug"`)
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_raw_docs() -> PathBuf {
    PathBuf::from("data/raw")
}
fn default_vectorstore() -> PathBuf {
    PathBuf::from("data/vectorstore")
}
fn default_chunk_size() -> usize {
    ChunkingConfig::default().chunk_size
}
fn default_chunk_overlap() -> usize {
    ChunkingConfig::default().overlap
}
fn default_top_k() -> usize {
    4
}
fn default_collection() -> String {
    "portops".to_string()
}
fn default_chroma_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_chroma_tenant() -> String {
    "default_tenant".to_string()
}
fn default_chroma_database() -> String {
    "default_database".to_string()
}
fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}
fn default_embedding_batch_size() -> usize {
    64
}
fn default_true() -> bool {
    true
}
fn default_chat_model() -> String {
    "llama3-8b-8192".to_string()
}
fn default_chat_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> usize {
    1000
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_docs: default_raw_docs(),
            vectorstore: default_vectorstore(),
            recursive: false,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            id_strategy: IdStrategy::default(),
        }
    }
}

impl RetrievalConfig {
    /// Chunking parameters for the ingestion pipeline.
    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: self.chunk_size,
            overlap: self.chunk_overlap,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            collection: default_collection(),
            chroma_url: default_chroma_url(),
            chroma_tenant: default_chroma_tenant(),
            chroma_database: default_chroma_database(),
            distance: DistanceMetric::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_embedding_batch_size(),
            show_download_progress: true,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            base_url: default_chat_base_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            use_rag: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    ///
    /// Uses the workspace settings file when one is found, else
    /// `.portops/settings.toml` under the current directory. Either way the
    /// file has to exist.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, layered over defaults and
    /// under environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let mut settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore separates nesting, single underscore stays in field names
            .merge(
                Env::prefixed("PORTOPS_")
                    .map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
            .map_err(Box::new)?;

        if let Ok(model) = std::env::var(EMBEDDING_MODEL_ENV) {
            if !model.trim().is_empty() {
                settings.embedding.model = model.trim().to_string();
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retrieval
            .chunking()
            .validate()
            .map_err(ConfigError::Invalid)?;

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.top_k must be greater than zero".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.chat.temperature) {
            return Err(ConfigError::Invalid(format!(
                "chat.temperature ({}) must be between 0.0 and 2.0",
                self.chat.temperature
            )));
        }

        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding.batch_size must be greater than zero".to_string(),
            ));
        }

        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "embedding.model must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Accepted values that are still likely mistakes.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            warnings.push(format!(
                "chunk_overlap ({}) >= chunk_size ({}): chunks will not overlap",
                self.retrieval.chunk_overlap, self.retrieval.chunk_size
            ));
        }

        warnings
    }

    /// Emit [`Settings::warnings`] through tracing. Call after logging is set up.
    pub fn log_warnings(&self) {
        for warning in self.warnings() {
            tracing::warn!(target: "config", "{warning}");
        }
    }

    /// Find the settings file by looking for `.portops` from the current
    /// directory up to the filesystem root.
    pub fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Write a default settings file under `root/.portops`.
    pub fn init_config_file(root: impl AsRef<Path>, force: bool) -> Result<PathBuf, ConfigError> {
        let config_path = root.as_ref().join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err(ConfigError::AlreadyExists(config_path));
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.paths.raw_docs, PathBuf::from("data/raw"));
        assert_eq!(settings.paths.vectorstore, PathBuf::from("data/vectorstore"));
        assert_eq!(settings.retrieval.chunk_size, 800);
        assert_eq!(settings.retrieval.chunk_overlap, 120);
        assert_eq!(settings.retrieval.id_strategy, IdStrategy::Random);
        assert_eq!(settings.store.backend, StoreBackend::Local);
        assert_eq!(settings.store.collection, "portops");
        assert_eq!(settings.chat.model, "llama3-8b-8192");
        assert_eq!(settings.chat.max_tokens, 1000);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
[paths]
raw_docs = "sops"
vectorstore = "index"

[retrieval]
chunk_size = 500
chunk_overlap = 50
top_k = 6
id_strategy = "content-hash"

[store]
backend = "chroma"
distance = "l2"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.paths.raw_docs, PathBuf::from("sops"));
        assert_eq!(settings.paths.vectorstore, PathBuf::from("index"));
        assert_eq!(settings.retrieval.chunk_size, 500);
        assert_eq!(settings.retrieval.chunk_overlap, 50);
        assert_eq!(settings.retrieval.top_k, 6);
        assert_eq!(settings.retrieval.id_strategy, IdStrategy::ContentHash);
        assert_eq!(settings.store.backend, StoreBackend::Chroma);
        assert_eq!(settings.store.distance, DistanceMetric::L2);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(&config_path, "[retrieval]\ntop_k = 2\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.retrieval.top_k, 2);
        assert_eq!(settings.retrieval.chunk_size, 800);
        assert_eq!(settings.chat.base_url, "https://api.groq.com/openai/v1");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(&config_path, "[retrieval]\nchunk_size = 0\n").unwrap();
        assert!(matches!(
            Settings::load_from(&config_path),
            Err(ConfigError::Invalid(_))
        ));

        fs::write(&config_path, "[retrieval]\ntop_k = 0\n").unwrap();
        assert!(matches!(
            Settings::load_from(&config_path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_DIR).join(CONFIG_FILE);

        match Settings::load_from(&config_path) {
            Err(ConfigError::NotFound(path)) => assert_eq!(path, config_path),
            other => panic!("expected NotFound, got {other:?}"),
        }

        // A directory in place of the file is not a settings file either
        fs::create_dir_all(&config_path).unwrap();
        assert!(matches!(
            Settings::load_from(&config_path),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_overlap_not_below_size_is_a_warning() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(
            &config_path,
            "[retrieval]\nchunk_size = 100\nchunk_overlap = 100\n",
        )
        .unwrap();
        let settings = Settings::load_from(&config_path).unwrap();
        let warnings = settings.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("chunk_overlap (100) >= chunk_size (100)"));

        assert!(Settings::default().warnings().is_empty());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(&config_path, "[retrieval\nchunk_size = ").unwrap();
        assert!(matches!(
            Settings::load_from(&config_path),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_save_and_init() {
        let temp_dir = TempDir::new().unwrap();

        let path = Settings::init_config_file(temp_dir.path(), false).unwrap();
        assert!(path.ends_with(".portops/settings.toml"));

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[paths]"));
        assert!(content.contains("[retrieval]"));

        assert!(matches!(
            Settings::init_config_file(temp_dir.path(), false),
            Err(ConfigError::AlreadyExists(_))
        ));
        assert!(Settings::init_config_file(temp_dir.path(), true).is_ok());

        let mut settings = Settings::load_from(&path).unwrap();
        settings.retrieval.top_k = 9;
        settings.save(&path).unwrap();
        let reloaded = Settings::load_from(&path).unwrap();
        assert_eq!(reloaded.retrieval.top_k, 9);
    }
}
