//! Embedding functions shared by ingestion and retrieval.
//!
//! The same function must embed documents at ingest time and queries at
//! retrieval time. Stores record [`EmbeddingFunction::model_id`] to catch
//! mismatches.

use std::path::PathBuf;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use thiserror::Error;

use crate::config::EmbeddingConfig;

/// Error type for embedding operations
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Unsupported embedding model: {0}")]
    UnsupportedModel(String),

    #[error("Failed to initialize embedding model: {0}")]
    ModelInit(String),

    #[error("Failed to generate embedding: {0}")]
    Generation(String),

    #[error("Embedding model returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}

/// Text -> fixed-dimension vectors.
pub trait EmbeddingFunction: Send + Sync {
    /// Stable identifier of the model producing the vectors.
    fn model_id(&self) -> &str;

    /// Embed each text. Returns one vector per input, in order.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// A supported fastembed model: the id recorded in stores and the other
/// spellings accepted for it in `embedding.model`.
struct KnownModel {
    id: &'static str,
    aliases: &'static [&'static str],
    model: EmbeddingModel,
}

const KNOWN_MODELS: &[KnownModel] = &[
    KnownModel {
        id: "sentence-transformers/all-MiniLM-L6-v2",
        aliases: &["all-minilm-l6-v2", "allminilml6v2"],
        model: EmbeddingModel::AllMiniLML6V2,
    },
    KnownModel {
        id: "sentence-transformers/all-MiniLM-L12-v2",
        aliases: &["all-minilm-l12-v2", "allminilml12v2"],
        model: EmbeddingModel::AllMiniLML12V2,
    },
    KnownModel {
        id: "BAAI/bge-small-en-v1.5",
        aliases: &["bge-small-en-v1.5"],
        model: EmbeddingModel::BGESmallENV15,
    },
    KnownModel {
        id: "BAAI/bge-base-en-v1.5",
        aliases: &["bge-base-en-v1.5"],
        model: EmbeddingModel::BGEBaseENV15,
    },
    KnownModel {
        id: "BAAI/bge-large-en-v1.5",
        aliases: &["bge-large-en-v1.5"],
        model: EmbeddingModel::BGELargeENV15,
    },
    KnownModel {
        id: "intfloat/multilingual-e5-small",
        aliases: &["multilingual-e5-small"],
        model: EmbeddingModel::MultilingualE5Small,
    },
    KnownModel {
        id: "nomic-ai/nomic-embed-text-v1.5",
        aliases: &["nomic-embed-text-v1.5"],
        model: EmbeddingModel::NomicEmbedTextV15,
    },
];

/// Case-insensitive lookup by id or alias.
fn known_model(name: &str) -> Option<&'static KnownModel> {
    let wanted = name.trim().to_lowercase();
    KNOWN_MODELS.iter().find(|known| {
        known.id.to_lowercase() == wanted || known.aliases.contains(&wanted.as_str())
    })
}

/// Map a configured model name to a fastembed model.
pub fn parse_embedding_model(name: &str) -> Option<EmbeddingModel> {
    known_model(name).map(|known| known.model.clone())
}

/// The single id every spelling of a supported model is stored under.
pub fn canonical_model_id(name: &str) -> Option<&'static str> {
    known_model(name).map(|known| known.id)
}

/// Where downloaded ONNX models are cached.
pub fn models_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("portops").join("models"))
        .unwrap_or_else(|| PathBuf::from(".portops").join("models"))
}

/// Sentence-transformer embeddings through fastembed (ONNX runtime).
pub struct FastEmbedFunction {
    /// The embedding model (`embed` needs `&mut`)
    model: Mutex<TextEmbedding>,
    model_id: String,
    batch_size: usize,
}

impl std::fmt::Debug for FastEmbedFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedFunction")
            .field("model_id", &self.model_id)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl FastEmbedFunction {
    /// Load (downloading on first use) the model named in configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let known = known_model(&config.model)
            .ok_or_else(|| EmbeddingError::UnsupportedModel(config.model.clone()))?;

        tracing::info!(target: "embedding", "loading embedding model {}", known.id);

        let text_model = TextEmbedding::try_new(
            InitOptions::new(known.model.clone())
                .with_cache_dir(models_dir())
                .with_show_download_progress(config.show_download_progress),
        )
        .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;

        Ok(Self {
            model: Mutex::new(text_model),
            model_id: known.id.to_string(),
            batch_size: config.batch_size.max(1),
        })
    }
}

impl EmbeddingFunction for FastEmbedFunction {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .model
            .lock()
            .embed(texts.to_vec(), Some(self.batch_size))
            .map_err(|e| EmbeddingError::Generation(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                got: embeddings.len(),
            });
        }

        Ok(embeddings)
    }
}

/// Prefix selecting [`HashingEmbedding`] in `embedding.model`.
pub const HASHING_MODEL_PREFIX: &str = "hashing";

/// Deterministic bag-of-features embedding that needs no model download.
///
/// Lower-cased word tokens and character trigrams are hashed into a fixed
/// number of buckets and the vector is L2-normalized. Texts sharing words
/// land close together, which is enough for offline runs and tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("{HASHING_MODEL_PREFIX}-{dimension}"),
        }
    }

    /// Parse `hashing` or `hashing-<dim>`; `None` for any other name.
    pub fn from_model_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        let rest = name.strip_prefix(HASHING_MODEL_PREFIX)?;
        if rest.is_empty() {
            return Some(Self::new(384));
        }
        rest.strip_prefix('-')?.parse().ok().map(Self::new)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn bucket(&self, feature: &str) -> usize {
        // FNV-1a, stable across runs and platforms
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in feature.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % self.dimension as u64) as usize
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lower = text.to_lowercase();

        for word in lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            vector[self.bucket(word)] += 1.0;

            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                vector[self.bucket(&format!("#{trigram}"))] += 0.5;
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl EmbeddingFunction for HashingEmbedding {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Build the embedding function named in configuration.
pub fn embedding_from_config(
    config: &EmbeddingConfig,
) -> Result<Box<dyn EmbeddingFunction>, EmbeddingError> {
    if let Some(hashing) = HashingEmbedding::from_model_name(&config.model) {
        tracing::debug!(target: "embedding", "using {}", hashing.model_id());
        return Ok(Box::new(hashing));
    }
    Ok(Box::new(FastEmbedFunction::from_config(config)?))
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Squared euclidean distance.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
