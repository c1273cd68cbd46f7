//! Vector store abstraction.
//!
//! The pipeline only upserts records and queries nearest neighbors; index
//! structure and persistence belong to the backend. Handles are passed
//! explicitly into ingestion and retrieval so tests can substitute the
//! in-memory local store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Metadata;
use super::embedding::{EmbeddingError, EmbeddingFunction};

/// Errors from vector store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Failed to (de)serialize collection {collection}: {reason}")]
    Serialization { collection: String, reason: String },

    #[error(
        "Collection '{collection}' was built with embedding model '{stored}', \
         but '{requested}' was requested"
    )]
    EmbeddingMismatch {
        collection: String,
        stored: String,
        requested: String,
    },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Invalid collection name: {0}")]
    InvalidName(String),

    #[error("Vector store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vector store returned {status}: {body}")]
    Remote { status: u16, body: String },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Optional fields a query may ask the store to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Include {
    Documents,
    Metadatas,
    Distances,
}

impl Include {
    /// What retrieval asks for. Ids are always returned.
    pub const RETRIEVAL: [Include; 3] = [
        Include::Documents,
        Include::Metadatas,
        Include::Distances,
    ];
}

/// Nearest-neighbor response, one outer entry per query text.
///
/// Every field may be missing, and so may any inner value; consumers must
/// default rather than index blindly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub ids: Option<Vec<Vec<String>>>,

    #[serde(default)]
    pub documents: Option<Vec<Vec<Option<String>>>>,

    #[serde(default)]
    pub metadatas: Option<Vec<Vec<Option<Metadata>>>>,

    #[serde(default)]
    pub distances: Option<Vec<Vec<Option<f32>>>>,
}

/// One stored record as returned by [`Collection::get_all`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub document: Option<String>,
    pub metadata: Metadata,
}

/// A named set of embedding records bound to one embedding function.
pub trait Collection: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Embedding model the collection is bound to.
    fn embedding_model(&self) -> &str;

    /// Insert or replace records by id. The three slices are parallel.
    ///
    /// Either every record is written or none is.
    fn upsert(&self, ids: &[String], documents: &[String], metadatas: &[Metadata])
    -> StoreResult<()>;

    /// Up to `n_results` nearest records for each query text, nearest first.
    fn query(
        &self,
        query_texts: &[&str],
        n_results: usize,
        include: &[Include],
    ) -> StoreResult<QueryResponse>;

    /// Number of stored records.
    fn count(&self) -> StoreResult<usize>;

    /// Every stored record (ids, documents, metadata).
    fn get_all(&self) -> StoreResult<Vec<StoredRecord>>;

    /// Ids of the records whose metadata `key` equals the string `value`.
    fn ids_where(&self, key: &str, value: &str) -> StoreResult<Vec<String>>;

    /// Remove records by id. Unknown ids are ignored.
    fn delete(&self, ids: &[String]) -> StoreResult<()>;
}

/// Entry point of a vector store backend.
pub trait VectorStore: Send + Sync {
    /// Open `name`, creating it bound to `embedding` if it does not exist.
    fn get_or_create(
        &self,
        name: &str,
        embedding: Arc<dyn EmbeddingFunction>,
    ) -> StoreResult<Arc<dyn Collection>>;
}

/// Check that parallel upsert slices line up and ids are usable.
pub(crate) fn validate_batch(
    ids: &[String],
    documents: &[String],
    metadatas: &[Metadata],
) -> StoreResult<()> {
    if ids.len() != documents.len() || ids.len() != metadatas.len() {
        return Err(StoreError::InvalidBatch(format!(
            "{} ids, {} documents, {} metadatas",
            ids.len(),
            documents.len(),
            metadatas.len()
        )));
    }

    if let Some(empty) = ids.iter().position(|id| id.is_empty()) {
        return Err(StoreError::InvalidBatch(format!("empty id at position {empty}")));
    }

    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(StoreError::InvalidBatch(format!("duplicate id {id}")));
        }
    }

    Ok(())
}
