//! Embeddings and vector storage.
//!
//! - [`embedding`]: the embedding function shared by ingestion and retrieval
//! - [`store`]: the `VectorStore` / `Collection` traits and query response
//! - [`local`]: on-disk (or in-memory) brute-force store
//! - [`chroma`]: client for a remote Chroma server

pub mod chroma;
pub mod embedding;
pub mod local;
pub mod store;

use std::sync::Arc;

use indexmap::IndexMap;

pub use chroma::ChromaStore;
pub use embedding::{
    EmbeddingError, EmbeddingFunction, FastEmbedFunction, HashingEmbedding, canonical_model_id,
    cosine_similarity, embedding_from_config, parse_embedding_model,
};
pub use local::LocalStore;
pub use store::{
    Collection, Include, QueryResponse, StoreError, StoreResult, StoredRecord, VectorStore,
};

use crate::config::{Settings, StoreBackend};

/// Ordered string -> JSON scalar map attached to every record.
pub type Metadata = IndexMap<String, serde_json::Value>;

/// Open the store backend named in configuration.
pub fn open_store(settings: &Settings) -> StoreResult<Box<dyn VectorStore>> {
    match settings.store.backend {
        StoreBackend::Local => Ok(Box::new(LocalStore::open(
            &settings.paths.vectorstore,
            settings.store.distance,
        )?)),
        StoreBackend::Chroma => Ok(Box::new(ChromaStore::from_config(&settings.store)?)),
    }
}

/// Open the configured collection with the configured embedding model.
pub fn open_collection(settings: &Settings) -> StoreResult<Arc<dyn Collection>> {
    let embedding: Arc<dyn EmbeddingFunction> =
        Arc::from(embedding_from_config(&settings.embedding)?);
    open_store(settings)?.get_or_create(&settings.store.collection, embedding)
}
