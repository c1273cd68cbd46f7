//! Configuration types for document chunking and chunk identity.

use serde::{Deserialize, Serialize};

/// Configuration for document chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between adjacent chunks in characters.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_chunk_size() -> usize {
    800
}

fn default_overlap() -> usize {
    120
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

impl ChunkingConfig {
    /// Validate configuration values.
    ///
    /// An overlap at or above the chunk size is accepted: the chunker then
    /// advances by whole windows instead of looping.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than zero".to_string());
        }

        Ok(())
    }
}

/// How chunk identifiers are generated during ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdStrategy {
    /// Fresh UUID v4 per chunk. Re-ingesting a file adds a second copy.
    #[default]
    Random,
    /// SHA-256 of source path and chunk offset. Re-ingesting a file
    /// overwrites its previous chunks.
    ContentHash,
}
