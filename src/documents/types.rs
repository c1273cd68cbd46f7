//! Core types for document loading and chunking.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::vector::Metadata;

/// Metadata key holding the source file name.
pub const META_SOURCE: &str = "source";

/// Metadata key holding the full path as discovered.
pub const META_PATH: &str = "path";

/// A source file with its extracted text.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path as discovered under the source directory.
    pub path: PathBuf,

    /// Lower-cased extension without the dot (e.g. "pdf").
    pub extension: String,

    /// Extracted plain text.
    pub text: String,
}

impl Document {
    /// Create a document, deriving the extension from the path.
    pub fn new(path: PathBuf, text: String) -> Self {
        let extension = extension_of(&path);
        Self {
            path,
            extension,
            text,
        }
    }

    /// File name without directories, used as the citation source.
    pub fn source_name(&self) -> String {
        source_name(&self.path)
    }

    /// True when the text holds nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Where a chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSource {
    /// Basename of the source file.
    pub source: String,

    /// Full path of the source file.
    pub path: String,
}

impl ChunkSource {
    pub fn from_path(path: &Path) -> Self {
        Self {
            source: source_name(path),
            path: path.to_string_lossy().into_owned(),
        }
    }

    /// Store metadata for this source: `{source, path}`.
    pub fn to_metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert(META_SOURCE.to_string(), self.source.clone().into());
        meta.insert(META_PATH.to_string(), self.path.clone().into());
        meta
    }
}

/// A chunk of a document ready for upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Unique identifier for this chunk.
    pub id: String,

    /// Character offset of the chunk in the document text.
    pub char_offset: usize,

    /// The text content of this chunk.
    pub text: String,

    /// Source file of the chunk.
    pub source: ChunkSource,
}

/// Lower-cased extension of `path`, empty when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Basename of `path`, falling back to the whole path.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
