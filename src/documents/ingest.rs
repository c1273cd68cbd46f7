//! Ingestion pipeline: discover -> extract -> chunk -> id -> upsert.
//!
//! Each document is written with a single upsert holding all of its chunks.
//! A document that fails to read, extract or upsert is skipped and recorded
//! in the [`IngestReport`]; the run carries on with the next file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::chunker::{Chunker, FixedWindowChunker};
use super::config::{ChunkingConfig, IdStrategy};
use super::loader::{DocumentLoader, LoaderError};
use super::types::{Chunk, ChunkSource, Document, META_PATH};
use crate::vector::{Collection, Metadata, StoreError};

/// Errors that abort a whole ingestion run.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid chunking configuration: {0}")]
    InvalidChunking(String),

    #[error(transparent)]
    Loader(#[from] LoaderError),
}

/// Progress events emitted while a run proceeds.
#[derive(Debug)]
pub enum IngestProgress<'a> {
    /// Discovery finished
    Discovered { total: usize },
    /// About to process a file
    ProcessingFile {
        current: usize,
        total: usize,
        path: &'a Path,
    },
    /// A file was handled, whatever the outcome
    FileDone { path: &'a Path, outcome: FileOutcome },
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Indexed { chunks: usize },
    SkippedEmpty,
    Failed,
}

/// Stage at which a document failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Read,
    Store,
}

/// A document that could not be ingested.
#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    pub path: PathBuf,
    pub stage: FailureStage,
    pub error: String,
}

/// Counts for one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub files_found: usize,
    pub files_indexed: usize,
    pub files_skipped_empty: usize,
    pub files_failed: usize,
    pub chunks_written: usize,
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn has_failures(&self) -> bool {
        self.files_failed > 0
    }

    fn record_failure(&mut self, path: &Path, stage: FailureStage, error: String) {
        self.files_failed += 1;
        self.failures.push(IngestFailure {
            path: path.to_path_buf(),
            stage,
            error,
        });
    }
}

/// Turns a directory of SOP documents into collection records.
pub struct Ingestor<'a> {
    collection: &'a dyn Collection,
    loader: DocumentLoader,
    chunker: Box<dyn Chunker>,
    chunking: ChunkingConfig,
    id_strategy: IdStrategy,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        collection: &'a dyn Collection,
        chunking: ChunkingConfig,
        id_strategy: IdStrategy,
    ) -> Self {
        Self {
            collection,
            loader: DocumentLoader::default(),
            chunker: Box::new(FixedWindowChunker::new()),
            chunking,
            id_strategy,
        }
    }

    /// Use a custom loader (extractor set, recursion).
    pub fn with_loader(mut self, loader: DocumentLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Ingest every supported file in `dir`.
    pub fn run(&self, dir: &Path) -> Result<IngestReport, IngestError> {
        self.run_with_progress(dir, |_| {})
    }

    /// Same as [`Ingestor::run`], reporting progress through `on_progress`.
    pub fn run_with_progress<F>(
        &self,
        dir: &Path,
        mut on_progress: F,
    ) -> Result<IngestReport, IngestError>
    where
        F: FnMut(IngestProgress<'_>),
    {
        self.chunking
            .validate()
            .map_err(IngestError::InvalidChunking)?;

        let files = self.loader.discover(dir)?;
        let mut report = IngestReport {
            files_found: files.len(),
            ..Default::default()
        };
        on_progress(IngestProgress::Discovered { total: files.len() });

        if files.is_empty() {
            tracing::warn!(target: "ingest", "no documents found in {}", dir.display());
            return Ok(report);
        }

        tracing::info!(
            target: "ingest",
            "ingesting {} files from {} into '{}'",
            files.len(),
            dir.display(),
            self.collection.name()
        );

        let total = files.len();
        for (idx, path) in files.iter().enumerate() {
            on_progress(IngestProgress::ProcessingFile {
                current: idx + 1,
                total,
                path,
            });

            let outcome = self.ingest_file(path, &mut report);
            on_progress(IngestProgress::FileDone { path, outcome });
        }

        tracing::info!(
            target: "ingest",
            "indexed {} of {} files ({} chunks, {} empty, {} failed)",
            report.files_indexed,
            report.files_found,
            report.chunks_written,
            report.files_skipped_empty,
            report.files_failed
        );

        Ok(report)
    }

    fn ingest_file(&self, path: &Path, report: &mut IngestReport) -> FileOutcome {
        let document = match self.loader.load(path) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(target: "loader", "failed to read {}: {e}", path.display());
                report.record_failure(path, FailureStage::Read, e.to_string());
                return FileOutcome::Failed;
            }
        };

        let source_path = path.to_string_lossy();

        if document.is_blank() {
            tracing::info!(target: "ingest", "empty file (skipped): {}", path.display());
            if let Err(e) = self.remove_stale_chunks(&source_path, &[]) {
                tracing::error!(
                    target: "ingest",
                    "failed to remove old chunks of {}: {e}",
                    path.display()
                );
                report.record_failure(path, FailureStage::Store, e.to_string());
                return FileOutcome::Failed;
            }
            report.files_skipped_empty += 1;
            return FileOutcome::SkippedEmpty;
        }

        let chunks = self.chunk_document(&document);
        let stored = self
            .upsert_chunks(&chunks)
            .and_then(|()| self.remove_stale_chunks(&source_path, &chunks));
        match stored {
            Ok(removed) => {
                tracing::debug!(
                    target: "ingest",
                    "{}: {} chunks ({} stale removed)",
                    path.display(),
                    chunks.len(),
                    removed
                );
                report.files_indexed += 1;
                report.chunks_written += chunks.len();
                FileOutcome::Indexed {
                    chunks: chunks.len(),
                }
            }
            Err(e) => {
                tracing::error!(
                    target: "ingest",
                    "failed to store {} ({} chunks): {e}",
                    path.display(),
                    chunks.len()
                );
                report.record_failure(path, FailureStage::Store, e.to_string());
                FileOutcome::Failed
            }
        }
    }

    /// Split a document and assign ids and source metadata.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        let source = ChunkSource::from_path(&document.path);
        self.chunker
            .chunk(&document.text, &self.chunking)
            .into_iter()
            .map(|raw| Chunk {
                id: chunk_id(self.id_strategy, &source.path, raw.char_offset),
                char_offset: raw.char_offset,
                text: raw.content,
                source: source.clone(),
            })
            .collect()
    }

    fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let documents: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let metadatas: Vec<Metadata> = chunks.iter().map(|c| c.source.to_metadata()).collect();

        self.collection.upsert(&ids, &documents, &metadatas)
    }

    /// Under content-hash ids, delete chunks of `path` that `current` no
    /// longer covers (the file got shorter or became empty). Random ids keep
    /// every previous copy.
    fn remove_stale_chunks(&self, path: &str, current: &[Chunk]) -> Result<usize, StoreError> {
        if self.id_strategy != IdStrategy::ContentHash {
            return Ok(0);
        }

        let keep: HashSet<&str> = current.iter().map(|chunk| chunk.id.as_str()).collect();
        let stale: Vec<String> = self
            .collection
            .ids_where(META_PATH, path)?
            .into_iter()
            .filter(|id| !keep.contains(id.as_str()))
            .collect();

        if !stale.is_empty() {
            self.collection.delete(&stale)?;
        }
        Ok(stale.len())
    }
}

/// Identifier for the chunk of `path` starting at `char_offset`.
pub fn chunk_id(strategy: IdStrategy, path: &str, char_offset: usize) -> String {
    match strategy {
        IdStrategy::Random => uuid::Uuid::new_v4().to_string(),
        IdStrategy::ContentHash => {
            let mut hasher = Sha256::new();
            hasher.update(path.as_bytes());
            hasher.update(b":");
            hasher.update(char_offset.to_string().as_bytes());
            format!("{:x}", hasher.finalize())
        }
    }
}
