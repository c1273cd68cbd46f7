//! SOP document handling for retrieval.
//!
//! This module provides:
//! - File discovery and per-format text extraction
//! - Fixed-window chunking with overlap
//! - The ingestion pipeline writing chunks into a vector collection

pub mod chunker;
pub mod config;
pub mod ingest;
pub mod loader;
pub mod types;

pub use chunker::{Chunker, FixedWindowChunker, RawChunk, chunk_spans, chunk_text};
pub use config::{ChunkingConfig, IdStrategy};
pub use ingest::{
    FailureStage, FileOutcome, IngestError, IngestFailure, IngestProgress, IngestReport, Ingestor,
    chunk_id,
};
pub use loader::{
    DocumentLoader, DocxExtractor, ExtractorRegistry, LoaderError, PdfExtractor,
    PlainTextExtractor, SUPPORTED_EXTENSIONS, TextExtractor, discover_files,
};
pub use types::{Chunk, ChunkSource, Document, META_PATH, META_SOURCE};
