//! PortOps: retrieval-augmented chat over port-operations SOP documents.
//!
//! Ingestion turns a directory of PDF, DOCX, TXT and Markdown files into
//! overlapping chunks stored in a vector collection. At query time the
//! [`retrieve::Retriever`] finds the nearest chunks and [`chat::Session`]
//! grounds an LLM answer in them.

pub mod chat;
pub mod cli;
pub mod config;
pub mod documents;
pub mod logging;
pub mod retrieve;
pub mod utils;
pub mod vector;

pub use config::Settings;
pub use documents::{IngestReport, Ingestor, chunk_text};
pub use retrieve::{RetrievalHit, Retriever};
pub use vector::{Collection, EmbeddingFunction, Metadata, VectorStore};
