//! Query-time retrieval of SOP snippets.
//!
//! The query is embedded by the collection's own embedding function, so it
//! always lands in the same space as the ingested chunks.

use serde::Serialize;
use thiserror::Error;

use crate::documents::META_SOURCE;
use crate::vector::{Collection, Include, Metadata, QueryResponse, StoreError};

/// Source label used when a hit carries no `source` metadata.
pub const UNKNOWN_SOURCE: &str = "unknown";

#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error("retrieval failed: {0}")]
    Store(#[from] StoreError),
}

/// One retrieved snippet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalHit {
    pub id: Option<String>,
    pub text: String,
    pub meta: Metadata,
    pub distance: Option<f32>,
}

impl RetrievalHit {
    /// File name the snippet came from.
    pub fn source(&self) -> &str {
        self.meta
            .get(META_SOURCE)
            .and_then(|value| value.as_str())
            .unwrap_or(UNKNOWN_SOURCE)
    }
}

/// Top-k nearest-neighbor lookup over one collection.
pub struct Retriever<'a> {
    collection: &'a dyn Collection,
    default_top_k: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(collection: &'a dyn Collection, default_top_k: usize) -> Self {
        Self {
            collection,
            default_top_k,
        }
    }

    /// Up to `k` (or the configured default) snippets nearest to `query`,
    /// ordered by ascending distance.
    pub fn retrieve(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<RetrievalHit>, RetrieveError> {
        let top_k = k.unwrap_or(self.default_top_k);
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .collection
            .query(&[query], top_k, &Include::RETRIEVAL)?;

        let hits = normalize_hits(response, top_k);
        tracing::debug!(
            target: "retrieve",
            "{} hits for query ({} chars)",
            hits.len(),
            query.chars().count()
        );
        Ok(hits)
    }
}

/// Turn the first row of a store response into hits.
///
/// One hit per returned document; ids, metadata and distances fill in when
/// present and default otherwise. Hits with a distance come first in
/// ascending order; hits without one keep store order after them.
pub fn normalize_hits(response: QueryResponse, k: usize) -> Vec<RetrievalHit> {
    let documents = first_row(response.documents);
    let mut ids = first_row(response.ids).into_iter();
    let mut metadatas = first_row(response.metadatas).into_iter();
    let mut distances = first_row(response.distances).into_iter();

    let mut hits: Vec<RetrievalHit> = documents
        .into_iter()
        .map(|text| RetrievalHit {
            id: ids.next(),
            text: text.unwrap_or_default(),
            meta: metadatas.next().flatten().unwrap_or_default(),
            distance: distances.next().flatten(),
        })
        .collect();

    // Stable: equal keys keep store order
    hits.sort_by(|a, b| match (a.distance, b.distance) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    hits.truncate(k);
    hits
}

fn first_row<T>(rows: Option<Vec<Vec<T>>>) -> Vec<T> {
    rows.and_then(|rows| rows.into_iter().next())
        .unwrap_or_default()
}
