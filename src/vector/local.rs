//! Brute-force vector store persisted as one JSON snapshot per collection.
//!
//! Every query scans all records; SOP corpora are small enough that an exact
//! scan is faster to build and easier to trust than an ANN index. Snapshots
//! are written to a temporary file and renamed into place, so a failed write
//! leaves the previous snapshot intact.

use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::Metadata;
use super::embedding::{EmbeddingError, EmbeddingFunction, cosine_similarity, squared_l2};
use super::store::{
    Collection, Include, QueryResponse, StoreError, StoreResult, StoredRecord, VectorStore,
    validate_batch,
};
use crate::config::DistanceMetric;
use crate::utils::get_utc_timestamp;

/// Snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// Local vector store rooted at a directory, or held purely in memory.
pub struct LocalStore {
    root: Option<PathBuf>,
    metric: DistanceMetric,
    collections: Mutex<HashMap<String, Arc<LocalCollection>>>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("root", &self.root)
            .field("metric", &self.metric)
            .field("collections", &self.collections.lock().len())
            .finish()
    }
}

impl LocalStore {
    /// Open a persistent store under `root`, creating the directory.
    pub fn open(root: impl AsRef<Path>, metric: DistanceMetric) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        tracing::debug!(target: "store", "opened local store at {}", root.display());
        Ok(Self {
            root: Some(root),
            metric,
            collections: Mutex::new(HashMap::new()),
        })
    }

    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            root: None,
            metric: DistanceMetric::default(),
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// Change the metric used for collections created from now on.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    fn snapshot_path(&self, name: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{name}.json")))
    }
}

impl VectorStore for LocalStore {
    fn get_or_create(
        &self,
        name: &str,
        embedding: Arc<dyn EmbeddingFunction>,
    ) -> StoreResult<Arc<dyn Collection>> {
        validate_collection_name(name)?;

        let mut collections = self.collections.lock();

        if let Some(existing) = collections.get(name) {
            check_model(name, &existing.model_id(), embedding.model_id())?;
            return Ok(existing.clone());
        }

        let path = self.snapshot_path(name);
        let snapshot = match &path {
            Some(path) if path.exists() => {
                let snapshot = Snapshot::read(path, name)?;
                check_model(name, &snapshot.embedding_model, embedding.model_id())?;
                if snapshot.distance != self.metric {
                    tracing::warn!(
                        target: "store",
                        "collection '{name}' uses {:?} distance, ignoring configured {:?}",
                        snapshot.distance,
                        self.metric
                    );
                }
                tracing::debug!(
                    target: "store",
                    "loaded collection '{name}' with {} records",
                    snapshot.records.len()
                );
                snapshot
            }
            _ => {
                tracing::debug!(target: "store", "creating collection '{name}'");
                Snapshot::new(name, embedding.model_id(), self.metric)
            }
        };

        let collection = Arc::new(LocalCollection {
            name: name.to_string(),
            path,
            embedding,
            state: RwLock::new(snapshot),
        });
        collections.insert(name.to_string(), collection.clone());
        Ok(collection)
    }
}

/// One stored record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
    document: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    name: String,
    embedding_model: String,
    distance: DistanceMetric,
    #[serde(default)]
    dimension: Option<usize>,
    /// UTC seconds of the last write
    #[serde(default)]
    updated_at: u64,
    #[serde(default)]
    records: IndexMap<String, Record>,
}

impl Snapshot {
    fn new(name: &str, embedding_model: &str, distance: DistanceMetric) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            name: name.to_string(),
            embedding_model: embedding_model.to_string(),
            distance,
            dimension: None,
            updated_at: get_utc_timestamp(),
            records: IndexMap::new(),
        }
    }

    fn read(path: &Path, name: &str) -> StoreResult<Self> {
        let file = fs::File::open(path)?;
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            StoreError::Serialization {
                collection: name.to_string(),
                reason: e.to_string(),
            }
        })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::Serialization {
                collection: name.to_string(),
                reason: format!("unsupported snapshot version {}", snapshot.version),
            });
        }

        Ok(snapshot)
    }

    fn write(&self, path: &Path) -> StoreResult<()> {
        let tmp = path.with_extension("json.tmp");
        {
            let file = fs::File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self).map_err(|e| StoreError::Serialization {
                collection: self.name.clone(),
                reason: e.to_string(),
            })?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.distance {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
            DistanceMetric::L2 => squared_l2(a, b),
        }
    }
}

/// A collection of the local store.
pub struct LocalCollection {
    name: String,
    path: Option<PathBuf>,
    embedding: Arc<dyn EmbeddingFunction>,
    state: RwLock<Snapshot>,
}

impl LocalCollection {
    fn model_id(&self) -> String {
        self.state.read().embedding_model.clone()
    }

    fn embed(&self, texts: &[&str]) -> StoreResult<Vec<Vec<f32>>> {
        let vectors = self.embedding.embed(texts)?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                got: vectors.len(),
            }
            .into());
        }
        Ok(vectors)
    }
}

impl Collection for LocalCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn embedding_model(&self) -> &str {
        self.embedding.model_id()
    }

    fn upsert(
        &self,
        ids: &[String],
        documents: &[String],
        metadatas: &[Metadata],
    ) -> StoreResult<()> {
        validate_batch(ids, documents, metadatas)?;
        if ids.is_empty() {
            return Ok(());
        }

        // Embed everything before touching the snapshot
        let texts: Vec<&str> = documents.iter().map(String::as_str).collect();
        let vectors = self.embed(&texts)?;

        let mut state = self.state.write();
        let expected = state
            .dimension
            .or_else(|| vectors.first().map(Vec::len))
            .unwrap_or_default();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        // Applied in place, undone if the snapshot write fails
        let previous_dimension = state.dimension.replace(expected);
        let previous_updated_at = std::mem::replace(&mut state.updated_at, get_utc_timestamp());
        let mut replaced = Vec::with_capacity(ids.len());
        for ((id, document), (metadata, embedding)) in ids
            .iter()
            .zip(documents)
            .zip(metadatas.iter().zip(vectors))
        {
            let previous = state.records.insert(
                id.clone(),
                Record {
                    document: document.clone(),
                    metadata: metadata.clone(),
                    embedding,
                },
            );
            replaced.push((id, previous));
        }

        if let Some(path) = &self.path {
            if let Err(e) = state.write(path) {
                for (id, previous) in replaced.into_iter().rev() {
                    match previous {
                        Some(record) => {
                            state.records.insert(id.clone(), record);
                        }
                        None => {
                            state.records.shift_remove(id);
                        }
                    }
                }
                state.dimension = previous_dimension;
                state.updated_at = previous_updated_at;
                return Err(e);
            }
        }

        tracing::debug!(
            target: "store",
            "upserted {} records into '{}' ({} total)",
            ids.len(),
            self.name,
            state.records.len()
        );
        Ok(())
    }

    fn query(
        &self,
        query_texts: &[&str],
        n_results: usize,
        include: &[Include],
    ) -> StoreResult<QueryResponse> {
        let state = self.state.read();

        let query_vectors = if n_results == 0 || state.records.is_empty() {
            vec![Vec::new(); query_texts.len()]
        } else {
            self.embed(query_texts)?
        };

        if let (Some(expected), Some(actual)) =
            (state.dimension, query_vectors.iter().map(Vec::len).find(|len| *len > 0))
        {
            if expected != actual {
                return Err(StoreError::DimensionMismatch { expected, actual });
            }
        }

        let mut response = QueryResponse {
            ids: Some(Vec::with_capacity(query_texts.len())),
            documents: include
                .contains(&Include::Documents)
                .then(|| Vec::with_capacity(query_texts.len())),
            metadatas: include
                .contains(&Include::Metadatas)
                .then(|| Vec::with_capacity(query_texts.len())),
            distances: include
                .contains(&Include::Distances)
                .then(|| Vec::with_capacity(query_texts.len())),
        };

        for query in &query_vectors {
            let mut scored: Vec<(&String, &Record, f32)> = if query.is_empty() {
                Vec::new()
            } else {
                state
                    .records
                    .iter()
                    .map(|(id, record)| (id, record, state.distance(query, &record.embedding)))
                    .collect()
            };

            // Stable sort keeps insertion order between equal distances
            scored.sort_by(|a, b| a.2.total_cmp(&b.2));
            scored.truncate(n_results);

            if let Some(ids) = response.ids.as_mut() {
                ids.push(scored.iter().map(|(id, _, _)| (*id).clone()).collect());
            }
            if let Some(documents) = response.documents.as_mut() {
                documents.push(
                    scored
                        .iter()
                        .map(|(_, record, _)| Some(record.document.clone()))
                        .collect(),
                );
            }
            if let Some(metadatas) = response.metadatas.as_mut() {
                metadatas.push(
                    scored
                        .iter()
                        .map(|(_, record, _)| Some(record.metadata.clone()))
                        .collect(),
                );
            }
            if let Some(distances) = response.distances.as_mut() {
                distances.push(scored.iter().map(|(_, _, d)| Some(*d)).collect());
            }
        }

        Ok(response)
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.state.read().records.len())
    }

    fn get_all(&self) -> StoreResult<Vec<StoredRecord>> {
        Ok(self
            .state
            .read()
            .records
            .iter()
            .map(|(id, record)| StoredRecord {
                id: id.clone(),
                document: Some(record.document.clone()),
                metadata: record.metadata.clone(),
            })
            .collect())
    }

    fn ids_where(&self, key: &str, value: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .state
            .read()
            .records
            .iter()
            .filter(|(_, record)| {
                record.metadata.get(key).and_then(|stored| stored.as_str()) == Some(value)
            })
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn delete(&self, ids: &[String]) -> StoreResult<()> {
        let mut state = self.state.write();
        let mut removed = Vec::new();
        for id in ids {
            if let Some(entry) = state.records.shift_remove_full(id) {
                removed.push(entry);
            }
        }
        if removed.is_empty() {
            return Ok(());
        }

        let previous_updated_at = std::mem::replace(&mut state.updated_at, get_utc_timestamp());
        if let Some(path) = &self.path {
            if let Err(e) = state.write(path) {
                for (index, id, record) in removed.into_iter().rev() {
                    state.records.shift_insert(index, id, record);
                }
                state.updated_at = previous_updated_at;
                return Err(e);
            }
        }

        tracing::debug!(
            target: "store",
            "deleted {} records from '{}' ({} left)",
            removed.len(),
            self.name,
            state.records.len()
        );
        Ok(())
    }
}

fn check_model(collection: &str, stored: &str, requested: &str) -> StoreResult<()> {
    if stored != requested {
        return Err(StoreError::EmbeddingMismatch {
            collection: collection.to_string(),
            stored: stored.to_string(),
            requested: requested.to_string(),
        });
    }
    Ok(())
}

/// Names become file names: ASCII alphanumerics plus `-`, `_` and `.`.
fn validate_collection_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}
