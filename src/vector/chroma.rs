//! Chroma server backend over its v2 REST API.
//!
//! Embeddings are computed client-side with the collection's embedding
//! function and sent with every upsert and query, so the server never needs
//! its own model. The model id is stored in the collection metadata and
//! checked when the collection is reopened.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::Metadata;
use super::embedding::{EmbeddingError, EmbeddingFunction};
use super::store::{
    Collection, Include, QueryResponse, StoreError, StoreResult, StoredRecord, VectorStore,
    validate_batch,
};
use crate::config::{DistanceMetric, StoreConfig};

/// Collection metadata key holding the embedding model id.
const MODEL_METADATA_KEY: &str = "embedding_model";

/// Collection metadata key selecting the HNSW distance function.
const SPACE_METADATA_KEY: &str = "hnsw:space";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one tenant/database of a Chroma server.
#[derive(Debug, Clone)]
pub struct ChromaStore {
    client: Client,
    collections_url: String,
    metric: DistanceMetric,
}

impl ChromaStore {
    pub fn new(
        base_url: &str,
        tenant: &str,
        database: &str,
        metric: DistanceMetric,
    ) -> StoreResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            collections_url: collections_url(base_url, tenant, database),
            metric,
        })
    }

    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        Self::new(
            &config.chroma_url,
            &config.chroma_tenant,
            &config.chroma_database,
            config.distance,
        )
    }
}

impl VectorStore for ChromaStore {
    fn get_or_create(
        &self,
        name: &str,
        embedding: Arc<dyn EmbeddingFunction>,
    ) -> StoreResult<Arc<dyn Collection>> {
        let mut metadata = Metadata::new();
        metadata.insert(MODEL_METADATA_KEY.to_string(), embedding.model_id().into());
        metadata.insert(SPACE_METADATA_KEY.to_string(), space_name(self.metric).into());

        let request = CreateCollectionRequest {
            name,
            metadata: &metadata,
            get_or_create: true,
        };

        tracing::debug!(target: "store", "opening chroma collection '{name}'");
        let response = self
            .client
            .post(&self.collections_url)
            .json(&request)
            .send()?;
        let model: CollectionModel = parse_json(response)?;

        check_collection_model(&model, embedding.model_id())?;

        Ok(Arc::new(ChromaCollection {
            client: self.client.clone(),
            url: format!("{}/{}", self.collections_url, model.id),
            name: model.name,
            embedding,
        }))
    }
}

/// A collection on the Chroma server.
pub struct ChromaCollection {
    client: Client,
    url: String,
    name: String,
    embedding: Arc<dyn EmbeddingFunction>,
}

impl ChromaCollection {
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

impl Collection for ChromaCollection {
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

        let texts: Vec<&str> = documents.iter().map(String::as_str).collect();
        let embeddings = self.embed(&texts)?;

        let request = UpsertRequest {
            ids,
            embeddings: &embeddings,
            documents,
            metadatas,
        };
        let response = self
            .client
            .post(format!("{}/upsert", self.url))
            .json(&request)
            .send()?;
        check_status(response)?;

        tracing::debug!(target: "store", "upserted {} records into '{}'", ids.len(), self.name);
        Ok(())
    }

    fn query(
        &self,
        query_texts: &[&str],
        n_results: usize,
        include: &[Include],
    ) -> StoreResult<QueryResponse> {
        if n_results == 0 || query_texts.is_empty() {
            return Ok(QueryResponse {
                ids: Some(vec![Vec::new(); query_texts.len()]),
                ..Default::default()
            });
        }

        let query_embeddings = self.embed(query_texts)?;
        let request = QueryRequest {
            query_embeddings: &query_embeddings,
            n_results,
            include,
        };
        let response = self
            .client
            .post(format!("{}/query", self.url))
            .json(&request)
            .send()?;
        parse_json(response)
    }

    fn count(&self) -> StoreResult<usize> {
        let response = self.client.get(format!("{}/count", self.url)).send()?;
        parse_json(response)
    }

    fn get_all(&self) -> StoreResult<Vec<StoredRecord>> {
        let request = GetRequest {
            filter: None,
            include: &[Include::Documents, Include::Metadatas],
        };
        let response = self
            .client
            .post(format!("{}/get", self.url))
            .json(&request)
            .send()?;
        let got: GetResponse = parse_json(response)?;
        Ok(got.into_records())
    }

    fn ids_where(&self, key: &str, value: &str) -> StoreResult<Vec<String>> {
        let mut filter = Metadata::new();
        filter.insert(key.to_string(), value.into());
        let request = GetRequest {
            filter: Some(&filter),
            include: &[],
        };
        let response = self
            .client
            .post(format!("{}/get", self.url))
            .json(&request)
            .send()?;
        let got: GetResponse = parse_json(response)?;
        Ok(got.ids)
    }

    fn delete(&self, ids: &[String]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let response = self
            .client
            .post(format!("{}/delete", self.url))
            .json(&DeleteRequest { ids })
            .send()?;
        check_status(response)?;

        tracing::debug!(target: "store", "deleted {} records from '{}'", ids.len(), self.name);
        Ok(())
    }
}

#[derive(Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
    metadata: &'a Metadata,
    get_or_create: bool,
}

#[derive(Debug, Deserialize)]
struct CollectionModel {
    id: String,
    name: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    ids: &'a [String],
    embeddings: &'a [Vec<f32>],
    documents: &'a [String],
    metadatas: &'a [Metadata],
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query_embeddings: &'a [Vec<f32>],
    n_results: usize,
    include: &'a [Include],
}

#[derive(Serialize)]
struct GetRequest<'a> {
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Metadata>,
    include: &'a [Include],
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
}

#[derive(Debug, Default, Deserialize)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Metadata>>>,
}

impl GetResponse {
    fn into_records(self) -> Vec<StoredRecord> {
        let mut documents = self.documents.unwrap_or_default().into_iter();
        let mut metadatas = self.metadatas.unwrap_or_default().into_iter();
        self.ids
            .into_iter()
            .map(|id| StoredRecord {
                id,
                document: documents.next().flatten(),
                metadata: metadatas.next().flatten().unwrap_or_default(),
            })
            .collect()
    }
}

fn collections_url(base_url: &str, tenant: &str, database: &str) -> String {
    format!(
        "{}/api/v2/tenants/{tenant}/databases/{database}/collections",
        base_url.trim_end_matches('/')
    )
}

fn space_name(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "cosine",
        DistanceMetric::L2 => "l2",
    }
}

fn check_collection_model(model: &CollectionModel, requested: &str) -> StoreResult<()> {
    let stored = model
        .metadata
        .as_ref()
        .and_then(|meta| meta.get(MODEL_METADATA_KEY))
        .and_then(|value| value.as_str());

    match stored {
        Some(stored) if stored != requested => Err(StoreError::EmbeddingMismatch {
            collection: model.name.clone(),
            stored: stored.to_string(),
            requested: requested.to_string(),
        }),
        Some(_) => Ok(()),
        None => {
            tracing::warn!(
                target: "store",
                "chroma collection '{}' has no recorded embedding model",
                model.name
            );
            Ok(())
        }
    }
}

fn check_status(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(StoreError::Remote {
        status: status.as_u16(),
        body,
    })
}

fn parse_json<T: DeserializeOwned>(response: Response) -> StoreResult<T> {
    Ok(check_status(response)?.json()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collections_url() {
        assert_eq!(
            collections_url("http://localhost:8000/", "default_tenant", "default_database"),
            "http://localhost:8000/api/v2/tenants/default_tenant/databases/default_database/collections"
        );
    }

    #[test]
    fn test_query_request_shape() {
        let embeddings = vec![vec![0.5f32, 0.25]];
        let request = QueryRequest {
            query_embeddings: &embeddings,
            n_results: 4,
            include: &Include::RETRIEVAL,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "query_embeddings": [[0.5, 0.25]],
                "n_results": 4,
                "include": ["documents", "metadatas", "distances"]
            })
        );
    }

    #[test]
    fn test_upsert_request_shape() {
        let ids = vec!["1".to_string()];
        let embeddings = vec![vec![1.0f32]];
        let documents = vec!["Lashing check".to_string()];
        let mut meta = Metadata::new();
        meta.insert("source".to_string(), "lashing.pdf".into());
        let metadatas = vec![meta];

        let request = UpsertRequest {
            ids: &ids,
            embeddings: &embeddings,
            documents: &documents,
            metadatas: &metadatas,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["ids"][0], "1");
        assert_eq!(json["documents"][0], "Lashing check");
        assert_eq!(json["metadatas"][0]["source"], "lashing.pdf");
    }

    #[test]
    fn test_get_request_shape() {
        let all = GetRequest {
            filter: None,
            include: &[Include::Documents, Include::Metadatas],
        };
        assert_eq!(
            serde_json::to_value(&all).unwrap(),
            serde_json::json!({"include": ["documents", "metadatas"]})
        );

        let mut filter = Metadata::new();
        filter.insert("path".to_string(), "data/raw/gate.txt".into());
        let by_path = GetRequest {
            filter: Some(&filter),
            include: &[],
        };
        assert_eq!(
            serde_json::to_value(&by_path).unwrap(),
            serde_json::json!({"where": {"path": "data/raw/gate.txt"}, "include": []})
        );
    }

    #[test]
    fn test_collection_model_check() {
        let model: CollectionModel = serde_json::from_str(
            r#"{"id": "c0ffee", "name": "portops",
                "metadata": {"embedding_model": "hashing-64", "hnsw:space": "cosine"}}"#,
        )
        .unwrap();
        assert!(check_collection_model(&model, "hashing-64").is_ok());
        assert!(matches!(
            check_collection_model(&model, "hashing-32"),
            Err(StoreError::EmbeddingMismatch { .. })
        ));

        let bare: CollectionModel =
            serde_json::from_str(r#"{"id": "c0ffee", "name": "portops", "metadata": null}"#)
                .unwrap();
        assert!(check_collection_model(&bare, "anything").is_ok());
    }

    #[test]
    fn test_get_response_into_records() {
        let got: GetResponse = serde_json::from_str(
            r#"{"ids": ["a", "b"], "documents": ["first", null], "metadatas": [{"source": "x.md"}]}"#,
        )
        .unwrap();
        let records = got.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].document.as_deref(), Some("first"));
        assert_eq!(records[0].metadata["source"], "x.md");
        assert!(records[1].document.is_none());
        assert!(records[1].metadata.is_empty());
    }
}
