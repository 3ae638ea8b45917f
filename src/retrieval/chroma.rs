//! Chroma HTTP adapter (REST API v1).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use super::{Passage, VectorStore, VectorStoreError};

/// Queries an existing Chroma collection. Indexing happens elsewhere.
pub struct ChromaVectorStore {
    http: reqwest::Client,
    base_url: String,
    collection: String,
    collection_id: OnceCell<String>,
}

impl ChromaVectorStore {
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, VectorStoreError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            collection_id: OnceCell::new(),
        })
    }

    async fn collection_id(&self) -> Result<&str, VectorStoreError> {
        self.collection_id
            .get_or_try_init(|| async {
                let url = format!(
                    "{}/api/v1/collections/{}",
                    self.base_url,
                    urlencoding::encode(&self.collection)
                );
                let response = self.http.get(&url).send().await?;
                let status = response.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Err(VectorStoreError::CollectionNotFound(self.collection.clone()));
                }
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    // Chroma answers a missing collection with 500 on some versions.
                    if body.contains("does not exist") {
                        return Err(VectorStoreError::CollectionNotFound(self.collection.clone()));
                    }
                    return Err(VectorStoreError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                let info: CollectionInfo = response
                    .json()
                    .await
                    .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))?;
                tracing::debug!(collection = %self.collection, id = %info.id, "resolved chroma collection");
                Ok::<_, VectorStoreError>(info.id)
            })
            .await
            .map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query_embeddings: [&'a [f32]; 1],
    n_results: usize,
    include: [&'static str; 2],
}

/// Chroma returns one inner list per query embedding.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Map<String, Value>>>>>,
}

impl QueryResponse {
    fn into_passages(self) -> Vec<Passage> {
        let documents = self.documents.into_iter().next().unwrap_or_default();
        let mut metadatas = self
            .metadatas
            .and_then(|m| m.into_iter().next())
            .unwrap_or_default()
            .into_iter();

        documents
            .into_iter()
            .filter_map(|doc| {
                let metadata = metadatas.next().flatten();
                doc.map(|text| Passage { text, metadata })
            })
            .collect()
    }
}

#[async_trait]
impl VectorStore for ChromaVectorStore {
    async fn similarity_search(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<Passage>, VectorStoreError> {
        let id = self.collection_id().await?;
        let url = format!("{}/api/v1/collections/{}/query", self.base_url, id);

        let response = self
            .http
            .post(&url)
            .json(&QueryRequest {
                query_embeddings: [embedding],
                n_results: k,
                include: ["documents", "metadatas"],
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VectorStoreError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))?;
        Ok(parsed.into_passages())
    }
}
