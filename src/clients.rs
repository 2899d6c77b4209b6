//! reqwest-backed clients for the embedding model and vector index.

use std::convert::Infallible;

use crm_core::PipelineError;
use crm_pipeline::{Embedder, IndexEntry, UpsertItem, VectorIndexClient};
use serde::{Deserialize, Serialize};

fn transport_error(err: reqwest::Error) -> PipelineError<Infallible> {
    PipelineError::Transport {
        detail: err.to_string(),
    }
}

fn consistency_error(err: reqwest::Error) -> PipelineError<Infallible> {
    PipelineError::Consistency {
        detail: err.to_string(),
    }
}

#[derive(Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    vectors: Vec<Vec<f32>>,
}

impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError<Infallible>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest { input: texts })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(PipelineError::Transport {
                detail: format!("embedder returned {}", response.status()),
            });
        }

        let body: EmbedResponse = response.json().await.map_err(consistency_error)?;
        Ok(body.vectors)
    }
}

#[derive(Clone)]
pub struct HttpVectorIndex {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpVectorIndex {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), path)
    }
}

#[derive(Deserialize)]
struct ListResponse {
    entries: Vec<ListEntryWire>,
}

#[derive(Deserialize)]
struct ListEntryWire {
    id: String,
    object_name: String,
    content_hash: String,
}

#[derive(Serialize)]
struct UpsertRequest {
    items: Vec<UpsertRecord>,
}

#[derive(Serialize)]
struct UpsertRecord {
    id: String,
    vector: Vec<f32>,
    text: String,
    metadata: serde_json::Value,
}

#[derive(Serialize)]
struct DeleteRequest {
    ids: Vec<String>,
}

impl VectorIndexClient for HttpVectorIndex {
    async fn list(&self) -> Result<Vec<IndexEntry>, PipelineError<Infallible>> {
        let response = self
            .client
            .get(self.url("list"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let body: ListResponse = response.json().await.map_err(consistency_error)?;
        Ok(body
            .entries
            .into_iter()
            .map(|e| IndexEntry {
                id: e.id,
                object_ref: e.object_name,
                content_hash: e.content_hash,
            })
            .collect())
    }

    async fn upsert(&self, items: Vec<UpsertItem>) -> Result<(), PipelineError<Infallible>> {
        let records = items
            .into_iter()
            .map(|item| {
                let metadata = serde_json::json!({
                    "object_name": item.chunk.metadata.object_ref,
                    "type": item.chunk.metadata.type_tag,
                    "content_hash": item.chunk.metadata.content_hash,
                    "part_index": item.chunk.metadata.part_index,
                    "total_parts": item.chunk.metadata.total_parts,
                    "sibling_ids": item.chunk.metadata.sibling_ids,
                });
                UpsertRecord {
                    id: item.chunk.id,
                    vector: item.vector,
                    text: item.chunk.text,
                    metadata,
                }
            })
            .collect();

        let response = self
            .client
            .post(self.url("upsert"))
            .bearer_auth(&self.api_key)
            .json(&UpsertRequest { items: records })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(PipelineError::Transport {
                detail: format!("index upsert returned {}", response.status()),
            });
        }
        Ok(())
    }

    async fn delete(&self, ids: Vec<String>) -> Result<(), PipelineError<Infallible>> {
        let response = self
            .client
            .post(self.url("delete"))
            .bearer_auth(&self.api_key)
            .json(&DeleteRequest { ids })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(PipelineError::Transport {
                detail: format!("index delete returned {}", response.status()),
            });
        }
        Ok(())
    }
}
