//! Vector similarity retrieval over the session's index partition.
//!
//! Queries are embedded in the same vector space the ingestion pipeline
//! used, then searched against a Qdrant collection named after the session.
//! Backend failures degrade to an empty result set, distinguishable from
//! "no documents uploaded" by the caller, and never fatal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tokio::task;
use tracing::{debug, info, warn};

/// One ranked hit with enough metadata to reconstruct a citation.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    /// 1 = most similar.
    pub rank: usize,
    pub score: f64,
    pub file_name: Option<String>,
    pub chunk_index: Option<i64>,
    pub total_chunks_in_file: Option<i64>,
}

/// Embeds query text into the ingestion vector space.
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Session-scoped nearest-neighbor search. The engine depends on this
/// trait, not on a concrete backend.
#[async_trait]
pub trait ChunkRetriever: Send + Sync {
    /// At most `top_k` hits, ordered by descending similarity. Empty on
    /// any backend failure.
    async fn retrieve(&self, session_id: &str, query: &str, top_k: usize) -> Vec<RetrievedChunk>;

    /// Drop the session's index partition (reset path).
    async fn drop_partition(&self, session_id: &str) -> anyhow::Result<()>;
}

/// Lazily loaded local embedding model (AllMiniLML6V2), shared and
/// initialized on the first request off the async runtime.
#[derive(Clone)]
pub struct FastembedEmbedder {
    model: Arc<OnceCell<Arc<TextEmbedding>>>,
}

impl FastembedEmbedder {
    pub fn new() -> Self {
        Self {
            model: Arc::new(OnceCell::new()),
        }
    }

    async fn get_model(&self) -> anyhow::Result<Arc<TextEmbedding>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                task::spawn_blocking(|| {
                    let mut options = InitOptions::default();
                    options.model_name = EmbeddingModel::AllMiniLML6V2;
                    let model = TextEmbedding::try_new(options)?;
                    info!("Embedding model loaded (AllMiniLML6V2)");
                    Ok::<_, anyhow::Error>(Arc::new(model))
                })
                .await?
            })
            .await?;
        Ok(model.clone())
    }
}

impl Default for FastembedEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryEmbedder for FastembedEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let model = self.get_model().await?;
        let text = text.to_string();
        task::spawn_blocking(move || {
            let embeddings = model.embed(vec![text], None)?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("embedding model returned no vectors"))
        })
        .await?
    }
}

/// Qdrant-backed retriever speaking the points/query HTTP API.
pub struct QdrantRetriever {
    client: Client,
    base_url: String,
    collection_prefix: String,
    embedder: Arc<dyn QueryEmbedder>,
}

impl QdrantRetriever {
    pub fn new(
        base_url: &str,
        collection_prefix: &str,
        embedder: Arc<dyn QueryEmbedder>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection_prefix: collection_prefix.to_string(),
            embedder,
        })
    }

    fn collection_name(&self, session_id: &str) -> String {
        format!("{}{}", self.collection_prefix, session_id)
    }
}

#[async_trait]
impl ChunkRetriever for QdrantRetriever {
    async fn retrieve(&self, session_id: &str, query: &str, top_k: usize) -> Vec<RetrievedChunk> {
        let vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(session_id, "Query embedding failed: {}", e);
                return Vec::new();
            }
        };

        let collection = self.collection_name(session_id);
        let url = format!("{}/collections/{}/points/query", self.base_url, collection);
        debug!(collection = %collection, top_k, "Searching vector index");

        let body = json!({
            "query": vector,
            "limit": top_k,
            "with_payload": true,
        });

        let resp = match self.client.post(&url).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(session_id, "Vector search request failed: {}", e);
                return Vec::new();
            }
        };

        if !resp.status().is_success() {
            // Covers collection-not-found as well: an empty document set is
            // a valid outcome, not an error.
            warn!(session_id, status = %resp.status(), "Vector search returned non-success");
            return Vec::new();
        }

        let data: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(session_id, "Vector search response unreadable: {}", e);
                return Vec::new();
            }
        };

        let points = data["result"]["points"].as_array().cloned().unwrap_or_default();
        let mut hits = Vec::with_capacity(points.len());
        for (idx, point) in points.iter().enumerate() {
            let payload = &point["payload"];
            hits.push(RetrievedChunk {
                text: payload["text"].as_str().unwrap_or("").trim().to_string(),
                rank: idx + 1,
                score: point["score"].as_f64().unwrap_or(0.0),
                file_name: payload["original_file_name"].as_str().map(str::to_string),
                chunk_index: payload["chunk_index"].as_i64(),
                total_chunks_in_file: payload["total_chunks_in_file"].as_i64(),
            });
        }

        info!(session_id, hits = hits.len(), "Retrieval complete");
        hits
    }

    async fn drop_partition(&self, session_id: &str) -> anyhow::Result<()> {
        let collection = self.collection_name(session_id);
        let url = format!("{}/collections/{}", self.base_url, collection);
        let resp = self.client.delete(&url).send().await?;
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::NOT_FOUND {
            info!(session_id, collection = %collection, "Dropped vector collection");
            Ok(())
        } else {
            anyhow::bail!(
                "failed to drop collection {} ({})",
                collection,
                resp.status()
            )
        }
    }
}
