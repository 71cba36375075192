//! In-memory vector store for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::embedding::{cosine_similarity, EmbeddingBackend};
use crate::error::PipelineError;
use crate::models::{ChunkRecord, DocMetadata, Neighbor, UpsertReport};
use crate::store::{rank_neighbors, VectorStore};

pub struct MemoryVectorStore {
    records: RwLock<Vec<ChunkRecord>>,
    metadata: RwLock<HashMap<String, DocMetadata>>,
    backend: Arc<dyn EmbeddingBackend>,
    next_id: AtomicI64,
}

impl MemoryVectorStore {
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            metadata: RwLock::new(HashMap::new()),
            backend,
            next_id: AtomicI64::new(1),
        }
    }

    /// Metadata recorded by the last upsert for `source_key`, if any.
    pub async fn source_metadata(&self, source_key: &str) -> Option<DocMetadata> {
        self.metadata.read().await.get(source_key).cloned()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert_by_source(
        &self,
        source_key: &str,
        chunks: &[String],
        meta: &DocMetadata,
    ) -> Result<UpsertReport, PipelineError> {
        let vectors = self.backend.embed(chunks).await?;

        self.metadata
            .write()
            .await
            .insert(source_key.to_string(), meta.clone());

        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.source_key != source_key);
        let deleted_prior = before - records.len();

        for (index, (text, embedding)) in chunks.iter().zip(vectors).enumerate() {
            records.push(ChunkRecord {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                source_key: source_key.to_string(),
                chunk_index: index as i64,
                text: text.clone(),
                embedding,
                created_at: Utc::now(),
            });
        }

        Ok(UpsertReport {
            inserted: chunks.len(),
            deleted_prior,
        })
    }

    async fn nearest_neighbors(
        &self,
        query: &str,
        k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<Neighbor>, PipelineError> {
        let query_vec = self
            .backend
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                PipelineError::EmbeddingService("backend returned no query vector".to_string())
            })?;

        let records = self.records.read().await;
        let scored = records
            .iter()
            .map(|record| Neighbor {
                similarity: cosine_similarity(&query_vec, &record.embedding),
                chunk: record.clone(),
            })
            .collect();

        Ok(rank_neighbors(scored, k, threshold))
    }

    async fn count_all(&self) -> Result<i64, PipelineError> {
        Ok(self.records.read().await.len() as i64)
    }

    async fn distinct_source_keys(&self) -> Result<Vec<String>, PipelineError> {
        let records = self.records.read().await;
        let mut keys: Vec<String> = records.iter().map(|r| r.source_key.clone()).collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn has_source(&self, source_key: &str) -> Result<bool, PipelineError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .any(|r| r.source_key == source_key))
    }

    async fn delete_by_ids(&self, _ids: &[i64]) -> Result<(), PipelineError> {
        Err(PipelineError::UnsupportedOperation)
    }
}
