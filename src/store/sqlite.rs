//! Durable vector store on SQLite.
//!
//! Vectors live next to their chunk rows as little-endian f32 BLOBs.
//! Similarity is computed in process at query time; workloads here are
//! thousands of chunks, not millions, and an exact scan keeps ranking
//! independent of any index.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingBackend};
use crate::error::PipelineError;
use crate::models::{ChunkRecord, DocMetadata, Neighbor, UpsertReport};
use crate::store::{rank_neighbors, VectorStore};

pub struct SqliteVectorStore {
    pool: SqlitePool,
    backend: Arc<dyn EmbeddingBackend>,
    batch_size: usize,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool, backend: Arc<dyn EmbeddingBackend>, batch_size: usize) -> Self {
        Self {
            pool,
            backend,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed all chunks up front, in request-size batches. Nothing is
    /// written if any batch fails.
    async fn embed_all(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            vectors.extend(self.backend.embed(batch).await?);
        }
        Ok(vectors)
    }
}

fn created_at_from_secs(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(|| {
        warn!(secs, "stored chunk timestamp out of range, reporting epoch");
        DateTime::<Utc>::UNIX_EPOCH
    })
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert_by_source(
        &self,
        source_key: &str,
        chunks: &[String],
        meta: &DocMetadata,
    ) -> Result<UpsertReport, PipelineError> {
        let vectors = self.embed_all(chunks).await?;

        let fail = |reason: sqlx::Error| PipelineError::StoreTransaction {
            source_key: source_key.to_string(),
            reason: reason.to_string(),
        };

        let mut tx = self.pool.begin().await.map_err(fail)?;

        let deleted = sqlx::query("DELETE FROM chunks WHERE source_key = ?1")
            .bind(source_key)
            .execute(&mut *tx)
            .await
            .map_err(fail)?
            .rows_affected();

        let now = Utc::now().timestamp();
        let model = self.backend.model_name();
        let dims = self.backend.dims() as i64;

        for (index, (text, vector)) in chunks.iter().zip(vectors.iter()).enumerate() {
            sqlx::query(
                "INSERT INTO chunks (source_key, chunk_index, text, embedding, dims, model, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(source_key)
            .bind(index as i64)
            .bind(text)
            .bind(vec_to_blob(vector))
            .bind(dims)
            .bind(model)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(fail)?;
        }

        sqlx::query(
            "INSERT INTO sources (source_key, url, title, origin, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(source_key) DO UPDATE SET
                 url = excluded.url,
                 title = excluded.title,
                 origin = excluded.origin,
                 updated_at = excluded.updated_at",
        )
        .bind(source_key)
        .bind(&meta.url)
        .bind(&meta.title)
        .bind(&meta.origin)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(fail)?;

        tx.commit().await.map_err(fail)?;

        debug!(source_key, inserted = chunks.len(), deleted, "upserted source");

        Ok(UpsertReport {
            inserted: chunks.len(),
            deleted_prior: deleted as usize,
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

        let rows = sqlx::query(
            "SELECT id, source_key, chunk_index, text, embedding, created_at FROM chunks",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Store(e.to_string()))?;

        let scored = rows
            .into_iter()
            .map(|row| {
                let embedding = blob_to_vec(row.get::<Vec<u8>, _>("embedding").as_slice());
                let similarity = cosine_similarity(&query_vec, &embedding);
                Neighbor {
                    chunk: ChunkRecord {
                        id: row.get("id"),
                        source_key: row.get("source_key"),
                        chunk_index: row.get("chunk_index"),
                        text: row.get("text"),
                        embedding,
                        created_at: created_at_from_secs(row.get::<i64, _>("created_at")),
                    },
                    similarity,
                }
            })
            .collect();

        Ok(rank_neighbors(scored, k, threshold))
    }

    async fn count_all(&self) -> Result<i64, PipelineError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))
    }

    async fn distinct_source_keys(&self) -> Result<Vec<String>, PipelineError> {
        sqlx::query_scalar("SELECT DISTINCT source_key FROM chunks ORDER BY source_key")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))
    }

    async fn has_source(&self, source_key: &str) -> Result<bool, PipelineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE source_key = ?1")
            .bind(source_key)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))?;
        Ok(count > 0)
    }

    async fn delete_by_ids(&self, _ids: &[i64]) -> Result<(), PipelineError> {
        Err(PipelineError::UnsupportedOperation)
    }
}
