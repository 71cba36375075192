//! Vector store abstraction.
//!
//! Two implementations share one trait: the durable SQLite store used by
//! the CLI, and an in-memory store for tests. Both own an embedding
//! backend, so callers hand them text and never see raw vectors.

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::models::{DocMetadata, Neighbor, UpsertReport};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace every chunk stored under `source_key` with the given texts,
    /// atomically, and record the source's metadata (url, title, origin)
    /// alongside them. Embedding happens before any row is touched, so an
    /// embedding failure leaves the prior chunk set intact.
    async fn upsert_by_source(
        &self,
        source_key: &str,
        chunks: &[String],
        meta: &DocMetadata,
    ) -> Result<UpsertReport, PipelineError>;

    /// Embed the query and return up to `k` stored chunks ranked by cosine
    /// similarity, highest first. A positive threshold drops chunks scoring
    /// below it before the cut to `k`; zero (or none) applies no filter.
    async fn nearest_neighbors(
        &self,
        query: &str,
        k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<Neighbor>, PipelineError>;

    async fn count_all(&self) -> Result<i64, PipelineError>;

    async fn distinct_source_keys(&self) -> Result<Vec<String>, PipelineError>;

    async fn has_source(&self, source_key: &str) -> Result<bool, PipelineError>;

    /// Always fails. Chunks are only removed as a side effect of replacing
    /// their source; see [`VectorStore::upsert_by_source`].
    async fn delete_by_ids(&self, ids: &[i64]) -> Result<(), PipelineError>;
}

/// Rank, filter, and cut a scored candidate list. Shared by both store
/// implementations so they order ties identically.
pub(crate) fn rank_neighbors(
    mut scored: Vec<Neighbor>,
    k: usize,
    threshold: Option<f32>,
) -> Vec<Neighbor> {
    // A zero threshold is no filter, so chunks with negative similarity
    // still come back.
    if let Some(min) = threshold {
        if min > 0.0 {
            scored.retain(|n| n.similarity >= min);
        }
    }
    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}
