//! Core data types that flow through the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};

/// Origin tag recorded on every extracted document.
pub const ORIGIN_URL: &str = "url";

/// Immutable metadata attached to an extracted document. Constructed once
/// by the extractor and never mutated downstream.
#[derive(Debug, Clone)]
pub struct DocMetadata {
    /// The raw URL the page was fetched from.
    pub url: String,
    /// The page `<title>` text (may be empty).
    pub title: String,
    /// Origin tag, currently always [`ORIGIN_URL`].
    pub origin: String,
    /// Stable key identifying the logical document, distinct from the
    /// fetch URL. Trial reports get `CLINICAL TRIAL: <id>`; generic pages
    /// get `<segment>:<url>`.
    pub source_key: String,
}

/// Full extracted body plus metadata, before normalization.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub metadata: DocMetadata,
}

/// A persisted chunk row as read back from the store.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: i64,
    pub source_key: String,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// A chunk returned from nearest-neighbor retrieval, closest first.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub chunk: ChunkRecord,
    /// Cosine similarity to the query vector, in `[-1, 1]`.
    pub similarity: f32,
}

/// Outcome of one upsert-by-source call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertReport {
    pub inserted: usize,
    pub deleted_prior: usize,
}
