//! Pipeline error taxonomy.
//!
//! Every failure a single source can hit maps to one variant here, so the
//! orchestrator can record a precise reason per source and the run summary
//! never swallows an error uncounted.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network, timeout, or HTTP-status failure while fetching a page.
    /// Recovered at the source boundary; the source is marked failed and
    /// the batch continues.
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The page was fetched but extraction found no usable content.
    #[error("no usable content extracted from {url}")]
    ExtractionEmpty { url: String },

    /// Content was present but fell below the minimum usefulness bar
    /// after cleaning.
    #[error("content rejected after normalization ({chars} chars, minimum {min})")]
    NormalizationRejected { chars: usize, min: usize },

    /// The embedding service failed. Aborts the whole upsert for the
    /// current source; partial embedding of a source is not tolerated.
    #[error("embedding service failure: {0}")]
    EmbeddingService(String),

    /// Delete/insert failure inside an upsert. The transaction rolls back,
    /// so the source keeps its prior chunk set, but the failure is
    /// reported rather than silently leaving the source stale.
    #[error("store transaction failed for '{source_key}': {reason}")]
    StoreTransaction { source_key: String, reason: String },

    /// Read-side store failure outside an upsert transaction.
    #[error("store query failed: {0}")]
    Store(String),

    /// Row-level deletion without a source key is not part of the store
    /// contract. Callers needing deletion go through upsert-by-source.
    #[error("delete by bare id is unsupported; replace chunks via upsert_by_source")]
    UnsupportedOperation,
}

impl PipelineError {
    /// Short machine-friendly tag used in diagnostics and the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Fetch { .. } => "fetch",
            PipelineError::ExtractionEmpty { .. } => "extraction-empty",
            PipelineError::NormalizationRejected { .. } => "normalization-rejected",
            PipelineError::EmbeddingService(_) => "embedding-service",
            PipelineError::StoreTransaction { .. } => "store-transaction",
            PipelineError::Store(_) => "store",
            PipelineError::UnsupportedOperation => "unsupported-operation",
        }
    }
}
