//! Embedding backends and vector helpers.
//!
//! The only production backend talks to the OpenAI embeddings endpoint.
//! Transient failures (429, 5xx, network errors) are retried with
//! exponential backoff; any other 4xx fails the batch immediately.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::PipelineError;

/// Produces fixed-dimension vectors for batches of text.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;
}

/// Resolve the configured backend. The provider name is validated at
/// config load, so this only fails on client construction.
pub fn create_backend(cfg: &EmbeddingConfig) -> Result<Box<dyn EmbeddingBackend>, PipelineError> {
    let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
        PipelineError::EmbeddingService("OPENAI_API_KEY is not set".to_string())
    })?;
    Ok(Box::new(OpenAiBackend::new(cfg, api_key)?))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAiBackend {
    const ENDPOINT: &'static str = "https://api.openai.com/v1/embeddings";

    pub fn new(cfg: &EmbeddingConfig, api_key: String) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| {
                PipelineError::EmbeddingService(format!("building http client: {}", e))
            })?;
        Ok(Self {
            client,
            api_key,
            model: cfg.model.clone(),
            dims: cfg.dims,
            max_retries: cfg.max_retries,
        })
    }

    async fn request_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RequestFailure> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(Self::ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RequestFailure::Transient(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(RequestFailure::Transient(format!("http status {}", status)));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RequestFailure::Fatal(format!(
                "http status {}: {}",
                status, detail
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RequestFailure::Fatal(format!("decoding response: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(RequestFailure::Fatal(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

enum RequestFailure {
    Transient(String),
    Fatal(String),
}

#[async_trait]
impl EmbeddingBackend for OpenAiBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(batch = texts.len(), model = %self.model, "requesting embeddings");

        let mut attempt = 0u32;
        loop {
            match self.request_once(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(RequestFailure::Fatal(reason)) => {
                    return Err(PipelineError::EmbeddingService(reason));
                }
                Err(RequestFailure::Transient(reason)) => {
                    if attempt >= self.max_retries {
                        return Err(PipelineError::EmbeddingService(format!(
                            "giving up after {} retries: {}",
                            self.max_retries, reason
                        )));
                    }
                    let backoff = Duration::from_secs(1 << attempt.min(5));
                    warn!(attempt, ?backoff, %reason, "transient embedding failure, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

// ============ Vector codec and similarity ============

/// Little-endian f32 packing for BLOB storage.
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

/// Cosine similarity in [-1, 1]. Zero-magnitude vectors compare as 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trip_preserves_values() {
        let vector = vec![0.0, 1.0, -1.5, 3.25, f32::MIN_POSITIVE];
        assert_eq!(blob_to_vec(&vec_to_blob(&vector)), vector);
    }

    #[test]
    fn blob_is_little_endian_f32() {
        assert_eq!(vec_to_blob(&[1.0]), 1.0f32.to_le_bytes().to_vec());
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, -0.2, 0.9];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_opposite_vectors_is_negative_one() {
        assert!((cosine_similarity(&[2.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
