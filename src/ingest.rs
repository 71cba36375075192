//! Ingestion orchestration.
//!
//! Drives one source at a time through fetch, extract, normalize, chunk,
//! and upsert. A failure in any stage marks that source failed and moves
//! on; the run summary accounts for every attempted source exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::error::PipelineError;
use crate::extract::extract;
use crate::fetch::{report_url, PageFetcher};
use crate::normalize::{clean, normalize};
use crate::store::VectorStore;

/// Per-source result of a completed ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOutcome {
    /// The source key was new; chunks were inserted fresh.
    Processed,
    /// The source key already existed; its chunks were replaced.
    Overwritten,
}

/// Accounting for one ingest run. Every attempted source lands in exactly
/// one of the three lists.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub attempted: usize,
    pub processed: Vec<String>,
    pub overwritten: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.processed.len() + self.overwritten.len()
    }
}

pub struct Ingestor {
    fetcher: PageFetcher,
    store: Arc<dyn VectorStore>,
    cfg: Config,
    cancelled: Arc<AtomicBool>,
}

impl Ingestor {
    pub fn new(cfg: Config, store: Arc<dyn VectorStore>) -> Result<Self, PipelineError> {
        let fetcher = PageFetcher::new(&cfg.fetch)?;
        Ok(Self {
            fetcher,
            store,
            cfg,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shared flag a shutdown watcher can set; the run loop checks it
    /// before starting each source, so cancellation lands between sources
    /// and never mid-upsert.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Ingest trial report pages by bare identifier. Blank identifiers are
    /// skipped without counting as attempts.
    pub async fn ingest_trial_ids(
        &self,
        ids: &[String],
        limit: Option<usize>,
        dry_run: bool,
    ) -> RunSummary {
        let ids: Vec<&String> = ids
            .iter()
            .filter(|id| !id.trim().is_empty())
            .take(limit.unwrap_or(usize::MAX))
            .collect();

        let urls: Vec<String> = ids
            .iter()
            .map(|id| report_url(&self.cfg.fetch.base_url, id))
            .collect();

        self.run(&urls, dry_run).await
    }

    /// Ingest arbitrary page URLs directly.
    pub async fn ingest_urls(&self, urls: &[String], dry_run: bool) -> RunSummary {
        let urls: Vec<String> = urls
            .iter()
            .filter(|url| !url.trim().is_empty())
            .map(|url| url.trim().to_string())
            .collect();
        self.run(&urls, dry_run).await
    }

    async fn run(&self, urls: &[String], dry_run: bool) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        for url in urls {
            if self.cancelled.load(Ordering::Relaxed) {
                warn!(
                    remaining = urls.len() - summary.attempted,
                    "run cancelled, stopping before the next source"
                );
                break;
            }

            summary.attempted += 1;
            match self.ingest_one(url, dry_run).await {
                Ok((SourceOutcome::Processed, source_key)) => {
                    info!(url = %url, source_key = %source_key, "source processed");
                    summary.processed.push(source_key);
                }
                Ok((SourceOutcome::Overwritten, source_key)) => {
                    info!(url = %url, source_key = %source_key, "source overwritten");
                    summary.overwritten.push(source_key);
                }
                Err(err) => {
                    warn!(url = %url, kind = err.kind(), error = %err, "source failed");
                    summary.failed.push((url.clone(), err.to_string()));
                }
            }
        }

        summary.elapsed = started.elapsed();
        info!(
            attempted = summary.attempted,
            processed = summary.processed.len(),
            overwritten = summary.overwritten.len(),
            failed = summary.failed.len(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "ingest run finished"
        );
        summary
    }

    async fn ingest_one(
        &self,
        url: &str,
        dry_run: bool,
    ) -> Result<(SourceOutcome, String), PipelineError> {
        let markup = self.fetcher.fetch(url).await?;

        let document = extract(&markup, url).ok_or_else(|| PipelineError::ExtractionEmpty {
            url: url.to_string(),
        })?;

        let min_chars = self.cfg.normalize.min_chars;
        let normalized = normalize(&document.text, min_chars).ok_or_else(|| {
            PipelineError::NormalizationRejected {
                chars: clean(&document.text).len(),
                min: min_chars,
            }
        })?;

        let chunks = chunk_text(&normalized, &self.cfg.chunking);
        if chunks.is_empty() {
            return Err(PipelineError::NormalizationRejected {
                chars: normalized.len(),
                min: self.cfg.chunking.min_embed_chars,
            });
        }

        let source_key = document.metadata.source_key.clone();
        let existed = self.store.has_source(&source_key).await?;

        if dry_run {
            info!(
                source_key = %source_key,
                chunks = chunks.len(),
                existed,
                "dry run, skipping store write"
            );
        } else {
            let report = self
                .store
                .upsert_by_source(&source_key, &chunks, &document.metadata)
                .await?;
            info!(
                source_key = %source_key,
                inserted = report.inserted,
                deleted_prior = report.deleted_prior,
                "chunks stored"
            );
        }

        let outcome = if existed {
            SourceOutcome::Overwritten
        } else {
            SourceOutcome::Processed
        };
        Ok((outcome, source_key))
    }
}
