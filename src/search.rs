//! Similarity search entry point and result rendering.

use crate::error::PipelineError;
use crate::models::Neighbor;
use crate::store::VectorStore;

/// Run a similarity query against the store. Guards the parameter ranges
/// before touching the embedding backend.
pub async fn search(
    store: &dyn VectorStore,
    query: &str,
    k: usize,
    threshold: Option<f32>,
) -> Result<Vec<Neighbor>, PipelineError> {
    if query.trim().is_empty() {
        return Err(PipelineError::Store("query must not be empty".to_string()));
    }
    if k == 0 {
        return Err(PipelineError::Store("k must be at least 1".to_string()));
    }
    if let Some(t) = threshold {
        if !(-1.0..=1.0).contains(&t) {
            return Err(PipelineError::Store(format!(
                "threshold {} outside [-1, 1]",
                t
            )));
        }
    }

    store.nearest_neighbors(query.trim(), k, threshold).await
}

/// Human-readable rendering for the CLI.
pub fn render_results(query: &str, results: &[Neighbor]) -> String {
    if results.is_empty() {
        return format!("No matches for \"{}\".\n", query);
    }

    let mut out = format!("{} result(s) for \"{}\":\n\n", results.len(), query);
    for (rank, neighbor) in results.iter().enumerate() {
        out.push_str(&format!(
            "{}. [{:.4}] {} (chunk {})\n",
            rank + 1,
            neighbor.similarity,
            neighbor.chunk.source_key,
            neighbor.chunk.chunk_index,
        ));
        let preview: String = neighbor.chunk.text.chars().take(240).collect();
        out.push_str(&format!("   {}\n\n", preview.replace('\n', " ")));
    }
    out
}
