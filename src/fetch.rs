//! Page fetching over HTTP.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::config::FetchConfig;
use crate::error::PipelineError;

/// Thin wrapper around a shared HTTP client. All fetch failures map to
/// [`PipelineError::Fetch`] so the orchestrator can record them per URL
/// without aborting the run.
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    pub fn new(cfg: &FetchConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(concat!("trial-harvest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Fetch {
                url: String::new(),
                reason: format!("building http client: {}", e),
            })?;
        Ok(Self { client })
    }

    /// Fetch the raw markup of one page. Non-2xx statuses are failures.
    pub async fn fetch(&self, url: &str) -> Result<String, PipelineError> {
        debug!(url, "fetching page");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Fetch {
                url: url.to_string(),
                reason: format!("http status {}", status),
            });
        }

        response.text().await.map_err(|e| PipelineError::Fetch {
            url: url.to_string(),
            reason: format!("reading body: {}", e),
        })
    }
}

/// Report URL for a bare trial identifier.
pub fn report_url(base_url: &str, trial_id: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), trial_id.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_url_joins_base_and_id() {
        assert_eq!(
            report_url("https://scge.mcw.edu/platform/data/report/clinicalTrials/", "NCT001"),
            "https://scge.mcw.edu/platform/data/report/clinicalTrials/NCT001"
        );
        assert_eq!(report_url("https://x.org/report", " NCT002 "), "https://x.org/report/NCT002");
    }
}
