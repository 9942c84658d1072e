//! Bug-fix logging client
//!
//! Fire-and-forget reporting of accepted fixes. A failed report must never
//! block or fail the acceptance flow; callers spawn `report` and drop the
//! handle.

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::CollabConfig;
use crate::error::{Error, Result};

/// An accepted fix, as reported to the logging collaborator
#[derive(Debug, Clone, Serialize)]
pub struct BugReport {
    pub language: String,
    pub error_message: String,
    pub original_code: String,
    pub fix_step_count: usize,
    pub fixed_code: String,
}

/// Client for the bug-fix logging collaborator
#[derive(Clone)]
pub struct BugReportClient {
    client: reqwest::Client,
    config: CollabConfig,
}

impl BugReportClient {
    /// Create a client from collaborator configuration
    pub fn new(config: CollabConfig) -> Result<Self> {
        let client = super::build_http_client(&config)?;
        Ok(BugReportClient { client, config })
    }

    /// Post one report. Errors are for the caller's log only.
    pub async fn report(&self, report: &BugReport) -> Result<()> {
        let url = format!("{}/bug-fixes", self.config.base_url);

        let response = self.client.post(&url).json(report).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Collaborator(format!(
                "bug-fix logger returned {}",
                status
            )));
        }

        debug!("reported accepted fix ({} steps)", report.fix_step_count);
        Ok(())
    }

    /// Spawn a report in the background, logging any failure locally
    pub fn report_detached(&self, report: BugReport) {
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.report(&report).await {
                warn!("bug-fix report failed (ignored): {}", e);
            }
        });
    }
}
