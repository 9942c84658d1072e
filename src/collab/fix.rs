//! AI fix-suggestion client

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CollabConfig;
use crate::error::{Error, Result};
use crate::replay::ReplayStep;

/// Context sent to the fix suggester
#[derive(Debug, Clone, Serialize)]
pub struct FixRequest {
    pub original_code: String,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub language: String,
}

impl FixRequest {
    /// Prompt text derived from the failing run
    fn prompt(&self) -> String {
        let mut prompt = format!(
            "The following {} code failed with the error \"{}\".\n\n{}\n",
            self.language, self.error_message, self.original_code
        );
        if let Some(ref stack) = self.stack {
            prompt.push_str("\nStack trace:\n");
            prompt.push_str(stack);
            prompt.push('\n');
        }
        prompt.push_str(
            "\nPropose a sequence of incremental fix steps. Each step must carry a title, \
             an explanation, and the complete resulting code.",
        );
        prompt
    }
}

#[derive(Serialize)]
struct SuggestPayload<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct SuggestResponse {
    #[serde(default)]
    steps: Vec<SuggestedStep>,
}

#[derive(Deserialize)]
struct SuggestedStep {
    #[serde(default)]
    title: String,
    #[serde(default)]
    explanation: String,
    code: String,
}

/// Client for the AI fix-suggestion collaborator
pub struct FixClient {
    client: reqwest::Client,
    config: CollabConfig,
}

impl FixClient {
    /// Create a client from collaborator configuration
    pub fn new(config: CollabConfig) -> Result<Self> {
        let client = super::build_http_client(&config)?;
        Ok(FixClient { client, config })
    }

    /// Request fix steps for a failing run.
    ///
    /// Retryable transport failures are retried up to the configured
    /// budget; a response with zero steps is a failure ("no actionable
    /// steps"), not an empty session.
    pub async fn suggest_fix(&self, request: &FixRequest) -> Result<Vec<ReplayStep>> {
        let url = format!("{}/ai/fix-suggestions", self.config.base_url);
        let prompt = request.prompt();

        let response = if self.config.max_retries == 0 {
            self.send(&url, &prompt).await?
        } else {
            let policy = backoff::ExponentialBackoffBuilder::new()
                .with_max_elapsed_time(Some(std::time::Duration::from_secs(
                    self.config.timeout_secs,
                )))
                .build();
            backoff::future::retry(policy, || async {
                self.send(&url, &prompt).await.map_err(|e| {
                    if e.is_retryable() {
                        warn!("fix suggestion attempt failed, retrying: {}", e);
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            })
            .await?
        };

        if response.steps.is_empty() {
            return Err(Error::Collaborator("no actionable steps".to_string()));
        }

        debug!("fix suggester returned {} steps", response.steps.len());

        Ok(response
            .steps
            .into_iter()
            .map(|s| ReplayStep {
                title: s.title,
                explanation: s.explanation,
                code: s.code,
            })
            .collect())
    }

    async fn send(&self, url: &str, prompt: &str) -> Result<SuggestResponse> {
        let response = self
            .client
            .post(url)
            .json(&SuggestPayload { prompt })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Collaborator(format!(
                "fix suggester returned {}: {}",
                status, body
            )));
        }

        let parsed = response.json::<SuggestResponse>().await?;
        Ok(parsed)
    }
}
