//! AI title-suggestion client

use serde::Serialize;
use tracing::debug;

use crate::config::CollabConfig;
use crate::error::{Error, Result};

#[derive(Serialize)]
struct TitlePayload<'a> {
    code: &'a str,
}

/// Client for the AI title-suggestion collaborator.
///
/// The response format is deliberately forgiving: plain text, an object
/// with a `title` field, or any object whose first string-valued field
/// serves as the title. Callers fall back to a generic title when this
/// client fails.
pub struct TitleClient {
    client: reqwest::Client,
    config: CollabConfig,
}

impl TitleClient {
    /// Create a client from collaborator configuration
    pub fn new(config: CollabConfig) -> Result<Self> {
        let client = super::build_http_client(&config)?;
        Ok(TitleClient { client, config })
    }

    /// Request a short descriptive title for a code excerpt
    pub async fn suggest_title(&self, code: &str) -> Result<String> {
        let url = format!("{}/ai/title-suggestions", self.config.base_url);

        // Long pastes get truncated: the first screenful is plenty for a title.
        let excerpt: String = code.chars().take(2000).collect();

        let response = self
            .client
            .post(&url)
            .json(&TitlePayload { code: &excerpt })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Collaborator(format!(
                "title suggester returned {}: {}",
                status, body
            )));
        }

        let body = response.text().await?;
        extract_title(&body)
            .inspect(|title| debug!("title suggester produced {:?}", title))
            .ok_or_else(|| Error::Collaborator("no usable title in response".to_string()))
    }
}

/// Pull a title out of a forgiving response body
fn extract_title(body: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        match value {
            serde_json::Value::String(s) => return non_empty(s),
            serde_json::Value::Object(map) => {
                if let Some(title) = map.get("title").and_then(|v| v.as_str()) {
                    if let Some(title) = non_empty(title.to_string()) {
                        return Some(title);
                    }
                }
                // Fallback: the first string-valued field.
                for (_, v) in map {
                    if let Some(s) = v.as_str() {
                        if let Some(title) = non_empty(s.to_string()) {
                            return Some(title);
                        }
                    }
                }
                return None;
            }
            _ => return None,
        }
    }
    non_empty(body.to_string())
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim().to_string();
    (!trimmed.is_empty()).then_some(trimmed)
}
