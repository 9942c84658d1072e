//! External collaborators
//!
//! The AI fix suggester, the AI title suggester, and the bug-fix logger are
//! remote services this crate only calls. Every failure is caught at the
//! call site: fix and title failures degrade to user-visible fallbacks,
//! bug-report failures are logged and swallowed.

mod bugreport;
mod fix;
mod title;

pub use bugreport::{BugReport, BugReportClient};
pub use fix::{FixClient, FixRequest};
pub use title::TitleClient;

use reqwest::header;
use secrecy::ExposeSecret;
use std::time::Duration;

use crate::config::CollabConfig;
use crate::error::{Error, Result};

/// Build the shared HTTP client for collaborator calls, with the API key
/// installed as a default bearer header when configured.
pub(crate) fn build_http_client(config: &CollabConfig) -> Result<reqwest::Client> {
    url::Url::parse(&config.base_url)
        .map_err(|e| Error::Config(format!("Invalid collaborator base URL: {}", e)))?;

    let mut headers = header::HeaderMap::new();
    if let Some(ref api_key) = config.api_key {
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
                .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );
    }

    let client = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    Ok(client)
}
