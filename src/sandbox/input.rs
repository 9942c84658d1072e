//! Input delegation for blocking `input()` calls
//!
//! Python's synchronous `input()` is preserved by delegating each read to a
//! host-provided capability over the message channel, instead of patching a
//! global inside the interpreter. The engine answers every `input_request`
//! line through the provider configured here.

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{Error, Result};

/// Host-side capability that answers one `input()` call at a time
#[async_trait]
pub trait InputProvider: Send + Sync {
    /// Produce one line of input for the given prompt
    async fn read_line(&self, prompt: &str) -> Result<String>;
}

/// Provider for contexts with no interactive user; answers every prompt
/// with an empty line and a warning in the host log.
pub struct NoInput;

#[async_trait]
impl InputProvider for NoInput {
    async fn read_line(&self, prompt: &str) -> Result<String> {
        warn!("input() called with no provider (prompt: {:?})", prompt);
        Ok(String::new())
    }
}

/// Provider backed by a fixed queue of answers. Used by the server API and
/// by tests; returns an error once the queue is exhausted.
pub struct QueuedInput {
    lines: Mutex<VecDeque<String>>,
}

impl QueuedInput {
    /// Create a provider from prepared answers, consumed in order
    pub fn new(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        QueuedInput {
            lines: Mutex::new(lines.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl InputProvider for QueuedInput {
    async fn read_line(&self, _prompt: &str) -> Result<String> {
        self.lines
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| Error::Sandbox("input requested but no input available".to_string()))
    }
}

/// Interactive terminal provider using a blocking dialoguer prompt,
/// moved off the async runtime with `spawn_blocking`.
pub struct PromptInput;

#[async_trait]
impl InputProvider for PromptInput {
    async fn read_line(&self, prompt: &str) -> Result<String> {
        let prompt = if prompt.is_empty() {
            "input".to_string()
        } else {
            prompt.to_string()
        };

        tokio::task::spawn_blocking(move || {
            dialoguer::Input::<String>::new()
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()
                .map_err(|e| Error::Sandbox(format!("Input prompt failed: {}", e)))
        })
        .await
        .map_err(|e| Error::Internal(format!("Input task panicked: {}", e)))?
    }
}
