//! Transient session handoff
//!
//! Short-lived key/value passing between surfaces: code arriving at the
//! sandbox from another page, and code/title/tag leaving it for the
//! create-post flow. Values are read once and cleared by the consumer, and
//! expire on their own if never consumed. Constructed and passed as a
//! dependency; there is no ambient global store.

use moka::future::Cache;
use std::time::Duration;

/// Code handed to the sandbox from elsewhere
pub const SANDBOX_CODE: &str = "sandbox_code";
/// Language tag accompanying [`SANDBOX_CODE`]
pub const SANDBOX_CODE_LANGUAGE: &str = "sandbox_code_language";
/// Code handed from the sandbox to the create-post flow
pub const CREATE_POST_CODE: &str = "create_post_code";
/// Title accompanying [`CREATE_POST_CODE`]
pub const CREATE_POST_TITLE: &str = "create_post_title";
/// Normalized language tag accompanying [`CREATE_POST_CODE`]
pub const CREATE_POST_TAG_NAME: &str = "create_post_tag_name";

/// Read-once TTL-bounded handoff store
#[derive(Clone)]
pub struct HandoffStore {
    values: Cache<String, String>,
}

impl HandoffStore {
    /// Create a store whose unconsumed values expire after `ttl`
    pub fn new(ttl: Duration) -> Self {
        HandoffStore {
            values: Cache::builder()
                .max_capacity(64)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Stash a value under a key, replacing any previous value
    pub async fn put(&self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into()).await;
    }

    /// Consume a value: returns it and clears the key
    pub async fn take(&self, key: &str) -> Option<String> {
        let value = self.values.get(key).await;
        if value.is_some() {
            self.values.invalidate(key).await;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_take_is_read_once() {
        let store = HandoffStore::new(Duration::from_secs(60));
        store.put(SANDBOX_CODE, "print(1)").await;

        assert_eq!(store.take(SANDBOX_CODE).await.as_deref(), Some("print(1)"));
        assert_eq!(store.take(SANDBOX_CODE).await, None);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = HandoffStore::new(Duration::from_secs(60));
        store.put(CREATE_POST_CODE, "code").await;
        store.put(CREATE_POST_TITLE, "title").await;

        assert_eq!(store.take(CREATE_POST_TITLE).await.as_deref(), Some("title"));
        assert_eq!(store.take(CREATE_POST_CODE).await.as_deref(), Some("code"));
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let store = HandoffStore::new(Duration::from_secs(60));
        store.put(SANDBOX_CODE, "first").await;
        store.put(SANDBOX_CODE, "second").await;

        assert_eq!(store.take(SANDBOX_CODE).await.as_deref(), Some("second"));
    }
}
