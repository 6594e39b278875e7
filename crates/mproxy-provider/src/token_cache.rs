use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

pub const TOKEN_CACHE_TTL: Duration = Duration::from_secs(25 * 60);
pub const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Per-executor cache of short-lived upstream tokens, keyed by credential id.
///
/// A token counts as valid only while more than the pre-expiry buffer
/// remains, so callers renew five minutes ahead of the deadline. Cached
/// tokens never touch durable storage.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: RwLock<HashMap<String, CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let guard = self.entries.read().await;
        let cached = guard.get(key)?;
        if Instant::now() + TOKEN_EXPIRY_BUFFER < cached.expires_at {
            Some(cached.token.clone())
        } else {
            None
        }
    }

    pub async fn insert(&self, key: impl Into<String>, token: impl Into<String>) {
        self.insert_with_expiry(key, token, Instant::now() + TOKEN_CACHE_TTL)
            .await;
    }

    pub async fn insert_with_expiry(
        &self,
        key: impl Into<String>,
        token: impl Into<String>,
        expires_at: Instant,
    ) {
        let mut guard = self.entries.write().await;
        guard.insert(
            key.into(),
            CachedToken {
                token: token.into(),
                expires_at,
            },
        );
    }

    pub async fn evict(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}
