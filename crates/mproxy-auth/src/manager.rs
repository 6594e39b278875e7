use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::warn;

use crate::credential::{Auth, AuthStatus, now_unix_seconds};
use crate::store::FileStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("no usable credential for provider {provider}")]
    NoCredential { provider: String },
}

/// In-memory registry of credentials loaded from the store, indexed by
/// provider.
///
/// Selection is oldest-`last_used` rotation with lexicographic id as the
/// tie-break; `select` stamps `last_used` so N eligible credentials rotate
/// round-robin.
pub struct AuthManager {
    creds: RwLock<HashMap<String, Auth>>,
    by_provider: RwLock<HashMap<String, Vec<String>>>,
    last_errored: RwLock<Option<String>>,
    store: Option<FileStore>,
    /// Strictly monotonic `last_used` stamps: wall-clock millis, bumped past
    /// the previous stamp when several selections land in the same tick.
    clock: std::sync::atomic::AtomicI64,
}

impl AuthManager {
    pub fn new(store: Option<FileStore>) -> Self {
        Self {
            creds: RwLock::new(HashMap::new()),
            by_provider: RwLock::new(HashMap::new()),
            last_errored: RwLock::new(None),
            store,
            clock: std::sync::atomic::AtomicI64::new(0),
        }
    }

    fn next_stamp(&self) -> i64 {
        use std::sync::atomic::Ordering;
        let now = crate::credential::now_unix_millis();
        self.clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |previous| {
                Some(now.max(previous + 1))
            })
            .map(|previous| now.max(previous + 1))
            .unwrap_or(now)
    }

    pub async fn insert(&self, auth: Auth) {
        let id = auth.id.clone();
        let provider = auth.provider.clone();
        self.creds.write().await.insert(id.clone(), auth);
        let mut index = self.by_provider.write().await;
        let ids = index.entry(provider).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    pub async fn load(&self, auths: Vec<Auth>) {
        for auth in auths {
            self.insert(auth).await;
        }
    }

    /// Snapshot in stable id order.
    pub async fn list(&self) -> Vec<Auth> {
        let guard = self.creds.read().await;
        let mut out: Vec<Auth> = guard.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub async fn get(&self, id: &str) -> Option<Auth> {
        self.creds.read().await.get(id).cloned()
    }

    /// Pick the next usable credential for a provider.
    ///
    /// Eligible: not disabled, status active, not unavailable (a lapsed
    /// recovery deadline clears the flag here), not past expiry.
    pub async fn select(&self, provider: &str) -> Result<Auth, SelectError> {
        let ids = {
            let index = self.by_provider.read().await;
            index.get(provider).cloned().unwrap_or_default()
        };
        if ids.is_empty() {
            return Err(SelectError::NoCredential {
                provider: provider.to_string(),
            });
        }

        let now = now_unix_seconds();
        let mut guard = self.creds.write().await;

        let mut chosen: Option<String> = None;
        let mut chosen_key: Option<(i64, String)> = None;
        for id in &ids {
            let Some(auth) = guard.get_mut(id) else {
                continue;
            };
            if auth.unavailable
                && auth
                    .unavailable_until
                    .is_some_and(|until| until <= now)
            {
                auth.unavailable = false;
                auth.unavailable_until = None;
            }
            if auth.disabled || !auth.status.is_active() || auth.unavailable || auth.is_expired()
            {
                continue;
            }
            let key = (auth.last_used().unwrap_or(0), auth.id.clone());
            if chosen_key.as_ref().is_none_or(|current| key < *current) {
                chosen_key = Some(key);
                chosen = Some(auth.id.clone());
            }
        }

        let Some(id) = chosen else {
            return Err(SelectError::NoCredential {
                provider: provider.to_string(),
            });
        };
        let stamp = self.next_stamp();
        let auth = guard.get_mut(&id).expect("chosen id exists");
        auth.set_last_used(stamp);
        Ok(auth.clone())
    }

    pub async fn mark_error(&self, id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        if let Some(auth) = self.creds.write().await.get_mut(id) {
            auth.status = AuthStatus::Error(reason);
        }
        *self.last_errored.write().await = Some(id.to_string());
    }

    /// Raise the transient flag; a recovery timer clears it unless a refresh
    /// does so first.
    pub async fn mark_unavailable(self: &Arc<Self>, id: &str, recover_after: Option<Duration>) {
        let until = recover_after.map(|after| now_unix_seconds() + after.as_secs() as i64);
        if let Some(auth) = self.creds.write().await.get_mut(id) {
            auth.unavailable = true;
            auth.unavailable_until = until;
        }
        if let Some(after) = recover_after {
            let manager = Arc::clone(self);
            let id = id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                let mut guard = manager.creds.write().await;
                if let Some(auth) = guard.get_mut(&id)
                    && auth.unavailable
                    && auth
                        .unavailable_until
                        .is_none_or(|deadline| deadline <= now_unix_seconds())
                {
                    auth.unavailable = false;
                    auth.unavailable_until = None;
                }
            });
        }
    }

    /// Id of the credential that most recently entered error state.
    pub async fn last_errored(&self) -> Option<String> {
        self.last_errored.read().await.clone()
    }

    /// Commit the result of a successful executor refresh: replace the
    /// record, clear status flags, persist.
    pub async fn apply_refresh(&self, refreshed: Auth) {
        let mut refreshed = refreshed;
        refreshed.status = AuthStatus::Active;
        refreshed.unavailable = false;
        refreshed.unavailable_until = None;

        if let Some(store) = &self.store
            && let Err(err) = store.save(&refreshed)
        {
            warn!(id = %refreshed.id, error = %err, "failed to persist refreshed credential");
        }
        self.insert(refreshed).await;
    }

    /// Per-provider tallies for the health surface.
    pub async fn provider_counts(&self) -> HashMap<String, ProviderCounts> {
        let guard = self.creds.read().await;
        let mut out: HashMap<String, ProviderCounts> = HashMap::new();
        for auth in guard.values() {
            let counts = out.entry(auth.provider.clone()).or_default();
            counts.total += 1;
            if auth.disabled {
                counts.disabled += 1;
            } else if !auth.status.is_active() {
                counts.error += 1;
            } else if auth.unavailable {
                counts.unavailable += 1;
            } else {
                counts.active += 1;
            }
            if !auth.is_expired() && auth.access_token().is_some() {
                counts.tokens_valid += 1;
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProviderCounts {
    pub total: usize,
    pub active: usize,
    pub error: usize,
    pub disabled: usize,
    pub unavailable: usize,
    pub tokens_valid: usize,
}
