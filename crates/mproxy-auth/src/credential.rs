use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Runtime + persisted record of one identity with a provider.
///
/// `id` doubles as the on-disk file name. `attributes` are operator-set and
/// immutable at runtime (api key, base URL, custom headers); `metadata` is
/// mutated by refresh and selection bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auth {
    pub id: String,
    pub provider: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Durable-serialization view written to disk alongside the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<Value>,
    #[serde(default)]
    pub status: AuthStatus,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub unavailable: bool,
    /// Wall-clock recovery time for a transient unavailability, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable_until: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "message")]
pub enum AuthStatus {
    #[default]
    Active,
    Error(String),
}

impl AuthStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AuthStatus::Active)
    }
}

pub(crate) fn now_unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or_default()
}

pub(crate) fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or_default()
}

impl Auth {
    pub fn new(provider: impl Into<String>, label: impl Into<String>) -> Self {
        let provider = provider.into();
        let label = label.into();
        Self {
            id: format!("{provider}-{label}.json"),
            provider,
            label,
            attributes: BTreeMap::new(),
            metadata: Map::new(),
            storage: None,
            status: AuthStatus::Active,
            disabled: false,
            unavailable: false,
            unavailable_until: None,
        }
    }

    /// Store a fresh access token. The timestamp is written in the same
    /// operation; an access token without one would break staleness checks.
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.metadata
            .insert("access_token".to_string(), Value::String(token.into()));
        self.metadata
            .insert("timestamp".to_string(), Value::from(now_unix_millis()));
    }

    pub fn access_token(&self) -> Option<&str> {
        self.metadata.get("access_token").and_then(Value::as_str)
    }

    pub fn set_last_used(&mut self, stamp: i64) {
        self.metadata
            .insert("last_used".to_string(), Value::from(stamp));
    }

    pub fn last_used(&self) -> Option<i64> {
        self.metadata.get("last_used").and_then(Value::as_i64)
    }

    /// Absolute expiry derived from metadata, unix seconds.
    pub fn expiration_time(&self) -> Option<i64> {
        self.metadata.get("expires_at").and_then(Value::as_i64)
    }

    pub fn is_expired(&self) -> bool {
        self.expiration_time()
            .is_some_and(|expiry| expiry <= now_unix_seconds())
    }

    /// Custom upstream headers from `header_`-prefixed attributes.
    pub fn custom_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(|(key, value)| {
            key.strip_prefix("header_")
                .map(|name| (name, value.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_write_stamps_timestamp() {
        let mut auth = Auth::new("continue", "alice");
        assert!(auth.metadata.get("timestamp").is_none());
        auth.set_access_token("at");
        assert_eq!(auth.access_token(), Some("at"));
        assert!(auth.metadata.get("timestamp").and_then(Value::as_i64).unwrap() > 0);
    }

    #[test]
    fn id_matches_provider_label_file_name() {
        let auth = Auth::new("continue", "alice");
        assert_eq!(auth.id, "continue-alice.json");
    }

    #[test]
    fn expiration_reads_metadata() {
        let mut auth = Auth::new("cursor", "bob");
        assert_eq!(auth.expiration_time(), None);
        assert!(!auth.is_expired());
        auth.metadata.insert("expires_at".to_string(), Value::from(1i64));
        assert!(auth.is_expired());
    }

    #[test]
    fn custom_headers_use_prefix() {
        let mut auth = Auth::new("bolt", "key");
        auth.attributes
            .insert("header_X-Org".to_string(), "acme".to_string());
        auth.attributes
            .insert("api_key".to_string(), "sk-1".to_string());
        let headers: Vec<_> = auth.custom_headers().collect();
        assert_eq!(headers, vec![("X-Org", "acme")]);
    }
}
