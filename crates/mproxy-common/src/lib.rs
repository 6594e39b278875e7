use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config field: {0}")]
    MissingField(&'static str),
    #[error("invalid config value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

/// Final, merged configuration used by the running process.
///
/// Merge order: CLI > ENV > defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Directory holding one credential JSON file per identity.
    pub auth_dir: PathBuf,
    /// Optional outbound proxy for upstream egress.
    pub proxy: Option<String>,
    /// Per-call timeout for non-streaming upstream requests, seconds.
    pub request_timeout_secs: u64,
    /// Seconds of upstream silence before a keep-alive comment is written.
    pub keepalive_secs: u64,
    /// Per-provider settings keyed by provider identifier.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.get(name)
    }
}

/// Settings for one upstream provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model table: upstream names plus optional client-facing aliases.
    #[serde(default)]
    pub models: Vec<ModelMapping>,
    /// Payload overrides applied after translation, keyed by
    /// `{model}:{dialect}` (`*` matches any model). Values are JSON pointers
    /// to literal values, e.g. `"/temperature": 0.2`.
    #[serde(default)]
    pub payload_overrides: BTreeMap<String, serde_json::Value>,
}

impl ProviderSettings {
    /// Resolve a client-facing alias to the upstream model name.
    pub fn resolve_model(&self, alias: &str) -> Option<&str> {
        let trimmed = alias.trim();
        if trimmed.is_empty() {
            return None;
        }
        for mapping in &self.models {
            if mapping
                .alias
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(trimmed))
            {
                return Some(mapping.name.as_str());
            }
            if mapping.name.eq_ignore_ascii_case(trimmed) {
                return Some(mapping.name.as_str());
            }
        }
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMapping {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Optional layer used when merging configuration sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub auth_dir: Option<PathBuf>,
    pub proxy: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub keepalive_secs: Option<u64>,
    pub providers: Option<BTreeMap<String, ProviderSettings>>,
}

impl ConfigPatch {
    pub fn overlay(&mut self, other: ConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.auth_dir.is_some() {
            self.auth_dir = other.auth_dir;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.request_timeout_secs.is_some() {
            self.request_timeout_secs = other.request_timeout_secs;
        }
        if other.keepalive_secs.is_some() {
            self.keepalive_secs = other.keepalive_secs;
        }
        if other.providers.is_some() {
            self.providers = other.providers;
        }
    }

    pub fn into_config(self) -> Result<Config, ConfigError> {
        Ok(Config {
            host: self.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: self.port.unwrap_or(8317),
            auth_dir: self
                .auth_dir
                .ok_or(ConfigError::MissingField("auth_dir"))?,
            proxy: self.proxy,
            request_timeout_secs: self.request_timeout_secs.unwrap_or(30),
            keepalive_secs: self.keepalive_secs.unwrap_or(15),
            providers: self.providers.unwrap_or_default(),
        })
    }
}

impl From<Config> for ConfigPatch {
    fn from(value: Config) -> Self {
        Self {
            host: Some(value.host),
            port: Some(value.port),
            auth_dir: Some(value.auth_dir),
            proxy: value.proxy,
            request_timeout_secs: Some(value.request_timeout_secs),
            keepalive_secs: Some(value.keepalive_secs),
            providers: Some(value.providers),
        }
    }
}
