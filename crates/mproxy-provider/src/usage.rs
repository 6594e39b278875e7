use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use mproxy_translator::sse::data_payload;

/// Token usage for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

/// OpenAI-shape `usage` object from a non-streaming body.
pub fn parse_openai_usage(body: &[u8]) -> Option<Usage> {
    let value: Value = serde_json::from_slice(body).ok()?;
    usage_from_openai_value(value.get("usage")?)
}

/// Claude-shape `usage` object from a non-streaming body.
pub fn parse_claude_usage(body: &[u8]) -> Option<Usage> {
    let value: Value = serde_json::from_slice(body).ok()?;
    usage_from_claude_value(value.get("usage")?)
}

/// Usage carried by one SSE line: an OpenAI `usage` frame or a Claude
/// `message_delta.usage` / `message_start.message.usage` frame.
pub fn parse_stream_usage(line: &str) -> Option<Usage> {
    let payload = data_payload(line)?;
    let value: Value = serde_json::from_str(payload).ok()?;

    if let Some(usage) = value.get("usage") {
        if let Some(parsed) = usage_from_openai_value(usage) {
            return Some(parsed);
        }
        if let Some(parsed) = usage_from_claude_value(usage) {
            return Some(parsed);
        }
    }
    value
        .get("message")
        .and_then(|message| message.get("usage"))
        .and_then(usage_from_claude_value)
}

fn usage_from_openai_value(usage: &Value) -> Option<Usage> {
    let prompt = usage.get("prompt_tokens").and_then(Value::as_i64);
    let completion = usage.get("completion_tokens").and_then(Value::as_i64);
    let total = usage.get("total_tokens").and_then(Value::as_i64);
    if prompt.is_none() && completion.is_none() && total.is_none() {
        return None;
    }
    let prompt = prompt.unwrap_or(0);
    let completion = completion.unwrap_or(0);
    Some(Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: total.unwrap_or(prompt + completion),
    })
}

fn usage_from_claude_value(usage: &Value) -> Option<Usage> {
    let input = usage.get("input_tokens").and_then(Value::as_i64);
    let output = usage.get("output_tokens").and_then(Value::as_i64);
    if input.is_none() && output.is_none() {
        return None;
    }
    let input = input.unwrap_or(0);
    let output = output.unwrap_or(0);
    Some(Usage {
        prompt_tokens: input,
        completion_tokens: output,
        total_tokens: input + output,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderUsage {
    pub requests: u64,
    pub success: u64,
    pub failure: u64,
    pub total_tokens: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageSnapshot {
    pub providers: HashMap<String, ProviderUsage>,
}

/// Process-wide usage counters behind the health surface.
#[derive(Debug, Default)]
pub struct UsageHub {
    inner: Mutex<HashMap<String, ProviderUsage>>,
}

impl UsageHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_success(&self, provider: &str, usage: Usage) {
        let mut guard = self.inner.lock().expect("usage hub lock");
        let entry = guard.entry(provider.to_string()).or_default();
        entry.requests += 1;
        entry.success += 1;
        entry.total_tokens += usage.total_tokens;
    }

    fn record_failure(&self, provider: &str) {
        let mut guard = self.inner.lock().expect("usage hub lock");
        let entry = guard.entry(provider.to_string()).or_default();
        entry.requests += 1;
        entry.failure += 1;
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            providers: self.inner.lock().expect("usage hub lock").clone(),
        }
    }

    pub fn reporter(
        self: &Arc<Self>,
        provider: impl Into<String>,
        model: impl Into<String>,
        auth_id: impl Into<String>,
    ) -> UsageReporter {
        UsageReporter {
            hub: Arc::clone(self),
            provider: provider.into(),
            model: model.into(),
            auth_id: auth_id.into(),
            published: false,
        }
    }
}

/// Per-request publication handle.
///
/// Exactly one of success/failure is recorded per request: the first
/// `publish` wins, `publish_failure` only lands when nothing was published,
/// and dropping the reporter unpublished (cancellation, panic, early return)
/// counts as a failure.
#[derive(Debug)]
pub struct UsageReporter {
    hub: Arc<UsageHub>,
    provider: String,
    pub model: String,
    pub auth_id: String,
    published: bool,
}

impl UsageReporter {
    pub fn publish(&mut self, usage: Usage) {
        if self.published {
            return;
        }
        self.published = true;
        self.hub.record_success(&self.provider, usage);
    }

    pub fn publish_failure(&mut self) {
        if self.published {
            return;
        }
        self.published = true;
        self.hub.record_failure(&self.provider);
    }

    /// Close out a normally-finished request that never surfaced usage.
    pub fn ensure_published(&mut self) {
        if self.published {
            return;
        }
        self.published = true;
        self.hub.record_success(&self.provider, Usage::default());
    }
}

impl Drop for UsageReporter {
    fn drop(&mut self) {
        if !self.published {
            self.published = true;
            self.hub.record_failure(&self.provider);
        }
    }
}
