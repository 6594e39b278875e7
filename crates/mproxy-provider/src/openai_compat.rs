//! Shared request/response plumbing for upstreams that speak an
//! OpenAI-compatible (or Claude-compatible) wire dialect. Individual
//! executors supply the URL, headers, and token handling; everything from
//! translation through the streaming pump lives here.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use mproxy_common::Config;
use mproxy_translator::{Dialect, StreamState, TranslateContext, TranslatorRegistry};

use crate::executor::{ExecOptions, ExecutorError, Request, Response, StreamChunk};
use crate::http::{Headers, HttpMethod, UpstreamBody, UpstreamClient, UpstreamRequest};
use crate::scanner::{LineScanner, MAX_LINE_BYTES};
use crate::usage::{Usage, UsageHub, UsageReporter, parse_claude_usage, parse_openai_usage, parse_stream_usage};

const ERROR_BODY_CAP: usize = 64 * 1024;
const STREAM_CHANNEL_CAPACITY: usize = 100;

/// Wiring shared by every executor instance.
#[derive(Clone)]
pub struct Shared {
    pub client: Arc<dyn UpstreamClient>,
    pub registry: Arc<TranslatorRegistry>,
    pub hub: Arc<UsageHub>,
}

/// Translate the live payload and the original request into the upstream
/// dialect. Both translations run so response translators can recover the
/// client-side shape.
pub fn translate_bodies(
    registry: &TranslatorRegistry,
    from: Dialect,
    to: Dialect,
    model: &str,
    req: &Request,
    opts: &ExecOptions,
) -> Result<(Vec<u8>, Vec<u8>), ExecutorError> {
    let translator = registry.lookup(from, to)?;
    let original = opts
        .original_request
        .clone()
        .unwrap_or_else(|| req.payload.clone());
    let original_translated = (translator.request)(model, &original, req.stream)?;
    let body = (translator.request)(model, &req.payload, req.stream)?;
    Ok((body, original_translated))
}

/// Pin the upstream model name onto the translated body.
pub fn normalize_model(body: Vec<u8>, model: &str) -> Vec<u8> {
    set_fields(body, |map| {
        map.insert("model".to_string(), Value::String(model.to_string()));
    })
}

/// Force the stream flag, and ask OpenAI-compatible upstreams to attach
/// usage to the final frame.
pub fn set_stream_mode(body: Vec<u8>, stream: bool, include_usage: bool) -> Vec<u8> {
    set_fields(body, |map| {
        map.insert("stream".to_string(), Value::Bool(stream));
        if stream && include_usage {
            map.insert(
                "stream_options".to_string(),
                serde_json::json!({"include_usage": true}),
            );
        } else {
            map.remove("stream_options");
        }
    })
}

/// Copy the normalized reasoning option from request metadata when present.
pub fn apply_reasoning_metadata(body: Vec<u8>, metadata: &Map<String, Value>) -> Vec<u8> {
    let Some(effort) = metadata.get("reasoning_effort").and_then(Value::as_str) else {
        return body;
    };
    let effort = effort.to_string();
    set_fields(body, |map| {
        map.insert("reasoning_effort".to_string(), Value::String(effort));
    })
}

/// Apply operator payload overrides keyed by `{model}:{dialect}` with a
/// `*:{dialect}` wildcard.
///
/// Overrides are defaults, not clobbers: a field the client set explicitly
/// (visible in the translated original request) is left alone.
pub fn apply_payload_overrides(
    config: &Config,
    provider: &str,
    model: &str,
    dialect: Dialect,
    body: Vec<u8>,
    original_translated: &[u8],
) -> Vec<u8> {
    let Some(settings) = config.provider(provider) else {
        return body;
    };
    let client_set: Map<String, Value> = serde_json::from_slice::<Value>(original_translated)
        .ok()
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();

    let keys = [
        format!("{model}:{}", dialect.as_str()),
        format!("*:{}", dialect.as_str()),
    ];
    let mut body = body;
    for key in keys {
        if let Some(Value::Object(overlay)) = settings.payload_overrides.get(&key) {
            let overlay = overlay.clone();
            body = set_fields(body, |map| {
                for (field, value) in overlay {
                    if client_set.contains_key(&field) {
                        continue;
                    }
                    map.insert(field, value);
                }
            });
        }
    }
    body
}

fn set_fields(body: Vec<u8>, apply: impl FnOnce(&mut Map<String, Value>)) -> Vec<u8> {
    match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(mut map)) => {
            apply(&mut map);
            serde_json::to_vec(&Value::Object(map)).unwrap_or(body)
        }
        _ => body,
    }
}

fn cap_error_body(body: &[u8]) -> String {
    let end = body.len().min(ERROR_BODY_CAP);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

fn parse_body_usage(upstream: Dialect, body: &[u8]) -> Option<Usage> {
    match upstream.family() {
        mproxy_translator::Family::Claude => parse_claude_usage(body),
        _ => parse_openai_usage(body),
    }
}

/// Non-streaming upstream call: send, check status, extract usage,
/// translate the body back into the client dialect.
#[allow(clippy::too_many_arguments)]
pub async fn run_nonstream(
    shared: &Shared,
    identifier: &'static str,
    upstream: Dialect,
    url: String,
    headers: Headers,
    from: Dialect,
    model: &str,
    body: Vec<u8>,
    original_request: Option<Bytes>,
    mut reporter: UsageReporter,
) -> Result<Response, ExecutorError> {
    let request = UpstreamRequest {
        method: HttpMethod::Post,
        url,
        headers,
        body: Some(Bytes::from(body.clone())),
        is_stream: false,
    };
    // A transport failure propagates here and the reporter drop records it.
    let response = shared.client.send(request).await?;

    let data = match response.body {
        UpstreamBody::Bytes(data) => data,
        UpstreamBody::Stream(mut rx) => {
            let mut data = Vec::new();
            while let Some(chunk) = rx.recv().await {
                data.extend_from_slice(&chunk);
            }
            Bytes::from(data)
        }
    };

    if !(200..300).contains(&response.status) {
        debug!(executor = identifier, status = response.status, "upstream error status");
        reporter.publish_failure();
        return Err(ExecutorError::status(response.status, cap_error_body(&data)));
    }

    if let Some(usage) = parse_body_usage(upstream, &data)
        && usage.total_tokens > 0
    {
        reporter.publish(usage);
    }

    let translator = shared.registry.lookup(from, upstream)?;
    let ctx = TranslateContext {
        original_request: original_request.as_deref(),
        translated_request: Some(&body),
    };
    let mut state = StreamState::new();
    let payload = (translator.non_stream)(&ctx, model, &data, &mut state)?;
    reporter.ensure_published();
    Ok(Response {
        payload: Bytes::from(payload.into_bytes()),
    })
}

/// Streaming upstream call: send, then pump lines through the stream
/// translator into a bounded channel until the body ends or the receiver
/// goes away.
#[allow(clippy::too_many_arguments)]
pub async fn run_stream(
    shared: &Shared,
    identifier: &'static str,
    upstream: Dialect,
    url: String,
    headers: Headers,
    from: Dialect,
    model: &str,
    body: Vec<u8>,
    original_request: Option<Bytes>,
    reporter: UsageReporter,
) -> Result<tokio::sync::mpsc::Receiver<StreamChunk>, ExecutorError> {
    let request = UpstreamRequest {
        method: HttpMethod::Post,
        url,
        headers,
        body: Some(Bytes::from(body.clone())),
        is_stream: true,
    };
    let response = shared.client.send(request).await?;

    if !(200..300).contains(&response.status) {
        let data = match response.body {
            UpstreamBody::Bytes(data) => data,
            UpstreamBody::Stream(mut rx) => {
                let mut data = Vec::new();
                while let Some(chunk) = rx.recv().await {
                    data.extend_from_slice(&chunk);
                }
                Bytes::from(data)
            }
        };
        debug!(executor = identifier, status = response.status, "upstream error status");
        let mut reporter = reporter;
        reporter.publish_failure();
        return Err(ExecutorError::status(response.status, cap_error_body(&data)));
    }

    let (tx, rx) = tokio::sync::mpsc::channel::<StreamChunk>(STREAM_CHANNEL_CAPACITY);
    let registry = Arc::clone(&shared.registry);
    let model = model.to_string();
    tokio::spawn(pump_stream(
        registry,
        identifier,
        upstream,
        from,
        model,
        body,
        original_request,
        response.body,
        tx,
        reporter,
    ));
    Ok(rx)
}

#[allow(clippy::too_many_arguments)]
async fn pump_stream(
    registry: Arc<TranslatorRegistry>,
    identifier: &'static str,
    upstream: Dialect,
    from: Dialect,
    model: String,
    body: Vec<u8>,
    original_request: Option<Bytes>,
    upstream_body: UpstreamBody,
    tx: tokio::sync::mpsc::Sender<StreamChunk>,
    mut reporter: UsageReporter,
) {
    let translator = match registry.lookup(from, upstream) {
        Ok(translator) => translator,
        Err(err) => {
            let _ = tx.send(StreamChunk::Error(err.into())).await;
            reporter.publish_failure();
            return;
        }
    };
    let ctx = TranslateContext {
        original_request: original_request.as_deref(),
        translated_request: Some(&body),
    };
    let mut state = StreamState::new();
    let mut scanner = LineScanner::new(MAX_LINE_BYTES);

    let mut chunks: Option<tokio::sync::mpsc::Receiver<Bytes>> = None;
    let mut single: Option<Bytes> = None;
    match upstream_body {
        UpstreamBody::Stream(rx) => chunks = Some(rx),
        UpstreamBody::Bytes(data) => single = Some(data),
    }

    loop {
        let chunk = match (&mut chunks, single.take()) {
            (_, Some(data)) => Some(data),
            (Some(rx), None) => rx.recv().await,
            (None, None) => None,
        };
        let Some(chunk) = chunk else {
            break;
        };

        let lines = match scanner.push(&chunk) {
            Ok(lines) => lines,
            Err(overflow) => {
                warn!(executor = identifier, "stream scanner overflow");
                let _ = tx
                    .send(StreamChunk::Error(ExecutorError::Scanner(
                        overflow.to_string(),
                    )))
                    .await;
                reporter.publish_failure();
                return;
            }
        };
        for line in lines {
            if let Some(usage) = parse_stream_usage(&line) {
                reporter.publish(usage);
            }
            for event in (translator.stream)(&ctx, &model, &line, &mut state) {
                if tx.send(StreamChunk::Event(event)).await.is_err() {
                    // Receiver dropped: client disconnected. The upstream
                    // body drops with this task; the reporter records the
                    // failure unless a success already landed.
                    return;
                }
            }
        }
        if chunks.is_none() {
            break;
        }
    }

    if let Some(line) = scanner.finish() {
        if let Some(usage) = parse_stream_usage(&line) {
            reporter.publish(usage);
        }
        for event in (translator.stream)(&ctx, &model, &line, &mut state) {
            if tx.send(StreamChunk::Event(event)).await.is_err() {
                return;
            }
        }
    }
    reporter.ensure_published();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_mode_sets_usage_option_only_when_streaming() {
        let body = br#"{"model":"m","stream":false}"#.to_vec();
        let streamed = set_stream_mode(body.clone(), true, true);
        let value: Value = serde_json::from_slice(&streamed).unwrap();
        assert_eq!(value["stream"], true);
        assert_eq!(value["stream_options"]["include_usage"], true);

        let plain = set_stream_mode(body, false, true);
        let value: Value = serde_json::from_slice(&plain).unwrap();
        assert_eq!(value["stream"], false);
        assert!(value.get("stream_options").is_none());
    }

    #[test]
    fn payload_overrides_merge_by_model_then_wildcard() {
        let mut settings = mproxy_common::ProviderSettings::default();
        settings.payload_overrides.insert(
            "gpt-4:openai_chat".to_string(),
            serde_json::json!({"temperature": 0.1}),
        );
        settings.payload_overrides.insert(
            "*:openai_chat".to_string(),
            serde_json::json!({"user": "mproxy"}),
        );
        let config = mproxy_common::ConfigPatch {
            auth_dir: Some(std::path::PathBuf::from("/tmp")),
            providers: Some([("continue".to_string(), settings)].into()),
            ..Default::default()
        }
        .into_config()
        .unwrap();

        let body = br#"{"model":"gpt-4"}"#.to_vec();
        let merged = apply_payload_overrides(
            &config,
            "continue",
            "gpt-4",
            Dialect::OpenAIChat,
            body,
            br#"{"model":"gpt-4"}"#,
        );
        let value: Value = serde_json::from_slice(&merged).unwrap();
        assert_eq!(value["temperature"], 0.1);
        assert_eq!(value["user"], "mproxy");
    }

    #[test]
    fn client_set_fields_win_over_overrides() {
        let mut settings = mproxy_common::ProviderSettings::default();
        settings.payload_overrides.insert(
            "*:openai_chat".to_string(),
            serde_json::json!({"temperature": 0.1}),
        );
        let config = mproxy_common::ConfigPatch {
            auth_dir: Some(std::path::PathBuf::from("/tmp")),
            providers: Some([("continue".to_string(), settings)].into()),
            ..Default::default()
        }
        .into_config()
        .unwrap();

        let body = br#"{"model":"gpt-4","temperature":0.9}"#.to_vec();
        let merged = apply_payload_overrides(
            &config,
            "continue",
            "gpt-4",
            Dialect::OpenAIChat,
            body,
            br#"{"model":"gpt-4","temperature":0.9}"#,
        );
        let value: Value = serde_json::from_slice(&merged).unwrap();
        assert_eq!(value["temperature"], 0.9);
    }
}
