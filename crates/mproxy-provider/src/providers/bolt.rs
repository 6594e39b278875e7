use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use mproxy_auth::Auth;
use mproxy_translator::Dialect;

use crate::executor::{
    ConfigProvider, ExecOptions, ExecutorError, ProviderExecutor, Request, Response, StreamChunk,
};
use crate::http::{
    Headers, HttpMethod, UpstreamBody, UpstreamRequest, header_set,
};
use crate::openai_compat::{
    Shared, apply_payload_overrides, normalize_model, run_nonstream, run_stream, set_stream_mode,
    translate_bodies,
};

use super::resolve_upstream_model;

const IDENTIFIER: &str = "bolt";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const BASE_BETAS: &str =
    "claude-code-20250219,interleaved-thinking-2025-05-14,fine-grained-tool-streaming-2025-05-14";

const WEBCONTAINER_PREAMBLE: &str = "You are Bolt, an expert AI assistant and exceptional senior \
software developer with vast knowledge across multiple programming languages, frameworks, and \
best practices. Your capabilities include:\n\n<bolt_capabilities>\n* Creating and managing \
project structures\n* Writing clean, efficient, and well-documented code\n* Debugging complex \
issues and providing detailed explanations\n* Offering architectural insights and design \
patterns\n* Staying up-to-date with the latest technologies and best practices\n* Reading and \
analyzing existing files in the project\n* Listing files and directories to understand the \
project structure\n* Performing web searches for additional information when needed\n\
</bolt_capabilities>\n\n<webcontainer_environment>\nYou are running in WebContainer, an \
in-browser Node.js runtime. Key characteristics:\n* Commands run inside a Node.js environment \
with limited shell capabilities\n* Filesystem is in-memory and browser-based\n* Network requests \
are proxied through the browser\n* You can install npm packages and run Node.js scripts\n* \
Development servers can be started and will be accessible via browser preview\n\
</webcontainer_environment>";

/// Bolt executor: Anthropic-compatible upstream authenticated with
/// `x-api-key`, with the WebContainer execution context injected on request.
pub struct BoltExecutor {
    shared: Shared,
    config: Arc<dyn ConfigProvider>,
}

impl BoltExecutor {
    pub fn new(shared: Shared, config: Arc<dyn ConfigProvider>) -> Self {
        Self { shared, config }
    }

    fn credentials(&self, auth: &Auth) -> Result<(String, String), ExecutorError> {
        let base_url = auth
            .attributes
            .get("base_url")
            .map(String::as_str)
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let api_key = auth
            .attributes
            .get("api_key")
            .cloned()
            .or_else(|| {
                auth.metadata
                    .get("api_key")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ExecutorError::status(401, "missing bolt API key"))?;
        Ok((base_url, api_key))
    }

    fn build_body(
        &self,
        req: &Request,
        opts: &ExecOptions,
        stream: bool,
    ) -> Result<(Vec<u8>, Vec<String>), ExecutorError> {
        let config = self.config.get();
        let upstream_model = resolve_upstream_model(&config, IDENTIFIER, &req.model);
        let (body, original_translated) = translate_bodies(
            &self.shared.registry,
            opts.source_format,
            Dialect::Claude,
            &upstream_model,
            req,
            opts,
        )?;
        let body = normalize_model(body, &upstream_model);
        let body = inject_webcontainer_context(body, &req.metadata);
        let body = inject_thinking_config(body, &req.metadata);
        let body = apply_payload_overrides(
            &config,
            IDENTIFIER,
            &upstream_model,
            Dialect::Claude,
            body,
            &original_translated,
        );
        let (betas, body) = extract_betas(body);
        Ok((set_stream_mode(body, stream, false), betas))
    }

    fn headers(&self, api_key: &str, stream: bool, betas: &[String], auth: &Auth) -> Headers {
        let mut headers = Headers::new();
        header_set(&mut headers, "x-api-key", api_key);
        header_set(&mut headers, "Content-Type", "application/json");
        header_set(&mut headers, "Anthropic-Beta", merge_betas(betas));
        header_set(&mut headers, "Anthropic-Version", ANTHROPIC_VERSION);
        header_set(&mut headers, "User-Agent", "bolt.new/1.0");
        header_set(
            &mut headers,
            "Accept",
            if stream {
                "text/event-stream"
            } else {
                "application/json"
            },
        );
        for (name, value) in auth.custom_headers() {
            header_set(&mut headers, name, value);
        }
        headers
    }
}

/// Prepend the WebContainer system context when the request asks for it.
fn inject_webcontainer_context(body: Vec<u8>, metadata: &serde_json::Map<String, Value>) -> Vec<u8> {
    if metadata.get("webcontainer").and_then(Value::as_bool) != Some(true) {
        return body;
    }
    let Ok(Value::Object(mut map)) = serde_json::from_slice::<Value>(&body) else {
        return body;
    };
    let context = json!({"type": "text", "text": WEBCONTAINER_PREAMBLE});
    let system = match map.remove("system") {
        Some(Value::Array(existing)) => {
            let mut blocks = vec![context];
            blocks.extend(existing);
            Value::Array(blocks)
        }
        Some(Value::String(existing)) => {
            json!([context, {"type": "text", "text": existing}])
        }
        _ => json!([context]),
    };
    map.insert("system".to_string(), system);
    serde_json::to_vec(&Value::Object(map)).unwrap_or(body)
}

/// Thinking budget from request metadata, with max_tokens raised above it.
fn inject_thinking_config(body: Vec<u8>, metadata: &serde_json::Map<String, Value>) -> Vec<u8> {
    let Some(budget) = metadata.get("thinking_budget").and_then(Value::as_i64) else {
        return body;
    };
    let Ok(Value::Object(mut map)) = serde_json::from_slice::<Value>(&body) else {
        return body;
    };
    map.insert(
        "thinking".to_string(),
        json!({"type": "enabled", "budget_tokens": budget}),
    );
    let max_tokens = map
        .get("max_tokens")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if max_tokens <= budget {
        map.insert("max_tokens".to_string(), Value::from(budget + 1024));
    }
    serde_json::to_vec(&Value::Object(map)).unwrap_or(body)
}

/// Pull request-level `betas` out of the body; they belong in the header.
fn extract_betas(body: Vec<u8>) -> (Vec<String>, Vec<u8>) {
    let Ok(Value::Object(mut map)) = serde_json::from_slice::<Value>(&body) else {
        return (Vec::new(), body);
    };
    let betas = match map.remove("betas") {
        Some(Value::Array(values)) => values
            .into_iter()
            .filter_map(|value| value.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    };
    let body = serde_json::to_vec(&Value::Object(map)).unwrap_or(body);
    (betas, body)
}

fn merge_betas(extra: &[String]) -> String {
    let mut merged = BASE_BETAS.to_string();
    let mut seen: Vec<String> = BASE_BETAS
        .split(',')
        .map(|beta| beta.trim().to_string())
        .collect();
    for beta in extra {
        let beta = beta.trim();
        if beta.is_empty() || seen.iter().any(|existing| existing == beta) {
            continue;
        }
        merged.push(',');
        merged.push_str(beta);
        seen.push(beta.to_string());
    }
    merged
}

#[async_trait]
impl ProviderExecutor for BoltExecutor {
    fn identifier(&self) -> &'static str {
        IDENTIFIER
    }

    fn upstream_dialect(&self) -> Dialect {
        Dialect::Claude
    }

    async fn execute(
        &self,
        auth: &Auth,
        req: Request,
        opts: ExecOptions,
    ) -> Result<Response, ExecutorError> {
        let (base_url, api_key) = self.credentials(auth)?;
        let reporter = self
            .shared
            .hub
            .reporter(IDENTIFIER, &req.model, &auth.id);
        let (body, betas) = self.build_body(&req, &opts, false)?;
        run_nonstream(
            &self.shared,
            IDENTIFIER,
            Dialect::Claude,
            format!("{base_url}/v1/messages"),
            self.headers(&api_key, false, &betas, auth),
            opts.source_format,
            &req.model,
            body,
            opts.original_request.clone(),
            reporter,
        )
        .await
    }

    async fn execute_stream(
        &self,
        auth: &Auth,
        req: Request,
        opts: ExecOptions,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamChunk>, ExecutorError> {
        let (base_url, api_key) = self.credentials(auth)?;
        let reporter = self
            .shared
            .hub
            .reporter(IDENTIFIER, &req.model, &auth.id);
        let (body, betas) = self.build_body(&req, &opts, true)?;
        run_stream(
            &self.shared,
            IDENTIFIER,
            Dialect::Claude,
            format!("{base_url}/v1/messages"),
            self.headers(&api_key, true, &betas, auth),
            opts.source_format,
            &req.model,
            body,
            opts.original_request.clone(),
            reporter,
        )
        .await
    }

    async fn count_tokens(
        &self,
        auth: &Auth,
        req: Request,
        opts: ExecOptions,
    ) -> Result<Response, ExecutorError> {
        let (base_url, api_key) = self.credentials(auth)?;
        let (body, betas) = self.build_body(&req, &opts, false)?;

        let request = UpstreamRequest {
            method: HttpMethod::Post,
            url: format!("{base_url}/v1/messages/count_tokens"),
            headers: self.headers(&api_key, false, &betas, auth),
            body: Some(bytes::Bytes::from(body)),
            is_stream: false,
        };
        let response = self.shared.client.send(request).await?;
        let data = match response.body {
            UpstreamBody::Bytes(data) => data,
            UpstreamBody::Stream(mut rx) => {
                let mut data = Vec::new();
                while let Some(chunk) = rx.recv().await {
                    data.extend_from_slice(&chunk);
                }
                bytes::Bytes::from(data)
            }
        };
        if !(200..300).contains(&response.status) {
            return Err(ExecutorError::status(
                response.status,
                String::from_utf8_lossy(&data).into_owned(),
            ));
        }

        let count = serde_json::from_slice::<Value>(&data)
            .ok()
            .and_then(|value| value.get("input_tokens").and_then(Value::as_i64))
            .unwrap_or(0);
        let translator = self
            .shared
            .registry
            .lookup(opts.source_format, Dialect::Claude)?;
        let rendered = (translator.token_count)(count);
        Ok(Response {
            payload: bytes::Bytes::from(rendered.into_bytes()),
        })
    }

    async fn prepare_request(
        &self,
        req: &mut UpstreamRequest,
        auth: &Auth,
    ) -> Result<(), ExecutorError> {
        let (_, api_key) = self.credentials(auth)?;
        header_set(&mut req.headers, "x-api-key", api_key);
        header_set(&mut req.headers, "Anthropic-Version", ANTHROPIC_VERSION);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webcontainer_context_is_prepended_once() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("webcontainer".to_string(), Value::Bool(true));
        let body = br#"{"model":"m","system":[{"type":"text","text":"existing"}]}"#.to_vec();
        let out = inject_webcontainer_context(body, &metadata);
        let value: Value = serde_json::from_slice(&out).unwrap();
        let system = value["system"].as_array().unwrap();
        assert_eq!(system.len(), 2);
        assert!(system[0]["text"].as_str().unwrap().starts_with("You are Bolt"));
        assert_eq!(system[1]["text"], "existing");
    }

    #[test]
    fn webcontainer_context_skipped_without_flag() {
        let body = br#"{"model":"m"}"#.to_vec();
        let out = inject_webcontainer_context(body.clone(), &serde_json::Map::new());
        assert_eq!(out, body);
    }

    #[test]
    fn betas_are_merged_and_deduplicated() {
        let merged = merge_betas(&[
            "interleaved-thinking-2025-05-14".to_string(),
            "context-1m-2025-08-07".to_string(),
            "".to_string(),
        ]);
        assert_eq!(
            merged,
            format!("{BASE_BETAS},context-1m-2025-08-07")
        );
    }

    #[test]
    fn thinking_budget_raises_max_tokens() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("thinking_budget".to_string(), Value::from(8_192));
        let body = br#"{"model":"m","max_tokens":4096}"#.to_vec();
        let out = inject_thinking_config(body, &metadata);
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["thinking"]["budget_tokens"], 8_192);
        assert_eq!(value["max_tokens"], 9_216);
    }
}
