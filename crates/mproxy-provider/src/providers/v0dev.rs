use std::sync::Arc;

use async_trait::async_trait;

use mproxy_auth::Auth;
use mproxy_translator::Dialect;

use crate::executor::{
    ConfigProvider, ExecOptions, ExecutorError, ProviderExecutor, Request, Response, StreamChunk,
};
use crate::http::{UpstreamRequest, header_set};
use crate::openai_compat::{
    Shared, apply_payload_overrides, apply_reasoning_metadata, normalize_model, run_nonstream,
    run_stream, set_stream_mode, translate_bodies,
};

use super::{bearer_headers, resolve_upstream_model};

const IDENTIFIER: &str = "v0dev";
const DEFAULT_BASE_URL: &str = "https://api.v0.dev";

/// v0.dev Platform API executor. Stateless: API key from attributes, no
/// token cache.
pub struct V0Executor {
    shared: Shared,
    config: Arc<dyn ConfigProvider>,
}

impl V0Executor {
    pub fn new(shared: Shared, config: Arc<dyn ConfigProvider>) -> Self {
        Self { shared, config }
    }

    fn credentials(&self, auth: &Auth) -> Result<(String, String), ExecutorError> {
        let config = self.config.get();
        let base_url = auth
            .attributes
            .get("base_url")
            .map(String::as_str)
            .or_else(|| {
                config
                    .provider(IDENTIFIER)
                    .and_then(|settings| settings.base_url.as_deref())
            })
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
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_owned)
            })
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ExecutorError::status(401, "missing v0.dev API key"))?;
        Ok((base_url, api_key))
    }

    fn build_body(
        &self,
        req: &Request,
        opts: &ExecOptions,
        stream: bool,
    ) -> Result<Vec<u8>, ExecutorError> {
        let config = self.config.get();
        let upstream_model = resolve_upstream_model(&config, IDENTIFIER, &req.model);
        let (body, original_translated) = translate_bodies(
            &self.shared.registry,
            opts.source_format,
            Dialect::OpenAIChat,
            &upstream_model,
            req,
            opts,
        )?;
        let body = normalize_model(body, &upstream_model);
        let body = apply_reasoning_metadata(body, &req.metadata);
        let body = apply_payload_overrides(
            &config,
            IDENTIFIER,
            &upstream_model,
            Dialect::OpenAIChat,
            body,
            &original_translated,
        );
        Ok(set_stream_mode(body, stream, stream))
    }
}

#[async_trait]
impl ProviderExecutor for V0Executor {
    fn identifier(&self) -> &'static str {
        IDENTIFIER
    }

    fn upstream_dialect(&self) -> Dialect {
        Dialect::OpenAIChat
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
        let body = self.build_body(&req, &opts, false)?;
        run_nonstream(
            &self.shared,
            IDENTIFIER,
            Dialect::OpenAIChat,
            format!("{base_url}/v1/chat/completions"),
            bearer_headers(&api_key, false, None, auth),
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
        let body = self.build_body(&req, &opts, true)?;
        run_stream(
            &self.shared,
            IDENTIFIER,
            Dialect::OpenAIChat,
            format!("{base_url}/v1/chat/completions"),
            bearer_headers(&api_key, true, None, auth),
            opts.source_format,
            &req.model,
            body,
            opts.original_request.clone(),
            reporter,
        )
        .await
    }

    async fn prepare_request(
        &self,
        req: &mut UpstreamRequest,
        auth: &Auth,
    ) -> Result<(), ExecutorError> {
        let (_, api_key) = self.credentials(auth)?;
        header_set(&mut req.headers, "Authorization", format!("Bearer {api_key}"));
        Ok(())
    }
}
