use std::sync::Arc;

use mproxy_auth::Auth;
use mproxy_translator::Dialect;

use crate::executor::{ConfigProvider, ExecOptions, ExecutorError, Request, Response, StreamChunk};
use crate::http::{UpstreamRequest, header_set};
use crate::openai_compat::{
    Shared, apply_payload_overrides, apply_reasoning_metadata, normalize_model, run_nonstream,
    run_stream, set_stream_mode, translate_bodies,
};
use crate::token_cache::TokenCache;

use super::{bearer_headers, resolve_upstream_model};

#[derive(Debug, Clone, Copy)]
pub(super) struct DirectParams {
    pub identifier: &'static str,
    pub default_base_url: &'static str,
    pub chat_path: &'static str,
    pub user_agent: &'static str,
}

/// Common path for providers whose OAuth access token is sent upstream
/// directly. The token still goes through the TTL cache so validation calls
/// stay infrequent.
pub(super) struct DirectCore {
    params: DirectParams,
    shared: Shared,
    config: Arc<dyn ConfigProvider>,
    cache: TokenCache,
}

impl DirectCore {
    pub(super) fn new(params: DirectParams, shared: Shared, config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            params,
            shared,
            config,
            cache: TokenCache::new(),
        }
    }

    fn chat_url(&self) -> String {
        let config = self.config.get();
        let base = config
            .provider(self.params.identifier)
            .and_then(|settings| settings.base_url.as_deref())
            .unwrap_or(self.params.default_base_url)
            .trim_end_matches('/')
            .to_string();
        format!("{base}{}", self.params.chat_path)
    }

    pub(super) async fn ensure_api_token(&self, auth: &Auth) -> Result<String, ExecutorError> {
        if let Some(token) = self.cache.get(&auth.id).await {
            return Ok(token);
        }
        let token = auth
            .access_token()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                ExecutorError::status(
                    401,
                    format!("missing {} access token", self.params.identifier),
                )
            })?
            .to_string();
        self.cache.insert(&auth.id, &token).await;
        Ok(token)
    }

    fn build_body(
        &self,
        req: &Request,
        opts: &ExecOptions,
        stream: bool,
    ) -> Result<Vec<u8>, ExecutorError> {
        let config = self.config.get();
        let upstream_model = resolve_upstream_model(&config, self.params.identifier, &req.model);
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
            self.params.identifier,
            &upstream_model,
            Dialect::OpenAIChat,
            body,
            &original_translated,
        );
        Ok(set_stream_mode(body, stream, stream))
    }

    pub(super) async fn execute(
        &self,
        auth: &Auth,
        req: Request,
        opts: ExecOptions,
    ) -> Result<Response, ExecutorError> {
        let token = self.ensure_api_token(auth).await?;
        let reporter = self
            .shared
            .hub
            .reporter(self.params.identifier, &req.model, &auth.id);
        let body = self.build_body(&req, &opts, false)?;
        run_nonstream(
            &self.shared,
            self.params.identifier,
            Dialect::OpenAIChat,
            self.chat_url(),
            bearer_headers(&token, false, Some(self.params.user_agent), auth),
            opts.source_format,
            &req.model,
            body,
            opts.original_request.clone(),
            reporter,
        )
        .await
    }

    pub(super) async fn execute_stream(
        &self,
        auth: &Auth,
        req: Request,
        opts: ExecOptions,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamChunk>, ExecutorError> {
        let token = self.ensure_api_token(auth).await?;
        let reporter = self
            .shared
            .hub
            .reporter(self.params.identifier, &req.model, &auth.id);
        let body = self.build_body(&req, &opts, true)?;
        run_stream(
            &self.shared,
            self.params.identifier,
            Dialect::OpenAIChat,
            self.chat_url(),
            bearer_headers(&token, true, Some(self.params.user_agent), auth),
            opts.source_format,
            &req.model,
            body,
            opts.original_request.clone(),
            reporter,
        )
        .await
    }

    pub(super) async fn refresh(&self, auth: &Auth) -> Result<Auth, ExecutorError> {
        // Access tokens are long-lived here; refresh just re-primes the
        // cache so the next call revalidates against the fresh value.
        self.cache.evict(&auth.id).await;
        self.ensure_api_token(auth).await?;
        Ok(auth.clone())
    }

    pub(super) async fn prepare_request(
        &self,
        req: &mut UpstreamRequest,
        auth: &Auth,
    ) -> Result<(), ExecutorError> {
        let token = self.ensure_api_token(auth).await?;
        header_set(&mut req.headers, "Authorization", format!("Bearer {token}"));
        header_set(&mut req.headers, "Content-Type", "application/json");
        header_set(&mut req.headers, "User-Agent", self.params.user_agent);
        Ok(())
    }
}
