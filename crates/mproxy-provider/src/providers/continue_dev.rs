use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{Duration, Instant};

use mproxy_auth::Auth;
use mproxy_auth::providers::fetch_continue_api_token;
use mproxy_translator::Dialect;

use crate::executor::{
    ConfigProvider, ExecOptions, ExecutorError, ProviderExecutor, Request, Response, StreamChunk,
};
use crate::http::{UpstreamRequest, header_set};
use crate::openai_compat::{
    Shared, apply_payload_overrides, apply_reasoning_metadata, normalize_model, run_nonstream,
    run_stream, set_stream_mode, translate_bodies,
};
use crate::token_cache::TokenCache;

use super::{bearer_headers, resolve_upstream_model};

const IDENTIFIER: &str = "continue";
const DEFAULT_BASE_URL: &str = "https://api.continue.dev";
const CHAT_PATH: &str = "/v1/chat/completions";

/// Continue.dev executor: two-stage token (OAuth access token exchanged for
/// a short-lived API token, cached per credential).
pub struct ContinueExecutor {
    shared: Shared,
    config: Arc<dyn ConfigProvider>,
    cache: TokenCache,
}

impl ContinueExecutor {
    pub fn new(shared: Shared, config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            shared,
            config,
            cache: TokenCache::new(),
        }
    }

    fn chat_url(&self) -> String {
        let config = self.config.get();
        let base = config
            .provider(IDENTIFIER)
            .and_then(|settings| settings.base_url.as_deref())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        format!("{base}{CHAT_PATH}")
    }

    async fn ensure_api_token(&self, auth: &Auth) -> Result<String, ExecutorError> {
        if let Some(token) = self.cache.get(&auth.id).await {
            return Ok(token);
        }

        let access_token = auth
            .access_token()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ExecutorError::status(401, "missing continue access token"))?;

        let config = self.config.get();
        let api_token = fetch_continue_api_token(&config, access_token)
            .await
            .map_err(|err| ExecutorError::Auth(err.to_string()))?;

        let expires_at = if api_token.expires_at > 0 {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|duration| duration.as_secs() as i64)
                .unwrap_or_default();
            let remaining = (api_token.expires_at - now).max(0) as u64;
            Instant::now() + Duration::from_secs(remaining)
        } else {
            Instant::now() + crate::token_cache::TOKEN_CACHE_TTL
        };
        self.cache
            .insert_with_expiry(&auth.id, &api_token.token, expires_at)
            .await;
        Ok(api_token.token)
    }

    fn build_body(
        &self,
        auth_model: &str,
        req: &Request,
        opts: &ExecOptions,
        stream: bool,
    ) -> Result<Vec<u8>, ExecutorError> {
        let config = self.config.get();
        let upstream_model = resolve_upstream_model(&config, IDENTIFIER, auth_model);
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
impl ProviderExecutor for ContinueExecutor {
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
        let token = self.ensure_api_token(auth).await?;
        let reporter = self
            .shared
            .hub
            .reporter(IDENTIFIER, &req.model, &auth.id);
        let body = self.build_body(&req.model, &req, &opts, false)?;
        run_nonstream(
            &self.shared,
            IDENTIFIER,
            Dialect::OpenAIChat,
            self.chat_url(),
            bearer_headers(&token, false, None, auth),
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
        let token = self.ensure_api_token(auth).await?;
        let reporter = self
            .shared
            .hub
            .reporter(IDENTIFIER, &req.model, &auth.id);
        let body = self.build_body(&req.model, &req, &opts, true)?;
        run_stream(
            &self.shared,
            IDENTIFIER,
            Dialect::OpenAIChat,
            self.chat_url(),
            bearer_headers(&token, true, None, auth),
            opts.source_format,
            &req.model,
            body,
            opts.original_request.clone(),
            reporter,
        )
        .await
    }

    /// Revalidate the OAuth access token by exchanging it once. The access
    /// token itself is never renewed here; only the cached exchange token
    /// turns over.
    async fn refresh(&self, auth: &Auth) -> Result<Auth, ExecutorError> {
        let access_token = auth
            .access_token()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ExecutorError::Auth("no access token to validate".to_string()))?;
        let config = self.config.get();
        let api_token = fetch_continue_api_token(&config, access_token)
            .await
            .map_err(|err| ExecutorError::Auth(err.user_message()))?;
        self.cache.evict(&auth.id).await;
        self.cache.insert(&auth.id, &api_token.token).await;
        Ok(auth.clone())
    }

    async fn prepare_request(
        &self,
        req: &mut UpstreamRequest,
        auth: &Auth,
    ) -> Result<(), ExecutorError> {
        let token = self.ensure_api_token(auth).await?;
        header_set(&mut req.headers, "Authorization", format!("Bearer {token}"));
        header_set(&mut req.headers, "Content-Type", "application/json");
        Ok(())
    }
}
