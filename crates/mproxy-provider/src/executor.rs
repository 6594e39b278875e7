use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};

use mproxy_auth::Auth;
use mproxy_common::Config;
use mproxy_translator::{Dialect, SseEvent, TranslateError};

use crate::http::{TransportErrorKind, UpstreamRequest};

/// Runtime view of configuration, swap-safe for hot reload.
pub trait ConfigProvider: Send + Sync {
    fn get(&self) -> Arc<Config>;
}

/// Fixed-config provider, mostly for tests and the login path.
pub struct StaticConfig(pub Arc<Config>);

impl ConfigProvider for StaticConfig {
    fn get(&self) -> Arc<Config> {
        self.0.clone()
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub model: String,
    pub payload: Bytes,
    pub metadata: Map<String, Value>,
    pub stream: bool,
}

#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Dialect the client spoke; the executor translates from it to its
    /// upstream dialect and back.
    pub source_format: Dialect,
    /// Untranslated client payload, used by response translators to recover
    /// client-side shape.
    pub original_request: Option<Bytes>,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub payload: Bytes,
}

/// One streaming unit: a translated SSE event or a terminal error.
#[derive(Debug)]
pub enum StreamChunk {
    Event(SseEvent),
    Error(ExecutorError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    /// Upstream returned a non-2xx status; body capped, never truncated
    /// silently.
    #[error("upstream status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("upstream transport error: {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
    #[error("auth: {0}")]
    Auth(String),
    #[error(transparent)]
    Translate(#[from] TranslateError),
    #[error("stream read failed: {0}")]
    Scanner(String),
    #[error("{0} is not supported by this provider")]
    NotSupported(&'static str),
}

impl ExecutorError {
    pub fn status(code: u16, body: impl Into<String>) -> Self {
        ExecutorError::Status {
            code,
            body: body.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ExecutorError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Per-provider upstream call implementation.
#[async_trait]
pub trait ProviderExecutor: Send + Sync {
    fn identifier(&self) -> &'static str;

    /// Dialect this executor speaks to the provider.
    fn upstream_dialect(&self) -> Dialect;

    async fn execute(
        &self,
        auth: &Auth,
        req: Request,
        opts: ExecOptions,
    ) -> Result<Response, ExecutorError>;

    /// Streaming call. The returned channel is closed by the producer on
    /// completion; dropping the receiver cancels the upstream read.
    async fn execute_stream(
        &self,
        auth: &Auth,
        req: Request,
        opts: ExecOptions,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamChunk>, ExecutorError>;

    async fn count_tokens(
        &self,
        _auth: &Auth,
        _req: Request,
        _opts: ExecOptions,
    ) -> Result<Response, ExecutorError> {
        Err(ExecutorError::NotSupported("count_tokens"))
    }

    /// Revalidate or renew the credential. Identity for API-key providers.
    async fn refresh(&self, auth: &Auth) -> Result<Auth, ExecutorError> {
        Ok(auth.clone())
    }

    /// Inject credentials onto an already-built outbound request
    /// (passthrough paths).
    async fn prepare_request(
        &self,
        req: &mut UpstreamRequest,
        auth: &Auth,
    ) -> Result<(), ExecutorError>;
}
