use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use mproxy_auth::{Auth, AuthManager};
use mproxy_provider::{
    ConfigProvider, ExecOptions, ExecutorError, ExecutorRegistry, Request, StreamChunk, UsageHub,
};
use mproxy_translator::{Dialect, TranslatorRegistry};

use crate::error::GatewayError;
use crate::health::HealthSnapshot;
use crate::routing::ModelRouter;

/// Result of a dispatch: a full response body or a channel of pre-framed SSE
/// bytes.
pub enum DispatchOutcome {
    Body(Bytes),
    Stream(tokio::sync::mpsc::Receiver<Bytes>),
}

/// The dispatch plane: picks a credential, runs translators around the
/// executor, and frames the outbound stream.
pub struct DispatchEngine {
    translators: Arc<TranslatorRegistry>,
    executors: Arc<ExecutorRegistry>,
    auth: Arc<AuthManager>,
    router: Arc<dyn ModelRouter>,
    hub: Arc<UsageHub>,
    config: Arc<dyn ConfigProvider>,
    started_at: std::time::Instant,
}

impl DispatchEngine {
    pub fn new(
        translators: Arc<TranslatorRegistry>,
        executors: Arc<ExecutorRegistry>,
        auth: Arc<AuthManager>,
        router: Arc<dyn ModelRouter>,
        hub: Arc<UsageHub>,
        config: Arc<dyn ConfigProvider>,
    ) -> Self {
        Self {
            translators,
            executors,
            auth,
            router,
            hub,
            config,
            started_at: std::time::Instant::now(),
        }
    }

    pub fn auth_manager(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    /// Entry point for the HTTP layer. `model` comes from the route for
    /// Gemini-style paths and from the body otherwise; pass `None` to let
    /// the engine read the body's `model` field.
    pub async fn dispatch(
        &self,
        inbound: Dialect,
        model: Option<String>,
        body: Bytes,
        stream: bool,
    ) -> Result<DispatchOutcome, GatewayError> {
        let request_id = uuid::Uuid::new_v4();
        let model = match model {
            Some(model) => model,
            None => extract_model(&body)?,
        };
        debug!(%request_id, dialect = %inbound, %model, stream, "dispatching");

        let target = self
            .router
            .resolve(inbound, &model)
            .ok_or_else(|| GatewayError::ModelNotFound {
                model: model.clone(),
            })?;
        let executor = self.executors.get(&target.provider).ok_or_else(|| {
            GatewayError::ExecutorNotRegistered {
                provider: target.provider.clone(),
            }
        })?;

        // Fail before any upstream work if the pair is not translatable.
        self.translators
            .lookup(inbound, executor.upstream_dialect())
            .map_err(GatewayError::from)?;

        let auth = self.select_with_refresh_retry(&target.provider, &executor).await?;

        let request = Request {
            model: target.upstream_model.unwrap_or(model),
            payload: body.clone(),
            metadata: serde_json::Map::new(),
            stream,
        };
        let opts = ExecOptions {
            source_format: inbound,
            original_request: Some(body),
        };

        if stream {
            let chunks = match executor.execute_stream(&auth, request, opts).await {
                Ok(chunks) => chunks,
                Err(err) => {
                    self.note_upstream_failure(&auth, &err).await;
                    return Err(err.into());
                }
            };
            Ok(DispatchOutcome::Stream(self.frame_stream(inbound, chunks)))
        } else {
            match executor.execute(&auth, request, opts).await {
                Ok(response) => Ok(DispatchOutcome::Body(response.payload)),
                Err(err) => {
                    self.note_upstream_failure(&auth, &err).await;
                    Err(err.into())
                }
            }
        }
    }

    /// Token counting follows the same path as dispatch but stays
    /// non-streaming; providers without a count endpoint surface 501.
    pub async fn count_tokens(
        &self,
        inbound: Dialect,
        model: Option<String>,
        body: Bytes,
    ) -> Result<Bytes, GatewayError> {
        let model = match model {
            Some(model) => model,
            None => extract_model(&body)?,
        };
        let target = self
            .router
            .resolve(inbound, &model)
            .ok_or_else(|| GatewayError::ModelNotFound {
                model: model.clone(),
            })?;
        let executor = self.executors.get(&target.provider).ok_or_else(|| {
            GatewayError::ExecutorNotRegistered {
                provider: target.provider.clone(),
            }
        })?;
        self.translators
            .lookup(inbound, executor.upstream_dialect())
            .map_err(GatewayError::from)?;
        let auth = self.select_with_refresh_retry(&target.provider, &executor).await?;

        let request = Request {
            model: target.upstream_model.unwrap_or(model),
            payload: body.clone(),
            metadata: serde_json::Map::new(),
            stream: false,
        };
        let opts = ExecOptions {
            source_format: inbound,
            original_request: Some(body),
        };
        match executor.count_tokens(&auth, request, opts).await {
            Ok(response) => Ok(response.payload),
            Err(err) => {
                self.note_upstream_failure(&auth, &err).await;
                Err(err.into())
            }
        }
    }

    /// Select a credential; on a dry pool, refresh the most recently errored
    /// credential once and retry the selection.
    async fn select_with_refresh_retry(
        &self,
        provider: &str,
        executor: &Arc<dyn mproxy_provider::ProviderExecutor>,
    ) -> Result<Auth, GatewayError> {
        match self.auth.select(provider).await {
            Ok(auth) => Ok(auth),
            Err(_) => {
                if let Some(id) = self.auth.last_errored().await
                    && let Some(candidate) = self.auth.get(&id).await
                    && candidate.provider == provider
                {
                    debug!(credential = %id, "retrying selection after refresh");
                    match executor.refresh(&candidate).await {
                        Ok(refreshed) => self.auth.apply_refresh(refreshed).await,
                        Err(err) => {
                            warn!(credential = %id, error = %err, "refresh failed");
                        }
                    }
                }
                self.auth.select(provider).await.map_err(|_| {
                    GatewayError::NoCredential {
                        provider: provider.to_string(),
                    }
                })
            }
        }
    }

    /// Update credential status from a terminal upstream error: auth
    /// failures mark it errored, quota and availability signals park it.
    async fn note_upstream_failure(&self, auth: &Auth, err: &ExecutorError) {
        let Some(code) = err.status_code() else {
            return;
        };
        match code {
            401 | 403 => {
                self.auth
                    .mark_error(&auth.id, format!("upstream auth failure ({code})"))
                    .await;
            }
            429 => {
                self.auth
                    .mark_unavailable(&auth.id, Some(Duration::from_secs(30)))
                    .await;
            }
            503 => {
                self.auth
                    .mark_unavailable(&auth.id, Some(Duration::from_secs(10)))
                    .await;
            }
            _ => {
                if let ExecutorError::Status { body, .. } = err
                    && body.contains("quota")
                {
                    self.auth
                        .mark_unavailable(&auth.id, Some(Duration::from_secs(30)))
                        .await;
                }
            }
        }
    }

    /// Frame executor chunks onto the SSE wire: immediate keep-alive
    /// comment, `data:`/`event:` frames, keep-alives during upstream
    /// silence, one terminal error frame or `[DONE]`.
    fn frame_stream(
        &self,
        inbound: Dialect,
        mut chunks: tokio::sync::mpsc::Receiver<StreamChunk>,
    ) -> tokio::sync::mpsc::Receiver<Bytes> {
        let keepalive = self.config.get().keepalive_interval();
        let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(32);
        tokio::spawn(async move {
            if tx.send(Bytes::from_static(b": keep-alive\n\n")).await.is_err() {
                return;
            }
            loop {
                let next = tokio::time::timeout(keepalive, chunks.recv()).await;
                match next {
                    Err(_) => {
                        if tx.send(Bytes::from_static(b": keep-alive\n\n")).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        let _ = tx.send(Bytes::from_static(b"data: [DONE]\n\n")).await;
                        return;
                    }
                    Ok(Some(StreamChunk::Event(event))) => {
                        if tx.send(Bytes::from(event.to_frame())).await.is_err() {
                            // Client went away; dropping `chunks` cancels the
                            // executor side.
                            return;
                        }
                    }
                    Ok(Some(StreamChunk::Error(err))) => {
                        let gateway: GatewayError = err.into();
                        let mut frame = Vec::from(&b"data: "[..]);
                        frame.extend_from_slice(&gateway.to_body(inbound));
                        frame.extend_from_slice(b"\n\n");
                        let _ = tx.send(Bytes::from(frame)).await;
                        return;
                    }
                }
            }
        });
        rx
    }

    pub async fn health_snapshot(&self) -> HealthSnapshot {
        HealthSnapshot::assemble(
            self.started_at.elapsed().as_secs(),
            self.auth.provider_counts().await,
            self.hub.snapshot().providers,
        )
    }
}

fn extract_model(body: &Bytes) -> Result<String, GatewayError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| GatewayError::Decode { len: body.len() })?;
    value
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| GatewayError::ModelNotFound {
            model: String::new(),
        })
}
