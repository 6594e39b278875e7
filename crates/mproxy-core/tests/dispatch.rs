use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;

use mproxy_auth::{Auth, AuthManager};
use mproxy_core::engine::{DispatchEngine, DispatchOutcome};
use mproxy_core::routing::{ModelRouter, RouteTarget};
use mproxy_core::state::SwappableConfig;
use mproxy_provider::{
    ExecOptions, ExecutorError, ExecutorRegistry, ProviderExecutor, Request, Response, StreamChunk,
    UsageHub,
};
use mproxy_translator::{Dialect, SseEvent, TranslatorRegistry};

enum Behavior {
    Ok(&'static str),
    Err(ExecutorError),
    Stream(Vec<StreamChunk>),
    /// Deliver the chunks, then hold the channel open without closing it.
    StreamHold(Vec<StreamChunk>),
}

struct MockExecutor {
    identifier: &'static str,
    upstream: Dialect,
    calls: AtomicUsize,
    behaviors: std::sync::Mutex<VecDeque<Behavior>>,
}

impl MockExecutor {
    fn new(identifier: &'static str, upstream: Dialect) -> Self {
        Self {
            identifier,
            upstream,
            calls: AtomicUsize::new(0),
            behaviors: std::sync::Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, behavior: Behavior) {
        self.behaviors.lock().unwrap().push_back(behavior);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderExecutor for MockExecutor {
    fn identifier(&self) -> &'static str {
        self.identifier
    }

    fn upstream_dialect(&self) -> Dialect {
        self.upstream
    }

    async fn execute(
        &self,
        _auth: &Auth,
        _req: Request,
        _opts: ExecOptions,
    ) -> Result<Response, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviors.lock().unwrap().pop_front() {
            Some(Behavior::Ok(body)) => Ok(Response {
                payload: Bytes::from_static(body.as_bytes()),
            }),
            Some(Behavior::Err(err)) => Err(err),
            _ => panic!("unexpected execute call"),
        }
    }

    async fn execute_stream(
        &self,
        _auth: &Auth,
        _req: Request,
        _opts: ExecOptions,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamChunk>, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviors.lock().unwrap().pop_front() {
            Some(Behavior::Stream(chunks)) => {
                let (tx, rx) = tokio::sync::mpsc::channel(16);
                tokio::spawn(async move {
                    for chunk in chunks {
                        if tx.send(chunk).await.is_err() {
                            return;
                        }
                    }
                });
                Ok(rx)
            }
            Some(Behavior::StreamHold(chunks)) => {
                let (tx, rx) = tokio::sync::mpsc::channel(16);
                tokio::spawn(async move {
                    for chunk in chunks {
                        if tx.send(chunk).await.is_err() {
                            return;
                        }
                    }
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    drop(tx);
                });
                Ok(rx)
            }
            Some(Behavior::Err(err)) => Err(err),
            _ => panic!("unexpected execute_stream call"),
        }
    }

    async fn prepare_request(
        &self,
        _req: &mut mproxy_provider::UpstreamRequest,
        _auth: &Auth,
    ) -> Result<(), ExecutorError> {
        Ok(())
    }
}

struct FixedRouter {
    provider: &'static str,
}

impl ModelRouter for FixedRouter {
    fn resolve(&self, _inbound: Dialect, model: &str) -> Option<RouteTarget> {
        if model.is_empty() {
            return None;
        }
        Some(RouteTarget {
            provider: self.provider.to_string(),
            upstream_model: None,
        })
    }
}

struct Fixture {
    engine: DispatchEngine,
    executor: Arc<MockExecutor>,
    auth: Arc<AuthManager>,
}

fn fixture(provider: &'static str, upstream: Dialect) -> Fixture {
    let executor = Arc::new(MockExecutor::new(provider, upstream));
    let mut executors = ExecutorRegistry::new();
    executors.register(executor.clone());

    let auth = Arc::new(AuthManager::new(None));
    let config = SwappableConfig::new(
        mproxy_common::ConfigPatch {
            auth_dir: Some(std::path::PathBuf::from("/tmp/auths")),
            keepalive_secs: Some(60),
            ..Default::default()
        }
        .into_config()
        .unwrap(),
    );

    let engine = DispatchEngine::new(
        Arc::new(TranslatorRegistry::standard()),
        Arc::new(executors),
        auth.clone(),
        Arc::new(FixedRouter { provider }),
        Arc::new(UsageHub::new()),
        config,
    );
    Fixture {
        engine,
        executor,
        auth,
    }
}

fn cred(provider: &str, label: &str) -> Auth {
    let mut auth = Auth::new(provider, label);
    auth.set_access_token("t");
    auth
}

fn chat_body() -> Bytes {
    Bytes::from(
        json!({"model": "gpt-4", "messages": [{"role": "user", "content": "ping"}]}).to_string(),
    )
}

#[tokio::test]
async fn missing_translator_fails_before_any_upstream_call() {
    let fx = fixture("kiro-lab", Dialect::Kiro);
    fx.auth.insert(cred("kiro-lab", "a")).await;

    let err = fx
        .engine
        .dispatch(Dialect::Windsurf, None, chat_body(), false)
        .await
        .err()
        .expect("dispatch must fail");
    assert_eq!(err.status().as_u16(), 500);
    let body = String::from_utf8(err.to_body(Dialect::Windsurf).to_vec()).unwrap();
    assert!(body.contains("translator not registered for (windsurf, kiro)"));
    assert_eq!(fx.executor.calls(), 0);
}

#[tokio::test]
async fn empty_pool_returns_synthesized_503() {
    let fx = fixture("continue", Dialect::OpenAIChat);
    let err = fx
        .engine
        .dispatch(Dialect::OpenAIChat, None, chat_body(), false)
        .await
        .err()
        .expect("dispatch must fail");
    assert_eq!(err.status().as_u16(), 503);
    let body: serde_json::Value =
        serde_json::from_slice(&err.to_body(Dialect::OpenAIChat)).unwrap();
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("no usable credential")
    );
}

#[tokio::test]
async fn quota_response_parks_the_credential_and_next_select_skips_it() {
    let fx = fixture("continue", Dialect::OpenAIChat);
    fx.auth.insert(cred("continue", "a")).await;
    fx.auth.insert(cred("continue", "b")).await;

    fx.executor.push(Behavior::Err(ExecutorError::status(
        429,
        r#"{"error":"quota exceeded"}"#,
    )));
    let err = fx
        .engine
        .dispatch(Dialect::OpenAIChat, None, chat_body(), false)
        .await
        .err()
        .expect("first dispatch fails");
    assert_eq!(err.status().as_u16(), 429);

    // The parked credential is skipped; the other one serves the request.
    let parked = fx.auth.get("continue-a.json").await.unwrap();
    assert!(parked.unavailable);
    let next = fx.auth.select("continue").await.unwrap();
    assert_eq!(next.id, "continue-b.json");
}

#[tokio::test]
async fn count_tokens_without_provider_support_maps_to_501() {
    let fx = fixture("continue", Dialect::OpenAIChat);
    fx.auth.insert(cred("continue", "a")).await;
    let err = fx
        .engine
        .count_tokens(Dialect::OpenAIChat, None, chat_body())
        .await
        .unwrap_err();
    assert_eq!(err.status().as_u16(), 501);
}

#[tokio::test]
async fn auth_failure_marks_the_credential_errored() {
    let fx = fixture("continue", Dialect::OpenAIChat);
    fx.auth.insert(cred("continue", "a")).await;
    fx.executor
        .push(Behavior::Err(ExecutorError::status(401, "bad token")));

    let _ = fx
        .engine
        .dispatch(Dialect::OpenAIChat, None, chat_body(), false)
        .await;
    let marked = fx.auth.get("continue-a.json").await.unwrap();
    assert!(!marked.status.is_active());
}

#[tokio::test]
async fn errored_credential_is_refreshed_and_retried_once() {
    let fx = fixture("continue", Dialect::OpenAIChat);
    fx.auth.insert(cred("continue", "a")).await;
    fx.auth.mark_error("continue-a.json", "boom").await;

    fx.executor.push(Behavior::Ok(r#"{"id":"c","choices":[]}"#));
    let outcome = fx
        .engine
        .dispatch(Dialect::OpenAIChat, None, chat_body(), false)
        .await
        .expect("refresh retry should recover");
    match outcome {
        DispatchOutcome::Body(body) => {
            assert_eq!(body, Bytes::from_static(br#"{"id":"c","choices":[]}"#));
        }
        DispatchOutcome::Stream(_) => panic!("expected body"),
    }
    let restored = fx.auth.get("continue-a.json").await.unwrap();
    assert!(restored.status.is_active());
}

#[tokio::test]
async fn stream_is_framed_with_keepalive_and_done() {
    let fx = fixture("continue", Dialect::OpenAIChat);
    fx.auth.insert(cred("continue", "a")).await;
    fx.executor.push(Behavior::Stream(vec![
        StreamChunk::Event(SseEvent::data(r#"{"id":"c","choices":[]}"#)),
        StreamChunk::Event(SseEvent::named("message_stop", r#"{"type":"message_stop"}"#)),
    ]));

    let outcome = fx
        .engine
        .dispatch(Dialect::OpenAIChat, None, chat_body(), true)
        .await
        .unwrap();
    let DispatchOutcome::Stream(mut rx) = outcome else {
        panic!("expected stream");
    };

    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(String::from_utf8(frame.to_vec()).unwrap());
    }
    assert_eq!(frames[0], ": keep-alive\n\n");
    assert_eq!(frames[1], "data: {\"id\":\"c\",\"choices\":[]}\n\n");
    assert_eq!(
        frames[2],
        "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n"
    );
    assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");
}

#[tokio::test]
async fn empty_upstream_still_frames_initial_comment_and_done() {
    let fx = fixture("continue", Dialect::OpenAIChat);
    fx.auth.insert(cred("continue", "a")).await;

    fx.executor.push(Behavior::Stream(Vec::new()));
    let outcome = fx
        .engine
        .dispatch(Dialect::OpenAIChat, None, chat_body(), true)
        .await
        .unwrap();
    let DispatchOutcome::Stream(mut rx) = outcome else {
        panic!("expected stream");
    };

    // Initial comment arrives immediately; the empty upstream closes and the
    // terminal marker follows.
    let first = rx.recv().await.unwrap();
    assert_eq!(first, Bytes::from_static(b": keep-alive\n\n"));
    let last = rx.recv().await.unwrap();
    assert_eq!(last, Bytes::from_static(b"data: [DONE]\n\n"));
}

#[tokio::test(start_paused = true)]
async fn silent_upstream_gets_periodic_keepalive_comments() {
    let fx = fixture("continue", Dialect::OpenAIChat);
    fx.auth.insert(cred("continue", "a")).await;
    fx.executor.push(Behavior::StreamHold(vec![StreamChunk::Event(
        SseEvent::data(r#"{"id":"c","choices":[]}"#),
    )]));

    let outcome = fx
        .engine
        .dispatch(Dialect::OpenAIChat, None, chat_body(), true)
        .await
        .unwrap();
    let DispatchOutcome::Stream(mut rx) = outcome else {
        panic!("expected stream");
    };

    assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b": keep-alive\n\n"));
    assert!(
        String::from_utf8(rx.recv().await.unwrap().to_vec())
            .unwrap()
            .starts_with("data: {")
    );
    // Upstream now goes quiet; the configured 60s silence window elapses and
    // a comment keeps the connection warm.
    let comment = rx.recv().await.unwrap();
    assert_eq!(comment, Bytes::from_static(b": keep-alive\n\n"));
}

#[tokio::test]
async fn stream_error_emits_single_terminal_error_frame() {
    let fx = fixture("continue", Dialect::OpenAIChat);
    fx.auth.insert(cred("continue", "a")).await;
    fx.executor.push(Behavior::Stream(vec![
        StreamChunk::Event(SseEvent::data(r#"{"id":"c","choices":[]}"#)),
        StreamChunk::Error(ExecutorError::Scanner("line too long".to_string())),
    ]));

    let outcome = fx
        .engine
        .dispatch(Dialect::OpenAIChat, None, chat_body(), true)
        .await
        .unwrap();
    let DispatchOutcome::Stream(mut rx) = outcome else {
        panic!("expected stream");
    };

    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(String::from_utf8(frame.to_vec()).unwrap());
    }
    let last = frames.last().unwrap();
    assert!(last.starts_with("data: {"));
    assert!(last.contains("line too long"));
    assert!(!frames.iter().any(|frame| frame.contains("[DONE]")));
}
