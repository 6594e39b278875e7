//! HTTP surface for the four client dialects plus the health endpoint.
//! Thin by design: route parsing and response framing only, the engine does
//! the work.

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use http::{StatusCode, header};
use serde_json::Value;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use mproxy_core::engine::DispatchOutcome;
use mproxy_core::{AppState, GatewayError};
use mproxy_translator::Dialect;

pub fn proxy_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/responses", post(responses))
        .route("/v1/messages", post(messages))
        .route("/v1/messages/count_tokens", post(count_tokens))
        .route("/v1beta/models/{model_action}", post(gemini_generate))
        .route("/health", get(health))
        .with_state(state)
}

async fn chat_completions(State(state): State<AppState>, body: Bytes) -> Response {
    dispatch_body_dialect(state, Dialect::OpenAIChat, body).await
}

async fn responses(State(state): State<AppState>, body: Bytes) -> Response {
    dispatch_body_dialect(state, Dialect::OpenAIResponses, body).await
}

async fn messages(State(state): State<AppState>, body: Bytes) -> Response {
    dispatch_body_dialect(state, Dialect::Claude, body).await
}

async fn count_tokens(State(state): State<AppState>, body: Bytes) -> Response {
    match state
        .engine
        .count_tokens(Dialect::Claude, None, body)
        .await
    {
        Ok(payload) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            payload,
        )
            .into_response(),
        Err(err) => err.into_dialect_response(Dialect::Claude),
    }
}

/// Gemini routes carry `{model}:{action}` in the path; the action selects
/// streaming.
async fn gemini_generate(
    State(state): State<AppState>,
    Path(model_action): Path<String>,
    body: Bytes,
) -> Response {
    let Some((model, action)) = model_action.split_once(':') else {
        return GatewayError::ModelNotFound {
            model: model_action,
        }
        .into_dialect_response(Dialect::Gemini);
    };
    let stream = match action {
        "generateContent" => false,
        "streamGenerateContent" => true,
        _ => {
            return GatewayError::ModelNotFound {
                model: model_action.clone(),
            }
            .into_dialect_response(Dialect::Gemini);
        }
    };
    respond(
        state
            .engine
            .dispatch(Dialect::Gemini, Some(model.to_string()), body, stream)
            .await,
        Dialect::Gemini,
    )
}

async fn health(State(state): State<AppState>) -> Response {
    let snapshot = state.engine.health_snapshot().await;
    let body = serde_json::to_vec(&snapshot).unwrap_or_default();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

async fn dispatch_body_dialect(state: AppState, dialect: Dialect, body: Bytes) -> Response {
    let stream = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|value| value.get("stream").and_then(Value::as_bool))
        .unwrap_or(false);
    respond(
        state.engine.dispatch(dialect, None, body, stream).await,
        dialect,
    )
}

fn respond(outcome: Result<DispatchOutcome, GatewayError>, dialect: Dialect) -> Response {
    match outcome {
        Ok(DispatchOutcome::Body(payload)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            payload,
        )
            .into_response(),
        Ok(DispatchOutcome::Stream(rx)) => {
            let stream = ReceiverStream::new(rx).map(Ok::<Bytes, std::convert::Infallible>);
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache")
                .header("X-Accel-Buffering", "no")
                .body(Body::from_stream(stream))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(err) => err.into_dialect_response(dialect),
    }
}

trait IntoDialectResponse {
    fn into_dialect_response(self, dialect: Dialect) -> Response;
}

impl IntoDialectResponse for GatewayError {
    fn into_dialect_response(self, dialect: Dialect) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "application/json")],
            self.to_body(dialect),
        )
            .into_response()
    }
}
