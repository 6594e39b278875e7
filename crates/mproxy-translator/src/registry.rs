use std::collections::HashMap;

use crate::count_tokens;
use crate::dialect::{Dialect, Family};
use crate::generate;
use crate::sse::{SseEvent, SseLineKind, classify_line};
use crate::state::StreamState;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    #[error("translator not registered for ({from}, {to})")]
    NotRegistered { from: Dialect, to: Dialect },
    /// The body length is reported instead of its content so payloads never
    /// leak into error strings.
    #[error("translator failed to decode body ({len} bytes)")]
    Decode { len: usize },
}

impl TranslateError {
    pub fn decode(body: &[u8]) -> Self {
        TranslateError::Decode { len: body.len() }
    }
}

/// Request- and response-side context shared with response translators.
///
/// `original_request` is the untouched client payload; `translated_request`
/// is what was actually sent upstream. Translators use them to recover
/// client-side shape (model echo, stream options) without re-parsing state.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslateContext<'a> {
    pub original_request: Option<&'a [u8]>,
    pub translated_request: Option<&'a [u8]>,
}

pub type RequestFn =
    Box<dyn Fn(&str, &[u8], bool) -> Result<Vec<u8>, TranslateError> + Send + Sync>;
pub type NonStreamFn = Box<
    dyn Fn(&TranslateContext<'_>, &str, &[u8], &mut StreamState) -> Result<String, TranslateError>
        + Send
        + Sync,
>;
pub type StreamFn =
    Box<dyn Fn(&TranslateContext<'_>, &str, &str, &mut StreamState) -> Vec<SseEvent> + Send + Sync>;
pub type TokenCountFn = Box<dyn Fn(i64) -> String + Send + Sync>;

/// The four transcoders registered for one `(from, to)` dialect pair.
///
/// `request` translates from→to; `non_stream`/`stream` translate upstream
/// payloads to→from; `token_count` renders a count in the `from` dialect.
pub struct Translator {
    pub request: RequestFn,
    pub non_stream: NonStreamFn,
    pub stream: StreamFn,
    pub token_count: TokenCountFn,
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator").finish_non_exhaustive()
    }
}

/// Write-once matrix of dialect transcoders.
///
/// Built at process start; lookups after that are lock-free reads.
#[derive(Default)]
pub struct TranslatorRegistry {
    entries: HashMap<(Dialect, Dialect), Translator>,
}

impl TranslatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pair. Registering the same `(from, to)` twice is a wiring
    /// bug, not a runtime condition.
    pub fn register(&mut self, from: Dialect, to: Dialect, translator: Translator) {
        let previous = self.entries.insert((from, to), translator);
        assert!(
            previous.is_none(),
            "translator already registered for ({from}, {to})"
        );
    }

    pub fn lookup(&self, from: Dialect, to: Dialect) -> Result<&Translator, TranslateError> {
        self.entries
            .get(&(from, to))
            .ok_or(TranslateError::NotRegistered { from, to })
    }

    pub fn contains(&self, from: Dialect, to: Dialect) -> bool {
        self.entries.contains_key(&(from, to))
    }

    /// The full matrix used by the dispatch plane: identity entries for every
    /// same-family pair, and family translations toward the two upstream
    /// dialects the executors speak (`openai_chat` and `claude`).
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for from in Dialect::ALL {
            for to in Dialect::ALL {
                if from.family() == to.family() {
                    registry.register(from, to, identity_translator(from));
                    continue;
                }
                if matches!(to, Dialect::OpenAIChat | Dialect::Claude)
                    && let Some(translator) = family_translator(from.family(), to.family())
                {
                    registry.register(from, to, translator);
                }
            }
        }
        registry
    }
}

fn family_translator(from: Family, to: Family) -> Option<Translator> {
    match (from, to) {
        (Family::Claude, Family::OpenAIChat) => Some(Translator {
            request: Box::new(generate::claude2openai_chat::request::transform_request),
            non_stream: Box::new(|ctx, model, body, _state| {
                generate::openai_chat2claude::response::transform_response(ctx, model, body)
            }),
            stream: Box::new(generate::openai_chat2claude::stream::transform_stream),
            token_count: Box::new(count_tokens::claude_token_count),
        }),
        (Family::OpenAIChat, Family::Claude) => Some(Translator {
            request: Box::new(generate::openai_chat2claude::request::transform_request),
            non_stream: Box::new(|ctx, model, body, _state| {
                generate::claude2openai_chat::response::transform_response(ctx, model, body)
            }),
            stream: Box::new(generate::claude2openai_chat::stream::transform_stream),
            token_count: Box::new(count_tokens::openai_token_count),
        }),
        (Family::Gemini, Family::OpenAIChat) => Some(Translator {
            request: Box::new(generate::gemini2openai_chat::request::transform_request),
            non_stream: Box::new(|ctx, model, body, _state| {
                generate::openai_chat2gemini::response::transform_response(ctx, model, body)
            }),
            stream: Box::new(generate::openai_chat2gemini::stream::transform_stream),
            token_count: Box::new(count_tokens::gemini_token_count),
        }),
        (Family::OpenAIResponses, Family::OpenAIChat) => Some(Translator {
            request: Box::new(generate::openai_responses2openai_chat::request::transform_request),
            non_stream: Box::new(|ctx, model, body, _state| {
                generate::openai_chat2openai_responses::response::transform_response(
                    ctx, model, body,
                )
            }),
            stream: Box::new(generate::openai_chat2openai_responses::stream::transform_stream),
            token_count: Box::new(count_tokens::openai_responses_token_count),
        }),
        // Pairs without a direct implementation pivot through openai_chat,
        // the same way the original's vendor translators delegate to the
        // core OpenAI translators.
        (Family::Gemini, Family::Claude) => Some(pivoted(
            family_translator(Family::Gemini, Family::OpenAIChat)?,
            family_translator(Family::OpenAIChat, Family::Claude)?,
        )),
        (Family::OpenAIResponses, Family::Claude) => Some(pivoted(
            family_translator(Family::OpenAIResponses, Family::OpenAIChat)?,
            family_translator(Family::OpenAIChat, Family::Claude)?,
        )),
        _ => None,
    }
}

/// Compose `from→pivot` and `pivot→to` translators into a `from→to` entry.
///
/// Requests run the two request legs back to back. Responses run the second
/// leg first (upstream→pivot), then re-frame each produced event as SSE lines
/// for the first leg (pivot→client).
fn pivoted(first: Translator, second: Translator) -> Translator {
    #[derive(Default)]
    struct PivotState {
        inner: StreamState,
        outer: StreamState,
    }

    let request_first = first.request;
    let request_second = second.request;
    let non_stream_first = first.non_stream;
    let non_stream_second = second.non_stream;
    let stream_first = first.stream;
    let stream_second = second.stream;
    let token_count = first.token_count;

    Translator {
        request: Box::new(move |model, body, stream| {
            let pivot = request_first(model, body, stream)?;
            request_second(model, &pivot, stream)
        }),
        non_stream: Box::new(move |ctx, model, body, state| {
            let state = state.get_or_insert_with(PivotState::default);
            let pivot = non_stream_second(ctx, model, body, &mut state.inner)?;
            non_stream_first(ctx, model, pivot.as_bytes(), &mut state.outer)
        }),
        stream: Box::new(move |ctx, model, line, state| {
            let state = state.get_or_insert_with(PivotState::default);
            let mut out = Vec::new();
            for event in stream_second(ctx, model, line, &mut state.inner) {
                if let Some(name) = &event.event {
                    out.extend(stream_first(
                        ctx,
                        model,
                        &format!("event: {name}"),
                        &mut state.outer,
                    ));
                }
                out.extend(stream_first(
                    ctx,
                    model,
                    &format!("data: {}", event.data),
                    &mut state.outer,
                ));
                out.extend(stream_first(ctx, model, "", &mut state.outer));
            }
            out
        }),
        token_count,
    }
}

/// Identity entry: requests pass through untouched and responses are
/// re-emitted as-is. Still registered explicitly so the pipeline can always
/// look a pair up.
fn identity_translator(dialect: Dialect) -> Translator {
    #[derive(Default)]
    struct IdentityStream {
        pending_event: Option<String>,
    }

    let token_count: TokenCountFn = match dialect.family() {
        Family::Claude => Box::new(count_tokens::claude_token_count),
        Family::Gemini => Box::new(count_tokens::gemini_token_count),
        Family::OpenAIResponses => Box::new(count_tokens::openai_responses_token_count),
        Family::OpenAIChat => Box::new(count_tokens::openai_token_count),
    };

    Translator {
        request: Box::new(|_model, body, _stream| Ok(body.to_vec())),
        non_stream: Box::new(|_ctx, _model, body, _state| {
            std::str::from_utf8(body)
                .map(str::to_owned)
                .map_err(|_| TranslateError::decode(body))
        }),
        stream: Box::new(|_ctx, _model, line, state| {
            let state = state.get_or_insert_with(IdentityStream::default);
            match classify_line(line) {
                SseLineKind::Event(name) => {
                    state.pending_event = Some(name.to_string());
                    Vec::new()
                }
                SseLineKind::Data(payload) => {
                    if payload == "[DONE]" {
                        // The pipeline writes its own terminal marker.
                        state.pending_event = None;
                        return Vec::new();
                    }
                    vec![SseEvent {
                        event: state.pending_event.take(),
                        data: payload.to_string(),
                    }]
                }
                SseLineKind::Blank => {
                    state.pending_event = None;
                    Vec::new()
                }
                SseLineKind::Other => Vec::new(),
            }
        }),
        token_count,
    }
}
