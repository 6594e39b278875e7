//! Wire-dialect translation for the dispatch plane.
//!
//! The registry maps `(inbound, upstream)` dialect pairs to four transcoders:
//! request, non-streaming response, streaming response, and token count.
//! Payloads are opaque JSON bytes; this crate is the only place allowed to
//! parse them.

pub mod count_tokens;
pub mod dialect;
pub mod generate;
pub mod registry;
pub mod sse;
pub mod state;

pub use dialect::{Dialect, Family};
pub use registry::{TranslateContext, TranslateError, Translator, TranslatorRegistry};
pub use sse::{SseEvent, SseLineKind, classify_line};
pub use state::StreamState;
