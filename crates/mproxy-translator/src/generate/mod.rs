//! Pair translators, one module per `src2dst` direction. Requests, responses
//! and streams inside a module all translate src→dst; the registry wires the
//! request leg of one module with the response legs of the opposite one.

pub mod claude2openai_chat;
pub mod gemini2openai_chat;
pub mod openai_chat2claude;
pub mod openai_chat2gemini;
pub mod openai_chat2openai_responses;
pub mod openai_responses2openai_chat;

pub(crate) mod util;
