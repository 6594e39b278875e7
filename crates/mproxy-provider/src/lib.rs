//! Provider executors: per-provider upstream HTTP calls, credential header
//! injection, streaming parse, and usage extraction.

pub mod executor;
pub mod http;
pub mod openai_compat;
pub mod providers;
pub mod registry;
pub mod scanner;
pub mod token_cache;
pub mod usage;

pub use executor::{
    ConfigProvider, ExecOptions, ExecutorError, ProviderExecutor, Request, Response, StreamChunk,
};
pub use http::{
    Headers, HttpMethod, TransportErrorKind, UpstreamBody, UpstreamClient, UpstreamClientConfig,
    UpstreamRequest, UpstreamResponse, WreqUpstreamClient, header_get, header_set,
};
pub use registry::ExecutorRegistry;
pub use token_cache::TokenCache;
pub use usage::{Usage, UsageHub, UsageReporter, UsageSnapshot};
