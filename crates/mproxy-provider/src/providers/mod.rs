mod bolt;
mod continue_dev;
mod cursor;
mod direct;
mod v0dev;
mod windsurf;

pub use bolt::BoltExecutor;
pub use continue_dev::ContinueExecutor;
pub use cursor::CursorExecutor;
pub use v0dev::V0Executor;
pub use windsurf::WindsurfExecutor;

use std::sync::Arc;

use mproxy_auth::Auth;

use crate::executor::ConfigProvider;
use crate::http::{Headers, header_set};
use crate::openai_compat::Shared;
use crate::registry::ExecutorRegistry;

/// Bearer-token header set for OpenAI-compatible upstreams, plus per-auth
/// custom headers from `header_`-prefixed attributes.
pub(crate) fn bearer_headers(
    token: &str,
    stream: bool,
    user_agent: Option<&str>,
    auth: &Auth,
) -> Headers {
    let mut headers = Headers::new();
    header_set(&mut headers, "Authorization", format!("Bearer {token}"));
    header_set(&mut headers, "Content-Type", "application/json");
    header_set(
        &mut headers,
        "Accept",
        if stream {
            "text/event-stream"
        } else {
            "application/json"
        },
    );
    if let Some(user_agent) = user_agent {
        header_set(&mut headers, "User-Agent", user_agent);
    }
    for (name, value) in auth.custom_headers() {
        header_set(&mut headers, name, value);
    }
    headers
}

/// Resolve the upstream model name through the provider's alias table.
pub(crate) fn resolve_upstream_model(
    config: &mproxy_common::Config,
    provider: &str,
    alias: &str,
) -> String {
    config
        .provider(provider)
        .and_then(|settings| settings.resolve_model(alias))
        .unwrap_or(alias)
        .to_string()
}

/// The full executor set wired against one client/registry/hub triple.
pub fn default_executors(shared: Shared, config: Arc<dyn ConfigProvider>) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(ContinueExecutor::new(
        shared.clone(),
        config.clone(),
    )));
    registry.register(Arc::new(CursorExecutor::new(shared.clone(), config.clone())));
    registry.register(Arc::new(WindsurfExecutor::new(
        shared.clone(),
        config.clone(),
    )));
    registry.register(Arc::new(V0Executor::new(shared.clone(), config.clone())));
    registry.register(Arc::new(BoltExecutor::new(shared, config)));
    registry
}
