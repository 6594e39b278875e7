use std::sync::Arc;

use async_trait::async_trait;

use mproxy_auth::Auth;
use mproxy_translator::Dialect;

use crate::executor::{
    ConfigProvider, ExecOptions, ExecutorError, ProviderExecutor, Request, Response, StreamChunk,
};
use crate::http::UpstreamRequest;
use crate::openai_compat::Shared;

use super::direct::{DirectCore, DirectParams};

const PARAMS: DirectParams = DirectParams {
    identifier: "cursor",
    default_base_url: "https://api.cursor.sh",
    chat_path: "/v1/chat/completions",
    user_agent: "Cursor-CLI/1.0",
};

pub struct CursorExecutor {
    core: DirectCore,
}

impl CursorExecutor {
    pub fn new(shared: Shared, config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            core: DirectCore::new(PARAMS, shared, config),
        }
    }
}

#[async_trait]
impl ProviderExecutor for CursorExecutor {
    fn identifier(&self) -> &'static str {
        PARAMS.identifier
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
        self.core.execute(auth, req, opts).await
    }

    async fn execute_stream(
        &self,
        auth: &Auth,
        req: Request,
        opts: ExecOptions,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamChunk>, ExecutorError> {
        self.core.execute_stream(auth, req, opts).await
    }

    async fn refresh(&self, auth: &Auth) -> Result<Auth, ExecutorError> {
        self.core.refresh(auth).await
    }

    async fn prepare_request(
        &self,
        req: &mut UpstreamRequest,
        auth: &Auth,
    ) -> Result<(), ExecutorError> {
        self.core.prepare_request(req, auth).await
    }
}
