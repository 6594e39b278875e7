use async_trait::async_trait;

use mproxy_common::Config;

use crate::authenticator::{Authenticator, LoginOptions};
use crate::credential::Auth;
use crate::errors::AuthError;

use super::device_client::{DeviceFlowClient, DeviceFlowEndpoints};

const ENDPOINTS: DeviceFlowEndpoints = DeviceFlowEndpoints {
    provider: "windsurf",
    client_id: "windsurf-cli-client",
    scope: "user:email",
    device_code_url: "https://proxy.codeium.com/auth/device/code",
    token_url: "https://proxy.codeium.com/auth/device/token",
    user_info_url: "https://proxy.codeium.com/auth/me",
};

pub struct WindsurfAuthenticator;

#[async_trait]
impl Authenticator for WindsurfAuthenticator {
    fn provider(&self) -> &'static str {
        "windsurf"
    }

    async fn login(&self, config: &Config, opts: &LoginOptions) -> Result<Auth, AuthError> {
        let client = DeviceFlowClient::new(config, ENDPOINTS)?;
        client.login(opts).await
    }
}
