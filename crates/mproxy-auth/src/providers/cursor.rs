use async_trait::async_trait;

use mproxy_common::Config;

use crate::authenticator::{Authenticator, LoginOptions};
use crate::credential::Auth;
use crate::errors::AuthError;

use super::device_client::{DeviceFlowClient, DeviceFlowEndpoints};

const ENDPOINTS: DeviceFlowEndpoints = DeviceFlowEndpoints {
    provider: "cursor",
    client_id: "cursor-cli-client",
    scope: "user:email",
    device_code_url: "https://api.cursor.sh/auth/device/code",
    token_url: "https://api.cursor.sh/auth/device/token",
    user_info_url: "https://api.cursor.sh/auth/me",
};

pub struct CursorAuthenticator;

#[async_trait]
impl Authenticator for CursorAuthenticator {
    fn provider(&self) -> &'static str {
        "cursor"
    }

    async fn login(&self, config: &Config, opts: &LoginOptions) -> Result<Auth, AuthError> {
        let client = DeviceFlowClient::new(config, ENDPOINTS)?;
        client.login(opts).await
    }
}
