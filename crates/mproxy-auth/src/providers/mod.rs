mod continue_dev;
mod cursor;
mod device_client;
mod windsurf;

pub use continue_dev::{ApiToken, ContinueAuthenticator, fetch_continue_api_token};
pub use cursor::CursorAuthenticator;
pub use device_client::{DeviceFlowClient, DeviceFlowEndpoints};
pub use windsurf::WindsurfAuthenticator;

use std::sync::Arc;

use crate::authenticator::AuthenticatorSet;

pub fn default_authenticators() -> AuthenticatorSet {
    let mut set = AuthenticatorSet::new();
    set.register(Arc::new(ContinueAuthenticator));
    set.register(Arc::new(CursorAuthenticator));
    set.register(Arc::new(WindsurfAuthenticator));
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_covers_the_device_flow_providers() {
        let set = default_authenticators();
        assert_eq!(set.providers(), ["continue", "cursor", "windsurf"]);
        for provider in set.providers() {
            let authenticator = set.get(provider).unwrap();
            assert_eq!(authenticator.provider(), provider);
            assert!(authenticator.refresh_lead().is_none());
        }
    }
}
