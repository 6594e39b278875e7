use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use mproxy_common::Config;

use crate::credential::Auth;
use crate::errors::AuthError;

/// Opens the verification URL in a browser. Best effort; failures are
/// reported but never abort a login.
pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), String>;
}

/// Presents the device-flow prompt to the operator.
pub trait Displayer: Send + Sync {
    fn show(&self, verification_uri: &str, user_code: &str, expires_in: u64);
}

#[derive(Clone)]
pub struct LoginOptions {
    pub no_browser: bool,
    pub browser: Arc<dyn BrowserOpener>,
    pub display: Arc<dyn Displayer>,
}

/// Per-provider login flow producing a credential bundle.
#[async_trait]
pub trait Authenticator: Send + Sync {
    fn provider(&self) -> &'static str;

    /// How far ahead of expiry to pre-refresh; `None` means never.
    fn refresh_lead(&self) -> Option<Duration> {
        None
    }

    async fn login(&self, config: &Config, opts: &LoginOptions) -> Result<Auth, AuthError>;
}

/// Registry of login flows, keyed by provider identifier.
#[derive(Default)]
pub struct AuthenticatorSet {
    authenticators: std::collections::HashMap<&'static str, Arc<dyn Authenticator>>,
}

impl AuthenticatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, authenticator: Arc<dyn Authenticator>) {
        self.authenticators
            .insert(authenticator.provider(), authenticator);
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn Authenticator>> {
        self.authenticators.get(provider).cloned()
    }

    pub fn providers(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.authenticators.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// No-op collaborators for headless use and tests.
pub struct NullBrowser;

impl BrowserOpener for NullBrowser {
    fn open(&self, _url: &str) -> Result<(), String> {
        Ok(())
    }
}

pub struct NullDisplay;

impl Displayer for NullDisplay {
    fn show(&self, _verification_uri: &str, _user_code: &str, _expires_in: u64) {}
}

impl LoginOptions {
    pub fn headless() -> Self {
        Self {
            no_browser: true,
            browser: Arc::new(NullBrowser),
            display: Arc::new(NullDisplay),
        }
    }
}
