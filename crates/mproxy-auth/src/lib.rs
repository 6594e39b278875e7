//! Credential records, durable storage, device-flow login, and the runtime
//! credential registry.

pub mod authenticator;
pub mod credential;
pub mod device_flow;
pub mod errors;
pub mod manager;
pub mod providers;
pub mod store;

pub use authenticator::{
    Authenticator, AuthenticatorSet, BrowserOpener, Displayer, LoginOptions,
};
pub use credential::{Auth, AuthStatus};
pub use device_flow::{DeviceCode, PollOutcome, TokenData, poll_for_token};
pub use errors::AuthError;
pub use manager::{AuthManager, SelectError};
pub use store::{FileStore, StoreError};
