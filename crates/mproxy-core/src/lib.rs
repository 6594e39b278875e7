//! Dispatch pipeline: credential selection, translation around the executor,
//! SSE framing, and the health surface.

pub mod engine;
pub mod error;
pub mod health;
pub mod routing;
pub mod state;

pub use engine::{DispatchEngine, DispatchOutcome};
pub use error::GatewayError;
pub use health::HealthSnapshot;
pub use routing::{ModelRouter, RouteTarget, StaticModelRouter};
pub use state::{AppState, SwappableConfig};
