use std::sync::Arc;

use arc_swap::ArcSwap;

use mproxy_common::Config;
use mproxy_provider::ConfigProvider;

use crate::engine::DispatchEngine;

/// Hot-swappable config view shared with executors.
pub struct SwappableConfig(pub ArcSwap<Config>);

impl SwappableConfig {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self(ArcSwap::from_pointee(config)))
    }

    pub fn store(&self, config: Config) {
        self.0.store(Arc::new(config));
    }
}

impl ConfigProvider for SwappableConfig {
    fn get(&self) -> Arc<Config> {
        self.0.load_full()
    }
}

/// Everything the HTTP layer needs per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SwappableConfig>,
    pub engine: Arc<DispatchEngine>,
}
