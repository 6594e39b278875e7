use mproxy_common::Config;
use mproxy_translator::Dialect;

/// Where a `(inbound dialect, model name)` pair should be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub provider: String,
    /// Upstream model name when the client used an alias.
    pub upstream_model: Option<String>,
}

pub trait ModelRouter: Send + Sync {
    fn resolve(&self, inbound: Dialect, model: &str) -> Option<RouteTarget>;
}

/// Table-driven router built from the per-provider model tables in config.
/// Selection is deterministic: providers are scanned in name order and the
/// first alias or name match wins.
#[derive(Debug, Default)]
pub struct StaticModelRouter {
    routes: Vec<(String, String, Option<String>)>,
}

impl StaticModelRouter {
    pub fn from_config(config: &Config) -> Self {
        let mut routes = Vec::new();
        for (provider, settings) in &config.providers {
            for mapping in &settings.models {
                if let Some(alias) = &mapping.alias {
                    routes.push((
                        alias.to_ascii_lowercase(),
                        provider.clone(),
                        Some(mapping.name.clone()),
                    ));
                }
                routes.push((mapping.name.to_ascii_lowercase(), provider.clone(), None));
            }
        }
        Self { routes }
    }
}

impl ModelRouter for StaticModelRouter {
    fn resolve(&self, _inbound: Dialect, model: &str) -> Option<RouteTarget> {
        let wanted = model.trim().to_ascii_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.routes
            .iter()
            .find(|(name, _, _)| *name == wanted)
            .map(|(_, provider, upstream)| RouteTarget {
                provider: provider.clone(),
                upstream_model: upstream.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mproxy_common::{ConfigPatch, ModelMapping, ProviderSettings};

    fn config() -> Config {
        let settings = ProviderSettings {
            models: vec![ModelMapping {
                name: "gpt-4".to_string(),
                alias: Some("fast".to_string()),
            }],
            ..Default::default()
        };
        ConfigPatch {
            auth_dir: Some(std::path::PathBuf::from("/tmp")),
            providers: Some([("cursor".to_string(), settings)].into()),
            ..Default::default()
        }
        .into_config()
        .unwrap()
    }

    #[test]
    fn alias_resolves_to_provider_and_upstream_name() {
        let router = StaticModelRouter::from_config(&config());
        let target = router.resolve(Dialect::OpenAIChat, "FAST").unwrap();
        assert_eq!(target.provider, "cursor");
        assert_eq!(target.upstream_model.as_deref(), Some("gpt-4"));

        let direct = router.resolve(Dialect::OpenAIChat, "gpt-4").unwrap();
        assert_eq!(direct.upstream_model, None);

        assert!(router.resolve(Dialect::OpenAIChat, "unknown").is_none());
    }
}
