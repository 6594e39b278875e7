use std::collections::BTreeMap;

use serde::Serialize;

use mproxy_auth::manager::ProviderCounts;
use mproxy_provider::usage::ProviderUsage;

#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub name: String,
    #[serde(flatten)]
    pub credentials: ProviderCounts,
    #[serde(flatten)]
    pub requests: ProviderUsage,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub providers: Vec<ProviderHealth>,
    pub uptime_secs: u64,
}

impl HealthSnapshot {
    pub fn assemble(
        uptime_secs: u64,
        counts: std::collections::HashMap<String, ProviderCounts>,
        usage: std::collections::HashMap<String, ProviderUsage>,
    ) -> Self {
        let mut merged: BTreeMap<String, ProviderHealth> = BTreeMap::new();
        for (name, credentials) in counts {
            merged.insert(
                name.clone(),
                ProviderHealth {
                    name,
                    credentials,
                    requests: ProviderUsage::default(),
                },
            );
        }
        for (name, requests) in usage {
            merged
                .entry(name.clone())
                .or_insert_with(|| ProviderHealth {
                    name,
                    credentials: ProviderCounts::default(),
                    requests: ProviderUsage::default(),
                })
                .requests = requests;
        }
        Self {
            providers: merged.into_values().collect(),
            uptime_secs,
        }
    }
}
