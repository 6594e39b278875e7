use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};

use mproxy_auth::{AuthManager, BrowserOpener, Displayer, FileStore, LoginOptions};
use mproxy_common::{Config, ConfigPatch};
use mproxy_core::{AppState, DispatchEngine, StaticModelRouter, SwappableConfig};
use mproxy_provider::openai_compat::Shared;
use mproxy_provider::providers::default_executors;
use mproxy_provider::{UpstreamClientConfig, UsageHub, WreqUpstreamClient};
use mproxy_translator::TranslatorRegistry;

mod cli;

use cli::{Cli, Command};

const KNOWN_PROVIDERS: &[&str] = &["continue", "cursor", "windsurf", "bolt", "v0dev"];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();
    let config = merge_config(&args)?;

    match args.command {
        Some(Command::Login {
            provider,
            no_browser,
        }) => login(config, &provider, no_browser).await,
        _ => serve(config).await,
    }
}

fn merge_config(args: &Cli) -> Result<Config> {
    let mut patch = ConfigPatch {
        auth_dir: Some(default_auth_dir()),
        ..Default::default()
    };

    if let Some(path) = &args.config {
        let raw = std::fs::read(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let file_patch: ConfigPatch = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        patch.overlay(file_patch);
    }

    patch.overlay(ConfigPatch {
        host: std::env::var("MPROXY_HOST").ok(),
        port: std::env::var("MPROXY_PORT").ok().and_then(|v| v.parse().ok()),
        auth_dir: std::env::var("MPROXY_AUTH_DIR").ok().map(PathBuf::from),
        proxy: std::env::var("MPROXY_PROXY").ok(),
        ..Default::default()
    });
    patch.overlay(ConfigPatch {
        host: args.host.clone(),
        port: args.port,
        auth_dir: args.auth_dir.clone(),
        proxy: args.proxy.clone(),
        ..Default::default()
    });

    Ok(patch.into_config()?)
}

fn default_auth_dir() -> PathBuf {
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".mproxy").join("auths"))
        .unwrap_or_else(|_| PathBuf::from("./auths"))
}

async fn serve(config: Config) -> Result<()> {
    let bind = format!("{}:{}", config.host, config.port);
    let store = FileStore::new(config.auth_dir.clone());

    let swap = SwappableConfig::new(config.clone());
    let router = Arc::new(StaticModelRouter::from_config(&config));

    let auth = Arc::new(AuthManager::new(Some(store.clone())));
    auth.load(store.list(KNOWN_PROVIDERS)?).await;
    let loaded = auth.list().await.len();
    info!(credentials = loaded, dir = %config.auth_dir.display(), "credential store loaded");

    let swap_for_proxy = swap.clone();
    let client = WreqUpstreamClient::new_with_proxy_resolver(
        UpstreamClientConfig {
            proxy: config.proxy.clone(),
            request_timeout: config.request_timeout(),
            ..Default::default()
        },
        move || swap_for_proxy.0.load().proxy.clone(),
    )
    .map_err(|err| anyhow::anyhow!("building upstream client: {err}"))?;

    let hub = Arc::new(UsageHub::new());
    let shared = Shared {
        client: Arc::new(client),
        registry: Arc::new(TranslatorRegistry::standard()),
        hub: hub.clone(),
    };
    let executors = Arc::new(default_executors(shared.clone(), swap.clone()));

    let engine = Arc::new(DispatchEngine::new(
        shared.registry.clone(),
        executors,
        auth,
        router,
        hub,
        swap.clone(),
    ));

    let app = mproxy_router::proxy_router(AppState {
        config: swap,
        engine,
    });

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(%bind, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn login(config: Config, provider: &str, no_browser: bool) -> Result<()> {
    let authenticators = mproxy_auth::providers::default_authenticators();
    let Some(authenticator) = authenticators.get(provider) else {
        bail!("no device-flow login for provider {provider}");
    };

    let opts = LoginOptions {
        no_browser,
        browser: Arc::new(SystemBrowser),
        display: Arc::new(TerminalDisplay),
    };

    println!("Starting {provider} authentication...");
    let auth = match authenticator.login(&config, &opts).await {
        Ok(auth) => auth,
        Err(err) => bail!("{provider}: {}", err.user_message()),
    };

    let store = FileStore::new(config.auth_dir.clone());
    let path = store.save(&auth)?;
    println!(
        "\n{provider} authentication successful for user: {}",
        auth.label
    );
    println!("Credential saved to {}", path.display());
    Ok(())
}

struct TerminalDisplay;

impl Displayer for TerminalDisplay {
    fn show(&self, verification_uri: &str, user_code: &str, expires_in: u64) {
        println!("\nTo authenticate, please visit: {verification_uri}");
        println!("And enter the code: {user_code}\n");
        println!("Waiting for authorization...");
        println!("(This will timeout in {expires_in} seconds if not authorized)");
    }
}

struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), String> {
        #[cfg(target_os = "macos")]
        let program = "open";
        #[cfg(not(target_os = "macos"))]
        let program = "xdg-open";

        match std::process::Command::new(program).arg(url).spawn() {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(error = %err, "could not launch browser");
                Err(err.to_string())
            }
        }
    }
}
