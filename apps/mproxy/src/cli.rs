use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "mproxy", about = "Multi-provider AI gateway")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Bind host (env: MPROXY_HOST).
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Bind port (env: MPROXY_PORT).
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Credential directory (env: MPROXY_AUTH_DIR).
    #[arg(long, global = true)]
    pub auth_dir: Option<PathBuf>,

    /// Outbound proxy URL (env: MPROXY_PROXY).
    #[arg(long, global = true)]
    pub proxy: Option<String>,

    /// Optional JSON config file with provider model tables.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the gateway (default).
    Serve,
    /// Log in to a provider via the OAuth device flow.
    Login {
        /// Provider identifier (continue, cursor, windsurf).
        #[arg(long)]
        provider: String,
        /// Skip opening the verification URL in a browser.
        #[arg(long)]
        no_browser: bool,
    },
}
