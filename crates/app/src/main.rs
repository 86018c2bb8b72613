use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use parlance_app::agent::{AgentStore, Registries};
use parlance_app::config::AppConfig;
use parlance_app::server;
use parlance_app::session::SessionManager;

#[derive(Parser, Debug)]
#[command(name = "parlance", about = "Real-time voice-agent orchestrator")]
struct Args {
    /// TOML configuration file; defaults are used when absent.
    #[arg(short, long, env = "PARLANCE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured listen address.
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    let manager = Arc::new(SessionManager::new(
        AgentStore::new(config.agents.clone()),
        Registries::with_defaults(),
        config.engine_config(),
    ));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "parlance listening");

    axum::serve(listener, server::router(manager))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    Ok(())
}
