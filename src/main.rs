//! subgate: authenticating reverse-proxy gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                       GATEWAY                        │
//!  Client Request    │  ┌─────────┐   ┌──────────┐                          │
//!  ──────────────────┼─▶│  http   │──▶│ routing  │── oauth.<d> ──▶ auth     │
//!                    │  │ server  │   │ (Host)   │── health.<d> ─▶ health   │
//!                    │  └─────────┘   └────┬─────┘                          │
//!                    │                     │ <app>.<d>                      │
//!                    │                     ▼                                │
//!                    │              ┌────────────┐    ┌────────────┐        │
//!                    │              │ auth gate  │───▶│   proxy    │────────┼──▶ Upstream
//!                    │              │ (session)  │    │ dispatcher │        │
//!                    │              └────────────┘    └────────────┘        │
//!                    │                                                      │
//!                    │  Cross-cutting: config, session, observability,      │
//!                    │                 lifecycle                            │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use subgate::auth::Provider;
use subgate::config::load_config;
use subgate::lifecycle::{shutdown_on_signal, Shutdown};
use subgate::net::load_tls_config;
use subgate::observability::{logging, metrics};
use subgate::session::cookie::CookieStore;
use subgate::GatewayServer;

#[derive(Parser, Debug)]
#[command(name = "subgate", version, about = "Authenticating reverse-proxy gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "subgate.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        return Err("a TLS crypto provider was already installed".into());
    }

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load {}: {e}", cli.config.display());
            return Err(e.into());
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        domain = %config.domain,
        upstreams = config.upstreams.len(),
        "subgate starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let provider = Provider::from_config(&config)?;
    tracing::info!(provider = provider.name(), "Identity provider configured");
    let sessions = Arc::new(CookieStore::new(
        config.domain.clone(),
        config.session.max_age_secs,
    ));

    let bind_address: SocketAddr = config.listener.bind_address.parse()?;
    let tls = config.tls.clone();
    let server = GatewayServer::new(config, Arc::new(provider), sessions)?;

    let shutdown = Shutdown::new();
    let signals = shutdown.clone();
    tokio::spawn(async move { shutdown_on_signal(&signals).await });

    match tls {
        Some(tls) => {
            let rustls_config = load_tls_config(&tls).await?;
            server.run_tls(bind_address, rustls_config, &shutdown).await?;
        }
        None => {
            tracing::warn!("No [tls] configured; serving plain HTTP");
            let listener = TcpListener::bind(bind_address).await?;
            server.run(listener, &shutdown).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
