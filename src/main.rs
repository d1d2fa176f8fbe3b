//! TLS terminator
//!
//! Accepts TCP connections, terminates TLS and answers decrypted HTTP/1.x
//! requests with a fixed response.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──TLS──▶ net::listener ──▶ net::binding ──▶ tls::TlsConnection
//!                                            │                  │
//!                                            │            plaintext
//!                                            │                  ▼
//!     Client ◀──TLS── writer task ◀── net::transport ◀── http::handler
//!
//!     Startup:  config ─▶ observability ─▶ tls::TlsContext ─▶ listener
//!     Shutdown: lifecycle::signals ─▶ Shutdown ─▶ drain ─▶ exit
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use tls_terminator::config::loader::load_config;
use tls_terminator::config::validation::validate_config;
use tls_terminator::http::{HttpsServer, StaticResponder};
use tls_terminator::lifecycle::{signals, Shutdown};
use tls_terminator::net::listener::Listener;
use tls_terminator::observability::{logging, metrics};
use tls_terminator::{TerminatorConfig, TlsContext};

#[derive(Parser)]
#[command(name = "tls-terminator")]
#[command(about = "TLS-terminating front end for an HTTP pipeline", long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in defaults are used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Validate the configuration and load certificates, then exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TerminatorConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        if let Err(errors) = validate_config(&config) {
            for error in &errors {
                eprintln!("invalid configuration: {error}");
            }
            return Err("invalid configuration".into());
        }
    }

    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tls-terminator starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        handshake_timeout_secs = config.timeouts.handshake_secs,
        idle_timeout_secs = config.timeouts.idle_secs,
        "Configuration loaded"
    );

    // Certificates and policy are checked before anything is bound.
    let context = Arc::new(TlsContext::from_config(config.tls.clone())?);
    if cli.check {
        tracing::info!("Configuration OK");
        return Ok(());
    }

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let server = HttpsServer::new(context, config.timeouts.clone());
    server
        .run(listener, StaticResponder::default, shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
