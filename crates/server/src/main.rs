use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use ephemera_blob::UrlSigner;
use ephemera_broker::{Broker, BrokerBuilder};
use ephemera_server::api::AppState;
use ephemera_server::api::schemas::SweepResponse;
use ephemera_server::config::EphemeraConfig;
use ephemera_server::ratelimit::RateLimiter;

/// Ephemera HTTP server.
#[derive(Parser, Debug)]
#[command(name = "ephemera-server", about = "Ephemeral file sharing server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "ephemera.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one reclamation pass against the configured backends, print the report, and exit.
    Sweep,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration from TOML file, or use defaults if the file does not exist.
    let mut config = EphemeraConfig::load(Path::new(&cli.config))?;
    config.apply_env();
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    ephemera_server::telemetry::init(&config.logging);

    if !Path::new(&cli.config).exists() {
        info!(path = %cli.config, "config file not found, using defaults");
    }

    let (broker, signer) = build_broker(&config).await?;
    let broker = Arc::new(broker);

    if let Some(Commands::Sweep) = cli.command {
        let report = broker.sweep().await?;
        println!("{}", serde_json::to_string_pretty(&SweepResponse::from(report))?);
        return Ok(());
    }

    // Periodic reclamation.
    let sweeper_handle = if config.sweeper.enabled {
        let interval = config.sweeper.interval();
        let broker = Arc::clone(&broker);
        Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            // The first tick completes immediately; skip it so we don't sweep
            // at startup.
            timer.tick().await;
            loop {
                timer.tick().await;
                if let Err(e) = broker.sweep().await {
                    warn!(error = %e, "periodic sweep failed");
                }
            }
        }))
    } else {
        info!("periodic sweeper disabled");
        None
    };

    if config.sweeper.secret.is_none() {
        warn!("no sweep secret configured; /v1/sweep and item deactivation are disabled");
    }

    let rate_limiter = config.rate_limit.enabled.then(|| {
        info!(
            requests = config.rate_limit.requests_per_window,
            window_seconds = config.rate_limit.window_seconds,
            "upload rate limiting enabled"
        );
        Arc::new(RateLimiter::new(&config.rate_limit))
    });

    let state = AppState {
        broker: Arc::clone(&broker),
        rate_limiter,
        trust_forwarded_for: config.rate_limit.trust_forwarded_for,
        signer,
        admin_secret: config.sweeper.secret.clone(),
        external_url: config.server.external_url.clone(),
        max_body_bytes: config.server.max_body_bytes(),
    };
    let app = ephemera_server::api::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "ephemera-server listening");

    // Serve with graceful shutdown on SIGINT / SIGTERM.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(handle) = sweeper_handle {
        handle.abort();
    }

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    info!(
        pending = broker.scheduler().pending(),
        timeout_secs = config.server.shutdown_timeout_seconds,
        "stopping deferred deletions..."
    );
    if !broker.shutdown(shutdown_timeout).await {
        warn!(
            timeout_secs = config.server.shutdown_timeout_seconds,
            "shutdown timeout exceeded, remaining blobs are left to the sweeper"
        );
    }

    info!("ephemera-server shut down");
    Ok(())
}

/// Wire the configured backends into a broker.
async fn build_broker(
    config: &EphemeraConfig,
) -> Result<(Broker, Option<UrlSigner>), Box<dyn std::error::Error>> {
    let store = ephemera_server::store_factory::create_store(&config.store).await?;
    info!(backend = %config.store.backend, "metadata store initialized");

    let (blobs, signer) =
        ephemera_server::blob_factory::create_blob_store(&config.blob, &config.public_base_url())
            .await?;
    info!(backend = %config.blob.backend, "blob store initialized");

    let broker = BrokerBuilder::new()
        .store(store)
        .blobs(blobs)
        .ingest_policy(config.ingest.policy())
        .access_policy(config.access.policy())
        .reaper_config(config.sweeper.reaper_config())
        .build()?;
    Ok((broker, signer))
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
