use std::net::SocketAddr;

use anyhow::anyhow;
use axum::http::Method;
use axum::http::header::CONTENT_TYPE;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use tts_gateway::{AppState, GatewayConfig, routes};

/// TTS Gateway - streaming text-to-speech multiplexer
#[derive(Parser, Debug)]
#[command(name = "tts-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Bind address override, e.g. "0.0.0.0:8080" (defaults to HOST/PORT)
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = GatewayConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    let address = cli.listen.unwrap_or_else(|| config.address());
    let cors_origins = config.cors_allowed_origins.clone();

    // Create application state and start the streaming worker pool
    let (state, worker_pool) = AppState::new(config).await;
    let shutdown = state.shutdown.clone();

    // Configure CORS
    let cors_layer = if let Some(ref origins) = cors_origins {
        if origins == "*" {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE])
        } else {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE])
        }
    } else {
        // No CORS configured: same-origin only.
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE])
    };

    let app = routes::create_router(state).layer(cors_layer);

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("invalid server address '{}': {}", address, e))?;
    let listener = TcpListener::bind(&socket_addr).await?;
    info!("server listening on http://{socket_addr}");

    // First Ctrl-C flips the shutdown token: the server stops accepting,
    // in-flight streams terminate with a shutting-down error, workers exit.
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_shutdown.cancel();
        }
    });

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.clone().cancelled_owned())
    .await?;

    shutdown.cancel();
    worker_pool.shutdown().await;
    info!("gateway stopped");

    Ok(())
}
