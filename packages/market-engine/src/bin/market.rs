//! Marketplace engine binary.

use std::sync::Arc;

use market_engine::jobs::spawn_background_jobs;
use market_engine::{create_router, AppState, Config, Market};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting market engine");

    let config = Config::load().unwrap_or_else(|e| {
        // Fall back only when no config exists; parse errors fail hard.
        let err_str = format!("{e}");
        if err_str.contains("not found") {
            warn!(error = %e, "No config found, using defaults");
            Config::default()
        } else {
            error!(error = %e, "FATAL: config error, fix MARKET_* env vars or market.toml");
            std::process::exit(1);
        }
    });

    info!(
        platform_fee_rate = %config.platform_fee_rate,
        creator_royalty_rate = %config.creator_royalty_rate,
        scale = config.decimal_scale,
        offer_expiry_days = config.offer_expiry_days,
        database_path = %config.database_path,
        "Configuration loaded"
    );

    let market = Arc::new(Market::from_config(&config).await?);

    // Trades reserved before a crash are still pending in the database.
    let recovered = market.reconcile_pending_trades();
    if !recovered.still_pending.is_empty() {
        warn!(
            still_pending = ?recovered.still_pending,
            "Pending trades could not be completed at startup"
        );
    }
    let state = Arc::new(AppState::new(Arc::clone(&market)));

    let cancel = CancellationToken::new();
    let jobs = spawn_background_jobs(Arc::clone(&market), &config, cancel.clone());

    let app = create_router(state);
    info!(address = %config.bind_address, lock_backend = market.lock_backend(), "Listening");
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, stopping background jobs...");
    cancel.cancel();
    for job in jobs {
        if let Err(e) = job.await {
            warn!(error = %e, "Background job ended abnormally");
        }
    }

    let pending = market.pending_trade_count();
    if pending > 0 {
        warn!(pending, "Shutting down with trades awaiting payment completion, they resume on next start");
    }

    info!("Market engine shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
