use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use swarmsim_api::config::ServerConfig;
use swarmsim_api::router::build_app_router;
use swarmsim_api::state::AppState;
use swarmsim_pipeline::transport::DEFAULT_LEASE;
use swarmsim_pipeline::{OutboxRelay, PgQueueTransport, PgRecordStore, RecordStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("swarmsim-api: {e}");
            return ExitCode::FAILURE;
        }
    };

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "swarmsim_api=debug,swarmsim_pipeline=debug,tower_http=debug".into());
    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let pool = match swarmsim_db::create_pool(&config.database_url, config.db_max_connections).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Database connection pool created");

    if let Err(e) = swarmsim_db::health_check(&pool).await {
        tracing::error!(error = %e, "Database health check failed");
        return ExitCode::FAILURE;
    }
    tracing::info!("Database health check passed");

    if let Err(e) = swarmsim_db::run_migrations(&pool).await {
        tracing::error!(error = %e, "Failed to run database migrations");
        return ExitCode::FAILURE;
    }
    tracing::info!("Database migrations applied");

    let store: Arc<dyn RecordStore> = Arc::new(PgRecordStore::new(pool.clone()));
    let transport = Arc::new(PgQueueTransport::new(pool.clone(), DEFAULT_LEASE));

    // --- Outbox relay ---
    let relay_cancel = CancellationToken::new();
    // Cancelled when the relay task ends for any reason, panics included.
    let relay_stopped = CancellationToken::new();
    let relay = OutboxRelay::new(Arc::clone(&store), transport).with_interval(config.outbox_interval);
    let relay_handle = tokio::spawn({
        let cancel = relay_cancel.clone();
        let stopped = relay_stopped.clone();
        async move {
            let _stopped = stopped.drop_guard();
            relay.run(cancel).await
        }
    });

    // --- Router ---
    let state = AppState::new(store);
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = match config.host.parse() {
        Ok(ip) => SocketAddr::new(ip, config.port),
        Err(e) => {
            tracing::error!(host = %config.host, error = %e, "Invalid HOST address");
            return ExitCode::FAILURE;
        }
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind to address");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(%addr, "Starting server");

    // Without the relay no submission ever reaches the queue, so its loss
    // stops the server too.
    let shutdown = {
        let relay_stopped = relay_stopped.clone();
        async move {
            tokio::select! {
                () = shutdown_signal() => {}
                () = relay_stopped.cancelled() => {
                    tracing::error!("Outbox relay stopped unexpectedly, shutting down");
                }
            }
        }
    };
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let relay_failed = relay_stopped.is_cancelled();
    relay_cancel.cancel();
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    match tokio::time::timeout(shutdown_timeout, relay_handle).await {
        Ok(Ok(())) => tracing::info!("Outbox relay stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Outbox relay task failed"),
        Err(_) => tracing::warn!("Outbox relay did not stop in time"),
    }

    pool.close().await;

    match served {
        Ok(()) if relay_failed => ExitCode::FAILURE,
        Ok(()) => {
            tracing::info!("Graceful shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
