use std::process::ExitCode;
use std::sync::Arc;

use swarmsim_core::workload::EchoWorkload;
use swarmsim_pipeline::{JobProcessor, PgQueueTransport, PgRecordStore};
use swarmsim_worker::config::WorkerConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("swarmsim-worker: {e}");
            return ExitCode::FAILURE;
        }
    };

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "swarmsim_worker=debug,swarmsim_pipeline=debug".into());
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

    tracing::info!(
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        lease_secs = config.lease.as_secs(),
        workload_duration_ms = config.workload_duration.as_millis() as u64,
        "Loaded worker configuration",
    );

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

    // --- Processor ---
    let processor = Arc::new(JobProcessor::new(
        Arc::new(PgRecordStore::new(pool.clone())),
        Arc::new(PgQueueTransport::new(pool.clone(), config.lease)),
        Arc::new(EchoWorkload::new(config.workload_duration)),
        config.processor_config(),
    ));

    let cancel = CancellationToken::new();
    let mut handle = tokio::spawn({
        let processor = Arc::clone(&processor);
        let cancel = cancel.clone();
        async move { processor.run(cancel).await }
    });

    // The processor only returns on cancellation; ending earlier means it
    // panicked and this worker can no longer make progress.
    tokio::select! {
        () = shutdown_signal() => {}
        joined = &mut handle => {
            match joined {
                Ok(()) => tracing::error!("Job processor exited unexpectedly"),
                Err(e) => tracing::error!(error = %e, "Job processor task failed"),
            }
            pool.close().await;
            return ExitCode::FAILURE;
        }
    }

    // --- Shutdown ---
    cancel.cancel();
    match tokio::time::timeout(config.shutdown_timeout, handle).await {
        Ok(Ok(())) => tracing::info!("Job processor stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Job processor task failed"),
        Err(_) => tracing::warn!(
            timeout_secs = config.shutdown_timeout.as_secs(),
            "Job processor did not stop in time; in-flight message will be redelivered",
        ),
    }

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
    ExitCode::SUCCESS
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
