//! Rentwise HTTP server.
//!
//! Rental lifecycle coordination over a `PostgreSQL` document store, with
//! domain events on Redpanda and real-time notifications over websockets.

use anyhow::Context;
use rentwise_core::{RentalRecord, Topic, UserRecord, VehicleRecord};
use rentwise_core::environment::SystemClock;
use rentwise_core::event_log::EventLog;
use rentwise_postgres::{PostgresDocumentStore, migrate};
use rentwise_redpanda::RedpandaEventLog;
use rentwise_runtime::{Coordinator, MetricsServer, Stores};
use rentwise_server::{Config, init_tracing};
use rentwise_web::{AppState, TokenService, router};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env file is the normal production case
        if !e.not_found() {
            return Err(e).context("Failed to read .env");
        }
    }
    init_tracing();

    info!("Starting Rentwise server");
    let config = Config::from_env();
    info!(
        redpanda_brokers = %config.redpanda.brokers,
        bind = %config.bind_address(),
        metrics_enabled = config.server.metrics_enabled,
        "Configuration loaded"
    );

    // Document store
    info!("Connecting to document store...");
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .connect(&config.postgres.url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    migrate(&pool).await.context("Failed to prepare schema")?;
    let users = Arc::new(PostgresDocumentStore::<UserRecord>::from_pool(pool.clone()));
    let stores = Stores {
        users: users.clone(),
        vehicles: Arc::new(PostgresDocumentStore::<VehicleRecord>::from_pool(pool.clone())),
        rentals: Arc::new(PostgresDocumentStore::<RentalRecord>::from_pool(pool)),
    };
    info!("Document store connected");

    // Event log
    info!("Connecting to Redpanda event log...");
    let event_log = Arc::new(
        RedpandaEventLog::builder()
            .brokers(&config.redpanda.brokers)
            .producer_acks(&config.redpanda.producer_acks)
            .compression(&config.redpanda.compression)
            .timeout(config.redpanda_timeout())
            .consumer_group(&config.redpanda.consumer_group)
            .build()
            .context("Failed to build Redpanda producer")?,
    );
    if let Err(e) = event_log.ensure_topics(&Topic::ALL).await {
        // Brokers with auto-create still accept publishes
        warn!(error = %e, "Could not ensure event topics");
    }
    info!("Event log connected");

    let mut metrics = MetricsServer::new();
    if config.server.metrics_enabled {
        metrics.start().context("Failed to install metrics recorder")?;
    }

    let clock = Arc::new(SystemClock);
    let coordinator = Coordinator::new(
        stores,
        event_log,
        clock.clone(),
        config.coordinator_config(),
    );
    let tokens = Arc::new(TokenService::new(config.token_ttl(), clock));
    let mut state = AppState::new(coordinator.clone(), users, tokens);
    if let Some(handle) = metrics.handle() {
        state = state.with_metrics(handle.clone());
    }

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "Server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Draining event publisher...");
    coordinator.shutdown().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
