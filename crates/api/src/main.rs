//! API server entry point.
//!
//! Hosts the HTTP API and the notification workers in one process.

use std::sync::Arc;

use api::config::{Config, LogFormat, MailSenderKind};
use api::error::StartupError;
use api::{AppState, AppStore, SharedMailSender};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use notifications::{DummyMailSender, OutboxMailSender, spawn_consumers};
use ordering::InMemoryLedger;
use storage::{InMemoryStore, PostgresStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use transport::{InMemoryTransport, MessageTransport, WorkerGroup};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn mail_sender(
    kind: MailSenderKind,
    transport: &InMemoryTransport,
) -> Result<SharedMailSender, StartupError> {
    let sender: SharedMailSender = match kind {
        MailSenderKind::Dummy => Arc::new(DummyMailSender::new()),
        MailSenderKind::Outbox => Arc::new(OutboxMailSender::connect(transport.clone()).await?),
    };
    Ok(sender)
}

/// Starts the workers, serves HTTP until a signal arrives, then drains.
async fn run<S: AppStore>(
    store: S,
    config: &Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), StartupError> {
    let transport = InMemoryTransport::with_max_redeliveries(config.max_redeliveries);
    let mailer = mail_sender(config.mail_sender, &transport).await?;
    let state = Arc::new(AppState::new(
        store,
        InMemoryLedger::new(),
        transport.clone(),
        mailer,
        config,
    ));

    let mut workers = WorkerGroup::new();
    let consumers = spawn_consumers(
        transport.clone(),
        Arc::clone(&state.notifications),
        config.legacy_queues,
        &mut workers,
    )
    .await?;
    tracing::info!(consumers, legacy_queues = config.legacy_queues, "notification workers started");

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("HTTP server stopped, draining workers");

    let stats = workers.shutdown(config.shutdown_grace).await;
    tracing::info!(
        processed = stats.processed,
        failed = stats.failed,
        "notification workers stopped"
    );

    transport.close().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Prometheus metrics recorder
    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    // 3. Store selection, then serve
    let result = match config.database_url.as_deref() {
        Some(url) => {
            tracing::info!("using PostgreSQL store");
            let store = PostgresStore::connect(url).await?;
            store.run_migrations().await?;
            let result = run(store.clone(), &config, metrics_handle).await;
            store.close().await;
            result
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory store");
            run(InMemoryStore::new(), &config, metrics_handle).await
        }
    };

    match &result {
        Ok(()) => tracing::info!("server shut down gracefully"),
        Err(e) => tracing::error!(error = %e, "server terminated with error"),
    }
    result
}
