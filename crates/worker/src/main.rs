use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tessera_core::tasks::TASK_SEND_VERIFY_EMAIL;
use tessera_events::{LogMailer, MailConfig, Mailer, SmtpMailer};
use tessera_service::config::ServiceConfig;
use tessera_service::store::PgStore;
use tessera_service::Services;
use tessera_worker::config::WorkerConfig;
use tessera_worker::{SendVerifyEmailHandler, TaskProcessor};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long background loops get to finish in-flight work after a signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessera_worker=debug,tessera_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let service_config = ServiceConfig::from_env().context("invalid service configuration")?;
    let worker_config = WorkerConfig::from_env().context("invalid worker configuration")?;
    tracing::info!(
        concurrency = worker_config.processor.concurrency,
        verify_email_url = %worker_config.verify_email_url,
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = tessera_db::create_pool(
        &service_config.database_url,
        service_config.database_max_connections,
    )
    .await
    .context("failed to connect to database")?;
    tracing::info!("Database connection pool created");

    tessera_db::health_check(&pool)
        .await
        .context("database health check failed")?;

    tessera_db::run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Mail ---
    let mailer: Arc<dyn Mailer> = match MailConfig::from_env() {
        Some(mail_config) => {
            tracing::info!(host = %mail_config.smtp_host, port = mail_config.smtp_port, "SMTP mailer configured");
            Arc::new(SmtpMailer::new(&mail_config).context("failed to build SMTP mailer")?)
        }
        None => {
            tracing::warn!("SMTP_HOST not set; verification emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    // --- Background loops ---
    let services = Services::new(pool.clone(), &service_config)
        .context("failed to initialise services")?;
    let store = Arc::new(PgStore::new(pool.clone()));

    let processor = TaskProcessor::new(pool, worker_config.processor.clone()).register(
        TASK_SEND_VERIFY_EMAIL,
        Arc::new(SendVerifyEmailHandler::new(
            store.clone(),
            store,
            mailer,
            worker_config.verify_email_url.clone(),
        )),
    );

    let cancel = CancellationToken::new();
    let relay_handle = tokio::spawn(services.outbox_relay.run(cancel.clone()));
    let processor_handle = tokio::spawn(Arc::new(processor).run(cancel.clone()));
    tracing::info!("Worker started (outbox relay, task processor)");

    shutdown_signal().await;
    cancel.cancel();

    if tokio::time::timeout(SHUTDOWN_GRACE, relay_handle).await.is_err() {
        tracing::warn!("Outbox relay did not stop in time");
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, processor_handle).await.is_err() {
        tracing::warn!("Task processor did not stop in time");
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
///
/// A handler that fails to install is logged and treated as never firing.
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
