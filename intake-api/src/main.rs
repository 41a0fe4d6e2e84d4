//! Intake API Server Entry Point
//!
//! Bootstraps logging and configuration, prepares the database schema,
//! selects a mail relay, and starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use intake_api::telemetry::{init_logging, LoggingConfig};
use intake_api::{
    connect_notifier, create_api_router, ApiConfig, ApiError, ApiResult, DbClient, DbConfig,
    MailConfig, NotificationDispatcher, SubmissionService,
};

const DEFAULT_PORT: &str = "5000";

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_logging(&LoggingConfig::from_env())?;

    let db_config = DbConfig::from_env();
    let db = DbClient::from_config(&db_config)?;

    // The server starts even if the database is down; requests fail until it returns.
    if db.probe().await {
        if let Err(e) = db.migrate().await {
            tracing::error!(error = %e, "Schema bootstrap failed");
        }
    }

    let api_config = ApiConfig::from_env();

    let mail_config = MailConfig::from_env();
    let notifier = connect_notifier(&mail_config).await;
    let notifications = NotificationDispatcher::new(notifier, mail_config.delivery)
        .with_inline_deadline(api_config.request_timeout / 2);

    let service = SubmissionService::new(Arc::new(db), notifications);

    let app: Router = create_api_router(service, &api_config)?;

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, environment = %api_config.environment, "Starting intake API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("INTAKE_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("INTAKE_API_PORT").ok())
        .unwrap_or_else(|| DEFAULT_PORT.to_string());
    let port = port_str.parse::<u16>().map_err(|_| {
        ApiError::invalid_input(format!("Invalid port value: {}", port_str))
    })?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
    })
}
