//! Intake API - REST layer for application intake
//!
//! Axum server that accepts structured applications, stores them in
//! PostgreSQL under a human-readable identifier, and sends a confirmation
//! email once the record is committed.

pub mod config;
pub mod db;
pub mod error;
pub mod mailer;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use config::ApiConfig;
pub use db::{DbClient, DbConfig, DbSslMode};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use mailer::{
    connect_notifier, DeliveryMode, MailConfig, NotificationDispatcher, NotificationOutcome,
    SmtpNotifier, SmtpProfile, SmtpSecurity,
};
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use services::{confirmation_email, SubmissionReceipt, SubmissionService};
pub use types::*;
