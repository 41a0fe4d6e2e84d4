//! REST API Routes Module
//!
//! Includes:
//! - Application intake routes under /api
//! - Health check endpoints (Kubernetes-compatible)
//! - Prometheus metrics and the OpenAPI document
//! - CORS support for the browser front end

pub mod application;
pub mod health;

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use utoipa::OpenApi;

use crate::config::ApiConfig;
use crate::error::ApiResult;
use crate::openapi::ApiDoc;
use crate::services::SubmissionService;
use crate::telemetry::{metrics_handler, observability_middleware};

// Re-export route creation functions for convenience
pub use application::create_router as application_router;
pub use health::create_router as health_router;

/// Body of `GET /`.
pub const ROOT_MESSAGE: &str = "Backend running successfully";

/// GET / - Plain-text liveness banner
async fn root() -> &'static str {
    ROOT_MESSAGE
}

/// Handler for /openapi.json endpoint.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// With no configured origins every origin is allowed and credentials are
/// not. Configured origins are matched exactly and may carry credentials.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!("CORS: allowing origins: {:?}", config.cors_origins);
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the complete API router.
///
/// - Application routes under /api/*
/// - Health checks at /health/*
/// - Metrics at /metrics
/// - OpenAPI spec at /openapi.json
///
/// # Middleware Order (outer to inner)
/// 1. CORS - answers preflight requests
/// 2. Observability - tracing and metrics
/// 3. Timeout - bounds handler time
///
/// # Errors
/// In production, fails if the CORS configuration is incomplete.
pub fn create_api_router(service: SubmissionService, api_config: &ApiConfig) -> ApiResult<Router> {
    api_config.validate_for_production()?;

    let health = health::create_router(service.store().clone());

    let router = Router::new()
        .route("/", get(root))
        .nest("/api", application::create_router(service))
        .nest("/health", health)
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json));

    let cors = build_cors_layer(api_config);

    Ok(router
        .layer(TimeoutLayer::new(api_config.request_timeout))
        .layer(from_fn(observability_middleware))
        .layer(cors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_builds_for_both_modes() {
        let _dev = build_cors_layer(&ApiConfig::default());
        let _configured = build_cors_layer(&ApiConfig {
            cors_origins: vec!["https://apply.example.com".to_string()],
            ..Default::default()
        });
    }

    #[test]
    fn test_production_requires_origins() {
        let config = ApiConfig {
            environment: "production".to_string(),
            ..Default::default()
        };
        let service = SubmissionService::new(
            std::sync::Arc::new(intake_storage::MemoryStore::new()),
            crate::mailer::NotificationDispatcher::disabled(),
        );
        assert!(create_api_router(service, &config).is_err());
    }
}
