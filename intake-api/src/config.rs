//! API Configuration Module
//!
//! CORS and request-timeout settings for the HTTP layer. Configuration is
//! loaded from environment variables with defaults suited to development.

use std::time::Duration;

use crate::error::{ApiError, ApiResult};

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for CORS and request handling.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    /// Example: "https://apply.example.com,https://admin.example.com"
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Request Handling
    // ========================================================================
    /// Upper bound on the time a single request may take.
    pub request_timeout: Duration,

    /// Deployment environment name (production, staging, development).
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(), // Empty = allow all
            cors_allow_credentials: true,
            cors_max_age_secs: 86400, // 24 hours
            request_timeout: Duration::from_secs(30),
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `INTAKE_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `INTAKE_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: true)
    /// - `INTAKE_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `INTAKE_REQUEST_TIMEOUT_SECS`: Per-request timeout (default: 30)
    /// - `INTAKE_ENVIRONMENT`: Deployment environment (default: development)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = std::env::var("INTAKE_CORS_ORIGINS")
            .ok()
            .map(|s| parse_origins(&s))
            .unwrap_or_default();

        let cors_allow_credentials = std::env::var("INTAKE_CORS_ALLOW_CREDENTIALS")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.cors_allow_credentials);

        let cors_max_age_secs = std::env::var("INTAKE_CORS_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cors_max_age_secs);

        let request_timeout = std::env::var("INTAKE_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        let environment =
            std::env::var("INTAKE_ENVIRONMENT").unwrap_or(defaults.environment);

        Self {
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs,
            request_timeout,
            environment,
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }

    /// Reject settings that are only acceptable in development.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        if self.is_production() && self.cors_origins.is_empty() {
            return Err(ApiError::invalid_input(
                "CORS origins not configured for production. Set INTAKE_CORS_ORIGINS.",
            ));
        }
        Ok(())
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}
