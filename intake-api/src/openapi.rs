//! OpenAPI Specification for the intake API
//!
//! Generated with utoipa from the handler annotations and response types.

use intake_core::{ApplicationData, ApplicationId, ApplicationRecord, ApplicationSummary};
use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::{application, health};
use crate::telemetry::metrics;
use crate::types::{GetResponse, ListResponse, MessageResponse, SubmitResponse};

/// OpenAPI document for the intake API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Intake API",
        version = "0.1.0",
        description = "Application intake: submit, list, fetch, replace and delete applications",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:5000", description = "Local Development")
    ),
    tags(
        (name = "Applications", description = "Application intake and management"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        application::submit_application,
        application::list_applications,
        application::get_application,
        application::update_application,
        application::delete_application,
        health::ping,
        health::liveness,
        health::readiness,
        metrics::metrics_handler,
    ),
    components(schemas(
        ApiError,
        ErrorCode,
        ApplicationId,
        ApplicationData,
        ApplicationRecord,
        ApplicationSummary,
        SubmitResponse,
        ListResponse,
        GetResponse,
        MessageResponse,
        health::HealthResponse,
        health::HealthStatus,
        health::HealthDetails,
        health::ComponentHealth,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_application_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/application"));
        assert!(doc.paths.paths.contains_key("/api/applications"));
        assert!(doc.paths.paths.contains_key("/api/application/{id}"));
        assert!(doc.paths.paths.contains_key("/health/ready"));
    }

    #[test]
    fn test_openapi_serializes() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(ApiDoc::openapi())?;
        assert_eq!(json["info"]["title"], "Intake API");
        Ok(())
    }
}
