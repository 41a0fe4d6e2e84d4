//! Intake Telemetry - Observability Infrastructure
//!
//! Structured logging, Prometheus metrics and per-request instrumentation
//! for the API layer.

pub mod logging;
pub mod metrics;
pub mod middleware;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{metrics, metrics_handler, IntakeMetrics, METRICS};
pub use middleware::observability_middleware;
