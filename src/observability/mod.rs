//! Observability: structured logging and metrics collection
//!
//! The HTTP exposure of these lives in `crate::server` (`/health`, `/metrics`).

pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use logging::{LogFormat, init_default_logging, init_logging};
pub use metrics::{MetricsCollector, MetricsSnapshot, metrics};

// Span macros for structured logging
pub use logging::{dispatch_span, lifecycle_span, pipeline_span};
