//! API layer
//!
//! HTTP handlers for:
//! - Course content proxy
//! - Metrics (Prometheus)

mod content;
pub mod metrics;

pub use content::content_router;
pub use metrics::metrics_router;
