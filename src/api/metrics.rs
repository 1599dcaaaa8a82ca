//! Prometheus metrics endpoint
//!
//! Exposes application metrics in Prometheus format. Teachers only.

use axum::{
    Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};

use crate::AppState;
use crate::auth::RouterGuardExt;
use crate::data::Role;
use crate::metrics::REGISTRY;

const OPERATORS: &[Role] = &[Role::Teacher];

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics_text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            metrics_text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

/// Create metrics router
///
/// Exposes `/metrics` behind the authentication and teacher role gates.
pub fn metrics_router() -> Router<AppState> {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .require_roles(OPERATORS)
}
