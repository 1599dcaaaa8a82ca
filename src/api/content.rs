//! Course content proxy
//!
//! Each route maps its path parameters onto the repository layout
//! `{cohort}/modules/...` or `{cohort}/challenges/...` and relays the
//! upstream JSON untouched.

use axum::{Json, Router, extract::Path, extract::State, routing::get};

use crate::AppState;
use crate::auth::RouterGuardExt;
use crate::content::ContentPath;
use crate::error::AppError;

const API_CONNECTED: &str = "API connected";

/// Create content proxy router
///
/// Routes:
/// - GET /api - Liveness of the API surface
/// - GET /api/:cohort/modules
/// - GET /api/:cohort/modules/:module
/// - GET /api/:cohort/modules/:module/:lesson
/// - GET /api/:cohort/challenges/:module/:challenge
///
/// Everything below `/api/:cohort` requires an authenticated session.
pub fn content_router() -> Router<AppState> {
    let proxied = Router::new()
        .route("/api/:cohort/modules", get(list_modules))
        .route("/api/:cohort/modules/:module", get(get_module))
        .route("/api/:cohort/modules/:module/:lesson", get(get_lesson))
        .route(
            "/api/:cohort/challenges/:module/:challenge",
            get(get_challenge),
        )
        .require_authentication();

    Router::new()
        .route("/api", get(api_connected))
        .merge(proxied)
}

async fn api_connected() -> &'static str {
    API_CONNECTED
}

async fn relay(state: &AppState, segments: &[&str]) -> Result<Json<serde_json::Value>, AppError> {
    let path = ContentPath::from_segments(segments.iter().copied())?;
    Ok(Json(state.content.get(&path).await?))
}

/// GET /api/:cohort/modules
async fn list_modules(
    State(state): State<AppState>,
    Path(cohort): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    relay(&state, &[&cohort, "modules"]).await
}

/// GET /api/:cohort/modules/:module
async fn get_module(
    State(state): State<AppState>,
    Path((cohort, module)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    relay(&state, &[&cohort, "modules", &module]).await
}

/// GET /api/:cohort/modules/:module/:lesson
async fn get_lesson(
    State(state): State<AppState>,
    Path((cohort, module, lesson)): Path<(String, String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    relay(&state, &[&cohort, "modules", &module, &lesson]).await
}

/// GET /api/:cohort/challenges/:module/:challenge
async fn get_challenge(
    State(state): State<AppState>,
    Path((cohort, module, challenge)): Path<(String, String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    relay(&state, &[&cohort, "challenges", &module, &challenge]).await
}
