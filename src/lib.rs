//! Coursegate - session-authenticated backend for a course portal
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Auth endpoints (login, logout, register, identity views) │
//! │  - Course content proxy                                     │
//! │  - Health / metrics / SPA assets                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Auth Layer                               │
//! │  - Session restoration, authentication and role gates       │
//! │  - Local email/password strategy                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx): users, sessions                           │
//! │  - GitHub contents API                                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: Content proxy and metrics handlers
//! - `auth`: Passwords, identities, sessions, gates and auth routes
//! - `content`: Content API capability and its GitHub client
//! - `data`: Database layer
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod content;
pub mod data;
pub mod error;
pub mod metrics;

use std::sync::Arc;

use auth::IdentityStore;
use content::ContentApi;

/// Application state shared across all handlers
///
/// This struct is cloned for each request.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// User accounts
    pub identities: Arc<dyn IdentityStore>,

    /// Session issuing and restoration
    pub sessions: Arc<auth::SessionManager>,

    /// Email/password verification
    pub strategy: Arc<auth::LocalStrategy>,

    /// Course content source
    pub content: Arc<dyn ContentApi>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Validate configuration
    /// 2. Connect to SQLite database (migrations run on connect)
    /// 3. Build the content client
    /// 4. Ensure the bootstrap teacher account, if configured
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        config.validate()?;

        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!(path = %config.database.path.display(), "Database connected");

        let content = content::GitHubContentClient::new(&config.content)?;
        tracing::info!(
            owner = %config.content.owner,
            repo = %config.content.repo,
            "Content client initialized"
        );

        let identities: Arc<dyn IdentityStore> = db.clone();
        Self::ensure_bootstrap_teacher(identities.as_ref(), &db, &config).await?;

        let sessions = auth::SessionManager::new(
            db.clone(),
            identities.clone(),
            &config.auth,
            config.should_use_secure_cookies(),
        );
        let strategy = auth::LocalStrategy::new(identities.clone(), config.auth.bcrypt_cost)?;

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            identities,
            sessions: Arc::new(sessions),
            strategy: Arc::new(strategy),
            content: Arc::new(content),
        })
    }

    /// Ensure the configured teacher account exists
    ///
    /// Creates the account with role `teacher`. An existing account under
    /// the same email is promoted; its password is left alone.
    async fn ensure_bootstrap_teacher(
        identities: &dyn IdentityStore,
        db: &data::Database,
        config: &config::AppConfig,
    ) -> Result<(), error::AppError> {
        let (Some(email), Some(password)) = (
            config.bootstrap.teacher_email.as_deref(),
            config.bootstrap.teacher_password.as_deref(),
        ) else {
            return Ok(());
        };

        let password_hash =
            auth::password::hash_async(password.to_string(), config.auth.bcrypt_cost).await?;
        let (user, created) = identities
            .find_or_create(
                email,
                data::NewIdentity {
                    password_hash,
                    role: data::Role::Teacher,
                },
            )
            .await?;

        if created {
            tracing::info!(user_id = %user.id, "Teacher account created");
        } else if user.role != data::Role::Teacher {
            db.set_user_role(&user.id, data::Role::Teacher).await?;
            tracing::info!(user_id = %user.id, "Existing account promoted to teacher");
        } else {
            tracing::info!(user_id = %user.id, "Teacher account exists");
        }

        Ok(())
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware, routing::get};
    use tower_http::{
        compression::CompressionLayer,
        services::{ServeDir, ServeFile},
        trace::TraceLayer,
    };

    let build_dir = state.config.client.build_dir.clone();

    let sessioned = Router::new()
        .merge(auth::auth_router())
        .merge(api::content_router())
        .merge(api::metrics_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::restore_session,
        ))
        .with_state(state);

    let mut router = Router::new()
        .route("/health", get(health_check))
        .merge(sessioned);

    if let Some(dir) = build_dir {
        tracing::info!(dir = %dir.display(), "Serving client build");
        let index = dir.join("index.html");
        router = router.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
    }

    router
        .layer(middleware::from_fn(track_http_metrics))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

async fn track_http_metrics(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = request.method().as_str().to_owned();
    let started = std::time::Instant::now();

    let response = next.run(request).await;

    metrics::observe_http_request(&method, response.status().as_u16(), started.elapsed());
    response
}

async fn health_check() -> &'static str {
    "OK"
}
