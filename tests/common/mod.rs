//! Common test utilities for E2E tests

#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use coursegate::{AppState, config};
use std::collections::HashMap;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const TEACHER_EMAIL: &str = "teacher@example.com";
pub const TEACHER_PASSWORD: &str = "chalkboard";

/// Test server instance
///
/// Runs the application against a temporary database and a stand-in
/// for the GitHub contents API.
pub struct TestServer {
    pub addr: String,
    pub upstream_addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server after adjusting the default test configuration
    pub async fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        let upstream_addr = spawn(mock_github()).await;

        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let mut config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            auth: config::AuthConfig {
                session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
                session_max_age: 86_400,
                cookie_name: "coursegate.sid".to_string(),
                bcrypt_cost: 4,
                session_prune_interval_seconds: 900,
            },
            content: config::ContentConfig {
                api_url: upstream_addr.clone(),
                owner: "acme".to_string(),
                repo: "curriculum".to_string(),
                git_ref: None,
                token: Some("test-token".to_string()),
                timeout_seconds: 5,
            },
            client: config::ClientConfig::default(),
            bootstrap: config::BootstrapConfig {
                teacher_email: Some(TEACHER_EMAIL.to_string()),
                teacher_password: Some(TEACHER_PASSWORD.to_string()),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };
        adjust(&mut config);

        coursegate::metrics::init_metrics();

        // Initialize app state
        let state = AppState::new(config).await.unwrap();
        let addr = spawn(coursegate::build_router(state.clone())).await;

        Self {
            addr,
            upstream_addr,
            state,
            _temp_dir: temp_dir,
            client: Self::browser(),
        }
    }

    /// A fresh client with its own cookie jar
    pub fn browser() -> reqwest::Client {
        reqwest::Client::builder()
            .cookie_store(true)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap()
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    pub async fn register(&self, client: &reqwest::Client, email: &str, password: &str) -> reqwest::Response {
        client
            .post(self.url("/auth/register"))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    pub async fn login(&self, client: &reqwest::Client, email: &str, password: &str) -> reqwest::Response {
        client
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    pub async fn get(&self, client: &reqwest::Client, path: &str) -> reqwest::Response {
        client.get(self.url(path)).send().await.unwrap()
    }
}

async fn spawn(app: Router) -> String {
    // Bind to random port
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

/// Stand-in for `GET /repos/:owner/:repo/contents/*path`
///
/// Echoes what it was asked for. Paths containing `missing` answer 404
/// with GitHub's error body.
fn mock_github() -> Router {
    Router::new().route("/repos/:owner/:repo/contents/*path", get(mock_contents))
}

async fn mock_contents(
    Path((owner, repo, path)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: axum::http::HeaderMap,
) -> Response {
    if path.contains("missing") {
        return (
            StatusCode::NOT_FOUND,
            r#"{"message":"Not Found","documentation_url":"https://docs.github.com/rest"}"#,
        )
            .into_response();
    }

    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Json(serde_json::json!({
        "owner": owner,
        "repo": repo,
        "path": path,
        "ref": query.get("ref"),
        "authorization": authorization,
    }))
    .into_response()
}
