//! GitHub "repository contents" client

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};

use super::{ContentApi, ContentPath};
use crate::config::ContentConfig;
use crate::error::AppError;
use crate::metrics::{UPSTREAM_REQUEST_DURATION_SECONDS, UPSTREAM_REQUESTS_TOTAL};

const GITHUB_JSON: &str = "application/vnd.github+json";

/// Reads `GET {api_url}/repos/{owner}/{repo}/contents/{path}`
pub struct GitHubContentClient {
    http: reqwest::Client,
    contents_url: String,
    git_ref: Option<String>,
}

impl GitHubContentClient {
    /// Build a client from configuration
    ///
    /// # Errors
    /// Returns error if the token is not a valid header value or the
    /// HTTP client cannot be constructed
    pub fn new(config: &ContentConfig) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_JSON));
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| AppError::Config(format!("content.token is invalid: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("Coursegate/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            http,
            contents_url: format!(
                "{}/repos/{}/{}/contents",
                config.api_url.trim_end_matches('/'),
                config.owner,
                config.repo
            ),
            git_ref: config.git_ref.clone(),
        })
    }

    fn url_for(&self, path: &ContentPath) -> String {
        format!("{}/{}", self.contents_url, path.as_str())
    }
}

#[async_trait]
impl ContentApi for GitHubContentClient {
    async fn get(&self, path: &ContentPath) -> Result<serde_json::Value, AppError> {
        let url = self.url_for(path);
        let mut request = self.http.get(&url);
        if let Some(git_ref) = &self.git_ref {
            request = request.query(&[("ref", git_ref)]);
        }

        let started = Instant::now();
        let result = request.send().await;
        UPSTREAM_REQUEST_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                UPSTREAM_REQUESTS_TOTAL.with_label_values(&["error"]).inc();
                return Err(error.into());
            }
        };

        let status = response.status();
        UPSTREAM_REQUESTS_TOTAL
            .with_label_values(&[status.as_str()])
            .inc();

        if !status.is_success() {
            let body = response.text().await?;
            tracing::warn!(%url, %status, "Content API returned an error");
            return Err(AppError::Upstream { status, body });
        }

        tracing::debug!(%url, "Content fetched");
        Ok(response.json::<serde_json::Value>().await?)
    }
}
