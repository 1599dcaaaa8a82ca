//! Course content source
//!
//! Lessons, modules and challenges live in a GitHub repository. The
//! proxy routes only know the [`ContentApi`] capability; [`GitHubContentClient`]
//! is the production implementation.

mod github;

use async_trait::async_trait;

use crate::error::AppError;

pub use github::GitHubContentClient;

/// Fetches a piece of course content by repository path
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Fetch the content at `path` (already encoded, no leading slash)
    ///
    /// # Errors
    /// `AppError::Upstream` carries a non-success upstream reply verbatim;
    /// transport failures are `AppError::HttpClient`.
    async fn get(&self, path: &ContentPath) -> Result<serde_json::Value, AppError>;
}

/// Repository path assembled from route segments
///
/// Each segment is percent-encoded; empty, `.` and `..` segments are
/// refused so a request cannot climb out of the cohort directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPath(String);

impl ContentPath {
    pub fn from_segments<'a, I>(segments: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut encoded = Vec::new();
        for segment in segments {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(AppError::Validation(format!(
                    "invalid content path segment: {segment:?}"
                )));
            }
            encoded.push(urlencoding::encode(segment).into_owned());
        }

        if encoded.is_empty() {
            return Err(AppError::Validation("empty content path".to_string()));
        }

        Ok(Self(encoded.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
