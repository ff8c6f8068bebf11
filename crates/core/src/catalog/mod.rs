//! Remote comic catalog integration.
//!
//! `ComicCatalog` models the logical operations the identify pipeline needs.
//! It is implemented by [`ComicVineClient`] and by the in-memory mock in
//! `crate::testing`. Neither implementation rate limits or retries; that is
//! the job of `crate::client::CatalogClient`.

mod comicvine;
mod types;

pub use comicvine::ComicVineClient;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when talking to the remote catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed before a response was read.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The remote side says our quota is used up.
    #[error("API rate limit exceeded: {0}")]
    QuotaExceeded(String),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Non-success HTTP status.
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Transient transport failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The API answered but rejected the request (bad filter, bad key).
    #[error("Request rejected ({code}): {message}")]
    Rejected { code: u32, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Client not configured (missing API key, etc.).
    #[error("Client not configured: {0}")]
    NotConfigured(String),
}

/// How the retry layer treats a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Never retried: the limiter under-throttled and must not be masked.
    QuotaExceeded,
    /// Never retried: repeating the request cannot help.
    NonRecoverable,
    /// Retried up to the configured attempt count.
    Retryable,
    /// Logged and surfaced immediately.
    Unexpected,
}

impl CatalogError {
    pub fn class(&self) -> FailureClass {
        match self {
            CatalogError::QuotaExceeded(_) => FailureClass::QuotaExceeded,
            CatalogError::ApiError { status: 414, .. } => FailureClass::NonRecoverable,
            CatalogError::ApiError { .. }
            | CatalogError::NotFound(_)
            | CatalogError::Transport(_) => FailureClass::Retryable,
            CatalogError::HttpError(e) if e.is_decode() || e.is_builder() => {
                FailureClass::Unexpected
            }
            CatalogError::HttpError(_) => FailureClass::Retryable,
            CatalogError::Rejected { .. }
            | CatalogError::ParseError(_)
            | CatalogError::NotConfigured(_) => FailureClass::Unexpected,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound(_))
    }
}

/// Logical operations offered by a remote comic catalog.
#[async_trait]
pub trait ComicCatalog: Send + Sync {
    /// Fetch a volume by ID.
    async fn lookup_volume(&self, volume_id: u64) -> Result<Volume, CatalogError>;

    /// One page of the volumes whose metadata matches `query`.
    ///
    /// `page_size` is a request, implementations may return smaller pages.
    /// Callers keep `page_size` fixed while walking the pages of one search.
    async fn search_volumes(
        &self,
        query: &str,
        offset: usize,
        page_size: usize,
    ) -> Result<ResultPage<Volume>, CatalogError>;

    /// Fetch an issue by ID.
    ///
    /// `Ok(None)` means the issue exists but is not attached to a volume,
    /// which makes it useless as a candidate.
    async fn lookup_issue(&self, issue_id: u64) -> Result<Option<Issue>, CatalogError>;

    /// One page of the IDs of the issues matching the filter.
    async fn search_issue_ids(
        &self,
        filter: &IssueFilter,
        offset: usize,
    ) -> Result<ResultPage<u64>, CatalogError>;

    /// People whose name matches `name`.
    async fn search_people(&self, name: &str) -> Result<Vec<Person>, CatalogError>;

    /// Cover image URLs of an issue, best quality first.
    async fn lookup_issue_image_urls(&self, issue_id: u64) -> Result<Vec<String>, CatalogError>;
}
