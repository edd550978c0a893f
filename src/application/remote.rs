//! Seam between the pipeline and the remote content host.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;

/// Rate-limit budget reported by the last response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests left in the current window; `None` when not reported.
    pub remaining: Option<u32>,
    /// When the window resets.
    pub reset_at: Option<OffsetDateTime>,
}

impl RateLimit {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// A raw directory entry as listed by the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListingEntry {
    pub name: String,
    #[serde(default)]
    pub download_url: Option<String>,
    pub sha: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Outcome of a conditional directory listing.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingReply {
    /// The revalidation token still matches.
    NotModified { rate_limit: RateLimit },
    /// The request budget is spent; nothing was read.
    RateLimited { rate_limit: RateLimit },
    Listed {
        entries: Vec<ListingEntry>,
        etag: Option<String>,
        rate_limit: RateLimit,
    },
}

impl ListingReply {
    pub fn rate_limit(&self) -> RateLimit {
        match self {
            ListingReply::NotModified { rate_limit }
            | ListingReply::RateLimited { rate_limit }
            | ListingReply::Listed { rate_limit, .. } => *rate_limit,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to `{url}` failed: {message}")]
    Request { url: String, message: String },
    #[error("request to `{url}` timed out")]
    Timeout { url: String },
    #[error("`{url}` answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("response from `{url}` could not be decoded: {message}")]
    Decode { url: String, message: String },
    #[error("transport misconfigured: {0}")]
    Protocol(String),
}

/// Remote host of the content directory.
#[async_trait]
pub trait ContentTransport: Send + Sync {
    /// List the content directory, revalidating against `etag` when given.
    async fn list_directory(&self, etag: Option<&str>) -> Result<ListingReply, TransportError>;

    /// Download a file body.
    async fn download(&self, url: &str) -> Result<String, TransportError>;
}
