//! Stored cache record shared by both tiers.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// How an entry ages out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expiry {
    /// Memory TTL in the fast tier, disk TTL in the durable tier.
    #[default]
    Tiered,
    /// Content-addressed data; never expires by age.
    Never,
}

/// A cached value with its write time and optional revalidation token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(rename = "etag", default, skip_serializing_if = "Option::is_none")]
    pub revalidation_token: Option<String>,
    #[serde(default)]
    pub expiry: Expiry,
}

impl CacheEntry {
    pub fn new(
        data: serde_json::Value,
        timestamp: OffsetDateTime,
        revalidation_token: Option<String>,
        expiry: Expiry,
    ) -> Self {
        Self {
            data,
            timestamp,
            revalidation_token,
            expiry,
        }
    }

    /// True when the entry is older than `ttl` at `now`.
    pub(crate) fn is_expired(&self, now: OffsetDateTime, ttl: time::Duration) -> bool {
        match self.expiry {
            Expiry::Never => false,
            Expiry::Tiered => now - self.timestamp > ttl,
        }
    }
}

/// A decoded cache hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub data: T,
    pub revalidation_token: Option<String>,
}
