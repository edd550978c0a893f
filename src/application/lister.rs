//! Content directory listing with conditional revalidation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::gauge;
use tracing::{debug, info, warn};

use crate::application::error::PipelineError;
use crate::application::remote::{ContentTransport, ListingReply, RateLimit, TransportError};
use crate::cache::{CacheStore, Cached, Clock, LISTING_KEY, mutex_lock};
use crate::domain::files::RemoteFile;

const SOURCE: &str = "application::lister";
const METRIC_RATELIMIT_REMAINING: &str = "folio_upstream_ratelimit_remaining";

/// Lists markdown files in the content directory.
///
/// The cached listing's ETag is always sent so that an unchanged directory
/// costs a `304` instead of a full listing.
pub struct ContentLister {
    transport: Arc<dyn ContentTransport>,
    cache: Arc<CacheStore>,
    clock: Arc<dyn Clock>,
    rate_limit: Mutex<RateLimit>,
}

impl ContentLister {
    pub fn new(
        transport: Arc<dyn ContentTransport>,
        cache: Arc<CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            cache,
            clock,
            rate_limit: Mutex::new(RateLimit::default()),
        }
    }

    /// Last rate-limit budget reported by the host.
    pub fn rate_limit(&self) -> RateLimit {
        *mutex_lock(&self.rate_limit, SOURCE, "rate_limit")
    }

    pub async fn list_files(&self) -> Result<Vec<RemoteFile>, PipelineError> {
        let cached = self.cache.get_revalidatable::<Vec<RemoteFile>>(LISTING_KEY).await;
        let etag = cached
            .as_ref()
            .and_then(|cached| cached.revalidation_token.as_deref());

        let reply = match self.transport.list_directory(etag).await {
            Ok(reply) => reply,
            Err(err) => return self.fall_back(cached, err),
        };
        self.observe(reply.rate_limit());

        match reply {
            ListingReply::NotModified { .. } => match cached {
                Some(Cached {
                    data,
                    revalidation_token,
                }) => {
                    debug!(
                        target = SOURCE,
                        files = data.len(),
                        "listing not modified; reusing cached copy"
                    );
                    self.cache.set(LISTING_KEY, &data, revalidation_token).await;
                    Ok(data)
                }
                None => Err(PipelineError::Upstream(TransportError::Protocol(
                    "not-modified reply without a cached listing".to_string(),
                ))),
            },
            ListingReply::RateLimited { rate_limit } => {
                let wait = self.wait_until(rate_limit);
                warn!(
                    target = SOURCE,
                    wait_secs = wait.as_secs(),
                    "remote rate limit exhausted"
                );
                Err(PipelineError::RateLimit { wait })
            }
            ListingReply::Listed { entries, etag, .. } => {
                let files: Vec<RemoteFile> = entries
                    .iter()
                    .filter_map(|entry| {
                        RemoteFile::from_entry(
                            &entry.name,
                            &entry.kind,
                            entry.download_url.as_deref(),
                            &entry.sha,
                        )
                    })
                    .collect();

                info!(
                    target = SOURCE,
                    entries = entries.len(),
                    files = files.len(),
                    "listed content directory"
                );
                self.cache.set(LISTING_KEY, &files, etag).await;
                Ok(files)
            }
        }
    }

    fn fall_back(
        &self,
        cached: Option<Cached<Vec<RemoteFile>>>,
        err: TransportError,
    ) -> Result<Vec<RemoteFile>, PipelineError> {
        match cached {
            Some(cached) => {
                warn!(
                    target = SOURCE,
                    error = %err,
                    files = cached.data.len(),
                    "listing failed; serving cached listing"
                );
                Ok(cached.data)
            }
            None => Err(PipelineError::Upstream(err)),
        }
    }

    fn observe(&self, rate_limit: RateLimit) {
        if rate_limit.remaining.is_none() && rate_limit.reset_at.is_none() {
            return;
        }

        *mutex_lock(&self.rate_limit, SOURCE, "observe") = rate_limit;
        if let Some(remaining) = rate_limit.remaining {
            gauge!(METRIC_RATELIMIT_REMAINING).set(f64::from(remaining));
        }
        debug!(
            target = SOURCE,
            remaining = ?rate_limit.remaining,
            reset_at = ?rate_limit.reset_at,
            "remote rate limit budget"
        );
    }

    fn wait_until(&self, rate_limit: RateLimit) -> Duration {
        match rate_limit.reset_at {
            Some(reset_at) => {
                let wait = reset_at - self.clock.now();
                if wait.is_positive() {
                    wait.unsigned_abs()
                } else {
                    Duration::ZERO
                }
            }
            None => Duration::ZERO,
        }
    }
}
