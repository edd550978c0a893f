//! Batch orchestration: listing, per-file fetch and processing, aggregate
//! caching and last-known-good fallback.

use std::sync::Arc;
use std::time::Instant;

use futures::{StreamExt, stream};
use metrics::histogram;
use tracing::{info, instrument, warn};

use crate::application::error::{PipelineError, error_chain};
use crate::application::fetcher::ContentFetcher;
use crate::application::lister::ContentLister;
use crate::application::processor::PostProcessor;
use crate::cache::{CacheStats, CacheStore, LAST_KNOWN_GOOD_KEY, aggregate_key};
use crate::domain::files::RemoteFile;
use crate::domain::posts::{Post, sort_newest_first};

const SOURCE: &str = "application::blog";
const METRIC_BATCH_MS: &str = "folio_batch_ms";

/// Entry point used by the rendering layer.
pub struct BlogService {
    lister: ContentLister,
    fetcher: ContentFetcher,
    processor: PostProcessor,
    cache: Arc<CacheStore>,
    max_concurrency: Option<usize>,
}

impl BlogService {
    pub fn new(
        lister: ContentLister,
        fetcher: ContentFetcher,
        processor: PostProcessor,
        cache: Arc<CacheStore>,
    ) -> Self {
        Self {
            lister,
            fetcher,
            processor,
            cache,
            max_concurrency: None,
        }
    }

    /// Caps parallel downloads below the remaining rate-limit budget.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency.max(1));
        self
    }

    pub fn lister(&self) -> &ContentLister {
        &self.lister
    }

    /// All valid posts, newest first.
    ///
    /// Files that fail to download or validate are logged and left out. When
    /// the listing itself fails the last successfully built collection is
    /// served instead.
    #[instrument(skip(self))]
    pub async fn fetch_blog_posts(&self) -> Result<Vec<Post>, PipelineError> {
        let files = match self.lister.list_files().await {
            Ok(files) => files,
            Err(err) => return self.fall_back(err).await,
        };

        let key = aggregate_key(files.iter().map(|file| file.sha.as_str()));
        if let Some(cached) = self.cache.get::<Vec<Post>>(&key).await {
            info!(
                target = SOURCE,
                posts = cached.data.len(),
                "serving cached post collection"
            );
            return Ok(cached.data);
        }

        let started_at = Instant::now();
        let limit = self.concurrency_limit();
        let total = files.len();

        let results: Vec<Result<Post, PipelineError>> = stream::iter(files.iter())
            .map(|file| self.build_post(file))
            .buffered(limit)
            .collect()
            .await;

        let mut posts = Vec::with_capacity(total);
        for (file, result) in files.iter().zip(results) {
            match result {
                Ok(post) => posts.push(post),
                Err(err) => warn!(
                    target = SOURCE,
                    file = %file.name,
                    error = %error_chain(&err).join(": "),
                    "skipping file"
                ),
            }
        }
        sort_newest_first(&mut posts);

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_BATCH_MS).record(elapsed_ms);
        info!(
            target = SOURCE,
            files = total,
            processed = posts.len(),
            failed = total - posts.len(),
            concurrency = limit,
            elapsed_ms,
            "built post collection"
        );

        self.cache.set(&key, &posts, None).await;
        if posts.is_empty() && total > 0 {
            warn!(
                target = SOURCE,
                "every file failed; keeping previous last-known-good collection"
            );
        } else {
            self.cache.set(LAST_KNOWN_GOOD_KEY, &posts, None).await;
        }

        Ok(posts)
    }

    /// Drop every cached entry in both tiers.
    pub async fn invalidate_cache(&self) {
        self.cache.clear().await;
        info!(target = SOURCE, "cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    async fn build_post(&self, file: &RemoteFile) -> Result<Post, PipelineError> {
        let raw = self.fetcher.fetch_content(file).await?;
        self.processor.process(&raw, file)
    }

    fn concurrency_limit(&self) -> usize {
        let budget = self
            .lister
            .rate_limit()
            .remaining
            .map(|remaining| usize::try_from(remaining).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        self.max_concurrency
            .map_or(budget, |max| max.min(budget))
            .max(1)
    }

    async fn fall_back(&self, err: PipelineError) -> Result<Vec<Post>, PipelineError> {
        match self.cache.get_stale::<Vec<Post>>(LAST_KNOWN_GOOD_KEY).await {
            Some(cached) => {
                warn!(
                    target = SOURCE,
                    error = %err,
                    posts = cached.data.len(),
                    "listing failed; serving last known good posts"
                );
                Ok(cached.data)
            }
            None => Err(PipelineError::AggregateFetch(Box::new(err))),
        }
    }
}
