use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use folio::application::blog::BlogService;
use folio::application::error::PipelineError;
use folio::application::fetcher::ContentFetcher;
use folio::application::lister::ContentLister;
use folio::application::processor::PostProcessor;
use folio::application::remote::{
    ContentTransport, ListingEntry, ListingReply, RateLimit, TransportError,
};
use folio::application::render::{MarkdownRenderer, RenderError};
use folio::cache::{CacheConfig, CacheStore, LAST_KNOWN_GOOD_KEY, ManualClock, MemoryBackend};
use folio::domain::posts::Post;
use time::OffsetDateTime;
use time::macros::datetime;

const START: OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

struct EchoRenderer;

impl MarkdownRenderer for EchoRenderer {
    fn render(&self, markdown: &str) -> Result<String, RenderError> {
        Ok(format!("<p>{}</p>", markdown.trim()))
    }
}

#[derive(Clone)]
enum Listing {
    Files {
        entries: Vec<ListingEntry>,
        etag: String,
        rate_limit: RateLimit,
    },
    RateLimited(RateLimit),
    Unreachable,
}

/// Behaves like the contents API: answers `304` when the caller's ETag
/// matches the current listing.
struct FakeTransport {
    listing: Mutex<Listing>,
    bodies: Mutex<HashMap<String, String>>,
    downloads: Mutex<Vec<String>>,
    etags_seen: Mutex<Vec<Option<String>>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeTransport {
    fn new() -> Self {
        Self {
            listing: Mutex::new(Listing::Unreachable),
            bodies: Mutex::new(HashMap::new()),
            downloads: Mutex::new(Vec::new()),
            etags_seen: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Publish `files` as `(name, sha, body)`; a `None` body fails to download.
    fn publish(&self, etag: &str, files: &[(&str, &str, Option<&str>)]) {
        self.publish_with_budget(etag, files, RateLimit::default());
    }

    fn publish_with_budget(
        &self,
        etag: &str,
        files: &[(&str, &str, Option<&str>)],
        rate_limit: RateLimit,
    ) {
        let mut bodies = self.bodies.lock().expect("bodies");
        let entries = files
            .iter()
            .map(|(name, sha, body)| {
                let url = download_url(sha, name);
                if let Some(body) = body {
                    bodies.insert(url.clone(), (*body).to_string());
                }
                ListingEntry {
                    name: (*name).to_string(),
                    download_url: Some(url),
                    sha: (*sha).to_string(),
                    kind: "file".to_string(),
                }
            })
            .collect();

        *self.listing.lock().expect("listing") = Listing::Files {
            entries,
            etag: etag.to_string(),
            rate_limit,
        };
    }

    fn set_listing(&self, listing: Listing) {
        *self.listing.lock().expect("listing") = listing;
    }

    fn downloads(&self) -> Vec<String> {
        self.downloads.lock().expect("downloads").clone()
    }

    fn etags_seen(&self) -> Vec<Option<String>> {
        self.etags_seen.lock().expect("etags").clone()
    }
}

#[async_trait]
impl ContentTransport for FakeTransport {
    async fn list_directory(&self, etag: Option<&str>) -> Result<ListingReply, TransportError> {
        self.etags_seen
            .lock()
            .expect("etags")
            .push(etag.map(str::to_string));

        let listing = self.listing.lock().expect("listing").clone();
        match listing {
            Listing::Files {
                entries,
                etag: current,
                rate_limit,
            } => {
                if etag == Some(current.as_str()) {
                    Ok(ListingReply::NotModified { rate_limit })
                } else {
                    Ok(ListingReply::Listed {
                        entries,
                        etag: Some(current),
                        rate_limit,
                    })
                }
            }
            Listing::RateLimited(rate_limit) => Ok(ListingReply::RateLimited { rate_limit }),
            Listing::Unreachable => Err(TransportError::Request {
                url: "https://api.example/contents".to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }

    async fn download(&self, url: &str) -> Result<String, TransportError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.downloads
            .lock()
            .expect("downloads")
            .push(url.to_string());
        self.bodies
            .lock()
            .expect("bodies")
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

fn download_url(sha: &str, name: &str) -> String {
    format!("https://raw.example/{sha}/{name}")
}

fn article(title: &str, date: &str) -> String {
    format!("---\ntitle: {title}\nauthor: surus\ndate: {date}\n---\nBody of {title}.\n")
}

struct Harness {
    transport: Arc<FakeTransport>,
    clock: Arc<ManualClock>,
    cache: Arc<CacheStore>,
    blog: BlogService,
}

fn harness() -> Harness {
    build_harness(None)
}

fn harness_with_concurrency(max_concurrency: usize) -> Harness {
    build_harness(Some(max_concurrency))
}

fn build_harness(max_concurrency: Option<usize>) -> Harness {
    let transport = Arc::new(FakeTransport::new());
    let clock = Arc::new(ManualClock::new(START));
    let cache = Arc::new(CacheStore::new(
        CacheConfig::default(),
        Arc::new(MemoryBackend::new()),
        clock.clone(),
    ));

    let lister = ContentLister::new(transport.clone(), cache.clone(), clock.clone());
    let fetcher = ContentFetcher::new(transport.clone(), cache.clone());
    let processor = PostProcessor::new(Arc::new(EchoRenderer), clock.clone());
    let mut blog = BlogService::new(lister, fetcher, processor, cache.clone());
    if let Some(max) = max_concurrency {
        blog = blog.with_max_concurrency(max);
    }

    Harness {
        transport,
        clock,
        cache,
        blog,
    }
}

fn slugs(posts: &[Post]) -> Vec<&str> {
    posts.iter().map(|post| post.slug.as_str()).collect()
}

#[tokio::test]
async fn unchanged_hashes_are_never_downloaded_twice() {
    let h = harness();
    let a = article("Alpha", "2024-01-01");
    let b = article("Beta", "2024-02-01");
    h.transport.publish(
        "v1",
        &[
            ("alpha.md", "sha-a", Some(a.as_str())),
            ("beta.md", "sha-b", Some(b.as_str())),
        ],
    );
    h.blog.fetch_blog_posts().await.expect("first batch");
    assert_eq!(h.transport.downloads().len(), 2);

    let b2 = article("Beta Revised", "2024-02-01");
    h.transport.publish(
        "v2",
        &[
            ("alpha.md", "sha-a", Some(a.as_str())),
            ("beta.md", "sha-b2", Some(b2.as_str())),
        ],
    );
    let posts = h.blog.fetch_blog_posts().await.expect("second batch");

    assert_eq!(
        h.transport.downloads(),
        vec![
            download_url("sha-a", "alpha.md"),
            download_url("sha-b", "beta.md"),
            download_url("sha-b2", "beta.md"),
        ]
    );
    assert_eq!(slugs(&posts), vec!["beta-revised", "alpha"]);
}

#[tokio::test]
async fn unchanged_listing_is_served_from_the_aggregate() {
    let h = harness();
    let a = article("Alpha", "2024-01-01");
    h.transport.publish("v1", &[("alpha.md", "sha-a", Some(a.as_str()))]);

    let first = h.blog.fetch_blog_posts().await.expect("first batch");
    let second = h.blog.fetch_blog_posts().await.expect("second batch");

    assert_eq!(first, second);
    assert_eq!(h.transport.downloads().len(), 1);
    assert_eq!(
        h.transport.etags_seen(),
        vec![None, Some("v1".to_string())]
    );
    // Second run: listing and aggregate lookups hit. First run missed the
    // listing, the aggregate and the body.
    let stats = h.blog.cache_stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 3);
}

#[tokio::test]
async fn changed_hash_rebuilds_the_collection() {
    let h = harness();
    let alpha = article("Alpha", "2024-01-01");
    h.transport
        .publish("v1", &[("alpha.md", "sha-a", Some(alpha.as_str()))]);
    h.blog.fetch_blog_posts().await.expect("first batch");

    let alpha_two = article("Alpha Two", "2024-01-01");
    h.transport
        .publish("v2", &[("alpha.md", "sha-a2", Some(alpha_two.as_str()))]);
    let posts = h.blog.fetch_blog_posts().await.expect("second batch");

    assert_eq!(slugs(&posts), vec!["alpha-two"]);
    assert_eq!(posts[0].id, "sha-a2");
}

#[tokio::test]
async fn reordered_listing_reuses_the_aggregate() {
    let h = harness();
    let a = article("Alpha", "2024-01-01");
    let b = article("Beta", "2024-02-01");
    h.transport.publish(
        "v1",
        &[
            ("alpha.md", "sha-a", Some(a.as_str())),
            ("beta.md", "sha-b", Some(b.as_str())),
        ],
    );
    let first = h.blog.fetch_blog_posts().await.expect("first batch");

    h.transport.publish(
        "v2",
        &[
            ("beta.md", "sha-b", Some(b.as_str())),
            ("alpha.md", "sha-a", Some(a.as_str())),
        ],
    );
    let second = h.blog.fetch_blog_posts().await.expect("second batch");

    assert_eq!(first, second);
    assert_eq!(h.transport.downloads().len(), 2);
}

#[tokio::test]
async fn failing_files_are_left_out_of_the_batch() {
    let h = harness();
    let good = article("Good", "2024-01-01");
    let anonymous = "---\ntitle: Anonymous\ndate: 2024-01-02\n---\nNo author.\n";
    h.transport.publish(
        "v1",
        &[
            ("good.md", "sha-good", Some(good.as_str())),
            ("anonymous.md", "sha-anon", Some(anonymous)),
            ("missing.md", "sha-missing", None),
        ],
    );

    let posts = h.blog.fetch_blog_posts().await.expect("batch succeeds");

    assert_eq!(slugs(&posts), vec!["good"]);
}

#[tokio::test]
async fn one_malformed_file_drops_exactly_that_post_on_every_run() {
    let h = harness();
    let first = article("First", "2024-01-01");
    let second = article("Second", "2024-02-01");
    let fourth = article("Fourth", "2024-04-01");
    let malformed = "---
title: Third
author: surus
date: not-a-date
---
Broken.
";
    h.transport.publish(
        "v1",
        &[
            ("first.md", "sha-1", Some(first.as_str())),
            ("second.md", "sha-2", Some(second.as_str())),
            ("third.md", "sha-3", Some(malformed)),
            ("fourth.md", "sha-4", Some(fourth.as_str())),
        ],
    );

    let initial = h.blog.fetch_blog_posts().await.expect("first batch");
    assert_eq!(initial.len(), 3);
    assert!(!slugs(&initial).contains(&"third"));
    assert_eq!(slugs(&initial), vec!["fourth", "second", "first"]);

    let repeated = h.blog.fetch_blog_posts().await.expect("repeat from aggregate");
    assert_eq!(repeated, initial);

    // Aggregate and listing both expired: the batch is rebuilt from cached
    // bodies and fails the same file again.
    h.clock.advance(Duration::from_secs(86_400 + 1));
    let rebuilt = h.blog.fetch_blog_posts().await.expect("rebuilt batch");
    assert_eq!(slugs(&rebuilt), slugs(&initial));
    assert_eq!(rebuilt, initial);
    assert_eq!(h.transport.downloads().len(), 4);
}

#[tokio::test]
async fn posts_are_newest_first_with_ties_in_listing_order() {
    let h = harness();
    let older = article("Older", "2023-12-31");
    let tie_first = article("Tie First", "2024-03-01");
    let tie_second = article("Tie Second", "2024-03-01");
    let newest = article("Newest", "2024-05-20");
    h.transport.publish(
        "v1",
        &[
            ("older.md", "sha-1", Some(older.as_str())),
            ("tie-first.md", "sha-2", Some(tie_first.as_str())),
            ("tie-second.md", "sha-3", Some(tie_second.as_str())),
            ("newest.md", "sha-4", Some(newest.as_str())),
        ],
    );

    let posts = h.blog.fetch_blog_posts().await.expect("batch");

    assert_eq!(
        slugs(&posts),
        vec!["newest", "tie-first", "tie-second", "older"]
    );
}

#[tokio::test]
async fn non_markdown_entries_are_ignored() {
    let h = harness();
    let a = article("Alpha", "2024-01-01");
    h.transport.publish(
        "v1",
        &[
            ("alpha.md", "sha-a", Some(a.as_str())),
            ("cover.png", "sha-img", Some("binary")),
            ("README.txt", "sha-txt", Some("text")),
        ],
    );

    let posts = h.blog.fetch_blog_posts().await.expect("batch");

    assert_eq!(slugs(&posts), vec!["alpha"]);
    assert_eq!(h.transport.downloads(), vec![download_url("sha-a", "alpha.md")]);
}

#[tokio::test]
async fn exhausted_rate_limit_without_fallback_reports_the_wait() {
    let h = harness();
    h.transport.set_listing(Listing::RateLimited(RateLimit {
        remaining: Some(0),
        reset_at: Some(START + time::Duration::seconds(300)),
    }));

    let err = h.blog.fetch_blog_posts().await.expect_err("no fallback");

    match err {
        PipelineError::AggregateFetch(inner) => match *inner {
            PipelineError::RateLimit { wait } => assert_eq!(wait, Duration::from_secs(300)),
            other => panic!("unexpected inner error: {other}"),
        },
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.blog.lister().rate_limit().remaining, Some(0));
    assert!(h.transport.downloads().is_empty());
}

#[tokio::test]
async fn exhausted_rate_limit_serves_last_known_good() {
    let h = harness();
    let a = article("Alpha", "2024-01-01");
    h.transport.publish("v1", &[("alpha.md", "sha-a", Some(a.as_str()))]);
    let before = h.blog.fetch_blog_posts().await.expect("first batch");

    h.transport.set_listing(Listing::RateLimited(RateLimit {
        remaining: Some(0),
        reset_at: Some(START + time::Duration::seconds(300)),
    }));
    let after = h.blog.fetch_blog_posts().await.expect("served from fallback");

    assert_eq!(before, after);
}

#[tokio::test]
async fn unreachable_host_with_cold_cache_is_a_total_failure() {
    let h = harness();

    let err = h.blog.fetch_blog_posts().await.expect_err("nothing cached");

    match err {
        PipelineError::AggregateFetch(inner) => {
            assert!(matches!(*inner, PipelineError::Upstream(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unreachable_host_rebuilds_from_expired_caches() {
    let h = harness();
    let a = article("Alpha", "2024-01-01");
    h.transport.publish("v1", &[("alpha.md", "sha-a", Some(a.as_str()))]);
    let before = h.blog.fetch_blog_posts().await.expect("first batch");

    h.clock.advance(Duration::from_secs(2 * 86_400));
    h.transport.set_listing(Listing::Unreachable);
    let after = h.blog.fetch_blog_posts().await.expect("stale listing used");

    assert_eq!(before, after);
    assert_eq!(h.transport.downloads().len(), 1);
}

#[tokio::test]
async fn total_batch_failure_keeps_the_previous_fallback() {
    let h = harness();
    let a = article("Alpha", "2024-01-01");
    h.transport.publish("v1", &[("alpha.md", "sha-a", Some(a.as_str()))]);
    let good = h.blog.fetch_blog_posts().await.expect("first batch");

    h.transport.publish("v2", &[("broken.md", "sha-broken", None)]);
    let empty = h.blog.fetch_blog_posts().await.expect("batch with failures");
    assert!(empty.is_empty());

    let fallback = h
        .cache
        .get_stale::<Vec<Post>>(LAST_KNOWN_GOOD_KEY)
        .await
        .expect("fallback kept");
    assert_eq!(fallback.data, good);
}

#[tokio::test]
async fn invalidation_forces_a_full_refetch() {
    let h = harness();
    let a = article("Alpha", "2024-01-01");
    h.transport.publish("v1", &[("alpha.md", "sha-a", Some(a.as_str()))]);
    h.blog.fetch_blog_posts().await.expect("first batch");

    h.blog.invalidate_cache().await;
    h.blog.fetch_blog_posts().await.expect("second batch");

    assert_eq!(h.transport.downloads().len(), 2);
    assert_eq!(h.transport.etags_seen(), vec![None, None]);
}

#[tokio::test]
async fn concurrency_respects_remaining_rate_limit_budget() {
    let h = harness_with_concurrency(8);
    let bodies: Vec<String> = (0..5)
        .map(|i| article(&format!("Post {i}"), "2024-01-01"))
        .collect();
    let names: Vec<String> = (0..5).map(|i| format!("post-{i}.md")).collect();
    let shas: Vec<String> = (0..5).map(|i| format!("sha-{i}")).collect();
    let files: Vec<(&str, &str, Option<&str>)> = (0..5)
        .map(|i| (names[i].as_str(), shas[i].as_str(), Some(bodies[i].as_str())))
        .collect();

    h.transport.publish_with_budget(
        "v1",
        &files,
        RateLimit {
            remaining: Some(1),
            reset_at: None,
        },
    );
    let posts = h.blog.fetch_blog_posts().await.expect("batch");

    assert_eq!(posts.len(), 5);
    assert_eq!(h.transport.peak_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn downloads_overlap_when_budget_allows() {
    let h = harness_with_concurrency(4);
    let bodies: Vec<String> = (0..6)
        .map(|i| article(&format!("Post {i}"), "2024-01-01"))
        .collect();
    let names: Vec<String> = (0..6).map(|i| format!("post-{i}.md")).collect();
    let shas: Vec<String> = (0..6).map(|i| format!("sha-{i}")).collect();
    let files: Vec<(&str, &str, Option<&str>)> = (0..6)
        .map(|i| (names[i].as_str(), shas[i].as_str(), Some(bodies[i].as_str())))
        .collect();

    h.transport.publish("v1", &files);
    h.blog.fetch_blog_posts().await.expect("batch");

    let peak = h.transport.peak_in_flight.load(Ordering::SeqCst);
    assert!(peak > 1, "downloads ran sequentially");
    assert!(peak <= 4, "concurrency limit exceeded: {peak}");
}

#[tokio::test]
async fn without_a_cap_every_file_is_fetched_at_once() {
    let h = harness();
    let bodies: Vec<String> = (0..20)
        .map(|i| article(&format!("Post {i}"), "2024-01-01"))
        .collect();
    let names: Vec<String> = (0..20).map(|i| format!("post-{i}.md")).collect();
    let shas: Vec<String> = (0..20).map(|i| format!("sha-{i}")).collect();
    let files: Vec<(&str, &str, Option<&str>)> = (0..20)
        .map(|i| (names[i].as_str(), shas[i].as_str(), Some(bodies[i].as_str())))
        .collect();

    h.transport.publish_with_budget(
        "v1",
        &files,
        RateLimit {
            remaining: Some(4999),
            reset_at: None,
        },
    );
    let posts = h.blog.fetch_blog_posts().await.expect("batch");

    assert_eq!(posts.len(), 20);
    let peak = h.transport.peak_in_flight.load(Ordering::SeqCst);
    assert!(peak > 16, "fan-out was capped at {peak}");
}
