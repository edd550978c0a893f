use std::sync::Arc;
use std::time::Duration;

use folio::cache::{
    CacheConfig, CacheStore, FsBackend, LAST_KNOWN_GOOD_KEY, ManualClock, blob_key,
};
use time::macros::datetime;

fn store(dir: &std::path::Path, clock: Arc<ManualClock>) -> CacheStore {
    CacheStore::new(
        CacheConfig::default(),
        Arc::new(FsBackend::new(dir)),
        clock,
    )
}

#[tokio::test]
async fn entries_survive_a_restart() {
    let dir = tempfile::tempdir().expect("temp dir");
    let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 12:00 UTC)));

    let before = store(dir.path(), clock.clone());
    before
        .set("github-file-list", &vec!["hola.md"], Some("\"v1\"".to_string()))
        .await;
    drop(before);

    let after = store(dir.path(), clock);
    let cached = after
        .get::<Vec<String>>("github-file-list")
        .await
        .expect("durable hit");

    assert_eq!(cached.data, vec!["hola.md".to_string()]);
    assert_eq!(cached.revalidation_token.as_deref(), Some("\"v1\""));
    assert_eq!(after.stats().hits, 1);
    assert_eq!(after.memory_len(), 1);
    assert!(dir.path().join("github-file-list.json").exists());
}

#[tokio::test]
async fn expired_durable_entries_are_purged_on_read() {
    let dir = tempfile::tempdir().expect("temp dir");
    let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 12:00 UTC)));

    store(dir.path(), clock.clone())
        .set("posts-abc", &vec![1, 2, 3], None)
        .await;
    clock.advance(Duration::from_secs(86_400 + 1));

    let fresh = store(dir.path(), clock);
    assert!(fresh.get::<Vec<u32>>("posts-abc").await.is_none());
    assert_eq!(fresh.stats().misses, 1);
    assert!(!dir.path().join("posts-abc.json").exists());
}

#[tokio::test]
async fn stale_reads_ignore_age() {
    let dir = tempfile::tempdir().expect("temp dir");
    let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 12:00 UTC)));

    store(dir.path(), clock.clone())
        .set(LAST_KNOWN_GOOD_KEY, &vec!["kept"], None)
        .await;
    clock.advance(Duration::from_secs(30 * 86_400));

    let fresh = store(dir.path(), clock);
    let stale = fresh
        .get_stale::<Vec<String>>(LAST_KNOWN_GOOD_KEY)
        .await
        .expect("stale copy");
    assert_eq!(stale.data, vec!["kept".to_string()]);
    assert_eq!(fresh.stats().hits, 0);
    assert_eq!(fresh.stats().misses, 0);
}

#[tokio::test]
async fn file_bodies_never_expire() {
    let dir = tempfile::tempdir().expect("temp dir");
    let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 12:00 UTC)));
    let key = blob_key("f00d");

    store(dir.path(), clock.clone())
        .set_permanent(&key, "---\nauthor: surus\n---\n")
        .await;
    clock.advance(Duration::from_secs(365 * 86_400));

    let fresh = store(dir.path(), clock);
    let cached = fresh.get::<String>(&key).await.expect("permanent entry");
    assert_eq!(cached.data, "---\nauthor: surus\n---\n");
}

#[tokio::test]
async fn corrupt_files_read_as_misses() {
    let dir = tempfile::tempdir().expect("temp dir");
    let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 12:00 UTC)));
    std::fs::write(dir.path().join("posts-broken.json"), b"{ not json").expect("write");

    let cache = store(dir.path(), clock);
    assert!(cache.get::<Vec<String>>("posts-broken").await.is_none());
    assert_eq!(cache.stats().misses, 1);

    cache.set("posts-broken", &vec!["repaired"], None).await;
    assert!(cache.get::<Vec<String>>("posts-broken").await.is_some());
}

#[tokio::test]
async fn clear_empties_both_tiers_but_leaves_foreign_files() {
    let dir = tempfile::tempdir().expect("temp dir");
    let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 12:00 UTC)));
    std::fs::write(dir.path().join("notes.txt"), b"keep me").expect("write");

    let cache = store(dir.path(), clock);
    cache.set("a", "1", None).await;
    cache.set_permanent("b", "2").await;
    cache.clear().await;

    assert_eq!(cache.memory_len(), 0);
    assert!(cache.get::<String>("a").await.is_none());
    assert!(cache.get::<String>("b").await.is_none());
    assert!(dir.path().join("notes.txt").exists());
}

#[tokio::test]
async fn keys_are_sanitized_into_file_names() {
    let dir = tempfile::tempdir().expect("temp dir");
    let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 12:00 UTC)));

    let cache = store(dir.path(), clock);
    cache.set("../escape/attempt", "x", None).await;

    assert!(dir.path().join("___escape_attempt.json").exists());
    assert_eq!(
        cache.get::<String>("../escape/attempt").await.map(|c| c.data),
        Some("x".to_string())
    );
}
