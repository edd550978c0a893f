//! Cache key definitions.
//!
//! Keys are plain strings so that they double as durable file names. Every
//! key handed to the store is passed through [`sanitize_key`].

use sha2::{Digest, Sha256};

/// Cached directory listing of the content folder.
pub const LISTING_KEY: &str = "github-file-list";

/// Last successfully built post collection, read when upstream is unavailable.
pub const LAST_KNOWN_GOOD_KEY: &str = "posts-last-known-good";

const BLOB_PREFIX: &str = "github-file-";
const AGGREGATE_PREFIX: &str = "posts-";

/// Key for the raw body of a file with the given content hash.
pub fn blob_key(sha: &str) -> String {
    format!("{BLOB_PREFIX}{sha}")
}

/// Key for the post collection built from exactly this set of content hashes.
///
/// The hashes are sorted first, so listing order does not change the key.
pub fn aggregate_key<'a, I>(hashes: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut sorted: Vec<&str> = hashes.into_iter().collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(sorted.join("-").as_bytes());
    format!("{AGGREGATE_PREFIX}{}", hex::encode(hasher.finalize()))
}

/// Replace anything outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
