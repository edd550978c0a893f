//! Folio Cache System
//!
//! Two-tier caching in front of the remote content API:
//!
//! - **Memory tier**: bounded LRU of recently used entries (default 10 min TTL)
//! - **Durable tier**: one JSON record per key (default 24 h TTL, purged on read)
//!
//! Content-addressed blobs are written with a permanent expiry and only
//! leave the memory tier by capacity.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `folio.toml`:
//!
//! ```toml
//! [cache]
//! directory = ".cache/blog"
//! memory_capacity = 100
//! memory_ttl_seconds = 600
//! disk_ttl_seconds = 86400
//! ```

mod backend;
mod clock;
mod config;
mod entry;
mod keys;
mod lock;
mod store;

pub use backend::{BackendError, DurableBackend, FsBackend, MemoryBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use entry::{CacheEntry, Cached, Expiry};
pub use keys::{LAST_KNOWN_GOOD_KEY, LISTING_KEY, aggregate_key, blob_key, sanitize_key};
pub use store::{CacheStats, CacheStore};

pub(crate) use lock::mutex_lock;
