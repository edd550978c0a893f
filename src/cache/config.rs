//! Cache configuration.
//!
//! Controls the bounded in-memory tier and the TTLs of both tiers via
//! `folio.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

// Default values for cache configuration
const DEFAULT_MEMORY_CAPACITY: usize = 100;
const DEFAULT_MEMORY_TTL: Duration = Duration::from_secs(10 * 60);
const DEFAULT_DISK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Resolved cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum entries held by the in-memory tier.
    pub memory_capacity: usize,
    /// Age after which an in-memory entry is treated as absent.
    pub memory_ttl: Duration,
    /// Age after which a durable entry is purged on read.
    pub disk_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            memory_ttl: DEFAULT_MEMORY_TTL,
            disk_ttl: DEFAULT_DISK_TTL,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            memory_capacity: settings.memory_capacity.get(),
            memory_ttl: settings.memory_ttl,
            disk_ttl: settings.disk_ttl,
        }
    }
}

impl CacheConfig {
    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub(crate) fn memory_ttl_span(&self) -> time::Duration {
        span(self.memory_ttl)
    }

    pub(crate) fn disk_ttl_span(&self) -> time::Duration {
        span(self.disk_ttl)
    }
}

fn span(duration: Duration) -> time::Duration {
    time::Duration::try_from(duration).unwrap_or(time::Duration::MAX)
}
