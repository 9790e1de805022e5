//! Cache layers over a tag store
//!
//! Both layers implement [`crate::tagstore::TagStore`] and are stacked
//! explicitly by the caller:
//!
//! - [`PositionCache`]: remembers where each entry lives, so repeated lookups
//!   skip the linear scan. Owns its [`crate::tagstore::ChunkTagStore`] and
//!   must see every mutation of it.
//! - [`ValueCache`]: remembers decoded values in front of any tag store,
//!   including one shared with other writers. Stays correct against change
//!   notifications from those writers.
//!
//! Caches never add an error class of their own. When a cache cannot be
//! trusted (poisoned lock, failed mutation) it is dropped and the next read
//! goes to the wrapped store.

mod position;
mod value;

pub use position::{PositionCache, PositionEntries};
pub use value::{ValueCache, ValueCacheConfig};

/// Cache statistics.
///
/// Passive only: reading them never changes caching decisions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that went to the wrapped store.
    pub misses: u64,
    /// Linear scans over the wrapped store.
    pub scans: u64,
    /// Entries dropped to stay within budget.
    pub evictions: u64,
    /// Entries dropped because of an external change.
    pub invalidations: u64,
    /// Notifications recognised as echoes of local mutations.
    pub echoes: u64,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache, 0.0 when there were none.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
