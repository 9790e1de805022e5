//! Tag store subsystem
//!
//! A tag store is an append-only sequence of entries, each entry being two
//! chunks: the tag (UTF-8) followed by the value (opaque bytes).
//!
//! ```text
//! +-----------+-------------+-----------+-------------+
//! | LI(tag 1) | LI(value 1) | LI(tag 2) | LI(value 2) | ...
//! +-----------+-------------+-----------+-------------+
//! ```
//!
//! No header, magic number or footer: the exported form of a store is exactly
//! these bytes.
//!
//! # Layers
//!
//! Every layer implements [`TagStore`], so layers compose explicitly at
//! construction time:
//!
//! - [`ChunkTagStore`]: linear scans over a byte store
//! - [`crate::cache::PositionCache`]: tag -> byte range cache over a `ChunkTagStore`
//! - [`crate::cache::ValueCache`]: tag -> value cache over any `TagStore`
//!
//! # Invariants
//!
//! - At most one live entry per tag when `add` is used (`add_nocheck` trusts the caller)
//! - Entries keep insertion order; deletion closes the gap

mod chunk_store;
mod entries;
mod observer;

pub use chunk_store::{ChunkTagStore, ScanControl, VerifyReport};
pub use entries::Entries;
pub use observer::{ChangeEvent, ChangeListener, Listeners};

use crate::bytes::ByteStream;
use crate::errors::StoreResult;

/// Byte offsets of one entry.
///
/// `raw_start` is where the tag chunk begins, `entry_start..entry_end` is the
/// value chunk (header included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchResult {
    pub raw_start: u64,
    pub entry_start: u64,
    pub entry_end: u64,
}

impl SearchResult {
    pub fn new(raw_start: u64, entry_start: u64, entry_end: u64) -> Self {
        debug_assert!(raw_start <= entry_start && entry_start <= entry_end);
        Self {
            raw_start,
            entry_start,
            entry_end,
        }
    }

    /// Bytes occupied by the whole entry (tag chunk plus value chunk).
    pub fn entry_len(&self) -> u64 {
        self.entry_end - self.raw_start
    }

    /// The same entry after `by` bytes in front of it were removed.
    pub fn shifted_left(&self, by: u64) -> Self {
        Self {
            raw_start: self.raw_start - by,
            entry_start: self.entry_start - by,
            entry_end: self.entry_end - by,
        }
    }
}

/// Operations shared by every store layer.
///
/// Reads take `&self` and may run concurrently with each other; mutations
/// take `&mut self`.
pub trait TagStore {
    /// Replaces any entry for `tag`, then appends. Returns whether an entry
    /// was replaced.
    fn add(&mut self, tag: &str, value: &[u8]) -> StoreResult<bool>;

    /// Appends without checking for an existing entry.
    fn add_nocheck(&mut self, tag: &str, value: &[u8]) -> StoreResult<()>;

    fn get(&self, tag: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Lazy view of the value for `tag`.
    fn get_as_stream(&self, tag: &str) -> StoreResult<Option<ByteStream<'_>>>;

    /// Removes the entry for `tag`, returning its value.
    fn delete(&mut self, tag: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Removes the entry for `tag`. Returns whether one existed.
    fn delete_noreturn(&mut self, tag: &str) -> StoreResult<bool>;

    fn exists(&self, tag: &str) -> StoreResult<bool>;

    /// Live tags in insertion order.
    fn tags(&self) -> StoreResult<Vec<String>>;

    /// Number of live entries.
    fn length(&self) -> StoreResult<usize>;

    /// Removes every entry.
    fn clear(&mut self) -> StoreResult<()>;

    /// The raw chunk sequence.
    fn export(&self) -> StoreResult<Vec<u8>>;

    /// Replaces the whole content with a raw chunk sequence.
    fn import(&mut self, raw: &[u8]) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_result_shift() {
        let r = SearchResult::new(10, 14, 20);
        assert_eq!(r.entry_len(), 10);
        assert_eq!(r.shifted_left(4), SearchResult::new(6, 10, 16));
    }
}
