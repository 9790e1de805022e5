//! Tag -> entry position cache
//!
//! After one full scan every lookup is a hash probe. Misses before that scan
//! cache every entry they pass, not only the one they were looking for.
//!
//! # Invariants
//!
//! - A cached `SearchResult` always matches the current byte layout: deletes
//!   shift every later cached entry left by the deleted entry's length.
//! - `fully_cached` means every live tag is in the index, so a miss is
//!   authoritative. Only a scan that ends cleanly at the end of the store
//!   sets it; a malformed tail leaves it clear.
//! - All mutations of the wrapped store go through this layer.
//!
//! Tags appended with `add_nocheck` may occur more than once. Lookups must
//! then resolve to the first occurrence, which the index cannot always prove
//! after a delete, so once duplicates are possible a delete clears
//! `fully_cached` and later misses rescan.
//!
//! `add` caches the position of the entry it appended only when the index is
//! complete and duplicate-free. Otherwise an unscanned older entry for the tag
//! could still shadow the new one, and the next lookup scans instead.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::CacheStats;
use crate::bytes::{ByteStore, ByteStream};
use crate::errors::StoreResult;
use crate::observability::{log_event_with_fields, Event};
use crate::tagstore::{
    ChangeEvent, ChunkTagStore, Entries, ScanControl, SearchResult, TagStore, VerifyReport,
};

#[derive(Debug, Default)]
struct PositionIndex {
    positions: HashMap<String, SearchResult>,
    fully_cached: bool,
    /// Set once a tag may occur more than once in the store.
    duplicates: bool,
    stats: CacheStats,
}

impl PositionIndex {
    fn reset(&mut self) {
        self.positions.clear();
        self.fully_cached = false;
        self.duplicates = false;
    }

    /// Records an entry met during a scan. The first occurrence wins.
    fn record_scanned(&mut self, tag: String, result: SearchResult) {
        match self.positions.get(&tag) {
            Some(known) if known.raw_start != result.raw_start => self.duplicates = true,
            Some(_) => {}
            None => {
                self.positions.insert(tag, result);
            }
        }
    }

    /// Records an entry appended by `add`, after any previous entry for the
    /// tag was removed.
    ///
    /// Only a complete, duplicate-free index proves that no older entry for
    /// the tag remains ahead of the new one.
    fn record_added(&mut self, tag: &str, result: SearchResult) {
        if self.duplicates {
            self.fully_cached = false;
        } else if self.fully_cached {
            self.positions.insert(tag.to_string(), result);
        }
    }

    fn record_appended_nocheck(&mut self, tag: &str, result: SearchResult) {
        if self.fully_cached && !self.positions.contains_key(tag) {
            self.positions.insert(tag.to_string(), result);
        } else {
            self.duplicates = true;
        }
    }

    /// Forgets a removed entry and shifts every later entry left.
    fn record_removed(&mut self, tag: &str, removed: &SearchResult) {
        if self
            .positions
            .get(tag)
            .is_some_and(|r| r.raw_start == removed.raw_start)
        {
            self.positions.remove(tag);
        }
        let by = removed.entry_len();
        for result in self.positions.values_mut() {
            if result.raw_start > removed.raw_start {
                *result = result.shifted_left(by);
            }
        }
        if self.duplicates {
            self.fully_cached = false;
        }
    }
}

/// Unlocks the index for a mutation. A poisoned index is discarded.
fn index_mut(index: &mut Mutex<PositionIndex>) -> &mut PositionIndex {
    let poisoned = index.is_poisoned();
    if poisoned {
        index.clear_poison();
    }
    let inner = index.get_mut().unwrap_or_else(PoisonError::into_inner);
    if poisoned {
        inner.reset();
    }
    inner
}

/// A [`ChunkTagStore`] with a tag -> position index in front of it.
///
/// Reads take `&self`; the index sits behind a mutex only so that reads can
/// fill it.
#[derive(Debug)]
pub struct PositionCache<B: ByteStore> {
    store: ChunkTagStore<B>,
    index: Mutex<PositionIndex>,
}

impl<B: ByteStore> PositionCache<B> {
    pub fn new(store: ChunkTagStore<B>) -> Self {
        Self {
            store,
            index: Mutex::new(PositionIndex::default()),
        }
    }

    pub fn store(&self) -> &ChunkTagStore<B> {
        &self.store
    }

    pub fn into_inner(self) -> ChunkTagStore<B> {
        self.store
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Whether a full scan has completed since the last reset.
    pub fn is_fully_cached(&self) -> bool {
        self.lock().fully_cached
    }

    /// Number of tags with a cached position.
    pub fn cached_len(&self) -> usize {
        self.lock().positions.len()
    }

    pub fn flush(&mut self) -> StoreResult<()> {
        self.store.flush()
    }

    pub fn verify(&self) -> StoreResult<VerifyReport> {
        self.store.verify()
    }

    /// Iterator over entries that keeps the index in step with removals.
    pub fn entries(&mut self) -> PositionEntries<'_, B> {
        PositionEntries {
            inner: self.store.entries(),
            index: index_mut(&mut self.index),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PositionIndex> {
        match self.index.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                let mut guard = poisoned.into_inner();
                guard.reset();
                self.index.clear_poison();
                guard
            }
        }
    }

    /// Finds the entry for `tag`, scanning and caching on a miss.
    fn locate(&self, tag: &str) -> StoreResult<Option<SearchResult>> {
        let mut index = self.lock();
        if let Some(result) = index.positions.get(tag).copied() {
            index.stats.hits += 1;
            return Ok(Some(result));
        }
        index.stats.misses += 1;
        if index.fully_cached {
            return Ok(None);
        }

        index.stats.scans += 1;
        let mut found = None;
        let reached_end = self.store.scan(|scanned, result| {
            let hit = scanned == tag;
            index.record_scanned(scanned, result);
            if hit {
                found = Some(result);
                ScanControl::Stop
            } else {
                ScanControl::Continue
            }
        })?;
        if reached_end {
            index.fully_cached = true;
        }
        Ok(found)
    }

    /// Completes a full scan if the index is not already complete.
    fn fill(&self) -> StoreResult<MutexGuard<'_, PositionIndex>> {
        let mut index = self.lock();
        if !index.fully_cached {
            index.stats.scans += 1;
            let reached_end = self.store.scan(|tag, result| {
                index.record_scanned(tag, result);
                ScanControl::Continue
            })?;
            index.fully_cached = reached_end;
        }
        Ok(index)
    }

    fn reset(&mut self, reason: &str) {
        index_mut(&mut self.index).reset();
        log_event_with_fields(Event::PositionCacheReset, &[("reason", reason)]);
    }

    fn remove(&mut self, tag: &str, result: &SearchResult) -> StoreResult<()> {
        self.store.remove_entry(result)?;
        index_mut(&mut self.index).record_removed(tag, result);
        Ok(())
    }
}

impl<B: ByteStore> TagStore for PositionCache<B> {
    fn add(&mut self, tag: &str, value: &[u8]) -> StoreResult<bool> {
        let replaced = match self.locate(tag)? {
            Some(existing) => {
                self.remove(tag, &existing)?;
                true
            }
            None => false,
        };
        let result = self.store.append_entry(tag, value)?;
        index_mut(&mut self.index).record_added(tag, result);
        self.store.notify(ChangeEvent::Added(tag.to_string()));
        Ok(replaced)
    }

    fn add_nocheck(&mut self, tag: &str, value: &[u8]) -> StoreResult<()> {
        let result = self.store.append_entry(tag, value)?;
        index_mut(&mut self.index).record_appended_nocheck(tag, result);
        self.store.notify(ChangeEvent::Added(tag.to_string()));
        Ok(())
    }

    fn get(&self, tag: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.locate(tag)? {
            Some(result) => self.store.read_value(&result).map(Some),
            None => Ok(None),
        }
    }

    fn get_as_stream(&self, tag: &str) -> StoreResult<Option<ByteStream<'_>>> {
        match self.locate(tag)? {
            Some(result) => self.store.stream_value(&result).map(Some),
            None => Ok(None),
        }
    }

    fn delete(&mut self, tag: &str) -> StoreResult<Option<Vec<u8>>> {
        let result = match self.locate(tag)? {
            Some(r) => r,
            None => return Ok(None),
        };
        let value = self.store.read_value(&result)?;
        self.remove(tag, &result)?;
        self.store.notify(ChangeEvent::Deleted(tag.to_string()));
        Ok(Some(value))
    }

    fn delete_noreturn(&mut self, tag: &str) -> StoreResult<bool> {
        let result = match self.locate(tag)? {
            Some(r) => r,
            None => return Ok(false),
        };
        self.remove(tag, &result)?;
        self.store.notify(ChangeEvent::Deleted(tag.to_string()));
        Ok(true)
    }

    fn exists(&self, tag: &str) -> StoreResult<bool> {
        Ok(self.locate(tag)?.is_some())
    }

    fn tags(&self) -> StoreResult<Vec<String>> {
        let index = self.fill()?;
        if index.duplicates {
            drop(index);
            return self.store.tags();
        }
        let mut entries: Vec<_> = index.positions.iter().collect();
        entries.sort_by_key(|(_, r)| r.raw_start);
        Ok(entries.into_iter().map(|(tag, _)| tag.clone()).collect())
    }

    fn length(&self) -> StoreResult<usize> {
        let index = self.fill()?;
        if index.duplicates {
            drop(index);
            return self.store.length();
        }
        Ok(index.positions.len())
    }

    fn clear(&mut self) -> StoreResult<()> {
        let outcome = self.store.clear();
        self.reset("clear");
        outcome
    }

    fn export(&self) -> StoreResult<Vec<u8>> {
        self.store.export()
    }

    fn import(&mut self, raw: &[u8]) -> StoreResult<()> {
        let outcome = self.store.import(raw);
        self.reset("import");
        outcome
    }
}

/// [`Entries`] over a [`PositionCache`]; removals shift cached positions.
pub struct PositionEntries<'a, B: ByteStore> {
    inner: Entries<'a, B>,
    index: &'a mut PositionIndex,
}

impl<B: ByteStore> PositionEntries<'_, B> {
    pub fn next_entry(&mut self) -> StoreResult<Option<(String, Vec<u8>)>> {
        self.inner.next_entry()
    }

    pub fn current(&self) -> Option<&SearchResult> {
        self.inner.current()
    }

    pub fn remove_current(&mut self) -> StoreResult<(String, SearchResult)> {
        let (tag, result) = self.inner.remove_current()?;
        self.index.record_removed(&tag, &result);
        Ok((tag, result))
    }

    pub fn restart(&mut self) {
        self.inner.restart();
    }
}

impl<B: ByteStore> Iterator for PositionEntries<'_, B> {
    type Item = StoreResult<(String, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
