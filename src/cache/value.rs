//! Tag -> value cache in front of a shared tag store
//!
//! The wrapped store may be mutated by other clients, which report their
//! changes through [`ValueCache::remote_update`]. Those reports also arrive
//! for this client's own mutations (echoes), and an echo must not evict the
//! value the local mutation just cached.
//!
//! # Echo detection
//!
//! Every local `add`/`delete` raises a per-tag pending counter before it
//! runs. A notification for a tag with a pending unit consumes the unit and
//! is ignored; any other notification invalidates the tag. Mutations that
//! end up producing no notification (failed, or deleting a missing tag)
//! give their unit back.
//!
//! # Locking
//!
//! Cache contents and pending counters share one mutex. The delegate sits
//! behind its own `RwLock`; the cache mutex is never held while waiting for
//! the delegate, so notifications raised synchronously from inside a
//! delegate mutation cannot deadlock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use super::CacheStats;
use crate::bytes::ByteStream;
use crate::errors::{StoreError, StoreResult};
use crate::observability::{log_event_with_fields, Event};
use crate::tagstore::{ChangeEvent, ChangeListener, TagStore};

/// Size limits of a [`ValueCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCacheConfig {
    /// Upper bound on the sum of cached value sizes.
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: usize,

    /// Values larger than this are never cached.
    #[serde(default = "default_max_single_entry_bytes")]
    pub max_single_entry_bytes: usize,
}

fn default_max_total_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_max_single_entry_bytes() -> usize {
    1024 * 1024
}

impl Default for ValueCacheConfig {
    fn default() -> Self {
        Self {
            max_total_bytes: default_max_total_bytes(),
            max_single_entry_bytes: default_max_single_entry_bytes(),
        }
    }
}

impl ValueCacheConfig {
    pub fn new(max_total_bytes: usize, max_single_entry_bytes: usize) -> Self {
        Self {
            max_total_bytes,
            max_single_entry_bytes,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_single_entry_bytes > self.max_total_bytes {
            return Err(format!(
                "max_single_entry_bytes ({}) exceeds max_total_bytes ({})",
                self.max_single_entry_bytes, self.max_total_bytes
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct CachedValue {
    value: Vec<u8>,
    generation: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    values: HashMap<String, CachedValue>,
    /// Insertion order. Entries whose generation no longer matches `values`
    /// are stale and skipped.
    order: VecDeque<(String, u64)>,
    total_bytes: usize,
    next_generation: u64,
    pending: HashMap<String, u32>,
    /// Bumped whenever cached content may have gone stale; a miss only fills
    /// the cache if the epoch it started under is still current.
    epoch: u64,
    stats: CacheStats,
}

impl CacheState {
    fn remove(&mut self, tag: &str) -> bool {
        match self.values.remove(tag) {
            Some(cached) => {
                self.total_bytes -= cached.value.len();
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, tag: &str, value: Vec<u8>, config: &ValueCacheConfig) {
        self.remove(tag);
        if value.len() > config.max_single_entry_bytes || value.len() > config.max_total_bytes {
            return;
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.total_bytes += value.len();
        self.values
            .insert(tag.to_string(), CachedValue { value, generation });
        self.order.push_back((tag.to_string(), generation));

        while self.total_bytes > config.max_total_bytes {
            let Some((oldest, generation)) = self.order.pop_front() else {
                break;
            };
            if self
                .values
                .get(&oldest)
                .is_some_and(|c| c.generation == generation)
            {
                self.remove(&oldest);
                self.stats.evictions += 1;
                log_event_with_fields(Event::ValueCacheEvicted, &[("tag", &oldest)]);
            }
        }

        if self.order.len() > 2 * self.values.len() + 16 {
            let values = &self.values;
            self.order
                .retain(|(tag, generation)| values.get(tag).is_some_and(|c| c.generation == *generation));
        }
    }

    fn invalidate(&mut self, tag: &str) {
        self.epoch += 1;
        if self.remove(tag) {
            self.stats.invalidations += 1;
            log_event_with_fields(Event::ValueCacheInvalidated, &[("tag", tag)]);
        }
    }

    /// Raises the pending counter for `tag` and returns the current epoch.
    fn begin_local(&mut self, tag: &str) -> u64 {
        *self.pending.entry(tag.to_string()).or_insert(0) += 1;
        self.epoch
    }

    /// Drops `tag` after a local mutation, without counting an invalidation.
    fn forget(&mut self, tag: &str) {
        self.epoch += 1;
        self.remove(tag);
    }

    /// Takes one pending unit for `tag`. Returns whether there was one.
    fn take_pending(&mut self, tag: &str) -> bool {
        match self.pending.get_mut(tag) {
            Some(count) => {
                *count -= 1;
                if *count == 0 {
                    self.pending.remove(tag);
                }
                true
            }
            None => false,
        }
    }

    fn reset(&mut self) {
        self.values.clear();
        self.order.clear();
        self.total_bytes = 0;
        self.pending.clear();
        self.epoch += 1;
    }
}

/// Caches values of the wrapped store, bounded by a [`ValueCacheConfig`].
///
/// Internally synchronized: every operation takes `&self`, so the cache can
/// be shared between application threads and the thread delivering change
/// notifications. The [`TagStore`] impl exists for stacking.
#[derive(Debug)]
pub struct ValueCache<S: TagStore> {
    delegate: RwLock<S>,
    state: Mutex<CacheState>,
    config: ValueCacheConfig,
}

impl<S: TagStore> ValueCache<S> {
    pub fn new(delegate: S, config: ValueCacheConfig) -> StoreResult<Self> {
        config.validate().map_err(StoreError::invalid_argument)?;
        Ok(Self {
            delegate: RwLock::new(delegate),
            state: Mutex::new(CacheState::default()),
            config,
        })
    }

    pub fn config(&self) -> &ValueCacheConfig {
        &self.config
    }

    pub fn into_inner(self) -> S {
        self.delegate
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> CacheStats {
        self.lock_state().stats
    }

    /// Sum of the sizes of cached values.
    pub fn cached_bytes(&self) -> usize {
        self.lock_state().total_bytes
    }

    pub fn is_cached(&self, tag: &str) -> bool {
        self.lock_state().values.contains_key(tag)
    }

    /// Local mutations on `tag` whose notification has not arrived yet.
    pub fn pending_ops(&self, tag: &str) -> u32 {
        self.lock_state().pending.get(tag).copied().unwrap_or(0)
    }

    /// Applies a change reported by the wrapped store.
    pub fn remote_update(&self, event: &ChangeEvent) {
        let mut state = self.lock_state();
        match event {
            ChangeEvent::Added(tag) | ChangeEvent::Deleted(tag) => {
                if state.take_pending(tag) {
                    state.stats.echoes += 1;
                } else {
                    state.invalidate(tag);
                }
            }
            ChangeEvent::FullReset => {
                state.reset();
                log_event_with_fields(Event::ValueCacheReset, &[("reason", "remote")]);
            }
        }
    }

    /// Adds through the wrapped store and caches `value`, unless a change
    /// from elsewhere arrived while the store was being written.
    pub fn add(&self, tag: &str, value: &[u8]) -> StoreResult<bool> {
        let epoch = self.lock_state().begin_local(tag);
        let outcome = self.write_delegate().add(tag, value);

        let mut state = self.lock_state();
        match outcome {
            Ok(replaced) => {
                if state.epoch == epoch {
                    state.epoch += 1;
                    state.insert(tag, value.to_vec(), &self.config);
                } else {
                    state.forget(tag);
                }
                Ok(replaced)
            }
            Err(e) => {
                state.take_pending(tag);
                state.forget(tag);
                Err(e)
            }
        }
    }

    /// Appends without replacing. The value is not cached: a lookup resolves
    /// to the first entry for the tag, which may be an older one.
    pub fn add_nocheck(&self, tag: &str, value: &[u8]) -> StoreResult<()> {
        self.lock_state().begin_local(tag);
        let outcome = self.write_delegate().add_nocheck(tag, value);

        let mut state = self.lock_state();
        if outcome.is_err() {
            state.take_pending(tag);
        }
        state.forget(tag);
        outcome
    }

    pub fn delete(&self, tag: &str) -> StoreResult<Option<Vec<u8>>> {
        self.lock_state().begin_local(tag);
        let outcome = self.write_delegate().delete(tag);
        let removed = matches!(outcome, Ok(Some(_)));
        self.finish_delete(tag, removed);
        outcome
    }

    pub fn delete_noreturn(&self, tag: &str) -> StoreResult<bool> {
        self.lock_state().begin_local(tag);
        let outcome = self.write_delegate().delete_noreturn(tag);
        let removed = matches!(outcome, Ok(true));
        self.finish_delete(tag, removed);
        outcome
    }

    pub fn clear(&self) -> StoreResult<()> {
        let outcome = self.write_delegate().clear();
        self.reset_local("clear");
        outcome
    }

    pub fn import(&self, raw: &[u8]) -> StoreResult<()> {
        let outcome = self.write_delegate().import(raw);
        self.reset_local("import");
        outcome
    }

    fn finish_delete(&self, tag: &str, removed: bool) {
        let mut state = self.lock_state();
        if !removed {
            // no notification will follow
            state.take_pending(tag);
        }
        state.forget(tag);
    }

    fn reset_local(&self, reason: &str) {
        self.lock_state().reset();
        log_event_with_fields(Event::ValueCacheReset, &[("reason", reason)]);
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                let mut guard = poisoned.into_inner();
                guard.reset();
                self.state.clear_poison();
                guard
            }
        }
    }

    fn read_delegate(&self) -> RwLockReadGuard<'_, S> {
        self.delegate.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_delegate(&self) -> RwLockWriteGuard<'_, S> {
        self.delegate.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn cached(&self, tag: &str) -> Result<Vec<u8>, u64> {
        let mut state = self.lock_state();
        match state.values.get(tag).map(|c| c.value.clone()) {
            Some(value) => {
                state.stats.hits += 1;
                Ok(value)
            }
            None => {
                state.stats.misses += 1;
                Err(state.epoch)
            }
        }
    }

    fn lookup(&self, tag: &str) -> StoreResult<Option<Vec<u8>>> {
        let epoch = match self.cached(tag) {
            Ok(value) => return Ok(Some(value)),
            Err(epoch) => epoch,
        };
        let value = self.read_delegate().get(tag)?;
        if let Some(value) = &value {
            let mut state = self.lock_state();
            if state.epoch == epoch {
                state.insert(tag, value.clone(), &self.config);
            }
        }
        Ok(value)
    }
}

impl<S: TagStore> TagStore for ValueCache<S> {
    fn add(&mut self, tag: &str, value: &[u8]) -> StoreResult<bool> {
        ValueCache::add(self, tag, value)
    }

    fn add_nocheck(&mut self, tag: &str, value: &[u8]) -> StoreResult<()> {
        ValueCache::add_nocheck(self, tag, value)
    }

    fn get(&self, tag: &str) -> StoreResult<Option<Vec<u8>>> {
        self.lookup(tag)
    }

    /// Values are served from memory, so the stream owns its bytes.
    fn get_as_stream(&self, tag: &str) -> StoreResult<Option<ByteStream<'_>>> {
        Ok(self.lookup(tag)?.map(ByteStream::from_vec))
    }

    fn delete(&mut self, tag: &str) -> StoreResult<Option<Vec<u8>>> {
        ValueCache::delete(self, tag)
    }

    fn delete_noreturn(&mut self, tag: &str) -> StoreResult<bool> {
        ValueCache::delete_noreturn(self, tag)
    }

    fn exists(&self, tag: &str) -> StoreResult<bool> {
        if self.lock_state().values.contains_key(tag) {
            return Ok(true);
        }
        self.read_delegate().exists(tag)
    }

    fn tags(&self) -> StoreResult<Vec<String>> {
        self.read_delegate().tags()
    }

    fn length(&self) -> StoreResult<usize> {
        self.read_delegate().length()
    }

    fn clear(&mut self) -> StoreResult<()> {
        ValueCache::clear(self)
    }

    fn export(&self) -> StoreResult<Vec<u8>> {
        self.read_delegate().export()
    }

    fn import(&mut self, raw: &[u8]) -> StoreResult<()> {
        ValueCache::import(self, raw)
    }
}

impl<S: TagStore + Send + Sync> ChangeListener for ValueCache<S> {
    fn on_change(&self, event: &ChangeEvent) {
        self.remote_update(event);
    }
}
