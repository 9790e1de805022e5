//! Entry iteration with in-place removal

use super::chunk_store::ChunkTagStore;
use super::observer::ChangeEvent;
use super::SearchResult;
use crate::bytes::ByteStore;
use crate::codec::{ChunkCursor, Position};
use crate::errors::{StoreError, StoreResult};

/// Lazy, one-pass iterator over `(tag, value)` pairs in insertion order.
///
/// [`Entries::remove_current`] deletes the entry most recently returned and
/// leaves the cursor at the entry that followed it, so the scan carries on
/// without skipping anything.
pub struct Entries<'a, B: ByteStore> {
    store: &'a mut ChunkTagStore<B>,
    cursor: ChunkCursor,
    current: Option<(String, SearchResult)>,
    failed: bool,
}

impl<'a, B: ByteStore> Entries<'a, B> {
    pub(crate) fn new(store: &'a mut ChunkTagStore<B>) -> Self {
        let cursor = ChunkCursor::new(store.policy());
        Self {
            store,
            cursor,
            current: None,
            failed: false,
        }
    }

    /// Advances to the next entry and returns its tag and value.
    pub fn next_entry(&mut self) -> StoreResult<Option<(String, Vec<u8>)>> {
        self.current = None;
        match self.store.next_entry(&mut self.cursor)? {
            Some((tag, result)) => {
                let value = self.store.read_value(&result)?;
                self.current = Some((tag.clone(), result));
                Ok(Some((tag, value)))
            }
            None => Ok(None),
        }
    }

    /// Position of the entry most recently returned.
    pub fn current(&self) -> Option<&SearchResult> {
        self.current.as_ref().map(|(_, r)| r)
    }

    /// Removes the entry most recently returned.
    ///
    /// Returns its former position so that callers keeping positions of
    /// later entries can shift them.
    pub fn remove_current(&mut self) -> StoreResult<(String, SearchResult)> {
        let (tag, result) = self
            .current
            .take()
            .ok_or_else(|| StoreError::invalid_argument("no current entry to remove"))?;
        self.store.remove_entry(&result)?;
        self.cursor.seek(Position::at(result.raw_start));
        self.store.notify(ChangeEvent::Deleted(tag.clone()));
        Ok((tag, result))
    }

    /// Starts over from the first entry.
    pub fn restart(&mut self) {
        self.cursor.seek(Position::START);
        self.current = None;
        self.failed = false;
    }
}

impl<B: ByteStore> Iterator for Entries<'_, B> {
    type Item = StoreResult<(String, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
