//! In-memory byte store
//!
//! Capacity grows and shrinks in whole pages so that a run of small appends
//! or deletes does not reallocate on every call. The buffer shrinks only when
//! less than a quarter of its capacity is in use.

use super::{check_delete_range, check_write_start, ByteStore};
use crate::errors::StoreResult;

/// Default growth granularity.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Growable in-memory buffer.
#[derive(Debug, Clone)]
pub struct MemoryByteStore {
    data: Vec<u8>,
    page_size: usize,
}

impl MemoryByteStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates a store whose capacity moves in multiples of `page_size`.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            data: Vec::new(),
            page_size: page_size.max(1),
        }
    }

    /// Creates a store holding a copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut store = Self::new();
        store.reserve_for(bytes.len());
        store.data.extend_from_slice(bytes);
        store
    }

    /// Current allocation, always a whole number of pages once non-empty.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Borrow the whole content.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn round_to_page(&self, len: usize) -> usize {
        len.div_ceil(self.page_size) * self.page_size
    }

    fn reserve_for(&mut self, new_len: usize) {
        if new_len > self.data.capacity() {
            let target = self.round_to_page(new_len);
            self.data.reserve_exact(target - self.data.len());
        }
    }

    fn maybe_shrink(&mut self) {
        let cap = self.data.capacity();
        if cap > self.page_size && self.data.len() < cap / 4 {
            let target = self.round_to_page((self.data.len() * 2).max(1));
            self.data.shrink_to(target);
        }
    }
}

impl Default for MemoryByteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteStore for MemoryByteStore {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, start: u64, buf: &mut [u8]) -> StoreResult<usize> {
        let len = self.data.len();
        let start = start as usize;
        if start >= len {
            return Ok(0);
        }
        let n = buf.len().min(len - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn write(&mut self, start: u64, data: &[u8]) -> StoreResult<()> {
        check_write_start(start, self.size())?;
        let start = start as usize;
        let end = start + data.len();
        if end > self.data.len() {
            self.reserve_for(end);
            let overlap = self.data.len() - start;
            self.data[start..].copy_from_slice(&data[..overlap]);
            self.data.extend_from_slice(&data[overlap..]);
        } else {
            self.data[start..end].copy_from_slice(data);
        }
        Ok(())
    }

    fn insert(&mut self, start: u64, data: &[u8]) -> StoreResult<()> {
        check_write_start(start, self.size())?;
        self.reserve_for(self.data.len() + data.len());
        let start = start as usize;
        self.data.splice(start..start, data.iter().copied());
        Ok(())
    }

    fn delete(&mut self, start: u64, end: u64) -> StoreResult<()> {
        check_delete_range(start, end, self.size())?;
        self.data.drain(start as usize..end as usize);
        self.maybe_shrink();
        Ok(())
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.data.clear();
        self.maybe_shrink();
        Ok(())
    }

    fn flush(&mut self) -> StoreResult<()> {
        Ok(())
    }
}
