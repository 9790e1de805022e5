//! Byte store subsystem
//!
//! A byte store is an ordered, gap-free, 0-indexed byte sequence that can grow
//! and shrink in the middle as well as at the end. Everything above it (the
//! chunk codec, the tag store, the caches) sees storage only through the
//! [`ByteStore`] trait.
//!
//! # Implementations
//!
//! - [`MemoryByteStore`]: growable buffer with page-aligned capacity
//! - [`FileByteStore`]: positioned reads/writes on a file, chunked shifting copies
//!
//! # Range conventions
//!
//! - `end` is exclusive
//! - reads clamp `end` to the current size
//! - writes may touch `[0, size]` only; a write starting past the end would leave a gap

mod file;
mod memory;
mod stream;

pub use file::{FileByteStore, DEFAULT_COPY_BUFFER};
pub use memory::{MemoryByteStore, DEFAULT_PAGE_SIZE};
pub use stream::ByteStream;

use crate::errors::{StoreError, StoreResult};

/// Default chunk size for streamed reads.
pub const DEFAULT_STREAM_CHUNK: usize = 64 * 1024;

/// Mutable, resizable byte sequence.
///
/// Reads take `&self`, mutations take `&mut self`. Implementations are not
/// required to serialize a mutation against a concurrent stream over the
/// same store.
pub trait ByteStore: Send + Sync {
    /// Current size in bytes.
    fn size(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Positioned read into `buf`. Returns the number of bytes copied, which
    /// is short only when the read reaches the end of the store.
    fn read_at(&self, start: u64, buf: &mut [u8]) -> StoreResult<usize>;

    /// Overwrites `[start, start + data.len())`, growing the store as needed.
    fn write(&mut self, start: u64, data: &[u8]) -> StoreResult<()>;

    /// Shifts bytes at and after `start` right by `data.len()` and writes
    /// `data` into the gap.
    fn insert(&mut self, start: u64, data: &[u8]) -> StoreResult<()>;

    /// Removes `[start, end)` and shifts the tail left.
    fn delete(&mut self, start: u64, end: u64) -> StoreResult<()>;

    /// Truncates the store to zero bytes.
    fn clear(&mut self) -> StoreResult<()>;

    /// Pushes written bytes to the backing resource.
    fn flush(&mut self) -> StoreResult<()>;

    /// Reads `[start, end)`, clamping `end` to the current size.
    fn read(&self, start: u64, end: u64) -> StoreResult<Vec<u8>> {
        let (start, end) = clamp_read_range(start, end, self.size())?;
        let mut buf = vec![0u8; (end - start) as usize];
        let n = self.read_at(start, &mut buf)?;
        if n != buf.len() {
            return Err(StoreError::storage(format!(
                "short read at {}: expected {} bytes, got {}",
                start,
                buf.len(),
                n
            )));
        }
        Ok(buf)
    }

    /// Equivalent to `write(size(), data)`.
    fn append(&mut self, data: &[u8]) -> StoreResult<()> {
        let size = self.size();
        self.write(size, data)
    }

    /// Lazy one-pass view over `[start, end)`, clamped like [`ByteStore::read`].
    fn stream(&self, start: u64, end: u64) -> StoreResult<ByteStream<'_>>
    where
        Self: Sized,
    {
        let (start, end) = clamp_read_range(start, end, self.size())?;
        Ok(ByteStream::new(self, start, end, DEFAULT_STREAM_CHUNK))
    }
}

/// Applies the read clamping rules and rejects negative lengths.
pub(crate) fn clamp_read_range(start: u64, end: u64, size: u64) -> StoreResult<(u64, u64)> {
    let end = end.min(size);
    if start > end {
        return Err(StoreError::InvalidRange { start, end });
    }
    Ok((start, end))
}

/// Rejects a write or insert that would leave a gap after the current end.
pub(crate) fn check_write_start(start: u64, size: u64) -> StoreResult<()> {
    if start > size {
        return Err(StoreError::IndexOutOfRange { index: start, size });
    }
    Ok(())
}

/// Validates a delete range against the current size.
pub(crate) fn check_delete_range(start: u64, end: u64, size: u64) -> StoreResult<()> {
    if end <= start {
        return Err(StoreError::InvalidRange { start, end });
    }
    if end > size {
        return Err(StoreError::IndexOutOfRange { index: end, size });
    }
    Ok(())
}
