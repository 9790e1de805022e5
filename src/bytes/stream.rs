//! Streamed reads over a byte store
//!
//! A [`ByteStream`] delivers a fixed byte range lazily, one buffer at a time,
//! so large values never have to be materialized. It borrows the store it
//! reads from; mutating the store while a stream is alive is ruled out by the
//! borrow for in-process callers.

use std::io::{self, Read};

use super::ByteStore;
use crate::errors::{StoreError, StoreResult};

enum Source<'a> {
    Store {
        store: &'a dyn ByteStore,
        next: u64,
        end: u64,
    },
    Owned(io::Cursor<Vec<u8>>),
}

/// Finite, one-pass byte sequence.
pub struct ByteStream<'a> {
    source: Source<'a>,
    buf: Vec<u8>,
    buf_pos: usize,
    buf_len: usize,
    total: u64,
}

impl<'a> ByteStream<'a> {
    /// Stream `[start, end)` of `store`. The range must already be clamped.
    pub fn new(store: &'a dyn ByteStore, start: u64, end: u64, chunk_size: usize) -> Self {
        let chunk = chunk_size.max(1).min((end - start) as usize).max(1);
        Self {
            source: Source::Store {
                store,
                next: start,
                end,
            },
            buf: vec![0u8; chunk],
            buf_pos: 0,
            buf_len: 0,
            total: end - start,
        }
    }

    /// Stream over bytes that are already in memory.
    pub fn from_vec(bytes: Vec<u8>) -> ByteStream<'static> {
        let total = bytes.len() as u64;
        ByteStream {
            source: Source::Owned(io::Cursor::new(bytes)),
            buf: Vec::new(),
            buf_pos: 0,
            buf_len: 0,
            total,
        }
    }

    /// Total number of bytes this stream promises.
    pub fn len(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Bytes not yet delivered.
    pub fn remaining(&self) -> u64 {
        match &self.source {
            Source::Store { next, end, .. } => (end - next) + (self.buf_len - self.buf_pos) as u64,
            Source::Owned(cursor) => self.total - cursor.position(),
        }
    }

    /// Drains the rest of the stream into a vector.
    pub fn read_to_vec(mut self) -> StoreResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.remaining() as usize);
        self.read_to_end(&mut out).map_err(unwrap_store_error)?;
        Ok(out)
    }

    fn refill(&mut self) -> StoreResult<()> {
        if let Source::Store { store, next, end } = &mut self.source {
            if *next >= *end {
                self.buf_pos = 0;
                self.buf_len = 0;
                return Ok(());
            }
            let want = ((*end - *next) as usize).min(self.buf.len());
            let got = store.read_at(*next, &mut self.buf[..want])?;
            if got == 0 {
                return Err(StoreError::storage(format!(
                    "stream under-delivered: {} bytes promised at offset {}, store returned none",
                    *end - *next,
                    *next
                )));
            }
            *next += got as u64;
            self.buf_pos = 0;
            self.buf_len = got;
        }
        Ok(())
    }
}

impl Read for ByteStream<'_> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if let Source::Owned(cursor) = &mut self.source {
            return cursor.read(out);
        }
        if self.buf_pos == self.buf_len {
            self.refill()
                .map_err(|e| io::Error::new(io::ErrorKind::UnexpectedEof, e))?;
        }
        let n = (self.buf_len - self.buf_pos).min(out.len());
        out[..n].copy_from_slice(&self.buf[self.buf_pos..self.buf_pos + n]);
        self.buf_pos += n;
        Ok(n)
    }
}

impl std::fmt::Debug for ByteStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("total", &self.total)
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// Recovers a `StoreError` that was tunnelled through `io::Error`.
fn unwrap_store_error(e: io::Error) -> StoreError {
    if e.get_ref().map_or(false, |inner| inner.is::<StoreError>()) {
        if let Some(inner) = e.into_inner() {
            if let Ok(store_err) = inner.downcast::<StoreError>() {
                return *store_err;
            }
        }
        return StoreError::storage("stream failed");
    }
    StoreError::io("stream read failed", e)
}
