//! Sequential chunk scanning
//!
//! A [`ChunkCursor`] walks a byte store chunk by chunk. It is a plain byte
//! offset plus a memory of the chunk it just passed; nothing tracks whether
//! another cursor has since mutated the store in front of it. Callers that
//! interleave cursors over one store must serialize them themselves.
//!
//! # End of scan
//!
//! A scan ends at the natural end of the store, and also when a length
//! indicator points past it. Under [`ScanPolicy::Lenient`] the second case is
//! indistinguishable from the first (a `SCAN_TRUNCATED` warning is logged);
//! under [`ScanPolicy::Strict`] it is a storage failure.

use serde::{Deserialize, Serialize};

use super::format::ChunkFormat;
use super::length::{decode_length, MAX_LENGTH_BYTES};
use crate::bytes::{ByteStore, ByteStream, DEFAULT_STREAM_CHUNK};
use crate::errors::{StoreError, StoreResult};
use crate::observability::{log_event_with_fields, Event};

/// What to do with a length indicator that points past the end of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPolicy {
    /// End the scan as if the store ended there.
    #[default]
    Lenient,
    /// Raise a storage failure.
    Strict,
}

/// Opaque byte offset into a chunk sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position(u64);

impl Position {
    /// Offset 0, the start of every scan.
    pub const START: Position = Position(0);

    pub fn at(offset: u64) -> Self {
        Position(offset)
    }

    pub fn offset(&self) -> u64 {
        self.0
    }
}

/// Decoded header of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Offset of the length-of-length byte.
    pub start: u64,
    /// Offset of the first payload byte.
    pub payload_start: u64,
    pub payload_len: u64,
}

impl ChunkHeader {
    /// Offset one past the last payload byte.
    pub fn end(&self) -> u64 {
        self.payload_start + self.payload_len
    }

    /// Encoded size of the whole chunk.
    pub fn total_len(&self) -> u64 {
        self.end() - self.start
    }
}

/// Reads the chunk header at `at`.
///
/// `Ok(None)` means the scan is over: either `at` is the end of the store or
/// (lenient policy) the header describes a chunk that does not fit.
pub fn read_header<S>(store: &S, at: u64, policy: ScanPolicy) -> StoreResult<Option<ChunkHeader>>
where
    S: ByteStore + ?Sized,
{
    let size = store.size();
    if at >= size {
        return Ok(None);
    }

    let mut n_buf = [0u8; 1];
    store.read_at(at, &mut n_buf)?;
    let n = n_buf[0];
    if n > MAX_LENGTH_BYTES {
        return malformed(
            at,
            size,
            policy,
            format!("length-of-length byte {} exceeds {}", n, MAX_LENGTH_BYTES),
        );
    }

    let payload_start = at + 1 + n as u64;
    if payload_start > size {
        return malformed(at, size, policy, "length indicator runs past end of store");
    }

    let mut len_buf = [0u8; MAX_LENGTH_BYTES as usize];
    let len_bytes = &mut len_buf[..n as usize];
    if !len_bytes.is_empty() {
        store.read_at(at + 1, len_bytes)?;
    }
    let payload_len = decode_length(len_bytes);

    match payload_start.checked_add(payload_len) {
        Some(end) if end <= size => Ok(Some(ChunkHeader {
            start: at,
            payload_start,
            payload_len,
        })),
        _ => malformed(
            at,
            size,
            policy,
            format!("chunk length {} runs past end of store", payload_len),
        ),
    }
}

fn malformed(
    at: u64,
    size: u64,
    policy: ScanPolicy,
    reason: impl Into<String>,
) -> StoreResult<Option<ChunkHeader>> {
    let reason = reason.into();
    match policy {
        ScanPolicy::Lenient => {
            let offset = at.to_string();
            let trailing = (size - at).to_string();
            log_event_with_fields(
                Event::ScanTruncated,
                &[
                    ("byte_offset", &offset),
                    ("reason", &reason),
                    ("trailing_bytes", &trailing),
                ],
            );
            Ok(None)
        }
        ScanPolicy::Strict => {
            let offset = at.to_string();
            log_event_with_fields(
                Event::ChunkCorruption,
                &[("byte_offset", &offset), ("reason", &reason)],
            );
            Err(StoreError::corruption_at_offset(at, reason))
        }
    }
}

/// Reads the payload described by `header`.
pub fn read_payload<S>(store: &S, header: &ChunkHeader) -> StoreResult<Vec<u8>>
where
    S: ByteStore + ?Sized,
{
    store.read(header.payload_start, header.end())
}

/// Forward-only cursor over a chunk sequence.
#[derive(Debug, Clone)]
pub struct ChunkCursor {
    pos: u64,
    last: Option<ChunkHeader>,
    policy: ScanPolicy,
}

impl ChunkCursor {
    /// Cursor at the start of the store.
    pub fn new(policy: ScanPolicy) -> Self {
        Self::at(Position::START, policy)
    }

    pub fn at(position: Position, policy: ScanPolicy) -> Self {
        Self {
            pos: position.0,
            last: None,
            policy,
        }
    }

    pub fn position(&self) -> Position {
        Position(self.pos)
    }

    pub fn policy(&self) -> ScanPolicy {
        self.policy
    }

    /// Moves the cursor and forgets the last chunk.
    pub fn seek(&mut self, position: Position) {
        self.pos = position.0;
        self.last = None;
    }

    /// Header of the chunk most recently passed, if any.
    pub fn last(&self) -> Option<ChunkHeader> {
        self.last
    }

    /// Advances past the next chunk and returns its header.
    pub fn next_header<S>(&mut self, store: &S) -> StoreResult<Option<ChunkHeader>>
    where
        S: ByteStore + ?Sized,
    {
        let header = read_header(store, self.pos, self.policy)?;
        if let Some(h) = header {
            self.pos = h.end();
        }
        self.last = header;
        Ok(header)
    }

    /// Decodes the next chunk through format `F`.
    pub fn decode<F, S>(&mut self, store: &S) -> StoreResult<Option<F::Item>>
    where
        F: ChunkFormat,
        S: ByteStore + ?Sized,
    {
        match self.next_header(store)? {
            Some(h) => {
                let bytes = read_payload(store, &h)?;
                F::from_payload(bytes, h.start).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Skips the next chunk, returning its payload length.
    pub fn skip<S>(&mut self, store: &S) -> StoreResult<Option<u64>>
    where
        S: ByteStore + ?Sized,
    {
        Ok(self.next_header(store)?.map(|h| h.payload_len))
    }

    /// Advances past the next chunk and returns a lazy view of its payload.
    pub fn stream<'a, S>(&mut self, store: &'a S) -> StoreResult<Option<ByteStream<'a>>>
    where
        S: ByteStore,
    {
        Ok(self.next_header(store)?.map(|h| {
            ByteStream::new(store, h.payload_start, h.end(), DEFAULT_STREAM_CHUNK)
        }))
    }

    /// Removes the chunk just passed and steps back to where it started.
    /// Returns the number of bytes removed.
    pub fn delete_last<S>(&mut self, store: &mut S) -> StoreResult<u64>
    where
        S: ByteStore + ?Sized,
    {
        let last = self
            .last
            .take()
            .ok_or_else(|| StoreError::invalid_argument("no chunk has been scanned"))?;
        if last.end() != self.pos {
            return Err(StoreError::invalid_argument(
                "cursor moved since the last chunk was scanned",
            ));
        }
        store.delete(last.start, last.end())?;
        self.pos = last.start;
        Ok(last.total_len())
    }

    /// Decodes the next chunk and removes it from the store.
    pub fn decode_and_delete<F, S>(&mut self, store: &mut S) -> StoreResult<Option<F::Item>>
    where
        F: ChunkFormat,
        S: ByteStore + ?Sized,
    {
        match self.decode::<F, S>(store)? {
            Some(item) => {
                self.delete_last(store)?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}
