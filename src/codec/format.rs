//! Chunk payload formats
//!
//! The codec is written once against [`ChunkFormat`] and instantiated for
//! raw bytes (values) and UTF-8 strings (tags).

use crate::errors::{StoreError, StoreResult};

/// How a chunk payload maps to a Rust value.
pub trait ChunkFormat {
    type Item;

    /// Borrow the payload bytes of an item.
    fn as_payload(item: &Self::Item) -> &[u8];

    /// Build an item from payload bytes read at `offset`.
    fn from_payload(bytes: Vec<u8>, offset: u64) -> StoreResult<Self::Item>;
}

/// Opaque byte payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytes;

impl ChunkFormat for RawBytes {
    type Item = Vec<u8>;

    fn as_payload(item: &Vec<u8>) -> &[u8] {
        item
    }

    fn from_payload(bytes: Vec<u8>, _offset: u64) -> StoreResult<Vec<u8>> {
        Ok(bytes)
    }
}

/// UTF-8 string payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8;

impl ChunkFormat for Utf8 {
    type Item = String;

    fn as_payload(item: &String) -> &[u8] {
        item.as_bytes()
    }

    fn from_payload(bytes: Vec<u8>, offset: u64) -> StoreResult<String> {
        String::from_utf8(bytes).map_err(|e| {
            StoreError::corruption_at_offset(offset, format!("tag is not valid UTF-8: {}", e))
        })
    }
}
