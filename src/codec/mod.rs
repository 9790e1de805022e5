//! Length-indicator chunk codec
//!
//! Chunks are self-describing: a scan from offset 0 recovers every chunk
//! without an external index. The byte layout is fixed for interchange:
//!
//! ```text
//! [N: u8][length: N bytes, big-endian][payload: length bytes]
//! ```
//!
//! - `length`: pure encode/decode of the layout
//! - `format`: bytes vs UTF-8 payload interpretation
//! - `cursor`: sequential scanning, skipping, deletion and streaming over a byte store

mod cursor;
mod format;
mod length;

pub use cursor::{read_header, read_payload, ChunkCursor, ChunkHeader, Position, ScanPolicy};
pub use format::{ChunkFormat, RawBytes, Utf8};
pub use length::{
    decode_length, decode_slice, encode, encode_header, encode_into, encoded_len, header_len,
    length_bytes_needed, MAX_LENGTH_BYTES,
};
