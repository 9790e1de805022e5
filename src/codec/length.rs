//! Length-indicator chunk layout
//!
//! ```text
//! +---------+---------------------------+-------------------+
//! | N (u8)  | length (N bytes, BE)      | payload (length)  |
//! +---------+---------------------------+-------------------+
//! ```
//!
//! N is the minimal number of bytes that can represent the length, so an
//! empty payload is the single byte `0x00`. Lengths fit in a u64, hence N <= 8.

/// Largest length-of-length value that can describe a u64 length.
pub const MAX_LENGTH_BYTES: u8 = 8;

/// Minimal number of big-endian bytes needed for `len` (0 for 0).
pub fn length_bytes_needed(len: u64) -> u8 {
    ((64 - len.leading_zeros()).div_ceil(8)) as u8
}

/// Size of the header (length-of-length byte plus length bytes).
pub fn header_len(payload_len: u64) -> u64 {
    1 + length_bytes_needed(payload_len) as u64
}

/// Total encoded size of a chunk carrying `payload_len` bytes.
pub fn encoded_len(payload_len: u64) -> u64 {
    header_len(payload_len) + payload_len
}

/// Encodes only the header for a payload of `payload_len` bytes.
pub fn encode_header(payload_len: u64) -> Vec<u8> {
    let n = length_bytes_needed(payload_len) as usize;
    let mut out = Vec::with_capacity(1 + n);
    out.push(n as u8);
    out.extend_from_slice(&payload_len.to_be_bytes()[8 - n..]);
    out
}

/// Encodes a complete chunk.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = encode_header(payload.len() as u64);
    out.reserve(payload.len());
    out.extend_from_slice(payload);
    out
}

/// Appends an encoded chunk to `out`.
pub fn encode_into(out: &mut Vec<u8>, payload: &[u8]) {
    out.extend_from_slice(&encode_header(payload.len() as u64));
    out.extend_from_slice(payload);
}

/// Interprets up to eight big-endian bytes as a length.
pub fn decode_length(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

/// Decodes one chunk from the front of an in-memory buffer.
///
/// Returns the payload and the number of bytes consumed, or `None` when the
/// buffer ends before the chunk does.
pub fn decode_slice(buf: &[u8]) -> Option<(&[u8], usize)> {
    let n = *buf.first()? as usize;
    if n > MAX_LENGTH_BYTES as usize || buf.len() < 1 + n {
        return None;
    }
    let len = decode_length(&buf[1..1 + n]);
    let start = 1 + n;
    let end = (start as u64).checked_add(len)?;
    if end > buf.len() as u64 {
        return None;
    }
    Some((&buf[start..end as usize], end as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_bytes_needed_boundaries() {
        assert_eq!(length_bytes_needed(0), 0);
        assert_eq!(length_bytes_needed(1), 1);
        assert_eq!(length_bytes_needed(255), 1);
        assert_eq!(length_bytes_needed(256), 2);
        assert_eq!(length_bytes_needed(65535), 2);
        assert_eq!(length_bytes_needed(65536), 3);
        assert_eq!(length_bytes_needed(u64::MAX), 8);
    }

    #[test]
    fn test_empty_payload_is_single_zero_byte() {
        assert_eq!(encode(&[]), vec![0u8]);
    }

    #[test]
    fn test_header_is_big_endian() {
        assert_eq!(encode_header(0x0102), vec![2, 0x01, 0x02]);
        assert_eq!(encode_header(0x010000), vec![3, 0x01, 0x00, 0x00]);
        assert_eq!(encode(&[0xAA]), vec![1, 1, 0xAA]);
    }

    #[test]
    fn test_decode_crosses_length_byte_boundaries() {
        for len in [0usize, 1, 255, 256, 65535, 65536] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let chunk = encode(&payload);
            assert_eq!(chunk.len() as u64, encoded_len(len as u64));
            let (decoded, consumed) = decode_slice(&chunk).unwrap();
            assert_eq!(decoded, payload.as_slice());
            assert_eq!(consumed, chunk.len());
        }
    }

    #[test]
    fn test_decode_truncated_is_none() {
        let chunk = encode(b"abcdef");
        assert!(decode_slice(&chunk[..chunk.len() - 1]).is_none());
        assert!(decode_slice(&[2, 0]).is_none());
        assert!(decode_slice(&[]).is_none());
        assert!(decode_slice(&[9, 0, 0, 0, 0, 0, 0, 0, 0, 0]).is_none());
    }
}
