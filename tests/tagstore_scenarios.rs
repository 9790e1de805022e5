//! Tag store behaviour through the public API
//!
//! Covers:
//! - Round trip of add/get over chunk-length boundaries
//! - Delete-then-miss
//! - Insertion order after replace and delete
//! - The exact exported byte layout
//! - Lenient vs strict handling of a truncated tail

use tagstore::bytes::{ByteStore, MemoryByteStore};
use tagstore::codec::{decode_slice, encode};
use tagstore::{ChunkTagStore, PositionCache, ScanPolicy, StoreConfig, TagStore};

// =============================================================================
// Test Utilities
// =============================================================================

fn plain() -> ChunkTagStore<MemoryByteStore> {
    ChunkTagStore::new(MemoryByteStore::new())
}

fn cached() -> PositionCache<MemoryByteStore> {
    PositionCache::new(plain())
}

fn boundary_values() -> Vec<Vec<u8>> {
    [0usize, 1, 255, 256, 65535, 65536]
        .iter()
        .map(|&n| (0..n).map(|i| (i % 251) as u8).collect())
        .collect()
}

fn run_basic_scenario<S: TagStore>(store: &mut S) {
    store.add("a", &[1, 2, 3]).unwrap();
    store.add("bb", &[4, 5]).unwrap();
    assert_eq!(store.tags().unwrap(), vec!["a", "bb"]);
    store.delete("a").unwrap();
    assert!(!store.exists("a").unwrap());
    assert_eq!(store.get("bb").unwrap(), Some(vec![4, 5]));
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_basic_scenario_plain() {
    run_basic_scenario(&mut plain());
}

#[test]
fn test_basic_scenario_cached() {
    run_basic_scenario(&mut cached());
}

#[test]
fn test_byte_store_scenario() {
    let mut bs = MemoryByteStore::new();
    bs.insert(0, &[9, 9]).unwrap();
    assert_eq!(bs.size(), 2);
    bs.delete(0, 1).unwrap();
    assert_eq!(bs.size(), 1);
    assert_eq!(bs.read(0, 1).unwrap(), vec![9]);
}

// =============================================================================
// Round trips
// =============================================================================

#[test]
fn test_roundtrip_across_length_boundaries() {
    let mut store = plain();
    for (i, value) in boundary_values().iter().enumerate() {
        store.add(&format!("tag-{}", i), value).unwrap();
    }
    for (i, value) in boundary_values().iter().enumerate() {
        assert_eq!(store.get(&format!("tag-{}", i)).unwrap().as_ref(), Some(value));
    }
}

#[test]
fn test_chunk_roundtrip_across_boundaries() {
    for value in boundary_values() {
        let encoded = encode(&value);
        let (payload, used) = decode_slice(&encoded).unwrap();
        assert_eq!(payload, value.as_slice());
        assert_eq!(used, encoded.len());
    }
}

#[test]
fn test_delete_then_miss() {
    let mut store = cached();
    for tag in ["x", "y", "z"] {
        store.add(tag, tag.as_bytes()).unwrap();
    }
    for tag in ["y", "x", "z"] {
        assert_eq!(store.delete(tag).unwrap(), Some(tag.as_bytes().to_vec()));
        assert_eq!(store.get(tag).unwrap(), None);
    }
    assert_eq!(store.length().unwrap(), 0);
}

// =============================================================================
// Layout
// =============================================================================

#[test]
fn test_export_is_alternating_tag_value_chunks() {
    let mut store = plain();
    store.add("k1", b"v1").unwrap();
    store.add("k2", &[0u8; 300]).unwrap();

    let raw = store.export().unwrap();
    let mut rest = raw.as_slice();
    let mut chunks = Vec::new();
    while let Some((payload, used)) = decode_slice(rest) {
        chunks.push(payload.to_vec());
        rest = &rest[used..];
    }
    assert!(rest.is_empty());
    assert_eq!(
        chunks,
        vec![b"k1".to_vec(), b"v1".to_vec(), b"k2".to_vec(), vec![0u8; 300]]
    );
    // 300 needs two length bytes
    assert_eq!(&raw[12..15], &[2, 0x01, 0x2c]);
}

#[test]
fn test_import_into_cached_store_rescans() {
    let mut source = plain();
    source.add("one", b"1").unwrap();
    source.add("two", b"2").unwrap();

    let mut target = cached();
    target.add("stale", b"s").unwrap();
    target.import(&source.export().unwrap()).unwrap();

    assert_eq!(target.get("stale").unwrap(), None);
    assert_eq!(target.tags().unwrap(), vec!["one", "two"]);
}

// =============================================================================
// Truncated tails
// =============================================================================

fn truncated_image() -> Vec<u8> {
    let mut raw = encode(b"kept");
    raw.extend_from_slice(&encode(b"value"));
    // a tag chunk claiming 200 bytes with only 3 present
    raw.extend_from_slice(&[1, 200, b'a', b'b', b'c']);
    raw
}

#[test]
fn test_lenient_scan_ends_at_truncated_tail() {
    let store = ChunkTagStore::new(MemoryByteStore::from_bytes(&truncated_image()));
    assert_eq!(store.tags().unwrap(), vec!["kept"]);
    assert_eq!(store.get("missing").unwrap(), None);

    let report = store.verify().unwrap();
    assert_eq!(report.entries, 1);
    assert_eq!(report.trailing_bytes, 5);
    assert!(!report.is_clean());
}

#[test]
fn test_strict_scan_fails_at_truncated_tail() {
    let config: StoreConfig = StoreConfig::from_json(r#"{"scan_policy":"strict"}"#).unwrap();
    assert_eq!(config.scan_policy, ScanPolicy::Strict);

    let store = PositionCache::new(ChunkTagStore::from_config(
        MemoryByteStore::from_bytes(&truncated_image()),
        &config,
        Default::default(),
    ));
    assert_eq!(store.get("kept").unwrap(), Some(b"value".to_vec()));
    let err = store.get("missing").unwrap_err();
    assert_eq!(err.code(), "TAGSTORE_STORAGE_FAILURE");
    assert!(err.to_string().contains("byte_offset: 13"));
}
