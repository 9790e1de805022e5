//! tagstore - a tag-indexed, append-only chunk store
//!
//! Values are stored under string tags in a flat sequence of length-prefixed
//! chunks that can be exported and imported as raw bytes.
//!
//! Layers, bottom up:
//! - [`bytes`]: resizable byte sequences (memory, file)
//! - [`codec`]: the length-indicator chunk layout and scanning cursor
//! - [`tagstore`]: tag -> value entries over a byte store
//! - [`cache`]: position and value caches stacked on a tag store

pub mod bytes;
pub mod cache;
pub mod cli;
pub mod codec;
pub mod config;
pub mod errors;
pub mod observability;
pub mod tagstore;

pub use bytes::{ByteStore, ByteStream, FileByteStore, MemoryByteStore};
pub use cache::{CacheStats, PositionCache, ValueCache, ValueCacheConfig};
pub use codec::ScanPolicy;
pub use config::{ConfigError, StoreConfig};
pub use errors::{StoreError, StoreResult};
pub use tagstore::{ChangeEvent, ChangeListener, ChunkTagStore, Listeners, SearchResult, TagStore};
