//! Observable store events
//!
//! Each event has a fixed name and a fixed severity, so a log consumer can
//! filter on either without parsing messages.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// A file-backed byte store was opened
    StoreOpened,
    /// A file-backed byte store was flushed and closed
    StoreClosed,
    /// Every entry was removed
    StoreCleared,
    /// Content replaced from a raw image
    StoreImported,
    /// Raw image produced
    StoreExported,
    /// Configuration file loaded and validated
    ConfigLoaded,

    // Scanning
    /// A lenient scan stopped at a malformed tail
    ScanTruncated,
    /// A strict scan found a malformed chunk
    ChunkCorruption,

    // Caches
    /// Position index discarded
    PositionCacheReset,
    /// Value cache emptied
    ValueCacheReset,
    /// One cached value dropped after an external change
    ValueCacheInvalidated,
    /// One cached value dropped to stay within budget
    ValueCacheEvicted,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StoreOpened => "STORE_OPENED",
            Event::StoreClosed => "STORE_CLOSED",
            Event::StoreCleared => "STORE_CLEARED",
            Event::StoreImported => "STORE_IMPORTED",
            Event::StoreExported => "STORE_EXPORTED",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::ScanTruncated => "SCAN_TRUNCATED",
            Event::ChunkCorruption => "CHUNK_CORRUPTION",
            Event::PositionCacheReset => "POSITION_CACHE_RESET",
            Event::ValueCacheReset => "VALUE_CACHE_RESET",
            Event::ValueCacheInvalidated => "VALUE_CACHE_INVALIDATED",
            Event::ValueCacheEvicted => "VALUE_CACHE_EVICTED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::ScanTruncated => Severity::Warn,
            Event::ChunkCorruption => Severity::Error,
            Event::ValueCacheInvalidated | Event::ValueCacheEvicted => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
