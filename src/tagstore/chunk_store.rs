//! Chunk-backed tag store
//!
//! Every lookup is a linear scan from offset 0 that decodes tag chunks and
//! skips value chunks. Appends are O(1) amortized; deletes cost O(store size)
//! because the tail is shifted to close the gap.

use std::collections::HashSet;

use super::entries::Entries;
use super::observer::{ChangeEvent, Listeners};
use super::{SearchResult, TagStore};
use crate::bytes::{ByteStore, ByteStream, DEFAULT_STREAM_CHUNK};
use crate::codec::{
    encode_header, read_header, read_payload, ChunkCursor, ChunkFormat, ChunkHeader, Position,
    ScanPolicy, Utf8,
};
use crate::config::StoreConfig;
use crate::errors::{StoreError, StoreResult};
use crate::observability::{log_event, log_event_with_fields, Event, ObservationScope};

/// Returned by scan visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    Continue,
    Stop,
}

/// Result of a strict walk over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Complete entries found before the walk stopped.
    pub entries: usize,
    /// Bytes covered by those entries.
    pub bytes_scanned: u64,
    /// Bytes after the last complete entry.
    pub trailing_bytes: u64,
    /// Tags that occur more than once.
    pub duplicate_tags: Vec<String>,
    /// Why the walk stopped early, if it did.
    pub corruption: Option<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.trailing_bytes == 0 && self.duplicate_tags.is_empty() && self.corruption.is_none()
    }
}

/// Tag store over a byte store.
#[derive(Debug)]
pub struct ChunkTagStore<B: ByteStore> {
    bytes: B,
    policy: ScanPolicy,
    listeners: Listeners,
}

impl<B: ByteStore> ChunkTagStore<B> {
    /// Lenient store without listeners.
    pub fn new(bytes: B) -> Self {
        Self::with_listeners(bytes, ScanPolicy::default(), Listeners::none())
    }

    pub fn with_policy(bytes: B, policy: ScanPolicy) -> Self {
        Self::with_listeners(bytes, policy, Listeners::none())
    }

    pub fn with_listeners(bytes: B, policy: ScanPolicy, listeners: Listeners) -> Self {
        Self {
            bytes,
            policy,
            listeners,
        }
    }

    /// Store configured from `config`.
    pub fn from_config(bytes: B, config: &StoreConfig, listeners: Listeners) -> Self {
        Self::with_listeners(bytes, config.scan_policy, listeners)
    }

    pub fn policy(&self) -> ScanPolicy {
        self.policy
    }

    /// The underlying byte store.
    pub fn bytes(&self) -> &B {
        &self.bytes
    }

    pub fn into_bytes(self) -> B {
        self.bytes
    }

    /// Pushes pending writes to the backing resource.
    pub fn flush(&mut self) -> StoreResult<()> {
        self.bytes.flush()
    }

    pub(crate) fn notify(&self, event: ChangeEvent) {
        self.listeners.notify(event);
    }

    /// Reads the tag and value headers of the entry under `cursor`.
    ///
    /// A tag chunk with no value chunk after it ends the scan, or fails under
    /// the strict policy.
    pub(crate) fn next_entry_headers(
        &self,
        cursor: &mut ChunkCursor,
    ) -> StoreResult<Option<(ChunkHeader, ChunkHeader)>> {
        let tag = match cursor.next_header(&self.bytes)? {
            Some(h) => h,
            None => return Ok(None),
        };
        match cursor.next_header(&self.bytes)? {
            Some(value) => Ok(Some((tag, value))),
            None if self.policy == ScanPolicy::Strict => Err(StoreError::corruption_at_offset(
                tag.start,
                "tag chunk has no value chunk",
            )),
            None => Ok(None),
        }
    }

    /// Decodes the entry under `cursor` into its tag and position.
    pub(crate) fn next_entry(
        &self,
        cursor: &mut ChunkCursor,
    ) -> StoreResult<Option<(String, SearchResult)>> {
        match self.next_entry_headers(cursor)? {
            Some((tag_h, value_h)) => {
                let tag = Utf8::from_payload(read_payload(&self.bytes, &tag_h)?, tag_h.start)?;
                Ok(Some((
                    tag,
                    SearchResult::new(tag_h.start, value_h.start, value_h.end()),
                )))
            }
            None => Ok(None),
        }
    }

    /// Visits every entry from the start of the store.
    ///
    /// Returns `true` only if the scan reached the end of the store cleanly.
    /// `false` means the visitor stopped it or a malformed tail ended it.
    pub fn scan<F>(&self, mut visit: F) -> StoreResult<bool>
    where
        F: FnMut(String, SearchResult) -> ScanControl,
    {
        let mut cursor = ChunkCursor::new(self.policy);
        loop {
            let entry_start = cursor.position().offset();
            match self.next_entry(&mut cursor)? {
                Some((tag, result)) => {
                    if visit(tag, result) == ScanControl::Stop {
                        return Ok(false);
                    }
                }
                None => return Ok(entry_start >= self.bytes.size()),
            }
        }
    }

    /// Locates the entry for `tag`. Tags of the wrong length are skipped
    /// without reading their payload.
    pub fn search(&self, tag: &str) -> StoreResult<Option<SearchResult>> {
        let wanted = tag.as_bytes();
        let mut cursor = ChunkCursor::new(self.policy);
        while let Some((tag_h, value_h)) = self.next_entry_headers(&mut cursor)? {
            if tag_h.payload_len == wanted.len() as u64
                && read_payload(&self.bytes, &tag_h)? == wanted
            {
                return Ok(Some(SearchResult::new(
                    tag_h.start,
                    value_h.start,
                    value_h.end(),
                )));
            }
        }
        Ok(None)
    }

    /// Header of the value chunk at `result`, checked against the stored end.
    fn value_header(&self, result: &SearchResult) -> StoreResult<ChunkHeader> {
        match read_header(&self.bytes, result.entry_start, self.policy)? {
            Some(h) if h.end() == result.entry_end => Ok(h),
            _ => Err(StoreError::corruption_at_offset(
                result.entry_start,
                "no value chunk at recorded position",
            )),
        }
    }

    /// Reads the value of an entry found by [`ChunkTagStore::search`].
    pub fn read_value(&self, result: &SearchResult) -> StoreResult<Vec<u8>> {
        let header = self.value_header(result)?;
        read_payload(&self.bytes, &header)
    }

    /// Streams the value of an entry found by [`ChunkTagStore::search`].
    pub fn stream_value(&self, result: &SearchResult) -> StoreResult<ByteStream<'_>> {
        let header = self.value_header(result)?;
        Ok(ByteStream::new(
            &self.bytes,
            header.payload_start,
            header.end(),
            DEFAULT_STREAM_CHUNK,
        ))
    }

    /// Appends an entry and returns where it landed. Does not notify.
    pub fn append_entry(&mut self, tag: &str, value: &[u8]) -> StoreResult<SearchResult> {
        let raw_start = self.bytes.size();

        let mut head = encode_header(tag.len() as u64);
        head.extend_from_slice(tag.as_bytes());
        let entry_start = raw_start + head.len() as u64;
        head.extend_from_slice(&encode_header(value.len() as u64));

        self.bytes.append(&head)?;
        self.bytes.append(value)?;

        Ok(SearchResult::new(raw_start, entry_start, self.bytes.size()))
    }

    /// Removes the entry at `result`. Does not notify.
    pub fn remove_entry(&mut self, result: &SearchResult) -> StoreResult<()> {
        self.bytes.delete(result.raw_start, result.entry_end)
    }

    /// Walks the whole store under the strict policy and reports what it found.
    ///
    /// A malformed tail is reported, not raised.
    pub fn verify(&self) -> StoreResult<VerifyReport> {
        let scope = ObservationScope::new("VERIFY");
        let mut report = VerifyReport::default();
        let mut seen = HashSet::new();
        let mut cursor = ChunkCursor::new(ScanPolicy::Strict);
        let mut clean_end = Position::START;

        loop {
            match self.verify_step(&mut cursor) {
                Ok(Some(tag)) => {
                    report.entries += 1;
                    clean_end = cursor.position();
                    if !seen.insert(tag.clone()) && !report.duplicate_tags.contains(&tag) {
                        report.duplicate_tags.push(tag);
                    }
                }
                Ok(None) => break,
                Err(StoreError::StorageFailure { message, .. }) => {
                    report.corruption = Some(message);
                    break;
                }
                Err(e) => {
                    scope.fail(&e.to_string());
                    return Err(e);
                }
            }
        }
        report.bytes_scanned = clean_end.offset();
        report.trailing_bytes = self.bytes.size() - clean_end.offset();

        let entries = report.entries.to_string();
        let trailing = report.trailing_bytes.to_string();
        scope.complete_with_fields(&[("entries", &entries), ("trailing_bytes", &trailing)]);
        Ok(report)
    }

    fn verify_step(&self, cursor: &mut ChunkCursor) -> StoreResult<Option<String>> {
        let tag_h = match cursor.next_header(&self.bytes)? {
            Some(h) => h,
            None => return Ok(None),
        };
        if cursor.next_header(&self.bytes)?.is_none() {
            return Err(StoreError::corruption_at_offset(
                tag_h.start,
                "tag chunk has no value chunk",
            ));
        }
        Utf8::from_payload(read_payload(&self.bytes, &tag_h)?, tag_h.start).map(Some)
    }

    /// Iterator over entries that can remove the entry it is positioned on.
    pub fn entries(&mut self) -> Entries<'_, B> {
        Entries::new(self)
    }
}

impl<B: ByteStore> TagStore for ChunkTagStore<B> {
    fn add(&mut self, tag: &str, value: &[u8]) -> StoreResult<bool> {
        let replaced = match self.search(tag)? {
            Some(existing) => {
                self.remove_entry(&existing)?;
                true
            }
            None => false,
        };
        self.append_entry(tag, value)?;
        self.notify(ChangeEvent::Added(tag.to_string()));
        Ok(replaced)
    }

    fn add_nocheck(&mut self, tag: &str, value: &[u8]) -> StoreResult<()> {
        self.append_entry(tag, value)?;
        self.notify(ChangeEvent::Added(tag.to_string()));
        Ok(())
    }

    fn get(&self, tag: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.search(tag)? {
            Some(result) => self.read_value(&result).map(Some),
            None => Ok(None),
        }
    }

    fn get_as_stream(&self, tag: &str) -> StoreResult<Option<ByteStream<'_>>> {
        match self.search(tag)? {
            Some(result) => self.stream_value(&result).map(Some),
            None => Ok(None),
        }
    }

    fn delete(&mut self, tag: &str) -> StoreResult<Option<Vec<u8>>> {
        let result = match self.search(tag)? {
            Some(r) => r,
            None => return Ok(None),
        };
        let value = self.read_value(&result)?;
        self.remove_entry(&result)?;
        self.notify(ChangeEvent::Deleted(tag.to_string()));
        Ok(Some(value))
    }

    fn delete_noreturn(&mut self, tag: &str) -> StoreResult<bool> {
        let result = match self.search(tag)? {
            Some(r) => r,
            None => return Ok(false),
        };
        self.remove_entry(&result)?;
        self.notify(ChangeEvent::Deleted(tag.to_string()));
        Ok(true)
    }

    fn exists(&self, tag: &str) -> StoreResult<bool> {
        Ok(self.search(tag)?.is_some())
    }

    fn tags(&self) -> StoreResult<Vec<String>> {
        let mut tags = Vec::new();
        self.scan(|tag, _| {
            tags.push(tag);
            ScanControl::Continue
        })?;
        Ok(tags)
    }

    fn length(&self) -> StoreResult<usize> {
        let mut count = 0;
        let mut cursor = ChunkCursor::new(self.policy);
        while self.next_entry_headers(&mut cursor)?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.bytes.clear()?;
        log_event(Event::StoreCleared);
        self.notify(ChangeEvent::FullReset);
        Ok(())
    }

    fn export(&self) -> StoreResult<Vec<u8>> {
        let raw = self.bytes.read(0, self.bytes.size())?;
        let size = raw.len().to_string();
        log_event_with_fields(Event::StoreExported, &[("size", &size)]);
        Ok(raw)
    }

    fn import(&mut self, raw: &[u8]) -> StoreResult<()> {
        self.bytes.clear()?;
        self.bytes.append(raw)?;
        let size = raw.len().to_string();
        log_event_with_fields(Event::StoreImported, &[("size", &size)]);
        self.notify(ChangeEvent::FullReset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::MemoryByteStore;
    use crate::codec::encode;
    use crate::tagstore::ChangeListener;
    use std::io::Read;
    use std::sync::{Arc, Mutex};

    fn new_store() -> ChunkTagStore<MemoryByteStore> {
        ChunkTagStore::new(MemoryByteStore::new())
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ChangeEvent>>);

    impl ChangeListener for Recorder {
        fn on_change(&self, event: &ChangeEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_basic_scenario() {
        let mut store = new_store();
        store.add("a", &[1, 2, 3]).unwrap();
        store.add("bb", &[4, 5]).unwrap();
        assert_eq!(store.tags().unwrap(), vec!["a", "bb"]);

        store.delete("a").unwrap();
        assert!(!store.exists("a").unwrap());
        assert_eq!(store.get("bb").unwrap(), Some(vec![4, 5]));
    }

    #[test]
    fn test_layout_is_alternating_chunks() {
        let mut store = new_store();
        store.add("t", b"value").unwrap();

        let mut expected = encode(b"t");
        expected.extend_from_slice(&encode(b"value"));
        assert_eq!(store.export().unwrap(), expected);
    }

    #[test]
    fn test_add_replaces_and_moves_to_end() {
        let mut store = new_store();
        assert!(!store.add("x", b"1").unwrap());
        store.add("y", b"2").unwrap();
        assert!(store.add("x", b"3").unwrap());

        assert_eq!(store.tags().unwrap(), vec!["y", "x"]);
        assert_eq!(store.get("x").unwrap(), Some(b"3".to_vec()));
        assert_eq!(store.length().unwrap(), 2);
    }

    #[test]
    fn test_add_nocheck_allows_duplicates() {
        let mut store = new_store();
        store.add_nocheck("d", b"first").unwrap();
        store.add_nocheck("d", b"second").unwrap();
        assert_eq!(store.length().unwrap(), 2);
        assert_eq!(store.get("d").unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn test_missing_tag_is_absent() {
        let mut store = new_store();
        store.add("present", b"v").unwrap();
        assert_eq!(store.get("absent").unwrap(), None);
        assert_eq!(store.delete("absent").unwrap(), None);
        assert!(!store.delete_noreturn("absent").unwrap());
        assert!(!store.exists("absent").unwrap());
    }

    #[test]
    fn test_delete_returns_value() {
        let mut store = new_store();
        store.add("k", b"payload").unwrap();
        assert_eq!(store.delete("k").unwrap(), Some(b"payload".to_vec()));
        assert!(store.bytes().is_empty());
    }

    #[test]
    fn test_empty_tag_and_value() {
        let mut store = new_store();
        store.add("", b"").unwrap();
        assert_eq!(store.get("").unwrap(), Some(Vec::new()));
        assert_eq!(store.bytes().size(), 2);
    }

    #[test]
    fn test_search_positions() {
        let mut store = new_store();
        let first = store.append_entry("ab", b"xyz").unwrap();
        assert_eq!(first, SearchResult::new(0, 4, 9));
        let second = store.append_entry("c", &[0u8; 300]).unwrap();
        assert_eq!(second, SearchResult::new(9, 12, 315));
        assert_eq!(store.search("c").unwrap(), Some(second));
    }

    #[test]
    fn test_get_as_stream() {
        let mut store = new_store();
        let big: Vec<u8> = (0..100_000u32).map(|i| (i % 253) as u8).collect();
        store.add("big", &big).unwrap();

        let mut stream = store.get_as_stream("big").unwrap().unwrap();
        assert_eq!(stream.len(), big.len() as u64);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, big);
        assert!(store.get_as_stream("nope").unwrap().is_none());
    }

    #[test]
    fn test_truncated_tail_is_ignored_when_lenient() {
        let mut store = new_store();
        store.add("ok", b"1").unwrap();
        let mut raw = store.export().unwrap();
        raw.extend_from_slice(&[2, 0x10]);
        store.import(&raw).unwrap();

        assert_eq!(store.tags().unwrap(), vec!["ok"]);
        assert!(!store.exists("missing").unwrap());
    }

    #[test]
    fn test_truncated_tail_fails_when_strict() {
        let mut raw = encode(b"ok");
        raw.extend_from_slice(&encode(b"1"));
        raw.extend_from_slice(&[2, 0x10]);
        let store = ChunkTagStore::with_policy(MemoryByteStore::from_bytes(&raw), ScanPolicy::Strict);

        assert_eq!(store.get("ok").unwrap(), Some(b"1".to_vec()));
        let err = store.exists("missing").unwrap_err();
        assert_eq!(err.code(), "TAGSTORE_STORAGE_FAILURE");
    }

    #[test]
    fn test_dangling_tag_fails_when_strict() {
        let raw = encode(b"lonely");
        let lenient = ChunkTagStore::new(MemoryByteStore::from_bytes(&raw));
        assert_eq!(lenient.length().unwrap(), 0);

        let strict = ChunkTagStore::with_policy(MemoryByteStore::from_bytes(&raw), ScanPolicy::Strict);
        assert!(strict.length().is_err());
    }

    #[test]
    fn test_import_export_roundtrip() {
        let mut source = new_store();
        source.add("one", b"1").unwrap();
        source.add("two", b"22").unwrap();
        let raw = source.export().unwrap();

        let mut target = new_store();
        target.add("stale", b"x").unwrap();
        target.import(&raw).unwrap();
        assert_eq!(target.tags().unwrap(), vec!["one", "two"]);
        assert_eq!(target.get("two").unwrap(), Some(b"22".to_vec()));
    }

    #[test]
    fn test_clear() {
        let mut store = new_store();
        store.add("a", b"1").unwrap();
        store.clear().unwrap();
        assert_eq!(store.length().unwrap(), 0);
        assert!(store.tags().unwrap().is_empty());
    }

    #[test]
    fn test_one_event_per_mutation() {
        let recorder = Arc::new(Recorder::default());
        let mut store = ChunkTagStore::with_listeners(
            MemoryByteStore::new(),
            ScanPolicy::Lenient,
            Listeners::single(recorder.clone()),
        );

        store.add("a", b"1").unwrap();
        store.add("a", b"2").unwrap();
        store.add_nocheck("b", b"3").unwrap();
        store.delete("a").unwrap();
        store.delete_noreturn("missing").unwrap();
        store.delete_noreturn("b").unwrap();
        store.clear().unwrap();
        store.import(&[]).unwrap();

        let events = recorder.0.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                ChangeEvent::Added("a".into()),
                ChangeEvent::Added("a".into()),
                ChangeEvent::Added("b".into()),
                ChangeEvent::Deleted("a".into()),
                ChangeEvent::Deleted("b".into()),
                ChangeEvent::FullReset,
                ChangeEvent::FullReset,
            ]
        );
    }

    #[test]
    fn test_verify_clean_store() {
        let mut store = new_store();
        store.add("a", b"1").unwrap();
        store.add("b", b"2").unwrap();
        let report = store.verify().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.entries, 2);
        assert_eq!(report.bytes_scanned, store.bytes().size());
    }

    #[test]
    fn test_verify_reports_tail_and_duplicates() {
        let mut store = new_store();
        store.add_nocheck("dup", b"1").unwrap();
        store.add_nocheck("dup", b"2").unwrap();
        let clean = store.bytes().size();
        let mut raw = store.export().unwrap();
        raw.extend_from_slice(&[1, 50, 0]);
        store.import(&raw).unwrap();

        let report = store.verify().unwrap();
        assert_eq!(report.entries, 2);
        assert_eq!(report.duplicate_tags, vec!["dup"]);
        assert_eq!(report.bytes_scanned, clean);
        assert_eq!(report.trailing_bytes, 3);
        assert!(report.corruption.is_some());
        assert!(!report.is_clean());
    }

    #[test]
    fn test_scan_stops_early() {
        let mut store = new_store();
        for t in ["a", "b", "c"] {
            store.add(t, b"v").unwrap();
        }
        let mut visited = Vec::new();
        let reached_end = store
            .scan(|tag, _| {
                visited.push(tag.clone());
                if tag == "b" {
                    ScanControl::Stop
                } else {
                    ScanControl::Continue
                }
            })
            .unwrap();
        assert!(!reached_end);
        assert_eq!(visited, vec!["a", "b"]);
    }

    #[test]
    fn test_scan_over_truncated_tail_is_not_complete() {
        let mut store = new_store();
        store.add("a", b"v").unwrap();
        assert!(store.scan(|_, _| ScanControl::Continue).unwrap());

        let mut raw = store.export().unwrap();
        raw.extend_from_slice(&[1, 200, b'a']);
        store.import(&raw).unwrap();
        let mut visited = 0;
        let reached_end = store
            .scan(|_, _| {
                visited += 1;
                ScanControl::Continue
            })
            .unwrap();
        assert!(!reached_end);
        assert_eq!(visited, 1);

        // tag chunk with nothing after it
        let mut raw = store.export().unwrap();
        raw.truncate(raw.len() - 3);
        raw.extend_from_slice(&[1, 1, b't']);
        store.import(&raw).unwrap();
        assert!(!store.scan(|_, _| ScanControl::Continue).unwrap());
    }
}
