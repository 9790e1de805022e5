//! File-backed byte store
//!
//! Reads and writes are positioned (seek + read/write) under one lock on the
//! file handle, so a seek is never separated from its read or write by
//! another thread. Insert and delete shift the tail of the file with a
//! bounded copy buffer; peak memory use is one buffer, never the whole tail.
//!
//! There is no transactional guarantee across calls: a crash or a concurrent
//! write in the middle of a shifting copy can leave the tail half-moved.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{check_delete_range, check_write_start, ByteStore};
use crate::errors::{StoreError, StoreResult};
use crate::observability::{log_event_with_fields, Event};

/// Default size of the shifting copy buffer.
pub const DEFAULT_COPY_BUFFER: usize = 64 * 1024;

/// Byte store over a single file.
#[derive(Debug)]
pub struct FileByteStore {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
    copy_buffer: usize,
}

impl FileByteStore {
    /// Opens `path`, creating it (and its parent directories) if missing.
    /// Existing content is kept.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with_buffer(path, DEFAULT_COPY_BUFFER)
    }

    /// Opens `path` with an explicit shifting copy buffer size.
    pub fn open_with_buffer(path: &Path, copy_buffer: usize) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    StoreError::io(
                        format!("failed to create directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io(format!("failed to open {}", path.display()), e))?;

        let size = file
            .metadata()
            .map_err(|e| StoreError::io("failed to read file metadata", e))?
            .len();

        let size_field = size.to_string();
        log_event_with_fields(
            Event::StoreOpened,
            &[("path", &path.display().to_string()), ("size", &size_field)],
        );

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size,
            copy_buffer: copy_buffer.max(1),
        })
    }

    /// Opens `path`, discarding any existing content.
    pub fn create(path: &Path) -> StoreResult<Self> {
        let mut store = Self::open(path)?;
        store.clear()?;
        Ok(store)
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes and releases the file handle.
    pub fn close(mut self) -> StoreResult<()> {
        self.flush()?;
        log_event_with_fields(
            Event::StoreClosed,
            &[("path", &self.path.display().to_string())],
        );
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, File>> {
        self.file
            .lock()
            .map_err(|_| StoreError::storage("file handle lock poisoned"))
    }

    fn write_locked(file: &mut File, start: u64, data: &[u8]) -> StoreResult<()> {
        file.seek(SeekFrom::Start(start))
            .map_err(|e| StoreError::io(format!("seek to {} failed", start), e))?;
        file.write_all(data)
            .map_err(|e| StoreError::io(format!("write at {} failed", start), e))
    }

    fn read_exact_locked(file: &mut File, start: u64, buf: &mut [u8]) -> StoreResult<()> {
        file.seek(SeekFrom::Start(start))
            .map_err(|e| StoreError::io(format!("seek to {} failed", start), e))?;
        file.read_exact(buf)
            .map_err(|e| StoreError::io(format!("read at {} failed", start), e))
    }
}

impl ByteStore for FileByteStore {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, start: u64, buf: &mut [u8]) -> StoreResult<usize> {
        if start >= self.size {
            return Ok(0);
        }
        let n = buf.len().min((self.size - start) as usize);
        let mut file = self.lock()?;
        Self::read_exact_locked(&mut file, start, &mut buf[..n])?;
        Ok(n)
    }

    fn write(&mut self, start: u64, data: &[u8]) -> StoreResult<()> {
        check_write_start(start, self.size)?;
        let mut file = self.lock()?;
        Self::write_locked(&mut file, start, data)?;
        drop(file);
        self.size = self.size.max(start + data.len() as u64);
        Ok(())
    }

    fn insert(&mut self, start: u64, data: &[u8]) -> StoreResult<()> {
        check_write_start(start, self.size)?;
        if data.is_empty() {
            return Ok(());
        }
        let shift = data.len() as u64;
        let mut buf = vec![0u8; self.copy_buffer];
        let mut file = self.lock()?;

        // Move the tail right, last block first, so no byte is overwritten
        // before it has been copied.
        let mut block_end = self.size;
        while block_end > start {
            let block_start = block_end.saturating_sub(buf.len() as u64).max(start);
            let len = (block_end - block_start) as usize;
            Self::read_exact_locked(&mut file, block_start, &mut buf[..len])?;
            Self::write_locked(&mut file, block_start + shift, &buf[..len])?;
            block_end = block_start;
        }
        Self::write_locked(&mut file, start, data)?;
        drop(file);

        self.size += shift;
        Ok(())
    }

    fn delete(&mut self, start: u64, end: u64) -> StoreResult<()> {
        check_delete_range(start, end, self.size)?;
        let shift = end - start;
        let mut buf = vec![0u8; self.copy_buffer];
        let mut file = self.lock()?;

        // Move the tail left, first block first.
        let mut from = end;
        while from < self.size {
            let len = ((self.size - from) as usize).min(buf.len());
            Self::read_exact_locked(&mut file, from, &mut buf[..len])?;
            Self::write_locked(&mut file, from - shift, &buf[..len])?;
            from += len as u64;
        }
        let new_size = self.size - shift;
        file.set_len(new_size)
            .map_err(|e| StoreError::io(format!("truncate to {} failed", new_size), e))?;
        drop(file);

        self.size = new_size;
        Ok(())
    }

    fn clear(&mut self) -> StoreResult<()> {
        let file = self.lock()?;
        file.set_len(0)
            .map_err(|e| StoreError::io("truncate to 0 failed", e))?;
        drop(file);
        self.size = 0;
        Ok(())
    }

    fn flush(&mut self) -> StoreResult<()> {
        let mut file = self.lock()?;
        file.flush()
            .map_err(|e| StoreError::io("flush failed", e))?;
        file.sync_all()
            .map_err(|e| StoreError::io("fsync failed", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store(dir: &TempDir, copy_buffer: usize) -> FileByteStore {
        FileByteStore::open_with_buffer(&dir.path().join("store.bin"), copy_buffer).unwrap()
    }

    #[test]
    fn test_insert_then_delete() {
        let dir = TempDir::new().unwrap();
        let mut bs = temp_store(&dir, 4);
        bs.insert(0, &[9, 9]).unwrap();
        assert_eq!(bs.size(), 2);
        bs.delete(0, 1).unwrap();
        assert_eq!(bs.size(), 1);
        assert_eq!(bs.read(0, 1).unwrap(), vec![9]);
    }

    #[test]
    fn test_insert_shifts_tail_with_small_buffer() {
        let dir = TempDir::new().unwrap();
        let mut bs = temp_store(&dir, 3);
        let initial: Vec<u8> = (0..20).collect();
        bs.append(&initial).unwrap();
        bs.insert(5, &[100, 101, 102, 103]).unwrap();

        let mut expected: Vec<u8> = (0..5).collect();
        expected.extend_from_slice(&[100, 101, 102, 103]);
        expected.extend(5..20);
        assert_eq!(bs.read(0, u64::MAX).unwrap(), expected);
    }

    #[test]
    fn test_delete_shifts_tail_with_small_buffer() {
        let dir = TempDir::new().unwrap();
        let mut bs = temp_store(&dir, 3);
        bs.append(&(0..20).collect::<Vec<u8>>()).unwrap();
        bs.delete(2, 9).unwrap();

        let mut expected: Vec<u8> = vec![0, 1];
        expected.extend(9..20);
        assert_eq!(bs.read(0, u64::MAX).unwrap(), expected);
        assert_eq!(fs::metadata(bs.path()).unwrap().len(), 13);
    }

    #[test]
    fn test_reopen_keeps_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/store.bin");
        {
            let mut bs = FileByteStore::open(&path).unwrap();
            bs.append(b"hello").unwrap();
            bs.close().unwrap();
        }
        let bs = FileByteStore::open(&path).unwrap();
        assert_eq!(bs.read(0, 5).unwrap(), b"hello".to_vec());
    }

    #[test]
    fn test_create_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.bin");
        fs::write(&path, b"stale").unwrap();
        let bs = FileByteStore::create(&path).unwrap();
        assert!(bs.is_empty());
    }

    #[test]
    fn test_write_past_end_rejected() {
        let dir = TempDir::new().unwrap();
        let mut bs = temp_store(&dir, 8);
        assert!(matches!(
            bs.write(1, &[1]),
            Err(StoreError::IndexOutOfRange { index: 1, size: 0 })
        ));
    }
}
