//! Store configuration
//!
//! Loaded from a JSON file. Every field has a default, so `{}` is a valid
//! configuration and so is [`StoreConfig::default`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bytes::{FileByteStore, MemoryByteStore, DEFAULT_COPY_BUFFER, DEFAULT_PAGE_SIZE};
use crate::cache::ValueCacheConfig;
use crate::codec::ScanPolicy;
use crate::errors::StoreResult;
use crate::observability::{log_event_with_fields, Event};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "TAGSTORE_CONFIG_READ",
            ConfigError::Parse(_) => "TAGSTORE_CONFIG_PARSE",
            ConfigError::Invalid(_) => "TAGSTORE_CONFIG_INVALID",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How scans treat a malformed tail.
    #[serde(default)]
    pub scan_policy: ScanPolicy,

    /// Growth and shrink granularity of in-memory byte stores.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Block size for shifting file content and for streaming values.
    #[serde(default = "default_copy_buffer_bytes")]
    pub copy_buffer_bytes: usize,

    #[serde(default)]
    pub value_cache: ValueCacheConfig,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_copy_buffer_bytes() -> usize {
    DEFAULT_COPY_BUFFER
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            scan_policy: ScanPolicy::default(),
            page_size: default_page_size(),
            copy_buffer_bytes: default_copy_buffer_bytes(),
            value_cache: ValueCacheConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Reads, parses and validates the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json(&content)?;

        let policy = match config.scan_policy {
            ScanPolicy::Lenient => "lenient",
            ScanPolicy::Strict => "strict",
        };
        log_event_with_fields(
            Event::ConfigLoaded,
            &[("path", &path.display().to_string()), ("scan_policy", policy)],
        );
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be > 0".into()));
        }
        if self.copy_buffer_bytes == 0 {
            return Err(ConfigError::Invalid("copy_buffer_bytes must be > 0".into()));
        }
        self.value_cache.validate().map_err(ConfigError::Invalid)
    }

    /// An empty in-memory byte store with the configured page size.
    pub fn memory_store(&self) -> MemoryByteStore {
        MemoryByteStore::with_page_size(self.page_size)
    }

    /// Opens a file byte store with the configured copy buffer.
    pub fn open_file_store(&self, path: &Path) -> StoreResult<FileByteStore> {
        FileByteStore::open_with_buffer(path, self.copy_buffer_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_empty_object() {
        let config = StoreConfig::from_json("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.scan_policy, ScanPolicy::Lenient);
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.copy_buffer_bytes, 65536);
        assert_eq!(config.value_cache.max_total_bytes, 16 * 1024 * 1024);
        assert_eq!(config.value_cache.max_single_entry_bytes, 1024 * 1024);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tagstore.json");
        let body = json!({
            "scan_policy": "strict",
            "page_size": 512,
            "value_cache": { "max_total_bytes": 1000, "max_single_entry_bytes": 100 }
        });
        fs::write(&path, body.to_string()).unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.scan_policy, ScanPolicy::Strict);
        assert_eq!(config.page_size, 512);
        assert_eq!(config.copy_buffer_bytes, 65536);
        assert_eq!(config.value_cache.max_total_bytes, 1000);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = StoreConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.code(), "TAGSTORE_CONFIG_READ");
    }

    #[test]
    fn test_rejects_bad_json_and_unknown_policy() {
        assert_eq!(StoreConfig::from_json("{").unwrap_err().code(), "TAGSTORE_CONFIG_PARSE");
        let err = StoreConfig::from_json(r#"{"scan_policy":"paranoid"}"#).unwrap_err();
        assert_eq!(err.code(), "TAGSTORE_CONFIG_PARSE");
    }

    #[test]
    fn test_validation() {
        let err = StoreConfig::from_json(r#"{"page_size":0}"#).unwrap_err();
        assert_eq!(err.code(), "TAGSTORE_CONFIG_INVALID");

        let err = StoreConfig::from_json(
            r#"{"value_cache":{"max_total_bytes":10,"max_single_entry_bytes":20}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_single_entry_bytes"));
    }

    #[test]
    fn test_memory_store_uses_page_size() {
        use crate::bytes::ByteStore;

        let config = StoreConfig {
            page_size: 128,
            ..StoreConfig::default()
        };
        let mut store = config.memory_store();
        store.append(&[0; 10]).unwrap();
        assert!(store.capacity() >= 128);
        assert_eq!(store.capacity() % 128, 0);
    }
}
