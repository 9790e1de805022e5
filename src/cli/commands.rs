//! CLI command implementations
//!
//! Each command opens the store file, wraps it in a [`PositionCache`], runs
//! one operation and flushes before returning its JSON result.

use std::fs;
use std::path::Path;

use chrono::Utc;
use serde_json::{json, Value};

use crate::bytes::FileByteStore;
use crate::cache::PositionCache;
use crate::config::StoreConfig;
use crate::observability::{Logger, Severity};
use crate::tagstore::{ChunkTagStore, Listeners, TagStore};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{value_json, write_error, write_response};

type FileStore = PositionCache<FileByteStore>;

/// Main CLI entry point. The only function main.rs calls.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    Logger::set_min_severity(if cli.verbose {
        Severity::Trace
    } else {
        Severity::Warn
    });

    let outcome = load_config(cli.config.as_deref()).and_then(|config| run_command(cli.command, &config));
    match outcome {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

fn load_config(path: Option<&Path>) -> CliResult<StoreConfig> {
    match path {
        Some(path) => Ok(StoreConfig::load(path)?),
        None => Ok(StoreConfig::default()),
    }
}

pub fn run_command(cmd: Command, config: &StoreConfig) -> CliResult<Value> {
    match cmd {
        Command::Tags { file } => tags(&file, config),
        Command::Get { file, tag } => get(&file, &tag, config),
        Command::Put {
            file,
            tag,
            value,
            input,
        } => {
            let value = match (value, input) {
                (Some(text), _) => text.into_bytes(),
                (None, Some(path)) => read_input(&path)?,
                (None, None) => return Err(CliError::io_error("put needs --value or --input")),
            };
            put(&file, &tag, &value, config)
        }
        Command::Delete { file, tag } => delete(&file, &tag, config),
        Command::Length { file } => length(&file, config),
        Command::Verify { file } => verify(&file, config),
        Command::Export { file, output } => export(&file, &output, config),
        Command::Import { file, input } => import(&file, &input, config),
    }
}

fn open(file: &Path, config: &StoreConfig) -> CliResult<FileStore> {
    let bytes = config.open_file_store(file)?;
    Ok(PositionCache::new(ChunkTagStore::from_config(
        bytes,
        config,
        Listeners::none(),
    )))
}

fn close(store: FileStore) -> CliResult<()> {
    store.into_inner().into_bytes().close()?;
    Ok(())
}

fn read_input(path: &Path) -> CliResult<Vec<u8>> {
    fs::read(path).map_err(|e| CliError::io_error(format!("failed to read {}: {}", path.display(), e)))
}

pub fn tags(file: &Path, config: &StoreConfig) -> CliResult<Value> {
    let store = open(file, config)?;
    let tags = store.tags()?;
    close(store)?;
    Ok(json!({ "tags": tags }))
}

pub fn get(file: &Path, tag: &str, config: &StoreConfig) -> CliResult<Value> {
    let store = open(file, config)?;
    let value = store.get(tag)?;
    close(store)?;
    match value {
        Some(value) => Ok(json!({ "tag": tag, "value": value_json(&value) })),
        None => Err(CliError::tag_not_found(tag)),
    }
}

pub fn put(file: &Path, tag: &str, value: &[u8], config: &StoreConfig) -> CliResult<Value> {
    let mut store = open(file, config)?;
    let replaced = store.add(tag, value)?;
    close(store)?;
    Ok(json!({ "tag": tag, "replaced": replaced, "length": value.len() }))
}

pub fn delete(file: &Path, tag: &str, config: &StoreConfig) -> CliResult<Value> {
    let mut store = open(file, config)?;
    let deleted = store.delete_noreturn(tag)?;
    close(store)?;
    Ok(json!({ "tag": tag, "deleted": deleted }))
}

pub fn length(file: &Path, config: &StoreConfig) -> CliResult<Value> {
    let store = open(file, config)?;
    let length = store.length()?;
    close(store)?;
    Ok(json!({ "length": length }))
}

pub fn verify(file: &Path, config: &StoreConfig) -> CliResult<Value> {
    let store = open(file, config)?;
    let report = store.verify()?;
    close(store)?;
    Ok(json!({
        "clean": report.is_clean(),
        "entries": report.entries,
        "bytes_scanned": report.bytes_scanned,
        "trailing_bytes": report.trailing_bytes,
        "duplicate_tags": report.duplicate_tags,
        "corruption": report.corruption,
    }))
}

pub fn export(file: &Path, output: &Path, config: &StoreConfig) -> CliResult<Value> {
    let store = open(file, config)?;
    let raw = store.export()?;
    close(store)?;
    fs::write(output, &raw)
        .map_err(|e| CliError::io_error(format!("failed to write {}: {}", output.display(), e)))?;
    Ok(json!({
        "output": output.display().to_string(),
        "size": raw.len(),
        "crc32": format!("{:08x}", crc32fast::hash(&raw)),
        "exported_at": Utc::now().to_rfc3339(),
    }))
}

pub fn import(file: &Path, input: &Path, config: &StoreConfig) -> CliResult<Value> {
    let raw = read_input(input)?;
    let mut store = open(file, config)?;
    store.import(&raw)?;
    let entries = store.length()?;
    close(store)?;
    Ok(json!({
        "entries": entries,
        "size": raw.len(),
        "crc32": format!("{:08x}", crc32fast::hash(&raw)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliErrorCode;
    use crate::codec::ScanPolicy;
    use tempfile::TempDir;

    fn setup() -> (TempDir, std::path::PathBuf, StoreConfig) {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("store.bin");
        (dir, file, StoreConfig::default())
    }

    #[test]
    fn test_put_get_delete() {
        let (_dir, file, config) = setup();

        let out = put(&file, "greeting", b"hello", &config).unwrap();
        assert_eq!(out["replaced"], false);
        let out = put(&file, "greeting", b"hi", &config).unwrap();
        assert_eq!(out["replaced"], true);

        let out = get(&file, "greeting", &config).unwrap();
        assert_eq!(out["value"]["text"], "hi");

        assert_eq!(delete(&file, "greeting", &config).unwrap()["deleted"], true);
        assert_eq!(delete(&file, "greeting", &config).unwrap()["deleted"], false);

        let err = get(&file, "greeting", &config).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::TagNotFound);
    }

    #[test]
    fn test_tags_and_length() {
        let (_dir, file, config) = setup();
        for tag in ["one", "two", "three"] {
            put(&file, tag, tag.as_bytes(), &config).unwrap();
        }
        assert_eq!(tags(&file, &config).unwrap()["tags"], json!(["one", "two", "three"]));
        assert_eq!(length(&file, &config).unwrap()["length"], 3);
    }

    #[test]
    fn test_export_import_roundtrip() {
        let (dir, file, config) = setup();
        put(&file, "a", &[0, 1, 2], &config).unwrap();
        put(&file, "b", &[3], &config).unwrap();

        let image = dir.path().join("image.bin");
        let exported = export(&file, &image, &config).unwrap();
        let raw = fs::read(&image).unwrap();
        assert_eq!(exported["size"], raw.len());
        assert_eq!(exported["crc32"], format!("{:08x}", crc32fast::hash(&raw)));

        let copy = dir.path().join("copy.bin");
        let imported = import(&copy, &image, &config).unwrap();
        assert_eq!(imported["entries"], 2);
        assert_eq!(imported["crc32"], exported["crc32"]);
        assert_eq!(get(&copy, "a", &config).unwrap()["value"]["base64"], "AAEC");
    }

    #[test]
    fn test_verify_reports_truncated_tail() {
        let (_dir, file, config) = setup();
        put(&file, "a", b"1", &config).unwrap();
        let mut raw = fs::read(&file).unwrap();
        raw.extend_from_slice(&[1, 9]);
        fs::write(&file, &raw).unwrap();

        let report = verify(&file, &config).unwrap();
        assert_eq!(report["clean"], false);
        assert_eq!(report["entries"], 1);
        assert_eq!(report["trailing_bytes"], 2);
    }

    #[test]
    fn test_strict_config_surfaces_corruption() {
        let (_dir, file, _) = setup();
        let config = StoreConfig {
            scan_policy: ScanPolicy::Strict,
            ..StoreConfig::default()
        };
        fs::write(&file, [1, 9]).unwrap();

        let err = length(&file, &config).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::StoreError);
        assert!(err.message().contains("TAGSTORE_STORAGE_FAILURE"));
    }
}
