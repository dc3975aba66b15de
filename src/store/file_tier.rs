//! Primary durable tier: one file per key
//!
//! Per DURABILITY.md §4.1:
//! - Most preferred tier (priority 1)
//! - Writes go to a temp file, are fsynced, then renamed into place;
//!   a reader never observes a torn value
//! - The operation is not acknowledged until fsync returns
//! - Probe re-checks directory writability on every call

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::errors::{StoreError, StoreResult};
use super::tier::{validate_key, StorageTier};

/// One-file-per-key tier rooted at a private directory.
pub struct FileTier {
    root: PathBuf,
    priority: u8,
    tmp_counter: AtomicU64,
}

impl FileTier {
    /// Creates the tier rooted at `<data_dir>/files`.
    ///
    /// The directory is created eagerly so the first probe reflects real
    /// writability rather than a missing-parent artifact.
    pub fn open(data_dir: &Path, priority: u8) -> StoreResult<Self> {
        let root = data_dir.join("files");
        fs::create_dir_all(&root).map_err(|e| {
            StoreError::io_error(
                format!("Failed to create file tier root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self {
            root,
            priority,
            tmp_counter: AtomicU64::new(0),
        })
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl StorageTier for FileTier {
    fn name(&self) -> &'static str {
        "file"
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn probe(&self) -> bool {
        // Writable check: directory exists and is not read-only. Quota or
        // permission loss shows up here before any write is attempted.
        match fs::metadata(&self.root) {
            Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
            Err(_) => false,
        }
    }

    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::read_failed(
                format!("Failed to read key '{}'", key),
                e,
            )),
        }
    }

    fn write(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StoreError::write_failed(format!("Failed to create parent for '{}'", key), e)
            })?;
        }

        // Unique temp name; concurrent writers to different keys share the
        // root directory.
        let tmp_name = format!(
            ".tmp-{}-{}",
            std::process::id(),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed)
        );
        let tmp_path = path.with_file_name(tmp_name);

        let result = (|| -> StoreResult<()> {
            let mut file = OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&tmp_path)
                .map_err(|e| {
                    StoreError::write_failed(format!("Failed to create temp for '{}'", key), e)
                })?;
            file.write_all(value).map_err(|e| {
                StoreError::write_failed(format!("Failed to write key '{}'", key), e)
            })?;
            // fsync before rename; a crash after rename must expose the
            // complete value or nothing.
            file.sync_all().map_err(|e| {
                StoreError::write_failed(format!("fsync failed for key '{}'", key), e)
            })?;
            fs::rename(&tmp_path, &path).map_err(|e| {
                StoreError::write_failed(format!("Failed to publish key '{}'", key), e)
            })?;
            if let Some(parent) = path.parent() {
                if let Ok(dir) = File::open(parent) {
                    let _ = dir.sync_all();
                }
            }
            Ok(())
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io_error(
                format!("Failed to delete key '{}'", key),
                e,
            )),
        }
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        collect_keys(&self.root, String::new(), &mut keys)?;
        keys.sort();
        Ok(keys)
    }
}

fn collect_keys(dir: &Path, prefix: String, out: &mut Vec<String>) -> StoreResult<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(StoreError::read_failed(
                format!("Failed to list tier directory: {}", dir.display()),
                e,
            ))
        }
    };

    for entry in entries {
        let entry =
            entry.map_err(|e| StoreError::read_failed("Failed to read directory entry", e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(".tmp-") {
            continue;
        }
        let child_key = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        let path = entry.path();
        if path.is_dir() {
            collect_keys(&path, child_key, out)?;
        } else {
            out.push(child_key);
        }
    }
    Ok(())
}
