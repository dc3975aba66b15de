//! Structured key-value tier: single append-only log
//!
//! Per DURABILITY.md §4.2, the on-disk record format is:
//!
//! ```text
//! +------------------+
//! | Record Length    | (u32 LE, bytes after this field)
//! +------------------+
//! | Key              | (length-prefixed string)
//! +------------------+
//! | Tombstone Flag   | (u8: 0 = live, 1 = deleted)
//! +------------------+
//! | Value            | (length-prefixed bytes)
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 over all preceding bytes)
//! +------------------+
//! ```
//!
//! The log is append-only; multiple records for one key may exist and the
//! latest wins. Deletes append tombstones. An in-memory key -> offset
//! index is rebuilt by scanning on open and maintained on writes. Any
//! checksum failure on read is LGR_STORE_DATA_CORRUPTION and aborts the
//! operation; corruption is never ignored.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crc32fast::Hasher;

use super::errors::{StoreError, StoreResult};
use super::tier::{validate_key, StorageTier};

const MAX_RECORD_LEN: u32 = 64 * 1024 * 1024;

/// Computes the CRC32 (IEEE) checksum over `data`. Deterministic.
pub(crate) fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// A decoded log record.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogRecord {
    key: String,
    is_tombstone: bool,
    value: Vec<u8>,
}

impl LogRecord {
    fn serialize(&self) -> Vec<u8> {
        let key_bytes = self.key.as_bytes();
        // key_len + key + flag + value_len + value + checksum
        let body_len = 4 + key_bytes.len() + 1 + 4 + self.value.len() + 4;

        let mut buf = Vec::with_capacity(4 + body_len);
        buf.extend_from_slice(&(body_len as u32).to_le_bytes());
        buf.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(key_bytes);
        buf.push(u8::from(self.is_tombstone));
        buf.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.value);

        let checksum = compute_checksum(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Reads the next record from `reader`, or `None` at a clean EOF.
    ///
    /// `offset` is the record's starting byte, for corruption context.
    fn read_from<R: Read>(reader: &mut R, offset: u64) -> StoreResult<Option<Self>> {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(StoreError::read_failed("Failed to read record length", e)),
        }
        let body_len = u32::from_le_bytes(len_buf);
        if body_len < 13 || body_len > MAX_RECORD_LEN {
            return Err(StoreError::corruption_at_offset(
                offset,
                format!("implausible record length {}", body_len),
            ));
        }

        let mut body = vec![0u8; body_len as usize];
        reader.read_exact(&mut body).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                StoreError::corruption_at_offset(offset, "truncated record")
            } else {
                StoreError::read_failed("Failed to read record body", e)
            }
        })?;

        let (payload, checksum_bytes) = body.split_at(body.len() - 4);
        let stored = u32::from_le_bytes([
            checksum_bytes[0],
            checksum_bytes[1],
            checksum_bytes[2],
            checksum_bytes[3],
        ]);

        // Checksum covers the length prefix too.
        let mut hasher = Hasher::new();
        hasher.update(&len_buf);
        hasher.update(payload);
        if hasher.finalize() != stored {
            return Err(StoreError::corruption_at_offset(
                offset,
                "record checksum mismatch",
            ));
        }

        let mut cursor = payload;
        let key_len = read_u32(&mut cursor, offset)? as usize;
        if key_len > cursor.len() {
            return Err(StoreError::corruption_at_offset(offset, "key overruns record"));
        }
        let key = String::from_utf8(cursor[..key_len].to_vec())
            .map_err(|_| StoreError::corruption_at_offset(offset, "key is not UTF-8"))?;
        cursor = &cursor[key_len..];

        let flag = read_u8(&mut cursor, offset)?;
        let value_len = read_u32(&mut cursor, offset)? as usize;
        if value_len != cursor.len() {
            return Err(StoreError::corruption_at_offset(
                offset,
                "value length disagrees with record length",
            ));
        }

        Ok(Some(Self {
            key,
            is_tombstone: flag == 1,
            value: cursor.to_vec(),
        }))
    }

    fn len_on_disk(&self) -> u64 {
        (4 + 4 + self.key.len() + 1 + 4 + self.value.len() + 4) as u64
    }
}

fn read_u32(cursor: &mut &[u8], offset: u64) -> StoreResult<u32> {
    if cursor.len() < 4 {
        return Err(StoreError::corruption_at_offset(offset, "record field truncated"));
    }
    let value = u32::from_le_bytes([cursor[0], cursor[1], cursor[2], cursor[3]]);
    *cursor = &cursor[4..];
    Ok(value)
}

fn read_u8(cursor: &mut &[u8], offset: u64) -> StoreResult<u8> {
    if cursor.is_empty() {
        return Err(StoreError::corruption_at_offset(offset, "missing record flag"));
    }
    let value = cursor[0];
    *cursor = &cursor[1..];
    Ok(value)
}

#[derive(Debug)]
struct LogTierInner {
    file: File,
    current_offset: u64,
    /// key -> offset of the latest live record. Tombstoned keys are absent.
    index: HashMap<String, u64>,
}

/// Append-only log tier with an in-memory offset index.
#[derive(Debug)]
pub struct LogTier {
    log_path: PathBuf,
    priority: u8,
    inner: Mutex<LogTierInner>,
}

impl LogTier {
    /// Opens or creates `<data_dir>/kvlog/records.dat` and rebuilds the
    /// offset index by scanning existing records.
    pub fn open(data_dir: &Path, priority: u8) -> StoreResult<Self> {
        let log_dir = data_dir.join("kvlog");
        fs::create_dir_all(&log_dir).map_err(|e| {
            StoreError::io_error(
                format!("Failed to create log tier directory: {}", log_dir.display()),
                e,
            )
        })?;
        let log_path = log_dir.join("records.dat");

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| {
                StoreError::io_error(
                    format!("Failed to open log tier file: {}", log_path.display()),
                    e,
                )
            })?;

        let (index, current_offset) = Self::build_index(&log_path)?;

        Ok(Self {
            log_path,
            priority,
            inner: Mutex::new(LogTierInner {
                file,
                current_offset,
                index,
            }),
        })
    }

    /// Scans the log, returning the live-key index and the end offset.
    fn build_index(log_path: &Path) -> StoreResult<(HashMap<String, u64>, u64)> {
        let mut index = HashMap::new();

        let mut file = match File::open(log_path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((index, 0)),
            Err(e) => return Err(StoreError::read_failed("Failed to open log for scan", e)),
        };

        let mut offset = 0u64;
        loop {
            match LogRecord::read_from(&mut file, offset)? {
                Some(record) => {
                    let advance = record.len_on_disk();
                    if record.is_tombstone {
                        index.remove(&record.key);
                    } else {
                        index.insert(record.key, offset);
                    }
                    offset += advance;
                }
                None => break,
            }
        }

        Ok((index, offset))
    }

    fn append(&self, record: &LogRecord) -> StoreResult<()> {
        let serialized = record.serialize();
        let mut inner = self.inner.lock().expect("log tier lock poisoned");

        inner.file.write_all(&serialized).map_err(|e| {
            StoreError::write_failed(format!("Failed to append record for '{}'", record.key), e)
        })?;
        // fsync before acknowledgement.
        inner.file.sync_all().map_err(|e| {
            StoreError::write_failed(format!("fsync failed for '{}'", record.key), e)
        })?;

        let offset = inner.current_offset;
        inner.current_offset += serialized.len() as u64;
        if record.is_tombstone {
            inner.index.remove(&record.key);
        } else {
            inner.index.insert(record.key.clone(), offset);
        }
        Ok(())
    }
}

impl StorageTier for LogTier {
    fn name(&self) -> &'static str {
        "kvlog"
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn probe(&self) -> bool {
        fs::metadata(&self.log_path).map(|m| m.is_file()).unwrap_or(false)
    }

    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_key(key)?;
        let offset = {
            let inner = self.inner.lock().expect("log tier lock poisoned");
            match inner.index.get(key) {
                Some(offset) => *offset,
                None => return Ok(None),
            }
        };

        // Reads use a fresh handle so they never disturb the append cursor.
        let mut file = File::open(&self.log_path)
            .map_err(|e| StoreError::read_failed("Failed to open log for read", e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| StoreError::read_failed("Failed to seek log record", e))?;

        match LogRecord::read_from(&mut file, offset)? {
            Some(record) if record.key == key && !record.is_tombstone => Ok(Some(record.value)),
            Some(_) => Err(StoreError::corruption_at_offset(
                offset,
                "index points at a record for a different key",
            )),
            None => Err(StoreError::corruption_at_offset(
                offset,
                "index points past end of log",
            )),
        }
    }

    fn write(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        self.append(&LogRecord {
            key: key.to_string(),
            is_tombstone: false,
            value: value.to_vec(),
        })
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        {
            let inner = self.inner.lock().expect("log tier lock poisoned");
            if !inner.index.contains_key(key) {
                return Ok(());
            }
        }
        self.append(&LogRecord {
            key: key.to_string(),
            is_tombstone: true,
            value: Vec::new(),
        })
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock().expect("log tier lock poisoned");
        let mut keys: Vec<String> = inner.index.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
