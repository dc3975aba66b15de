//! Typed task payloads and the worker-side executor
//!
//! Each task kind carries its own strongly-typed payload, decoded
//! nowhere — the variant is the contract. The executor is a pure
//! function from payload to outcome; workers call it and ship the
//! result back over their reply channel.

use sha2::{Digest, Sha256};

use crate::crypto::{
    aead_decrypt, aead_encrypt, derive_key, fallback_decrypt, fallback_encrypt, CipherMethod,
    EncryptedPayload, KdfParams, SymmetricKey,
};

use super::errors::{TaskError, TaskResult};

/// Capability class of a task, used to pick its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Key derivation and cipher operations.
    Crypto,
    /// Bulk hashing and other CPU-heavy computation.
    BulkCompute,
    /// Backup snapshot serialization.
    BackupSerialize,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Crypto => "crypto",
            TaskKind::BulkCompute => "bulk_compute",
            TaskKind::BackupSerialize => "backup_serialize",
        }
    }
}

/// Closed set of task payloads.
#[derive(Debug, Clone)]
pub enum TaskPayload {
    /// Derive a symmetric key from a secret.
    DeriveKey {
        secret: Vec<u8>,
        salt: Vec<u8>,
        params: KdfParams,
    },
    /// Encrypt a buffer. `force_fallback` pins the software cipher, for
    /// hosts where the platform primitive is known broken.
    Encrypt {
        key: SymmetricKey,
        plaintext: Vec<u8>,
        force_fallback: bool,
    },
    /// Decrypt a payload, branching on its recorded method.
    Decrypt {
        key: SymmetricKey,
        payload: EncryptedPayload,
    },
    /// Hash a batch of canonical content strings.
    BulkHash { items: Vec<String> },
    /// Serialize a key/value snapshot into one backup document.
    BackupSerialize { entries: Vec<(String, Vec<u8>)> },
    /// Diagnostic payload: completes after `delay`. Used to measure
    /// worker scheduling latency and to exercise the timeout path.
    Probe { delay: std::time::Duration },
}

impl TaskPayload {
    /// The worker kind this payload dispatches to.
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::DeriveKey { .. }
            | TaskPayload::Encrypt { .. }
            | TaskPayload::Decrypt { .. } => TaskKind::Crypto,
            TaskPayload::BulkHash { .. } | TaskPayload::Probe { .. } => TaskKind::BulkCompute,
            TaskPayload::BackupSerialize { .. } => TaskKind::BackupSerialize,
        }
    }
}

/// Result of a completed task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    KeyDerived { key: SymmetricKey },
    Encrypted { payload: EncryptedPayload },
    Decrypted { plaintext: Vec<u8> },
    Hashed { hashes: Vec<String> },
    BackupSerialized { document: Vec<u8> },
    ProbeCompleted,
}

/// Executes a task payload. Runs on a worker, never on the interactive
/// path.
pub fn execute(payload: TaskPayload) -> TaskResult<TaskOutcome> {
    match payload {
        TaskPayload::DeriveKey {
            secret,
            salt,
            params,
        } => {
            let key = derive_key(&secret, &salt, params).map_err(|e| {
                TaskError::ExecutionFailed {
                    reason: e.to_string(),
                }
            })?;
            Ok(TaskOutcome::KeyDerived { key })
        }
        TaskPayload::Encrypt {
            key,
            plaintext,
            force_fallback,
        } => {
            // The stronger method is claimed only when it actually ran.
            let payload = if force_fallback {
                fallback_encrypt(&key, &plaintext)
            } else {
                match aead_encrypt(&key, &plaintext) {
                    Ok(payload) => Ok(payload),
                    Err(_) => fallback_encrypt(&key, &plaintext),
                }
            }
            .map_err(|e| TaskError::ExecutionFailed {
                reason: e.to_string(),
            })?;
            Ok(TaskOutcome::Encrypted { payload })
        }
        TaskPayload::Decrypt { key, payload } => {
            let plaintext = match payload.method {
                CipherMethod::Aes256Gcm => aead_decrypt(&key, &payload),
                CipherMethod::FallbackStream => fallback_decrypt(&key, &payload),
            }
            .map_err(|e| TaskError::ExecutionFailed {
                reason: e.to_string(),
            })?;
            Ok(TaskOutcome::Decrypted { plaintext })
        }
        TaskPayload::BulkHash { items } => {
            let hashes = items
                .iter()
                .map(|item| {
                    let mut hasher = Sha256::new();
                    hasher.update(item.as_bytes());
                    hasher
                        .finalize()
                        .iter()
                        .map(|b| format!("{:02x}", b))
                        .collect::<String>()
                })
                .collect();
            Ok(TaskOutcome::Hashed { hashes })
        }
        TaskPayload::BackupSerialize { entries } => {
            let document: Vec<serde_json::Value> = entries
                .iter()
                .map(|(key, value)| {
                    serde_json::json!({
                        "key": key,
                        "value": base64::Engine::encode(
                            &base64::engine::general_purpose::STANDARD,
                            value,
                        ),
                    })
                })
                .collect();
            let bytes =
                serde_json::to_vec(&document).map_err(|e| TaskError::ExecutionFailed {
                    reason: e.to_string(),
                })?;
            Ok(TaskOutcome::BackupSerialized { document: bytes })
        }
        TaskPayload::Probe { delay } => {
            std::thread::sleep(delay);
            Ok(TaskOutcome::ProbeCompleted)
        }
    }
}
