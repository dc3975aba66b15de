//! Cryptographic gateway
//!
//! Per CRYPTO.md §2, the gateway owns the derived key for its lifetime.
//! Callers submit plaintext or payloads and get results back; the key
//! itself never crosses the boundary. All derivation and cipher work
//! runs on orchestrator workers under a bounded timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::observability::Logger;
use crate::tasks::{Orchestrator, TaskError, TaskOutcome, TaskPayload};

use super::errors::{CryptoError, CryptoResult};
use super::primitives::{generate_salt, EncryptedPayload, KdfParams, SymmetricKey};

/// Deadline for in-memory cipher work. Generous; a healthy primitive
/// finishes in microseconds.
const CIPHER_TIMEOUT: Duration = Duration::from_secs(10);

/// Stateful encryption gateway backed by the task orchestrator.
pub struct CryptoGateway {
    orchestrator: Arc<Orchestrator>,
    logger: Logger,
    key: Mutex<Option<SymmetricKey>>,
    kdf_params: KdfParams,
    kdf_timeout: Duration,
    /// Pins the software cipher on hosts where the platform primitive
    /// is known broken.
    force_fallback: AtomicBool,
}

impl CryptoGateway {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        kdf_params: KdfParams,
        kdf_timeout: Duration,
        logger: Logger,
    ) -> Self {
        Self {
            orchestrator,
            logger: logger.for_subsystem("crypto"),
            key: Mutex::new(None),
            kdf_params,
            kdf_timeout,
            force_fallback: AtomicBool::new(false),
        }
    }

    /// Derives and installs the gateway key from `secret`. A fresh
    /// random salt is generated when none is supplied. Returns the salt
    /// that was used; the derived key stays inside the gateway.
    pub async fn init_with_secret(
        &self,
        secret: &[u8],
        salt: Option<Vec<u8>>,
    ) -> CryptoResult<Vec<u8>> {
        let salt = salt.unwrap_or_else(generate_salt);
        let outcome = self
            .orchestrator
            .submit(
                TaskPayload::DeriveKey {
                    secret: secret.to_vec(),
                    salt: salt.clone(),
                    params: self.kdf_params,
                },
                self.kdf_timeout,
            )
            .await
            .map_err(|e| match e {
                TaskError::Timeout { timeout_ms, .. } => CryptoError::KdfTimeout(timeout_ms),
                TaskError::ExecutionFailed { reason } => CryptoError::KdfFailed(reason),
                other => CryptoError::TaskFailed(other.to_string()),
            })?;

        let TaskOutcome::KeyDerived { key } = outcome else {
            return Err(CryptoError::TaskFailed(
                "derive task returned wrong outcome".to_string(),
            ));
        };
        self.store_key(key)?;
        self.logger.info("GATEWAY_INITIALIZED", &[]);
        Ok(salt)
    }

    /// Whether a key has been derived and installed.
    pub fn is_initialized(&self) -> bool {
        self.key.lock().map(|k| k.is_some()).unwrap_or(false)
    }

    /// Forces the software cipher for all subsequent encryptions.
    pub fn set_force_fallback(&self, force: bool) {
        self.force_fallback.store(force, Ordering::SeqCst);
        if force {
            self.logger.warn("FALLBACK_CIPHER_PINNED", &[]);
        }
    }

    /// Encrypts `plaintext` under the gateway key. The returned payload
    /// records which cipher actually ran.
    pub async fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<EncryptedPayload> {
        let key = self.current_key()?;
        let outcome = self
            .orchestrator
            .submit(
                TaskPayload::Encrypt {
                    key,
                    plaintext: plaintext.to_vec(),
                    force_fallback: self.force_fallback.load(Ordering::SeqCst),
                },
                CIPHER_TIMEOUT,
            )
            .await
            .map_err(Self::map_cipher_error)?;

        match outcome {
            TaskOutcome::Encrypted { payload } => Ok(payload),
            _ => Err(CryptoError::TaskFailed(
                "encrypt task returned wrong outcome".to_string(),
            )),
        }
    }

    /// Decrypts a payload under the gateway key, branching on its
    /// recorded cipher method.
    pub async fn decrypt(&self, payload: &EncryptedPayload) -> CryptoResult<Vec<u8>> {
        let key = self.current_key()?;
        let outcome = self
            .orchestrator
            .submit(
                TaskPayload::Decrypt {
                    key,
                    payload: payload.clone(),
                },
                CIPHER_TIMEOUT,
            )
            .await
            .map_err(Self::map_cipher_error)?;

        match outcome {
            TaskOutcome::Decrypted { plaintext } => Ok(plaintext),
            _ => Err(CryptoError::TaskFailed(
                "decrypt task returned wrong outcome".to_string(),
            )),
        }
    }

    fn current_key(&self) -> CryptoResult<SymmetricKey> {
        self.key
            .lock()
            .map_err(|_| CryptoError::TaskFailed("key lock poisoned".to_string()))?
            .ok_or(CryptoError::NotInitialized)
    }

    fn store_key(&self, key: SymmetricKey) -> CryptoResult<()> {
        let mut guard = self
            .key
            .lock()
            .map_err(|_| CryptoError::TaskFailed("key lock poisoned".to_string()))?;
        *guard = Some(key);
        Ok(())
    }

    fn map_cipher_error(e: TaskError) -> CryptoError {
        match e {
            TaskError::ExecutionFailed { reason } => {
                if reason == CryptoError::AuthenticationFailed.to_string() {
                    CryptoError::AuthenticationFailed
                } else {
                    CryptoError::CipherFailed(reason)
                }
            }
            other => CryptoError::TaskFailed(other.to_string()),
        }
    }
}
