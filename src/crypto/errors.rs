//! Crypto error types

use thiserror::Error;

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Cryptographic gateway errors.
#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    /// Key derivation failed.
    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    /// Key derivation exceeded its bounded timeout.
    #[error("Key derivation timed out after {0} ms")]
    KdfTimeout(u64),

    /// The gateway has no derived key yet.
    #[error("Gateway not initialized; call init_with_secret first")]
    NotInitialized,

    /// The cipher primitive rejected the operation.
    #[error("Cipher operation failed: {0}")]
    CipherFailed(String),

    /// Authentication tag mismatch on decryption.
    #[error("Ciphertext failed authentication")]
    AuthenticationFailed,

    /// A malformed encrypted payload (wrong nonce length, truncated
    /// ciphertext).
    #[error("Malformed encrypted payload: {0}")]
    MalformedPayload(String),

    /// The background execution context failed or was discarded.
    #[error("Background crypto task failed: {0}")]
    TaskFailed(String),
}
