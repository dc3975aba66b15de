//! Cryptographic primitives
//!
//! Pure functions over key material; nothing here touches storage or
//! the orchestrator. The fallback cipher is a portable SHA-256
//! counter-keystream with a keyed tag: deterministic everywhere, but
//! strictly weaker than AES-GCM, which is why every encrypted payload
//! carries the method that actually produced it.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::errors::{CryptoError, CryptoResult};

/// Symmetric key length (AES-256).
pub const KEY_LEN: usize = 32;

/// Nonce length (96-bit, both ciphers).
pub const NONCE_LEN: usize = 12;

/// Fallback tag length.
const TAG_LEN: usize = 32;

/// A derived symmetric key.
pub type SymmetricKey = [u8; KEY_LEN];

/// Key derivation parameters (Argon2id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Iteration count.
    pub iterations: u32,
    /// Lanes.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Which cipher actually produced an encrypted payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherMethod {
    /// Authenticated encryption via the platform primitive.
    Aes256Gcm,
    /// Portable software cipher. Explicitly weaker.
    FallbackStream,
}

/// An encrypted buffer with the metadata decryption needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub method: CipherMethod,
}

/// Derives a symmetric key from a secret and salt via Argon2id.
pub fn derive_key(secret: &[u8], salt: &[u8], params: KdfParams) -> CryptoResult<SymmetricKey> {
    let argon_params = argon2::Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| CryptoError::KdfFailed(e.to_string()))?;
    let argon2 = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon_params,
    );

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(secret, salt, &mut key)
        .map_err(|e| CryptoError::KdfFailed(e.to_string()))?;
    Ok(key)
}

/// Generates a random 16-byte salt.
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; 16];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Generates a random nonce.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// AES-256-GCM encryption.
pub fn aead_encrypt(key: &SymmetricKey, plaintext: &[u8]) -> CryptoResult<EncryptedPayload> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| CryptoError::CipherFailed("invalid key length".into()))?;
    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::CipherFailed("AES-GCM encryption failed".into()))?;
    Ok(EncryptedPayload {
        ciphertext,
        nonce: nonce_bytes.to_vec(),
        method: CipherMethod::Aes256Gcm,
    })
}

/// AES-256-GCM decryption.
pub fn aead_decrypt(key: &SymmetricKey, payload: &EncryptedPayload) -> CryptoResult<Vec<u8>> {
    if payload.nonce.len() != NONCE_LEN {
        return Err(CryptoError::MalformedPayload(format!(
            "nonce length {} != {}",
            payload.nonce.len(),
            NONCE_LEN
        )));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| CryptoError::CipherFailed("invalid key length".into()))?;
    let nonce = Nonce::from_slice(&payload.nonce);
    cipher
        .decrypt(nonce, payload.ciphertext.as_ref())
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Portable fallback encryption: SHA-256 counter keystream plus a keyed
/// tag appended to the ciphertext.
pub fn fallback_encrypt(key: &SymmetricKey, plaintext: &[u8]) -> CryptoResult<EncryptedPayload> {
    let nonce = generate_nonce();
    let mut body = plaintext.to_vec();
    apply_keystream(key, &nonce, &mut body);

    let tag = fallback_tag(key, &nonce, &body);
    let mut ciphertext = body;
    ciphertext.extend_from_slice(&tag);

    Ok(EncryptedPayload {
        ciphertext,
        nonce: nonce.to_vec(),
        method: CipherMethod::FallbackStream,
    })
}

/// Fallback decryption: verifies the tag in constant time, then strips
/// the keystream.
pub fn fallback_decrypt(key: &SymmetricKey, payload: &EncryptedPayload) -> CryptoResult<Vec<u8>> {
    if payload.nonce.len() != NONCE_LEN {
        return Err(CryptoError::MalformedPayload(format!(
            "nonce length {} != {}",
            payload.nonce.len(),
            NONCE_LEN
        )));
    }
    if payload.ciphertext.len() < TAG_LEN {
        return Err(CryptoError::MalformedPayload(
            "ciphertext shorter than tag".into(),
        ));
    }
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&payload.nonce);

    let (body, tag) = payload.ciphertext.split_at(payload.ciphertext.len() - TAG_LEN);
    let expected = fallback_tag(key, &nonce, body);
    let matches: bool = expected.ct_eq(tag).into();
    if !matches {
        return Err(CryptoError::AuthenticationFailed);
    }

    let mut plaintext = body.to_vec();
    apply_keystream(key, &nonce, &mut plaintext);
    Ok(plaintext)
}

fn apply_keystream(key: &SymmetricKey, nonce: &[u8; NONCE_LEN], buf: &mut [u8]) {
    let mut counter: u64 = 0;
    let mut offset = 0;
    while offset < buf.len() {
        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.update(nonce);
        hasher.update(counter.to_le_bytes());
        let block = hasher.finalize();

        let take = (buf.len() - offset).min(block.len());
        for i in 0..take {
            buf[offset + i] ^= block[i];
        }
        offset += take;
        counter += 1;
    }
}

fn fallback_tag(key: &SymmetricKey, nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> [u8; TAG_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(b"ledgercore-fallback-tag");
    hasher.update(key);
    hasher.update(nonce);
    hasher.update(ciphertext);
    let digest = hasher.finalize();
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&digest);
    tag
}
