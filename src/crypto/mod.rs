//! Cryptographic gateway
//!
//! Per CRYPTO.md:
//! - Keys are derived with Argon2id from a user secret; the salt is
//!   random when not supplied
//! - Encryption is AES-256-GCM when the primitive works; on primitive
//!   failure a portable software cipher keyed from the same secret runs
//!   instead, and the result is tagged with the method that actually
//!   executed — never the stronger method when the fallback ran
//! - Derivation and bulk cipher work run on background workers through
//!   the orchestrator; key material never crosses back to callers

mod errors;
mod gateway;
mod primitives;

pub use errors::{CryptoError, CryptoResult};
pub use gateway::CryptoGateway;
pub use primitives::{
    aead_decrypt, aead_encrypt, derive_key, fallback_decrypt, fallback_encrypt, generate_nonce,
    generate_salt, CipherMethod, EncryptedPayload, KdfParams, SymmetricKey, KEY_LEN, NONCE_LEN,
};
