//! Content hashing for the audit chain
//!
//! The chain hash is a SHA-256 over a canonical JSON rendering of the
//! hashed fields (object keys sorted, no insignificant whitespace). When
//! the strong primitive is unavailable the engine degrades to a
//! deterministic FNV-1a 64-bit hash; that hash is NOT collision
//! resistant, so every event records which algorithm produced it and
//! verification reports flag fallback-hashed links as weak.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which algorithm produced a `changes_hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// Collision-resistant content hash (256-bit).
    Sha256,
    /// Deterministic non-cryptographic fallback. Explicitly weaker.
    Fnv64Fallback,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Fnv64Fallback => "fnv64_fallback",
        }
    }

    /// Whether chain links hashed with this algorithm are
    /// collision-resistant.
    pub fn is_strong(&self) -> bool {
        matches!(self, HashAlgorithm::Sha256)
    }
}

/// Renders a JSON value canonically: object keys sorted, arrays in
/// order, no whitespace. Deterministic across runs and platforms.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Hashes canonical content with the selected algorithm.
#[derive(Debug, Clone)]
pub struct HashEngine {
    use_fallback: bool,
}

impl HashEngine {
    /// Engine backed by the strong primitive.
    pub fn new() -> Self {
        Self { use_fallback: false }
    }

    /// Engine pinned to the weak deterministic fallback, for hosts where
    /// the cryptographic primitive is unavailable.
    pub fn with_fallback() -> Self {
        Self { use_fallback: true }
    }

    /// Hashes `content`, reporting which algorithm actually ran.
    pub fn hash(&self, content: &str) -> (String, HashAlgorithm) {
        if self.use_fallback {
            (fnv1a64_hex(content), HashAlgorithm::Fnv64Fallback)
        } else {
            (sha256_hex(content), HashAlgorithm::Sha256)
        }
    }

    /// Recomputes a hash with a specific algorithm, for chain
    /// verification of historical events.
    pub fn hash_with(&self, content: &str, algorithm: HashAlgorithm) -> String {
        match algorithm {
            HashAlgorithm::Sha256 => sha256_hex(content),
            HashAlgorithm::Fnv64Fallback => fnv1a64_hex(content),
        }
    }
}

impl Default for HashEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

fn fnv1a64_hex(content: &str) -> String {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for byte in content.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    format!("{:016x}", hash)
}
