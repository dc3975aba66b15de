//! Storage tier capability interface
//!
//! Per DURABILITY.md §3, every backend exposes exactly read/write/delete
//! behind one trait; the fallback router is generic over this interface
//! and never over concrete tier types.

use super::errors::{StoreError, StoreResult};

/// Which of the three operations a tier supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierCapabilities {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
}

impl TierCapabilities {
    /// Full read/write/delete support.
    pub const fn all() -> Self {
        Self {
            read: true,
            write: true,
            delete: true,
        }
    }
}

impl Default for TierCapabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// A single storage backend.
///
/// Implementations are `Send + Sync` and internally synchronized: the
/// router and subsystems above it hold tiers behind shared references.
pub trait StorageTier: Send + Sync {
    /// Stable tier name, used in logs and delete outcomes.
    fn name(&self) -> &'static str;

    /// Ordering in the fallback chain; 1 = most preferred.
    fn priority(&self) -> u8;

    /// Lazily evaluated availability. Called before every operation:
    /// host capability can change between calls.
    fn probe(&self) -> bool;

    /// Supported operations.
    fn capabilities(&self) -> TierCapabilities {
        TierCapabilities::all()
    }

    /// Read a value. Absence is `Ok(None)`, not an error.
    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write a value.
    fn write(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Delete a value. Deleting an absent key succeeds.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// All keys currently present in this tier.
    fn keys(&self) -> StoreResult<Vec<String>>;
}

/// Validates a storage key.
///
/// Keys are slash-separated segments of `[A-Za-z0-9._-]`; no empty
/// segments, no `..`, no leading slash. The file tier maps segments to
/// directories, so traversal must be rejected here, once, for all tiers.
pub fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() || key.starts_with('/') || key.ends_with('/') {
        return Err(StoreError::invalid_key(key));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(StoreError::invalid_key(key));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(StoreError::invalid_key(key));
        }
    }
    Ok(())
}
