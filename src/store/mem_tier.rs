//! Last-resort tier: in-memory map with an optional byte quota
//!
//! Per DURABILITY.md §4.3 this tier is always reachable but never
//! durable; it exists so a write still lands somewhere when both on-disk
//! tiers are refusing work. The quota models host storage exhaustion:
//! once the byte budget is spent, writes fail and the fallback chain
//! reports the exhaustion instead of silently dropping data.

use std::collections::HashMap;
use std::sync::Mutex;

use super::errors::{StoreError, StoreResult};
use super::tier::{validate_key, StorageTier, TierCapabilities};

/// In-memory key-value tier.
pub struct MemTier {
    priority: u8,
    quota_bytes: Option<usize>,
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemTier {
    /// Creates the tier. `quota_bytes: None` means unbounded.
    pub fn new(priority: u8, quota_bytes: Option<usize>) -> Self {
        Self {
            priority,
            quota_bytes,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn used_bytes(entries: &HashMap<String, Vec<u8>>) -> usize {
        entries.values().map(|v| v.len()).sum()
    }
}

impl StorageTier for MemTier {
    fn name(&self) -> &'static str {
        "mem"
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn probe(&self) -> bool {
        true
    }

    fn capabilities(&self) -> TierCapabilities {
        TierCapabilities::all()
    }

    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_key(key)?;
        let entries = self.entries.lock().expect("mem tier lock poisoned");
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        let mut entries = self.entries.lock().expect("mem tier lock poisoned");
        if let Some(quota) = self.quota_bytes {
            let existing = entries.get(key).map(|v| v.len()).unwrap_or(0);
            let projected = Self::used_bytes(&entries) - existing + value.len();
            if projected > quota {
                return Err(StoreError::quota_exceeded(self.name(), projected, quota));
            }
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        self.entries
            .lock()
            .expect("mem tier lock poisoned")
            .remove(key);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let entries = self.entries.lock().expect("mem tier lock poisoned");
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let tier = MemTier::new(3, None);
        tier.write("k", b"v").unwrap();
        assert_eq!(tier.read("k").unwrap(), Some(b"v".to_vec()));
        tier.delete("k").unwrap();
        assert_eq!(tier.read("k").unwrap(), None);
    }

    #[test]
    fn test_quota_exhaustion_fails_write() {
        let tier = MemTier::new(3, Some(10));
        tier.write("a", b"12345").unwrap();
        let err = tier.write("b", b"123456").unwrap_err();
        assert_eq!(err.code().code(), "LGR_STORE_QUOTA_EXCEEDED");
        // Still available; the router decides what to do next.
        assert!(tier.probe());
    }

    #[test]
    fn test_overwrite_frees_old_bytes() {
        let tier = MemTier::new(3, Some(10));
        tier.write("a", b"1234567890").unwrap();
        // Same key, same size: fits because the old value is replaced.
        tier.write("a", b"0987654321").unwrap();
    }
}
