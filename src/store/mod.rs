//! Storage tier subsystem for ledgercore
//!
//! Durability without a server comes from a prioritized chain of local
//! storage tiers behind one capability interface. Per DURABILITY.md:
//!
//! - Tiers are ordered ascending by priority (1 = most preferred)
//! - Availability is probed lazily, per call; host capability can change
//!   at runtime (quota exhaustion, revoked directory access)
//! - A write lands in exactly one tier (the first that accepts it)
//! - A read returns the first present value in priority order
//! - "Not found" is a valid outcome, not an error
//! - Tier failures are logged and skipped, never abort the chain
//! - Exhausting every tier on write is a hard `LGR_STORE_ALL_TIERS_FAILED`
//! - Checksum failure on read is corruption and is never ignored

mod errors;
mod file_tier;
mod log_tier;
mod mem_tier;
mod router;
mod tier;

pub use errors::{Severity, StoreError, StoreErrorCode, StoreResult};
pub use file_tier::FileTier;
pub use log_tier::LogTier;
pub use mem_tier::MemTier;
pub use router::{DeleteOutcome, FallbackRouter};
pub use tier::{validate_key, StorageTier, TierCapabilities};
