//! Storage error types following ERRORS.md
//!
//! Error codes:
//! - LGR_STORE_IO_ERROR (ERROR severity)
//! - LGR_STORE_WRITE_FAILED (ERROR severity)
//! - LGR_STORE_READ_FAILED (ERROR severity)
//! - LGR_STORE_DELETE_INCOMPLETE (ERROR severity)
//! - LGR_STORE_QUOTA_EXCEEDED (ERROR severity)
//! - LGR_STORE_INVALID_KEY (ERROR severity)
//! - LGR_STORE_ALL_TIERS_FAILED (FATAL severity)
//! - LGR_STORE_DATA_CORRUPTION (FATAL severity)
//!
//! ERROR-severity failures are absorbed by the fallback chain (skip the
//! tier, try the next). FATAL failures surface to the caller: either every
//! fallback option is exhausted or persisted data failed its checksum.

use std::fmt;
use std::io;

/// Severity levels for storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The affected tier is skipped; the fallback chain continues.
    Error,
    /// The triggering operation fails hard; never absorbed.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Storage-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// Disk or handle I/O failure on one tier
    LgrStoreIoError,
    /// Write attempt on one tier failed
    LgrStoreWriteFailed,
    /// Read attempt on one tier failed
    LgrStoreReadFailed,
    /// A delete left the key present in at least one tier
    LgrStoreDeleteIncomplete,
    /// Tier byte quota would be exceeded
    LgrStoreQuotaExceeded,
    /// Key is malformed (empty, absolute, or traversing)
    LgrStoreInvalidKey,
    /// Every available tier rejected the write
    LgrStoreAllTiersFailed,
    /// Record checksum failure
    LgrStoreDataCorruption,
}

impl StoreErrorCode {
    /// Returns the string code.
    pub fn code(&self) -> &'static str {
        match self {
            StoreErrorCode::LgrStoreIoError => "LGR_STORE_IO_ERROR",
            StoreErrorCode::LgrStoreWriteFailed => "LGR_STORE_WRITE_FAILED",
            StoreErrorCode::LgrStoreReadFailed => "LGR_STORE_READ_FAILED",
            StoreErrorCode::LgrStoreDeleteIncomplete => "LGR_STORE_DELETE_INCOMPLETE",
            StoreErrorCode::LgrStoreQuotaExceeded => "LGR_STORE_QUOTA_EXCEEDED",
            StoreErrorCode::LgrStoreInvalidKey => "LGR_STORE_INVALID_KEY",
            StoreErrorCode::LgrStoreAllTiersFailed => "LGR_STORE_ALL_TIERS_FAILED",
            StoreErrorCode::LgrStoreDataCorruption => "LGR_STORE_DATA_CORRUPTION",
        }
    }

    /// Returns the severity level for this error.
    pub fn severity(&self) -> Severity {
        match self {
            StoreErrorCode::LgrStoreIoError => Severity::Error,
            StoreErrorCode::LgrStoreWriteFailed => Severity::Error,
            StoreErrorCode::LgrStoreReadFailed => Severity::Error,
            StoreErrorCode::LgrStoreDeleteIncomplete => Severity::Error,
            StoreErrorCode::LgrStoreQuotaExceeded => Severity::Error,
            StoreErrorCode::LgrStoreInvalidKey => Severity::Error,
            StoreErrorCode::LgrStoreAllTiersFailed => Severity::Fatal,
            StoreErrorCode::LgrStoreDataCorruption => Severity::Fatal,
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage error with full context.
#[derive(Debug)]
pub struct StoreError {
    code: StoreErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl StoreError {
    /// Create a new storage I/O error.
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StoreErrorCode::LgrStoreIoError,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a new tier write failure.
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StoreErrorCode::LgrStoreWriteFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a tier write failure without an I/O source.
    pub fn write_failed_no_source(message: impl Into<String>) -> Self {
        Self {
            code: StoreErrorCode::LgrStoreWriteFailed,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a new tier read failure.
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StoreErrorCode::LgrStoreReadFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create an incomplete-delete error: the fan-out finished but at
    /// least one tier still holds the key.
    pub fn delete_incomplete(key: &str, failed_tiers: &[&'static str]) -> Self {
        Self {
            code: StoreErrorCode::LgrStoreDeleteIncomplete,
            message: format!("Delete left key '{}' present in some tiers", key),
            details: Some(format!("failed_tiers: {}", failed_tiers.join(","))),
            source: None,
        }
    }

    /// Create a quota-exceeded error.
    pub fn quota_exceeded(tier: &str, requested: usize, capacity: usize) -> Self {
        Self {
            code: StoreErrorCode::LgrStoreQuotaExceeded,
            message: format!("Tier '{}' quota exceeded", tier),
            details: Some(format!("requested: {}, capacity: {}", requested, capacity)),
            source: None,
        }
    }

    /// Create an invalid-key error.
    pub fn invalid_key(key: &str) -> Self {
        Self {
            code: StoreErrorCode::LgrStoreInvalidKey,
            message: format!("Invalid storage key: '{}'", key),
            details: None,
            source: None,
        }
    }

    /// Create the exhausted-fallback error (FATAL).
    pub fn all_tiers_failed(operation: &str, key: &str) -> Self {
        Self {
            code: StoreErrorCode::LgrStoreAllTiersFailed,
            message: format!("All storage tiers failed for {}", operation),
            details: Some(format!("key: {}", key)),
            source: None,
        }
    }

    /// Create a data corruption error (FATAL).
    pub fn data_corruption(message: impl Into<String>) -> Self {
        Self {
            code: StoreErrorCode::LgrStoreDataCorruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a data corruption error with byte offset context.
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: StoreErrorCode::LgrStoreDataCorruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Returns the error code.
    pub fn code(&self) -> StoreErrorCode {
        self.code
    }

    /// Returns the severity level.
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details.
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error must surface to the caller.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StoreErrorCode::LgrStoreAllTiersFailed.code(),
            "LGR_STORE_ALL_TIERS_FAILED"
        );
        assert_eq!(
            StoreErrorCode::LgrStoreDataCorruption.code(),
            "LGR_STORE_DATA_CORRUPTION"
        );
    }

    #[test]
    fn test_fallback_exhaustion_is_fatal() {
        let err = StoreError::all_tiers_failed("write", "audit/head");
        assert!(err.is_fatal());
        let display = format!("{}", err);
        assert!(display.contains("LGR_STORE_ALL_TIERS_FAILED"));
        assert!(display.contains("key: audit/head"));
    }

    #[test]
    fn test_corruption_is_fatal() {
        let err = StoreError::corruption_at_offset(512, "checksum mismatch");
        assert!(err.is_fatal());
        assert!(format!("{}", err).contains("byte_offset: 512"));
    }

    #[test]
    fn test_tier_failures_are_not_fatal() {
        let err = StoreError::write_failed(
            "disk full",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        assert!(!err.is_fatal());
        assert!(!StoreError::quota_exceeded("mem", 10, 5).is_fatal());
    }

    #[test]
    fn test_incomplete_delete_names_surviving_tiers() {
        let err = StoreError::delete_incomplete("schema/customers", &["kvlog", "mem"]);
        assert!(!err.is_fatal());
        let display = format!("{}", err);
        assert!(display.contains("LGR_STORE_DELETE_INCOMPLETE"));
        assert!(display.contains("kvlog,mem"));
    }
}
