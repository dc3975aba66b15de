//! Journal entry types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One side of a journal entry. Exactly one of `debit`/`credit` must be
/// non-zero; the validator enforces this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    /// Chart-of-accounts code this line posts to.
    pub account_code: String,
    pub debit: f64,
    pub credit: f64,
}

impl JournalLine {
    pub fn debit(account_code: impl Into<String>, amount: f64) -> Self {
        Self {
            account_code: account_code.into(),
            debit: amount,
            credit: 0.0,
        }
    }

    pub fn credit(account_code: impl Into<String>, amount: f64) -> Self {
        Self {
            account_code: account_code.into(),
            debit: 0.0,
            credit: amount,
        }
    }
}

/// A double-entry journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub description: String,
    /// External document reference (invoice number, statement line).
    pub reference: Option<String>,
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    pub fn new(description: impl Into<String>, lines: Vec<JournalLine>) -> Self {
        Self {
            id: Uuid::new_v4(),
            date: Utc::now(),
            description: description.into(),
            reference: None,
            lines,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}
