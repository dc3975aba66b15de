//! Double-entry invariant validation
//!
//! A pure function layer invoked by writers before a journal mutation
//! is accepted. The validator has no side effects and no dependency on
//! storage; callers decide whether a failed validation blocks the
//! write.

mod entry;
mod validator;

pub use entry::{JournalEntry, JournalLine};
pub use validator::{validate, EntryTotals, ValidationReport, BALANCE_EPSILON};
