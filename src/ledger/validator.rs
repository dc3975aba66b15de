//! Balance and single-sidedness checks
//!
//! Per LEDGER.md §3:
//! - An entry needs at least two lines
//! - Debit and credit totals must agree within a fixed rounding epsilon
//! - Each line carries exactly one non-zero side
//! - A repeated account code is a warning, never a hard error

use std::collections::HashSet;

use super::entry::JournalEntry;

/// Monetary rounding tolerance, in currency units.
pub const BALANCE_EPSILON: f64 = 0.01;

/// Computed debit/credit totals for an entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryTotals {
    pub debit_total: f64,
    pub credit_total: f64,
    /// `debit_total - credit_total`.
    pub difference: f64,
}

/// Outcome of validating one journal entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub totals: EntryTotals,
}

/// Validates a journal entry against the double-entry invariants.
///
/// Pure: no storage access, no side effects. `valid` is false exactly
/// when `errors` is non-empty; warnings alone never invalidate.
pub fn validate(entry: &JournalEntry) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if entry.lines.len() < 2 {
        errors.push(format!(
            "entry has {} line(s); a double-entry posting needs at least 2",
            entry.lines.len()
        ));
    }

    let debit_total: f64 = entry.lines.iter().map(|l| l.debit).sum();
    let credit_total: f64 = entry.lines.iter().map(|l| l.credit).sum();
    let difference = debit_total - credit_total;

    if difference.abs() > BALANCE_EPSILON {
        errors.push(format!(
            "entry is unbalanced: debit total {:.2}, credit total {:.2}, difference {:.2}",
            debit_total,
            credit_total,
            difference.abs()
        ));
    }

    for (index, line) in entry.lines.iter().enumerate() {
        let has_debit = line.debit != 0.0;
        let has_credit = line.credit != 0.0;
        if has_debit && has_credit {
            errors.push(format!(
                "line {} ({}) has both a debit and a credit",
                index + 1,
                line.account_code
            ));
        } else if !has_debit && !has_credit {
            errors.push(format!(
                "line {} ({}) has neither a debit nor a credit",
                index + 1,
                line.account_code
            ));
        }

        if line.debit < 0.0 || line.credit < 0.0 {
            errors.push(format!(
                "line {} ({}) has a negative amount",
                index + 1,
                line.account_code
            ));
        }
    }

    let mut seen = HashSet::new();
    for line in &entry.lines {
        if !seen.insert(line.account_code.as_str()) {
            warnings.push(format!(
                "account {} appears on more than one line",
                line.account_code
            ));
        }
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
        totals: EntryTotals {
            debit_total,
            credit_total,
            difference,
        },
    }
}
