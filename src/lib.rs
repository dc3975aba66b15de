//! ledgercore - durability and integrity core for a local, server-less
//! financial ledger
//!
//! No backing server exists: durability comes from a prioritized chain of
//! local storage tiers, schema evolution runs through transactional
//! migrations with recorded inverses, every mutating action lands in a
//! hash-chained append-only audit trail, and expensive or key-touching
//! work runs on a bounded background worker pool.

pub mod audit;
pub mod config;
pub mod crypto;
pub mod ledger;
pub mod migrate;
pub mod observability;
pub mod services;
pub mod store;
pub mod tasks;
