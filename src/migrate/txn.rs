//! Staged migration transaction
//!
//! Forward operations never touch storage directly: they stage writes
//! and deletes in a buffer, and nothing reaches the tier chain until
//! commit. Aborting is dropping the transaction. Commit captures every
//! prior value before applying and, if an operation fails partway,
//! restores the applied prefix in reverse order before reporting the
//! failure, so a half-committed migration is never left behind.

use std::collections::HashMap;

use crate::store::{DeleteOutcome, FallbackRouter, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum StagedOp {
    Write { key: String, value: Vec<u8> },
    Delete { key: String },
}

/// A buffered transaction over the fallback router.
pub struct MigrationTxn<'a> {
    router: &'a FallbackRouter,
    ops: Vec<StagedOp>,
}

impl<'a> MigrationTxn<'a> {
    pub(crate) fn new(router: &'a FallbackRouter) -> Self {
        Self {
            router,
            ops: Vec::new(),
        }
    }

    /// Reads a key as the transaction would see it: staged operations
    /// shadow persisted state.
    pub fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        for op in self.ops.iter().rev() {
            match op {
                StagedOp::Write { key: k, value } if k == key => return Ok(Some(value.clone())),
                StagedOp::Delete { key: k } if k == key => return Ok(None),
                _ => {}
            }
        }
        self.router.read(key)
    }

    /// Stages a write.
    pub fn write(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.ops.push(StagedOp::Write {
            key: key.into(),
            value,
        });
    }

    /// Stages a delete.
    pub fn delete(&mut self, key: impl Into<String>) {
        self.ops.push(StagedOp::Delete { key: key.into() });
    }

    /// Number of staged operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether anything is staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies every staged operation in order.
    ///
    /// On failure the already-applied prefix is undone (best effort)
    /// before the error is returned.
    pub(crate) fn commit(self) -> StoreResult<()> {
        // Prior value per key, captured once at first touch.
        let mut priors: HashMap<String, Option<Vec<u8>>> = HashMap::new();
        let mut applied: Vec<String> = Vec::new();

        for op in &self.ops {
            let key = match op {
                StagedOp::Write { key, .. } => key,
                StagedOp::Delete { key } => key,
            };
            if !priors.contains_key(key) {
                let prior = self.router.read(key)?;
                priors.insert(key.clone(), prior);
            }

            let result = match op {
                StagedOp::Write { key, value } => self.router.write(key, value),
                // A partial delete is a failure: a tier still holds the
                // key and the value stays readable through the chain.
                StagedOp::Delete { key } => {
                    self.router.delete(key).and_then(|outcome| match outcome {
                        DeleteOutcome::Complete => Ok(()),
                        DeleteOutcome::Partial { failed } => {
                            Err(StoreError::delete_incomplete(key, &failed))
                        }
                    })
                }
            };

            if let Err(e) = result {
                // Undo in reverse; keys touched more than once are
                // restored to their original prior exactly once.
                let mut restored = std::collections::HashSet::new();
                for key in applied.iter().rev() {
                    if !restored.insert(key.clone()) {
                        continue;
                    }
                    match priors.get(key) {
                        Some(Some(value)) => {
                            let _ = self.router.write(key, value);
                        }
                        Some(None) => {
                            let _ = self.router.delete(key);
                        }
                        None => {}
                    }
                }
                return Err(e);
            }
            applied.push(key.clone());
        }
        Ok(())
    }
}
