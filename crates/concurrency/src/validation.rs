//! Read-set validation for OCC.
//!
//! At commit time, every `(id, version)` pair observed by a transaction
//! is checked against the backend's current version. Any drift means
//! another transaction committed in between: the attempt conflicts and
//! must be retried. A vanished id is not a conflict — records are never
//! removed, so it indicates a logic error and is fatal.

use crate::transaction::ReadEntry;
use jstm_core::{Error, KvBackend, Result};
use std::collections::HashMap;

/// One read whose version moved underneath the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConflict {
    /// Id of the conflicted TVar
    pub id: String,
    /// Version recorded in the read set
    pub read_version: u64,
    /// Current version in the backend at validation time
    pub current_version: u64,
}

/// Outcome of validating a read set.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected
    pub conflicts: Vec<VersionConflict>,
}

impl ValidationResult {
    /// A passing result with no conflicts
    pub fn ok() -> Self {
        ValidationResult::default()
    }

    /// Whether validation passed
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Number of conflicts found
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }
}

/// Validate a read set against the backend's current versions.
///
/// Returns `Err(NotFound)` if any read id no longer exists (fatal, not
/// retried); otherwise returns the accumulated conflicts.
pub fn validate_read_set(
    read_set: &HashMap<String, ReadEntry>,
    backend: &dyn KvBackend,
) -> Result<ValidationResult> {
    let mut result = ValidationResult::ok();
    for (id, entry) in read_set {
        let current = backend
            .select_version(id)?
            .ok_or_else(|| Error::not_found(id.clone()))?;
        if current != entry.version {
            result.conflicts.push(VersionConflict {
                id: id.clone(),
                read_version: entry.version,
                current_version: current,
            });
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionContext;
    use jstm_core::{JsonValue, KvBackend};
    use jstm_storage::MemoryBackend;
    use std::sync::Arc;

    fn setup() -> (Arc<dyn KvBackend>, TransactionContext) {
        let backend = MemoryBackend::new();
        backend.insert("a", &JsonValue::from(1i64)).unwrap();
        backend.insert("b", &JsonValue::from(2i64)).unwrap();
        let backend: Arc<dyn KvBackend> = Arc::new(backend);
        let txn = TransactionContext::new(backend.clone());
        (backend, txn)
    }

    #[test]
    fn unchanged_reads_validate() {
        let (backend, mut txn) = setup();
        let _ = txn.read_tvar("a").unwrap();
        let _ = txn.read_tvar("b").unwrap();
        let result = validate_read_set(&txn.read_set, backend.as_ref()).unwrap();
        assert!(result.is_valid());
    }

    #[test]
    fn moved_version_conflicts() {
        let (backend, mut txn) = setup();
        let _ = txn.read_tvar("a").unwrap();
        // A concurrent commit bumps the version
        assert!(backend.cas_update("a", &JsonValue::from(9i64), 0).unwrap());

        let result = validate_read_set(&txn.read_set, backend.as_ref()).unwrap();
        assert!(!result.is_valid());
        assert_eq!(result.conflict_count(), 1);
        assert_eq!(
            result.conflicts[0],
            VersionConflict {
                id: "a".to_string(),
                read_version: 0,
                current_version: 1,
            }
        );
    }

    #[test]
    fn only_touched_ids_are_validated() {
        let (backend, mut txn) = setup();
        let _ = txn.read_tvar("a").unwrap();
        // "b" changes, but this transaction never read it
        assert!(backend.cas_update("b", &JsonValue::from(9i64), 0).unwrap());
        let result = validate_read_set(&txn.read_set, backend.as_ref()).unwrap();
        assert!(result.is_valid());
    }

    #[test]
    fn empty_read_set_is_valid() {
        let (backend, txn) = setup();
        let result = validate_read_set(&txn.read_set, backend.as_ref()).unwrap();
        assert!(result.is_valid());
    }
}
