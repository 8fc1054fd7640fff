//! Backend contract: the versioned key/value store the engine runs on.

use crate::error::Result;
use crate::json::JsonValue;
use crate::types::VersionedDoc;

/// A versioned key/value store.
///
/// The engine requires only these operations; any backend providing them
/// is conforming (the shipped ones are an in-memory map and a
/// snapshot-file variant; an embedded SQL engine with a JSON column works
/// equally well).
///
/// ## Bracket
///
/// `begin_exclusive` / `commit` / `rollback` delimit a transactional
/// bracket inside which the other operations are linearizable. The
/// engine serializes brackets with its own commit lock; backends may
/// additionally stage writes so that `rollback` discards them.
///
/// ## Versions
///
/// `insert` creates records at version 0. `cas_update` bumps the version
/// by exactly 1 iff the expected version matches, and reports whether a
/// record changed.
pub trait KvBackend: Send + Sync {
    /// Insert a new record at version 0. Fails with `AlreadyExists` if
    /// the id is present.
    fn insert(&self, id: &str, value: &JsonValue) -> Result<()>;

    /// Current committed `(value, version)` pair, or `None` if absent.
    ///
    /// The pair must be consistent: the value corresponds to the version.
    fn select(&self, id: &str) -> Result<Option<VersionedDoc>>;

    /// Current version only (cheaper than [`KvBackend::select`]).
    fn select_version(&self, id: &str) -> Result<Option<u64>>;

    /// Version-conditioned update.
    ///
    /// Writes `value` and sets `version := expected_version + 1` iff the
    /// record's current version equals `expected_version`. Returns
    /// whether a record was updated (`false` means the CAS lost).
    fn cas_update(&self, id: &str, value: &JsonValue, expected_version: u64) -> Result<bool>;

    /// Open the exclusive bracket.
    fn begin_exclusive(&self) -> Result<()>;

    /// Commit the bracket, publishing staged writes.
    fn commit(&self) -> Result<()>;

    /// Roll the bracket back, discarding staged writes.
    fn rollback(&self) -> Result<()>;
}
