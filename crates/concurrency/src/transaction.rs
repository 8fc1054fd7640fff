//! Transaction context for OCC.
//!
//! `TransactionContext` tracks everything one transaction attempt reads
//! and intends to write. Reads snapshot individual TVars from the backend
//! at first access and are cached for the life of the attempt (read
//! stability); writes are buffered as plans and applied only by the
//! commit protocol. Nothing here mutates the store.
//!
//! # Read-your-writes
//!
//! When reading a TVar, the context checks in order:
//! 1. a buffered full replacement — returned directly
//! 2. buffered path patches — materialized against the cached (or
//!    freshly fetched) committed document
//! 3. the read-set cache
//! 4. the backend, caching the `(value, version)` pair for validation
//!
//! # Conflict detection
//!
//! Every committed pair that enters the read set is validated at commit
//! time against the backend's current version. Accessed paths are
//! recorded per entry for diagnostics, but validation is whole-record:
//! the backend versions documents, not paths, so disjoint-path writes to
//! the same TVar conflict by design.

use jstm_core::{get_at_path, set_at_path, Error, JsonPath, JsonValue, KvBackend, Result};
use serde::de::DeserializeOwned;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Status of a transaction attempt in its lifecycle.
///
/// Transitions:
/// - `Active` → `Validating` (commit begins)
/// - `Validating` → `Committed` (validation and apply succeeded)
/// - `Active`/`Validating` → `Aborted` (closure error or conflict)
///
/// `Committed` and `Aborted` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Executing the user closure; reads and writes are accepted
    Active,
    /// Commit in progress: read set being validated
    Validating,
    /// Writes applied and published
    Committed,
    /// Discarded without publishing anything
    Aborted {
        /// Why the attempt was abandoned
        reason: String,
    },
}

/// One observed read: the committed pair cached at first access.
#[derive(Debug, Clone)]
pub struct ReadEntry {
    /// Committed document at the time of the read
    pub value: JsonValue,
    /// Version the document had at the time of the read
    pub version: u64,
    /// Paths projected from this document (informational)
    pub paths: Vec<JsonPath>,
}

impl ReadEntry {
    fn new(value: JsonValue, version: u64) -> Self {
        ReadEntry {
            value,
            version,
            paths: Vec::new(),
        }
    }
}

/// One buffered path assignment within a [`WritePlan::Patch`].
#[derive(Debug, Clone)]
pub struct PatchOp {
    /// Normalized target path
    pub path: JsonPath,
    /// Value to assign at the path
    pub value: JsonValue,
}

/// Buffered intent for one TVar.
///
/// A later `Replace` supersedes any prior plan for the same id; patches
/// accumulate in insertion order and later patches observe earlier ones.
#[derive(Debug, Clone)]
pub enum WritePlan {
    /// Replace the whole document
    Replace(JsonValue),
    /// Apply ordered path assignments to the committed document
    Patch(Vec<PatchOp>),
}

/// Per-transaction read/write tracking.
///
/// Owned by exactly one closure invocation on one thread; a fresh context
/// is created for every attempt and discarded on commit or abort.
pub struct TransactionContext {
    backend: Arc<dyn KvBackend>,

    /// Observed reads, keyed by TVar id; validated at commit
    pub read_set: HashMap<String, ReadEntry>,

    /// Buffered writes, keyed by TVar id
    ///
    /// BTreeMap so the commit protocol applies writes in a stable order.
    pub write_set: BTreeMap<String, WritePlan>,

    /// Current lifecycle state
    pub status: TransactionStatus,
}

impl TransactionContext {
    /// Create a fresh context reading through the given backend
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        TransactionContext {
            backend,
            read_set: HashMap::new(),
            write_set: BTreeMap::new(),
            status: TransactionStatus::Active,
        }
    }

    // === Read operations ===

    /// Read the full document of a TVar.
    ///
    /// Sees this transaction's own buffered writes. The first read of an
    /// id snapshots `(value, version)` from the backend into the read set;
    /// repeated reads with no intervening write return the same value.
    ///
    /// # Errors
    /// `NotFound` if no such TVar exists (and none was fully replaced in
    /// this transaction).
    pub fn read_tvar(&mut self, id: &str) -> Result<JsonValue> {
        self.ensure_active()?;

        // 1. Buffered full replacement wins. Record the committed version
        //    in the read set so commit still validates it.
        if let Some(WritePlan::Replace(v)) = self.write_set.get(id) {
            let v = v.clone();
            if !self.read_set.contains_key(id) {
                let version = self.backend.select_version(id)?.unwrap_or(0);
                self.read_set
                    .insert(id.to_string(), ReadEntry::new(v.clone(), version));
            }
            return Ok(v);
        }

        let has_patches = matches!(self.write_set.get(id), Some(WritePlan::Patch(_)));
        let base = self.cached_value(id)?;

        if has_patches {
            Ok(self.apply_patches(id, base))
        } else {
            Ok(base)
        }
    }

    /// Read the value at `path` inside a TVar's document.
    ///
    /// # Errors
    /// - `InvalidPath` if the path string does not parse
    /// - `NotFound` if no such TVar exists
    /// - `PathAbsent` if traversal hits a missing key or index
    pub fn read_tvar_path(&mut self, id: &str, path: &str) -> Result<JsonValue> {
        self.ensure_active()?;
        let path: JsonPath = path.parse()?;

        // Buffered full replacement: project in memory.
        if let Some(WritePlan::Replace(v)) = self.write_set.get(id) {
            return match get_at_path(v.as_inner(), &path) {
                Some(found) => Ok(JsonValue::from(found.clone())),
                None => Err(Error::path_absent(id, path.to_string())),
            };
        }

        let has_patches = matches!(self.write_set.get(id), Some(WritePlan::Patch(_)));
        let base = self.cached_value(id)?;
        self.record_accessed_path(id, path.clone());

        let doc = if has_patches {
            self.apply_patches(id, base)
        } else {
            base
        };

        match get_at_path(doc.as_inner(), &path) {
            Some(found) => Ok(JsonValue::from(found.clone())),
            None => Err(Error::path_absent(id, path.to_string())),
        }
    }

    /// Read a TVar and deserialize it into `T`
    pub fn read_tvar_as<T: DeserializeOwned>(&mut self, id: &str) -> Result<T> {
        let value = self.read_tvar(id)?;
        serde_json::from_value(value.into_inner())
            .map_err(|e| Error::serialization(format!("tvar {}: {}", id, e)))
    }

    /// Read a path inside a TVar and deserialize it into `T`
    pub fn read_tvar_path_as<T: DeserializeOwned>(&mut self, id: &str, path: &str) -> Result<T> {
        let value = self.read_tvar_path(id, path)?;
        serde_json::from_value(value.into_inner())
            .map_err(|e| Error::serialization(format!("tvar {} at {}: {}", id, path, e)))
    }

    // === Write operations ===

    /// Buffer a full replacement of a TVar's document.
    ///
    /// Supersedes any prior plan for the id. Does not touch the read set;
    /// read-your-writes is served on the read side.
    pub fn write_tvar(&mut self, id: &str, value: impl Into<JsonValue>) -> Result<()> {
        self.ensure_active()?;
        self.write_set
            .insert(id.to_string(), WritePlan::Replace(value.into()));
        Ok(())
    }

    /// Buffer an assignment at `path` inside a TVar's document.
    ///
    /// Requires no prior read of the id: a patch plan is validated at
    /// commit against the backend's then-current version, which detects
    /// concurrent writers exactly like read-then-replace would.
    ///
    /// # Errors
    /// `InvalidPath` if the path string does not parse.
    pub fn update_tvar_path(
        &mut self,
        id: &str,
        path: &str,
        value: impl Into<JsonValue>,
    ) -> Result<()> {
        self.ensure_active()?;
        let path: JsonPath = path.parse()?;
        let value = value.into();

        match self.write_set.entry(id.to_string()) {
            Entry::Occupied(mut occupied) => match occupied.get_mut() {
                // A buffered replacement is mutated in place; the plan
                // stays a replacement.
                WritePlan::Replace(doc) => {
                    set_at_path(doc.as_inner_mut(), &path, value.into_inner());
                }
                WritePlan::Patch(ops) => {
                    ops.push(PatchOp { path, value });
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(WritePlan::Patch(vec![PatchOp { path, value }]));
            }
        }
        Ok(())
    }

    // === Internals ===

    /// Cached committed value for `id`, fetching it into the read set on
    /// first access.
    fn cached_value(&mut self, id: &str) -> Result<JsonValue> {
        if let Some(entry) = self.read_set.get(id) {
            return Ok(entry.value.clone());
        }
        let doc = self
            .backend
            .select(id)?
            .ok_or_else(|| Error::not_found(id))?;
        tracing::trace!(
            target: "jstm::txn",
            id,
            version = doc.version,
            "snapshotted tvar into read set"
        );
        let value = doc.value.clone();
        self.read_set
            .insert(id.to_string(), ReadEntry::new(doc.value, doc.version));
        Ok(value)
    }

    /// Materialize this transaction's patch plan for `id` on top of `base`
    fn apply_patches(&self, id: &str, base: JsonValue) -> JsonValue {
        let mut doc = base;
        if let Some(WritePlan::Patch(ops)) = self.write_set.get(id) {
            for op in ops {
                set_at_path(doc.as_inner_mut(), &op.path, op.value.clone().into_inner());
            }
        }
        doc
    }

    fn record_accessed_path(&mut self, id: &str, path: JsonPath) {
        if let Some(entry) = self.read_set.get_mut(id) {
            if !entry.paths.contains(&path) {
                entry.paths.push(path);
            }
        }
    }

    // === State management ===

    /// Whether the context still accepts operations
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Whether the attempt committed
    pub fn is_committed(&self) -> bool {
        matches!(self.status, TransactionStatus::Committed)
    }

    /// Whether the attempt was abandoned
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TransactionStatus::Aborted { .. })
    }

    /// Error unless the context is `Active`
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::not_active(format!("{:?}", self.status)))
        }
    }

    /// `Active` → `Validating`
    pub fn mark_validating(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.status = TransactionStatus::Validating;
        Ok(())
    }

    /// `Validating` → `Committed`
    pub fn mark_committed(&mut self) -> Result<()> {
        match self.status {
            TransactionStatus::Validating => {
                self.status = TransactionStatus::Committed;
                Ok(())
            }
            _ => Err(Error::not_active(format!("{:?}", self.status))),
        }
    }

    /// `Active`/`Validating` → `Aborted`; buffered writes are discarded
    pub fn mark_aborted(&mut self, reason: impl Into<String>) -> Result<()> {
        match self.status {
            TransactionStatus::Active | TransactionStatus::Validating => {
                self.status = TransactionStatus::Aborted {
                    reason: reason.into(),
                };
                self.write_set.clear();
                Ok(())
            }
            _ => Err(Error::not_active(format!("{:?}", self.status))),
        }
    }

    // === Introspection ===

    /// Number of ids in the read set
    pub fn read_count(&self) -> usize {
        self.read_set.len()
    }

    /// Number of ids with buffered writes
    pub fn write_count(&self) -> usize {
        self.write_set.len()
    }

    /// Whether this attempt has no buffered writes
    pub fn is_read_only(&self) -> bool {
        self.write_set.is_empty()
    }
}
