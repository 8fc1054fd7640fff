//! The TVar store and the commit protocol.
//!
//! A `Store` is a cheap handle over shared state: the backend holding the
//! TVar records and the commit lock that serializes `new_tvar` and
//! transaction commits. Handles may be cloned freely across threads via
//! [`Store::new_handle`]; `open` calls sharing a `handle_id` resolve to
//! the same underlying TVar set through a process-local registry.
//!
//! # Commit protocol
//!
//! A transaction's closure runs entirely against its context's snapshot;
//! no lock is held while user code executes. When the closure returns,
//! the commit takes the store's commit lock, opens the backend's
//! exclusive bracket, validates every read-set version, resolves each
//! write plan to an effective document, and applies it with a
//! version-conditioned update. Validation failure or a lost CAS rolls
//! the bracket back and reports a conflict for the retry driver.

use crate::retry::RetryConfig;
use jstm_concurrency::{validate_read_set, TransactionContext, WritePlan};
use jstm_core::{set_at_path, Error, JsonValue, KvBackend, Result, VersionedDoc};
use jstm_storage::{FileBackend, MemoryBackend};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Which backend a store runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-memory, discarded on drop
    Ephemeral,
    /// Snapshot-file backed, reloaded on open
    Persistent,
}

/// Options for [`Store::open`].
///
/// # Example
/// ```
/// use jstm_engine::{Store, StoreOptions};
///
/// let store = Store::open(StoreOptions::ephemeral().with_handle_id(7)).unwrap();
/// let same_set = Store::open(StoreOptions::ephemeral().with_handle_id(7)).unwrap();
/// # let _ = (store, same_set);
/// ```
#[derive(Debug, Clone)]
pub struct StoreOptions {
    backend: BackendKind,
    location: Option<PathBuf>,
    handle_id: Option<u64>,
    retry: RetryConfig,
}

impl StoreOptions {
    /// An in-memory store
    pub fn ephemeral() -> Self {
        StoreOptions {
            backend: BackendKind::Ephemeral,
            location: None,
            handle_id: None,
            retry: RetryConfig::default(),
        }
    }

    /// A snapshot-file store at `location`
    pub fn persistent(location: impl Into<PathBuf>) -> Self {
        StoreOptions {
            backend: BackendKind::Persistent,
            location: Some(location.into()),
            handle_id: None,
            retry: RetryConfig::default(),
        }
    }

    /// Share one TVar set between all opens using this id
    pub fn with_handle_id(mut self, handle_id: u64) -> Self {
        self.handle_id = Some(handle_id);
        self
    }

    /// Override the retry schedule for handles opened with these options
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// State shared by every handle over one TVar set.
struct StoreShared {
    /// Distinguishes underlying stores for nested-transaction detection
    store_id: u64,
    backend: Arc<dyn KvBackend>,
    /// Single linearization point: serializes commits and `new_tvar`
    commit_lock: Mutex<()>,
}

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Registry backing `handle_id` sharing. Holds weak references only, so
/// stores are dropped when the last handle goes away.
fn registry() -> &'static Mutex<HashMap<u64, Weak<StoreShared>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<u64, Weak<StoreShared>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

thread_local! {
    /// store_id → nesting depth of transactions running on this thread
    static TX_DEPTH: RefCell<HashMap<u64, u32>> = RefCell::new(HashMap::new());
}

/// Decrements the thread-local depth on scope exit, including unwinds
/// out of a panicking closure.
struct TxDepthGuard {
    store_id: u64,
}

impl TxDepthGuard {
    fn enter(store_id: u64) -> Self {
        TX_DEPTH.with(|depths| {
            *depths.borrow_mut().entry(store_id).or_insert(0) += 1;
        });
        TxDepthGuard { store_id }
    }

    fn is_entered(store_id: u64) -> bool {
        TX_DEPTH.with(|depths| depths.borrow().contains_key(&store_id))
    }
}

impl Drop for TxDepthGuard {
    fn drop(&mut self) {
        TX_DEPTH.with(|depths| {
            let mut depths = depths.borrow_mut();
            if let Some(depth) = depths.get_mut(&self.store_id) {
                *depth -= 1;
                if *depth == 0 {
                    depths.remove(&self.store_id);
                }
            }
        });
    }
}

/// A handle over a shared set of TVars.
///
/// All mutation flows through [`Store::atomically`]; `new_tvar` is the
/// only direct write and takes the same commit lock as transactions.
#[derive(Clone)]
pub struct Store {
    shared: Arc<StoreShared>,
    retry: RetryConfig,
}

impl Store {
    /// Open a store with the given options.
    pub fn open(options: StoreOptions) -> Result<Self> {
        let StoreOptions {
            backend,
            location,
            handle_id,
            retry,
        } = options;

        let make_shared = || -> Result<Arc<StoreShared>> {
            let backend: Arc<dyn KvBackend> = match backend {
                BackendKind::Ephemeral => Arc::new(MemoryBackend::new()),
                BackendKind::Persistent => {
                    let location = location.clone().ok_or_else(|| {
                        Error::backend("persistent store requires a location")
                    })?;
                    Arc::new(FileBackend::open(location)?)
                }
            };
            Ok(Arc::new(StoreShared {
                store_id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
                backend,
                commit_lock: Mutex::new(()),
            }))
        };

        let shared = match handle_id {
            None => make_shared()?,
            Some(handle_id) => {
                let mut map = registry().lock();
                match map.get(&handle_id).and_then(Weak::upgrade) {
                    Some(existing) => existing,
                    None => {
                        let fresh = make_shared()?;
                        map.insert(handle_id, Arc::downgrade(&fresh));
                        fresh
                    }
                }
            }
        };

        Ok(Store { shared, retry })
    }

    /// Open an ephemeral in-memory store
    pub fn in_memory() -> Result<Self> {
        Self::open(StoreOptions::ephemeral())
    }

    /// An independent handle over the same TVar set
    pub fn new_handle(&self) -> Store {
        Store {
            shared: self.shared.clone(),
            retry: self.retry.clone(),
        }
    }

    /// Create a TVar. One-shot: fails with `AlreadyExists` if present.
    ///
    /// Serialized with concurrent commits via the commit lock.
    pub fn new_tvar(&self, id: &str, value: impl Into<JsonValue>) -> Result<()> {
        let value = value.into();
        let backend = self.shared.backend.as_ref();
        let _guard = self.shared.commit_lock.lock();
        backend.begin_exclusive()?;
        match backend.insert(id, &value) {
            Ok(()) => {
                backend.commit()?;
                tracing::debug!(target: "jstm::store", id, "created tvar");
                Ok(())
            }
            Err(e) => {
                Self::rollback_best_effort(backend);
                Err(e)
            }
        }
    }

    /// Current committed `(value, version)` of a TVar, if it exists
    pub fn snapshot_record(&self, id: &str) -> Result<Option<VersionedDoc>> {
        self.shared.backend.select(id)
    }

    /// Current committed version of a TVar, if it exists
    pub fn current_version(&self, id: &str) -> Result<Option<u64>> {
        self.shared.backend.select_version(id)
    }

    /// Run a closure atomically, retrying on conflict.
    ///
    /// The closure may run many times; it must be free of side effects
    /// other than TVar operations. Closure errors abort the transaction
    /// without committing and propagate without retry. Conflicts retry
    /// per the store's [`RetryConfig`] until `MaxRetriesExceeded`.
    ///
    /// Calling `atomically` from inside a transaction on the same store
    /// dispatches the inner closure to a fresh handle; it commits
    /// independently of (not atomically with) the outer transaction.
    pub fn atomically<F, T>(&self, f: F) -> Result<T>
    where
        F: FnMut(&mut TransactionContext) -> Result<T>,
    {
        if TxDepthGuard::is_entered(self.shared.store_id) {
            tracing::debug!(
                target: "jstm::txn",
                "nested atomically dispatched to an independent handle"
            );
            return self.new_handle().run_transaction(f);
        }
        self.run_transaction(f)
    }

    fn run_transaction<F, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(&mut TransactionContext) -> Result<T>,
    {
        let _depth = TxDepthGuard::enter(self.shared.store_id);
        let mut attempts: u32 = 0;

        loop {
            let mut txn = TransactionContext::new(self.shared.backend.clone());
            match f(&mut txn) {
                Ok(value) => match self.commit_transaction(&mut txn) {
                    Ok(()) => return Ok(value),
                    Err(e) if e.is_conflict() => {
                        attempts += 1;
                        if attempts >= self.retry.max_attempts {
                            tracing::debug!(
                                target: "jstm::txn",
                                attempts,
                                "retry ceiling reached"
                            );
                            return Err(Error::MaxRetriesExceeded { attempts });
                        }
                        let delay = self.retry.backoff_delay(attempts);
                        if !delay.is_zero() {
                            tracing::trace!(
                                target: "jstm::txn",
                                attempts,
                                delay_ms = delay.as_millis() as u64,
                                "backing off before retry"
                            );
                            std::thread::sleep(delay);
                        }
                    }
                    Err(e) => return Err(e),
                },
                Err(e) => {
                    // Closure error: abort without committing, no retry
                    let _ = txn.mark_aborted(format!("closure error: {}", e));
                    return Err(e);
                }
            }
        }
    }

    /// Validate and apply one attempt under the commit lock.
    fn commit_transaction(&self, txn: &mut TransactionContext) -> Result<()> {
        txn.mark_validating()?;
        let backend = self.shared.backend.as_ref();

        let _guard = self.shared.commit_lock.lock();
        backend.begin_exclusive()?;
        match Self::validate_and_apply(txn, backend) {
            Ok(()) => {
                backend.commit()?;
                txn.mark_committed()?;
                Ok(())
            }
            Err(e) => {
                Self::rollback_best_effort(backend);
                let _ = txn.mark_aborted(e.to_string());
                Err(e)
            }
        }
    }

    fn validate_and_apply(txn: &TransactionContext, backend: &dyn KvBackend) -> Result<()> {
        // Step 1: every observed read must still be current
        let validation = validate_read_set(&txn.read_set, backend)?;
        if !validation.is_valid() {
            let first = &validation.conflicts[0];
            tracing::debug!(
                target: "jstm::txn",
                id = %first.id,
                read_version = first.read_version,
                current_version = first.current_version,
                conflicts = validation.conflict_count(),
                "read validation failed"
            );
            return Err(Error::conflict(format!(
                "tvar {} read at version {}, current is {}",
                first.id, first.read_version, first.current_version
            )));
        }

        // Step 2: resolve each plan to an effective document and CAS it in
        for (id, plan) in &txn.write_set {
            let effective = match plan {
                WritePlan::Replace(value) => value.clone(),
                WritePlan::Patch(ops) => {
                    let mut base = match txn.read_set.get(id) {
                        Some(entry) => entry.value.clone(),
                        None => {
                            backend
                                .select(id)?
                                .ok_or_else(|| Error::not_found(id.clone()))?
                                .value
                        }
                    };
                    for op in ops {
                        set_at_path(base.as_inner_mut(), &op.path, op.value.clone().into_inner());
                    }
                    base
                }
            };

            let expected = match txn.read_set.get(id) {
                Some(entry) => entry.version,
                None => backend
                    .select_version(id)?
                    .ok_or_else(|| Error::not_found(id.clone()))?,
            };

            if !backend.cas_update(id, &effective, expected)? {
                tracing::debug!(target: "jstm::txn", id = %id, expected, "cas lost");
                return Err(Error::conflict(format!(
                    "cas on tvar {} lost at expected version {}",
                    id, expected
                )));
            }
        }

        Ok(())
    }

    fn rollback_best_effort(backend: &dyn KvBackend) {
        if let Err(e) = backend.rollback() {
            tracing::warn!(target: "jstm::txn", error = %e, "rollback failed");
        }
    }
}
