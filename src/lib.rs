//! Software transactional memory over named, versioned JSON documents.
//!
//! A [`Store`] holds *TVars*: named JSON documents with a monotonic
//! version. Closures passed to [`Store::atomically`] read and write TVars
//! through a [`TransactionContext`]; the runtime executes the closure
//! atomically, detects conflicts with concurrent transactions via
//! optimistic concurrency control, and retries until the commit succeeds
//! or the retry ceiling is hit.
//!
//! # Example
//!
//! ```
//! use jstm::{Result, Store};
//! use serde_json::json;
//!
//! # fn main() -> Result<()> {
//! let store = Store::in_memory()?;
//! store.new_tvar("account", json!({"balance": 100}))?;
//!
//! let new_balance = store.atomically(|tx| {
//!     let balance: i64 = tx.read_tvar_path_as("account", "balance")?;
//!     tx.update_tvar_path("account", "balance", json!(balance - 30))?;
//!     Ok(balance - 30)
//! })?;
//!
//! assert_eq!(new_balance, 70);
//! # Ok(())
//! # }
//! ```
//!
//! # Guarantees
//!
//! - **Atomicity**: either every buffered write in a transaction is
//!   published, or none is. Closure errors abort without committing.
//! - **Isolation**: reads observe per-TVar committed snapshots, cached
//!   for the life of the attempt; commit validates that every observed
//!   version is still current and aborts (for retry) otherwise.
//! - **Linearizability**: commits are serialized on a single lock, so
//!   committed transactions form a total order consistent with real time.
//!
//! Closures may run many times under contention — keep them free of side
//! effects other than TVar operations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use jstm_core::{
    get_at_path, set_at_path, Error, JsonPath, JsonValue, KvBackend, PathSegment, Result,
    VersionedDoc,
};

pub use jstm_concurrency::{
    PatchOp, ReadEntry, TransactionContext, TransactionStatus, WritePlan,
};

pub use jstm_engine::{BackendKind, RetryConfig, Store, StoreOptions};
