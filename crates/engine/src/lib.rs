//! Engine layer for jstm.
//!
//! Wires the pieces together:
//! - `Store`: handles over a shared TVar set, `new_tvar`, snapshots, and
//!   the commit protocol (validate under a commit lock, apply via CAS)
//! - `atomically`: the retry driver executing user closures until commit
//! - `RetryConfig`: retry ceiling and backoff schedule

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod retry;
pub mod store;

pub use retry::RetryConfig;
pub use store::{BackendKind, Store, StoreOptions};
