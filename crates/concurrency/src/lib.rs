//! Concurrency layer for jstm.
//!
//! Implements optimistic concurrency control:
//! - `TransactionContext`: per-transaction read/write tracking with
//!   read-your-writes semantics and JSON-path projection/patching
//! - Read-set validation against current backend versions at commit time

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod transaction;
pub mod validation;

pub use transaction::{PatchOp, ReadEntry, TransactionContext, TransactionStatus, WritePlan};
pub use validation::{validate_read_set, ValidationResult, VersionConflict};
