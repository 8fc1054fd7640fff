//! Core vocabulary for the jstm transactional store.
//!
//! This crate defines the types shared by every layer:
//! - `JsonValue`: the document model (newtype over `serde_json::Value`)
//! - `JsonPath`: dotted/bracketed accessors with a canonical form, plus
//!   projection (`get_at_path`) and patching (`set_at_path`)
//! - `VersionedDoc`: a committed `(value, version)` pair
//! - `KvBackend`: the versioned key/value contract backends implement
//! - `Error`: the unified error type for all jstm APIs

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod json;
pub mod path;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use json::JsonValue;
pub use path::{get_at_path, set_at_path, JsonPath, PathSegment};
pub use traits::KvBackend;
pub use types::VersionedDoc;
