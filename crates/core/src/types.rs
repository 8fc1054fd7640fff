//! Shared record types.

use crate::json::JsonValue;
use serde::{Deserialize, Serialize};

/// The committed state of one TVar: a JSON document plus its version.
///
/// Versions start at 0 on creation and increase by exactly 1 on every
/// successful commit that modifies the record. The pair is always
/// consistent: `value` is the document that was written at `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedDoc {
    /// The document
    pub value: JsonValue,
    /// Monotonic modification counter
    pub version: u64,
}

impl VersionedDoc {
    /// Create a record at a given version
    pub fn new(value: JsonValue, version: u64) -> Self {
        VersionedDoc { value, version }
    }

    /// Create a freshly inserted record (version 0)
    pub fn initial(value: JsonValue) -> Self {
        VersionedDoc { value, version: 0 }
    }
}
