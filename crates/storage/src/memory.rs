//! In-memory backend.
//!
//! A mutex-guarded table of `VersionedDoc` records. The exclusive bracket
//! is realized as a staged overlay: writes issued inside the bracket land
//! in the overlay, visible only to the bracket-holding thread; `commit`
//! merges the overlay into the committed table, `rollback` discards it.
//! Other threads keep reading the committed table, so in-flight commits
//! are never observable. The engine's commit lock guarantees at most one
//! bracket is open at a time.

use jstm_core::{Error, JsonValue, KvBackend, Result, VersionedDoc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread::ThreadId;

/// Overlay of writes staged inside an open bracket.
///
/// Visible only to the thread that opened the bracket; every other
/// thread keeps reading the committed table, so an in-flight commit is
/// never observable before it is published.
struct StagedWrites {
    writes: HashMap<String, VersionedDoc>,
    owner: ThreadId,
}

#[derive(Default)]
struct TableState {
    committed: HashMap<String, VersionedDoc>,
    staged: Option<StagedWrites>,
}

impl TableState {
    fn owns_bracket(&self) -> bool {
        self.staged
            .as_ref()
            .map(|staged| staged.owner == std::thread::current().id())
            .unwrap_or(false)
    }

    fn lookup(&self, id: &str) -> Option<&VersionedDoc> {
        if let Some(staged) = &self.staged {
            if staged.owner == std::thread::current().id() {
                if let Some(doc) = staged.writes.get(id) {
                    return Some(doc);
                }
            }
        }
        self.committed.get(id)
    }

    fn write(&mut self, id: String, doc: VersionedDoc) {
        if self.owns_bracket() {
            if let Some(staged) = &mut self.staged {
                staged.writes.insert(id, doc);
            }
        } else {
            self.committed.insert(id, doc);
        }
    }
}

/// Ephemeral versioned KV backend.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<TableState>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an exclusive bracket is currently open
    pub(crate) fn in_bracket(&self) -> bool {
        self.state.lock().staged.is_some()
    }

    /// Clone of the committed table (used by the snapshot-file backend)
    pub(crate) fn export_table(&self) -> HashMap<String, VersionedDoc> {
        self.state.lock().committed.clone()
    }

    /// Replace the committed table (used when loading a snapshot)
    pub(crate) fn load_table(&self, table: HashMap<String, VersionedDoc>) {
        self.state.lock().committed = table;
    }
}

impl KvBackend for MemoryBackend {
    fn insert(&self, id: &str, value: &JsonValue) -> Result<()> {
        let mut state = self.state.lock();
        if state.lookup(id).is_some() {
            return Err(Error::already_exists(id));
        }
        state.write(id.to_string(), VersionedDoc::initial(value.clone()));
        Ok(())
    }

    fn select(&self, id: &str) -> Result<Option<VersionedDoc>> {
        Ok(self.state.lock().lookup(id).cloned())
    }

    fn select_version(&self, id: &str) -> Result<Option<u64>> {
        Ok(self.state.lock().lookup(id).map(|doc| doc.version))
    }

    fn cas_update(&self, id: &str, value: &JsonValue, expected_version: u64) -> Result<bool> {
        let mut state = self.state.lock();
        let current_matches = state
            .lookup(id)
            .map(|doc| doc.version == expected_version)
            .unwrap_or(false);
        if !current_matches {
            return Ok(false);
        }
        state.write(
            id.to_string(),
            VersionedDoc::new(value.clone(), expected_version + 1),
        );
        Ok(true)
    }

    fn begin_exclusive(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.staged.is_some() {
            return Err(Error::backend("exclusive bracket already open"));
        }
        state.staged = Some(StagedWrites {
            writes: HashMap::new(),
            owner: std::thread::current().id(),
        });
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.state.lock();
        let Some(staged) = state.staged.take() else {
            return Err(Error::backend("commit without an open bracket"));
        };
        for (id, doc) in staged.writes {
            state.committed.insert(id, doc);
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        // Lenient: rolling back with no bracket open is a no-op, so error
        // paths can always call it.
        self.state.lock().staged = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val(n: i64) -> JsonValue {
        JsonValue::from(n)
    }

    #[test]
    fn insert_starts_at_version_zero() {
        let backend = MemoryBackend::new();
        backend.insert("a", &val(1)).unwrap();
        let doc = backend.select("a").unwrap().unwrap();
        assert_eq!(doc.version, 0);
        assert_eq!(doc.value, val(1));
    }

    #[test]
    fn insert_existing_fails() {
        let backend = MemoryBackend::new();
        backend.insert("a", &val(1)).unwrap();
        let err = backend.insert("a", &val(2)).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[test]
    fn cas_bumps_version_by_one() {
        let backend = MemoryBackend::new();
        backend.insert("a", &val(1)).unwrap();
        assert!(backend.cas_update("a", &val(2), 0).unwrap());
        assert_eq!(backend.select_version("a").unwrap(), Some(1));
        assert_eq!(backend.select("a").unwrap().unwrap().value, val(2));
    }

    #[test]
    fn cas_with_stale_version_loses() {
        let backend = MemoryBackend::new();
        backend.insert("a", &val(1)).unwrap();
        assert!(backend.cas_update("a", &val(2), 0).unwrap());
        assert!(!backend.cas_update("a", &val(3), 0).unwrap());
        assert_eq!(backend.select("a").unwrap().unwrap().value, val(2));
    }

    #[test]
    fn cas_on_absent_id_loses() {
        let backend = MemoryBackend::new();
        assert!(!backend.cas_update("ghost", &val(1), 0).unwrap());
    }

    #[test]
    fn rollback_discards_staged_writes() {
        let backend = MemoryBackend::new();
        backend.insert("a", &val(1)).unwrap();
        backend.begin_exclusive().unwrap();
        assert!(backend.cas_update("a", &val(2), 0).unwrap());
        // Staged write is visible inside the bracket
        assert_eq!(backend.select("a").unwrap().unwrap().value, val(2));
        backend.rollback().unwrap();
        let doc = backend.select("a").unwrap().unwrap();
        assert_eq!(doc.value, val(1));
        assert_eq!(doc.version, 0);
    }

    #[test]
    fn commit_publishes_staged_writes() {
        let backend = MemoryBackend::new();
        backend.insert("a", &val(1)).unwrap();
        backend.begin_exclusive().unwrap();
        assert!(backend.cas_update("a", &val(2), 0).unwrap());
        backend.commit().unwrap();
        let doc = backend.select("a").unwrap().unwrap();
        assert_eq!(doc.value, val(2));
        assert_eq!(doc.version, 1);
    }

    #[test]
    fn staged_writes_are_invisible_to_other_threads() {
        let backend = std::sync::Arc::new(MemoryBackend::new());
        backend.insert("a", &val(1)).unwrap();
        backend.begin_exclusive().unwrap();
        assert!(backend.cas_update("a", &val(2), 0).unwrap());

        let other = backend.clone();
        let seen = std::thread::spawn(move || other.select("a").unwrap().unwrap())
            .join()
            .unwrap();
        // The in-flight bracket is not observable from another thread
        assert_eq!(seen.value, val(1));
        assert_eq!(seen.version, 0);

        backend.commit().unwrap();
        let other = backend.clone();
        let seen = std::thread::spawn(move || other.select("a").unwrap().unwrap())
            .join()
            .unwrap();
        assert_eq!(seen.value, val(2));
    }

    #[test]
    fn nested_bracket_is_rejected() {
        let backend = MemoryBackend::new();
        backend.begin_exclusive().unwrap();
        assert!(backend.begin_exclusive().is_err());
    }

    #[test]
    fn commit_without_bracket_is_rejected() {
        let backend = MemoryBackend::new();
        assert!(backend.commit().is_err());
    }
}
