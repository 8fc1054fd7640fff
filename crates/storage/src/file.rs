//! Snapshot-file backend.
//!
//! Same table semantics as [`MemoryBackend`], plus durability: on every
//! bracket commit the committed table is serialized with MessagePack and
//! written to the snapshot file via temp-file + atomic rename. The file
//! is loaded on open, so stores re-opened at the same location see all
//! previously committed TVars.
//!
//! This is deliberately a whole-table snapshot, not a WAL: the engine
//! promises no durability beyond its backing store, and commit volume in
//! an STM workload is bounded by contention on the single commit lock.

use crate::memory::MemoryBackend;
use jstm_core::{Error, JsonValue, KvBackend, Result, VersionedDoc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Persistent versioned KV backend backed by a snapshot file.
pub struct FileBackend {
    inner: MemoryBackend,
    path: PathBuf,
}

impl FileBackend {
    /// Open a backend at `path`, loading the snapshot if one exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = MemoryBackend::new();
        if path.exists() {
            let bytes = fs::read(&path)
                .map_err(|e| Error::backend_with_source("failed to read snapshot", e))?;
            let table: HashMap<String, VersionedDoc> = rmp_serde::from_slice(&bytes)
                .map_err(|e| Error::serialization(format!("corrupt snapshot: {}", e)))?;
            tracing::debug!(
                target: "jstm::storage",
                records = table.len(),
                path = %path.display(),
                "loaded snapshot"
            );
            inner.load_table(table);
        }
        Ok(FileBackend { inner, path })
    }

    /// The snapshot file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let table = self.inner.export_table();
        let bytes = rmp_serde::to_vec(&table)
            .map_err(|e| Error::serialization(format!("failed to encode snapshot: {}", e)))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes)
            .map_err(|e| Error::backend_with_source("failed to write snapshot", e))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::backend_with_source("failed to publish snapshot", e))?;
        tracing::trace!(
            target: "jstm::storage",
            records = table.len(),
            bytes = bytes.len(),
            "persisted snapshot"
        );
        Ok(())
    }
}

impl KvBackend for FileBackend {
    fn insert(&self, id: &str, value: &JsonValue) -> Result<()> {
        self.inner.insert(id, value)?;
        // Inserts issued outside a bracket must still reach disk.
        if !self.inner.in_bracket() {
            self.persist()?;
        }
        Ok(())
    }

    fn select(&self, id: &str) -> Result<Option<VersionedDoc>> {
        self.inner.select(id)
    }

    fn select_version(&self, id: &str) -> Result<Option<u64>> {
        self.inner.select_version(id)
    }

    fn cas_update(&self, id: &str, value: &JsonValue, expected_version: u64) -> Result<bool> {
        let updated = self.inner.cas_update(id, value, expected_version)?;
        if updated && !self.inner.in_bracket() {
            self.persist()?;
        }
        Ok(updated)
    }

    fn begin_exclusive(&self) -> Result<()> {
        self.inner.begin_exclusive()
    }

    fn commit(&self) -> Result<()> {
        self.inner.commit()?;
        self.persist()
    }

    fn rollback(&self) -> Result<()> {
        self.inner.rollback()
    }
}
