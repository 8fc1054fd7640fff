//! Storage backends for jstm.
//!
//! Two conforming implementations of the `KvBackend` contract:
//! - [`MemoryBackend`]: ephemeral, a mutex-guarded map
//! - [`FileBackend`]: persistent, same table plus a MessagePack snapshot
//!   written atomically on every bracket commit

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod file;
pub mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;
