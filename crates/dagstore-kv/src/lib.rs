//! Ordered key-value metadata store for DagStore.
//!
//! The storage engine keeps every piece of metadata (object records,
//! multipart sessions, the pending-delete queue and bucket records) in a
//! lexicographically ordered key-value store. This crate defines the
//! [`MetaStore`] contract and ships two backends:
//!
//! - [`MemoryMetaStore`]: a `BTreeMap` behind a `parking_lot` lock, used by
//!   tests and ephemeral deployments.
//! - [`FjallMetaStore`]: a durable LSM-tree store on top of `fjall`.
//!
//! [`MetaDb`] wraps any backend with typed JSON encoding so callers never
//! handle raw bytes.
//!
//! # Scans
//!
//! [`MetaStore::read_all`] streams `(key, value)` pairs in key order over a
//! bounded channel. Only keys sharing the requested prefix are produced and,
//! when a seek key is given, scanning starts strictly after it. Dropping the
//! receiver stops the producer.

mod db;
mod disk;
mod error;
mod memory;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

pub use db::MetaDb;
pub use disk::FjallMetaStore;
pub use error::{KvError, KvResult};
pub use memory::MemoryMetaStore;

/// Capacity of the channel used to stream scan results.
pub const SCAN_CHANNEL_CAPACITY: usize = 64;

/// One key-value pair produced by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// The full key.
    pub key: String,
    /// The raw stored value.
    pub value: Bytes,
}

impl ScanEntry {
    /// Decode the value as JSON into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> KvResult<T> {
        serde_json::from_slice(&self.value).map_err(|source| KvError::Decode {
            key: self.key.clone(),
            source,
        })
    }
}

/// Ordered key-value store contract consumed by the storage engine.
///
/// Implementations must be safe to share across tasks. Point operations are
/// synchronous; [`read_all`](MetaStore::read_all) hands results back through
/// a channel so large scans never materialize in memory at once.
pub trait MetaStore: Send + Sync + std::fmt::Debug {
    /// Insert or overwrite `key`.
    fn put(&self, key: &str, value: Bytes) -> KvResult<()>;

    /// Fetch the value stored under `key`.
    fn get(&self, key: &str) -> KvResult<Option<Bytes>>;

    /// Remove `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> KvResult<()>;

    /// Stream every entry whose key starts with `prefix`, in key order.
    ///
    /// When `seek` is given, entries up to and including `seek` are skipped.
    ///
    /// # Panics
    ///
    /// Backends that scan on a worker thread require a Tokio runtime.
    fn read_all(&self, prefix: &str, seek: Option<&str>) -> mpsc::Receiver<KvResult<ScanEntry>>;
}

/// Compute the lower scan bound shared by all backends.
///
/// Returns the key to start from and whether that key itself is excluded.
pub(crate) fn scan_start<'a>(prefix: &'a str, seek: Option<&'a str>) -> (&'a str, bool) {
    match seek {
        Some(seek) if seek >= prefix => (seek, true),
        _ => (prefix, false),
    }
}
