//! In-memory [`MetaStore`] backend.

use std::collections::BTreeMap;
use std::ops::Bound;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::trace;

use crate::{KvResult, MetaStore, ScanEntry, scan_start};

/// Ordered in-memory store backed by a `BTreeMap`.
///
/// Scans take a snapshot of the matching range under the read lock, so a
/// scan never observes writes made after it started.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use dagstore_kv::{MemoryMetaStore, MetaStore};
///
/// # tokio_test::block_on(async {
/// let store = MemoryMetaStore::new();
/// store.put("obj/b/a", Bytes::from_static(b"1")).unwrap();
/// store.put("obj/b/c", Bytes::from_static(b"2")).unwrap();
/// store.put("obj/c/a", Bytes::from_static(b"3")).unwrap();
///
/// let mut rx = store.read_all("obj/b/", Some("obj/b/a"));
/// let entry = rx.recv().await.unwrap().unwrap();
/// assert_eq!(entry.key, "obj/b/c");
/// assert!(rx.recv().await.is_none());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryMetaStore {
    entries: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryMetaStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl MetaStore for MemoryMetaStore {
    fn put(&self, key: &str, value: Bytes) -> KvResult<()> {
        trace!(key, size = value.len(), "memory put");
        self.entries.write().insert(key.to_owned(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> KvResult<Option<Bytes>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn delete(&self, key: &str) -> KvResult<()> {
        trace!(key, "memory delete");
        self.entries.write().remove(key);
        Ok(())
    }

    fn read_all(&self, prefix: &str, seek: Option<&str>) -> mpsc::Receiver<KvResult<ScanEntry>> {
        let (start, exclusive) = scan_start(prefix, seek);
        let lower = if exclusive {
            Bound::Excluded(start.to_owned())
        } else {
            Bound::Included(start.to_owned())
        };

        let snapshot: Vec<ScanEntry> = self
            .entries
            .read()
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| ScanEntry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();

        // The channel is sized to the snapshot so every send succeeds without
        // a runtime.
        let (tx, rx) = mpsc::channel(snapshot.len().max(1));
        for entry in snapshot {
            if tx.try_send(Ok(entry)).is_err() {
                break;
            }
        }
        rx
    }
}
