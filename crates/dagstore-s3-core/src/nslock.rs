//! Namespace lock manager.
//!
//! Serializes access to logical paths (`bucket`, `bucket/object`,
//! `bucket/object/upload-id`, ...) with read/write locks that support a
//! timeout and caller cancellation.
//!
//! The registry is a plain map behind a single `parking_lot` mutex. Each
//! entry counts the [`NsLock`] handles and [`NsLockGuard`]s referring to it
//! and is removed as soon as the count drops to zero, so the table only ever
//! holds paths that are in use.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{StoreError, StoreResult};

type Registry = Arc<Mutex<HashMap<String, LockEntry>>>;

#[derive(Debug)]
struct LockEntry {
    lock: Arc<RwLock<()>>,
    refs: usize,
}

/// Counted reference to a registry entry.
struct EntryRef {
    registry: Registry,
    resource: String,
    lock: Arc<RwLock<()>>,
}

impl EntryRef {
    fn acquire(registry: &Registry, resource: String) -> Self {
        let lock = {
            let mut map = registry.lock();
            let entry = map.entry(resource.clone()).or_insert_with(|| LockEntry {
                lock: Arc::new(RwLock::new(())),
                refs: 0,
            });
            entry.refs += 1;
            Arc::clone(&entry.lock)
        };
        Self {
            registry: Arc::clone(registry),
            resource,
            lock,
        }
    }
}

impl Clone for EntryRef {
    fn clone(&self) -> Self {
        if let Some(entry) = self.registry.lock().get_mut(&self.resource) {
            entry.refs += 1;
        }
        Self {
            registry: Arc::clone(&self.registry),
            resource: self.resource.clone(),
            lock: Arc::clone(&self.lock),
        }
    }
}

impl Drop for EntryRef {
    fn drop(&mut self) {
        let mut map = self.registry.lock();
        if let Some(entry) = map.get_mut(&self.resource) {
            entry.refs = entry.refs.saturating_sub(1);
            if entry.refs == 0 {
                map.remove(&self.resource);
                trace!(resource = %self.resource, "released namespace lock entry");
            }
        }
    }
}

impl fmt::Debug for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryRef")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// Registry of path-keyed read/write locks.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct NsLockMap {
    registry: Registry,
}

impl NsLockMap {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a handle for the path `bucket/segments...`.
    ///
    /// Handles for identical paths share one underlying lock. Empty segments
    /// are skipped.
    #[must_use]
    pub fn new_ns_lock(&self, bucket: &str, segments: &[&str]) -> NsLock {
        let mut resource = bucket.to_owned();
        for segment in segments.iter().filter(|s| !s.is_empty()) {
            resource.push('/');
            resource.push_str(segment);
        }
        NsLock {
            entry: EntryRef::acquire(&self.registry, resource),
        }
    }

    /// Number of paths currently referenced.
    #[must_use]
    pub fn active_paths(&self) -> usize {
        self.registry.lock().len()
    }
}

/// Handle to one namespace path.
#[derive(Debug, Clone)]
pub struct NsLock {
    entry: EntryRef,
}

impl NsLock {
    /// The joined path this handle locks.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.entry.resource
    }

    /// Acquire the path exclusively.
    ///
    /// Waits for every shared and exclusive holder to release. Fails with
    /// [`StoreError::LockTimeout`] once `timeout` elapses and with
    /// [`StoreError::Canceled`] if `cancel` fires first.
    pub async fn lock(&self, cancel: &CancellationToken, timeout: Duration) -> StoreResult<NsLockGuard> {
        let lock = Arc::clone(&self.entry.lock);
        let guard = self.wait(cancel, timeout, lock.write_owned()).await?;
        trace!(resource = %self.resource(), "acquired exclusive lock");
        Ok(NsLockGuard::new(Held::Exclusive(guard), cancel, self.entry.clone()))
    }

    /// Acquire the path in shared mode.
    ///
    /// Shared holders coexist; a queued exclusive request blocks later shared
    /// requests until it has been served.
    pub async fn read_lock(&self, cancel: &CancellationToken, timeout: Duration) -> StoreResult<NsLockGuard> {
        let lock = Arc::clone(&self.entry.lock);
        let guard = self.wait(cancel, timeout, lock.read_owned()).await?;
        trace!(resource = %self.resource(), "acquired shared lock");
        Ok(NsLockGuard::new(Held::Shared(guard), cancel, self.entry.clone()))
    }

    async fn wait<G>(
        &self,
        cancel: &CancellationToken,
        timeout: Duration,
        acquire: impl Future<Output = G>,
    ) -> StoreResult<G> {
        if cancel.is_cancelled() {
            return Err(StoreError::Canceled);
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(StoreError::Canceled),
            acquired = tokio::time::timeout(timeout, acquire) => {
                acquired.map_err(|_| StoreError::LockTimeout {
                    resource: self.resource().to_owned(),
                    timeout,
                })
            }
        }
    }
}

#[derive(Debug)]
enum Held {
    Exclusive(OwnedRwLockWriteGuard<()>),
    Shared(OwnedRwLockReadGuard<()>),
}

/// A held namespace lock.
///
/// The lock is released when the guard is dropped or [`unlock`](Self::unlock)
/// is called. The guard carries a token derived from the caller's token;
/// it is canceled together with the caller's token and when the guard is
/// released.
#[derive(Debug)]
pub struct NsLockGuard {
    held: Held,
    token: CancellationToken,
    _entry: EntryRef,
}

impl NsLockGuard {
    fn new(held: Held, parent: &CancellationToken, entry: EntryRef) -> Self {
        Self {
            held,
            token: parent.child_token(),
            _entry: entry,
        }
    }

    /// Token to thread through work done while holding the lock.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether this guard holds the lock exclusively.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        matches!(self.held, Held::Exclusive(_))
    }

    /// Release the lock.
    pub fn unlock(self) {
        drop(self);
    }
}

impl Drop for NsLockGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
