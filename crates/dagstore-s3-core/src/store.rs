//! Object store engine.
//!
//! [`ObjectStore`] maps `bucket/object` names to content-addressed trees in
//! a [`DagPool`], keeping one [`ObjectRecord`] per key in the metadata
//! store. The operations themselves live in [`crate::ops`]; this module
//! holds the engine state, the contracts it consumes from the bucket
//! subsystem, and the helpers shared by every operation.
//!
//! # Reference handoff
//!
//! Content is always committed to the pool before the metadata that points
//! at it is written. When a record stops referencing a tree (overwrite,
//! delete, multipart completion or abort) the tree's address is appended to
//! the pending-delete queue after the metadata change is committed; the
//! garbage collector releases it later. A crash between the two steps
//! therefore leaks content instead of leaving a dangling reference.

use std::sync::Arc;

use async_trait::async_trait;
use dagstore_kv::MetaDb;
use dagstore_pool::{ContentAddress, DagPool, DagReader, TreeInfo};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::nslock::{NsLock, NsLockGuard, NsLockMap};
use crate::readahead::read_ahead;
use crate::state::PendingDelete;
use crate::state::object::ObjectRecord;
use crate::utils::{cancellable, new_pending_delete_key, object_key};

// ---------------------------------------------------------------------------
// Contracts with the bucket subsystem
// ---------------------------------------------------------------------------

/// Bucket lookups the object store needs from the bucket subsystem.
#[async_trait]
pub trait BucketCatalog: Send + Sync + std::fmt::Debug {
    /// Whether `bucket` exists. Must not take the bucket lock.
    async fn has_bucket(&self, cancel: &CancellationToken, bucket: &str) -> StoreResult<bool>;

    /// The bucket-level lock shared by object operations and bucket deletion.
    fn bucket_ns_lock(&self, bucket: &str) -> NsLock;
}

/// Emptiness check the bucket subsystem runs before deleting a bucket.
#[async_trait]
pub trait EmptyBucketProbe: Send + Sync {
    /// Whether `bucket` holds no objects.
    ///
    /// Called while the bucket lock is held exclusively, so implementations
    /// must not take it.
    async fn empty_bucket(&self, cancel: &CancellationToken, bucket: &str) -> StoreResult<bool>;
}

// ---------------------------------------------------------------------------
// ObjectStore
// ---------------------------------------------------------------------------

/// The storage engine for objects and multipart uploads.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// use dagstore_kv::MemoryMetaStore;
/// use dagstore_pool::MemoryDagPool;
/// use dagstore_s3_core::{DagStore, StoreConfig};
/// use tokio::io::AsyncReadExt;
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test::block_on(async {
/// let store = DagStore::new(
///     Arc::new(MemoryMetaStore::new()),
///     Arc::new(MemoryDagPool::new()),
///     StoreConfig::default(),
/// );
/// let cancel = CancellationToken::new();
/// store.buckets().create_bucket(&cancel, "photos", None, "alice").await.unwrap();
///
/// let record = store
///     .objects()
///     .store_object(&cancel, "photos", "cat.txt", Box::new(&b"meow"[..]), Some(4), &HashMap::new(), false)
///     .await
///     .unwrap();
/// assert_eq!(record.size, 4);
///
/// let (_, mut body) = store.objects().get_object(&cancel, "photos", "cat.txt").await.unwrap();
/// let mut out = Vec::new();
/// body.read_to_end(&mut out).await.unwrap();
/// assert_eq!(out, b"meow");
/// # });
/// ```
#[derive(Debug)]
pub struct ObjectStore {
    pub(crate) db: MetaDb,
    pub(crate) pool: Arc<dyn DagPool>,
    pub(crate) catalog: Arc<dyn BucketCatalog>,
    pub(crate) locks: NsLockMap,
    pub(crate) config: Arc<StoreConfig>,
}

impl ObjectStore {
    /// Create an engine over the given metadata store, pool and catalog.
    #[must_use]
    pub fn new(
        db: MetaDb,
        pool: Arc<dyn DagPool>,
        catalog: Arc<dyn BucketCatalog>,
        config: Arc<StoreConfig>,
    ) -> Self {
        Self {
            db,
            pool,
            catalog,
            locks: NsLockMap::new(),
            config,
        }
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Lock handle for `bucket/segments...` in the object namespace.
    #[must_use]
    pub fn new_ns_lock(&self, bucket: &str, segments: &[&str]) -> NsLock {
        self.locks.new_ns_lock(bucket, segments)
    }

    /// Take the bucket lock in shared mode and check the bucket exists.
    pub(crate) async fn lock_bucket_shared(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
    ) -> StoreResult<NsLockGuard> {
        let guard = self
            .catalog
            .bucket_ns_lock(bucket)
            .read_lock(cancel, self.config.operation_timeout())
            .await?;
        if !self.catalog.has_bucket(guard.token(), bucket).await? {
            return Err(StoreError::NoSuchBucket {
                bucket: bucket.to_owned(),
            });
        }
        Ok(guard)
    }

    /// Load the record at `bucket/object`.
    pub(crate) fn load_object(&self, bucket: &str, object: &str) -> StoreResult<ObjectRecord> {
        self.db
            .get::<ObjectRecord>(&object_key(bucket, object))?
            .ok_or_else(|| StoreError::NoSuchKey {
                bucket: bucket.to_owned(),
                key: object.to_owned(),
            })
    }

    /// Stream `reader` into the pool and return the committed tree.
    ///
    /// Streams declared larger than the big-file threshold are read ahead on
    /// a separate task. When `size` is given and does not match the stored
    /// length the tree is queued for deletion and
    /// [`StoreError::IncompleteBody`] is returned.
    pub(crate) async fn add_content(
        &self,
        token: &CancellationToken,
        reader: DagReader,
        size: Option<u64>,
    ) -> StoreResult<TreeInfo> {
        let reader = match size {
            Some(size) if size > self.config.big_file_threshold => {
                debug!(size, "reading ahead large stream");
                read_ahead(reader, self.config.readahead_chunk_size)
            }
            _ => reader,
        };

        let tree = cancellable(token, async {
            self.pool.add_tree(reader).await.map_err(StoreError::from)
        })
        .await?;

        if let Some(expected) = size {
            if expected != tree.size {
                self.queue_delete(&tree.address);
                return Err(StoreError::IncompleteBody {
                    expected,
                    actual: tree.size,
                });
            }
        }
        Ok(tree)
    }

    /// Append `address` to the pending-delete queue.
    ///
    /// Failures are logged and swallowed: the content leaks but no live
    /// reference is affected.
    pub(crate) fn queue_delete(&self, address: &ContentAddress) {
        let key = new_pending_delete_key();
        let entry = PendingDelete {
            address: address.to_string(),
        };
        match self.db.put(&key, &entry) {
            Ok(()) => debug!(%address, key = %key, "queued content for deletion"),
            Err(e) => error!(%address, error = %e, "failed to queue content for deletion"),
        }
    }

    /// Queue the content of a record that is no longer referenced.
    pub(crate) fn release_record(&self, record: &ObjectRecord) {
        match record.content_address() {
            Ok(Some(address)) => self.queue_delete(&address),
            Ok(None) => {}
            Err(e) => warn!(
                bucket = %record.bucket,
                object = %record.name,
                error = %e,
                "skipping release of undecodable content address"
            ),
        }
    }
}

#[async_trait]
impl EmptyBucketProbe for ObjectStore {
    async fn empty_bucket(&self, cancel: &CancellationToken, bucket: &str) -> StoreResult<bool> {
        let page = self.scan_objects(cancel, bucket, "", None, "", 1).await?;
        Ok(page.objects.is_empty() && page.prefixes.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------
