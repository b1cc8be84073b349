//! Bucket metadata subsystem.
//!
//! Owns the canonical bucket records (`bkt/{bucket}`) together with two
//! denormalized reverse indexes: the buckets of each owner
//! (`userbkt/{owner}`) and the global bucket list (`bktidx/all`).
//!
//! Bucket creation records the bucket in both indexes before writing the
//! canonical record and rolls the index updates back when a later step
//! fails. Read-modify-write cycles on each index are serialized by a
//! namespace lock on the index key.
//!
//! Bucket deletion runs under the bucket's exclusive lock and asks an
//! [`EmptyBucketProbe`] (the object store) whether the bucket still holds
//! objects.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use dagstore_kv::MetaDb;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::nslock::{NsLock, NsLockMap};
use crate::state::bucket::{BucketMetadata, GlobalBucketIndex, UserBucketIndex};
use crate::store::{BucketCatalog, EmptyBucketProbe};
use crate::utils::{GLOBAL_BUCKET_INDEX_KEY, bucket_key, user_bucket_key};
use crate::validation::validate_bucket_name;

/// Lock namespace of bucket records.
const BUCKET_LOCK_NS: &str = "meta";

/// Lock namespace of per-owner indexes.
const USER_INDEX_LOCK_NS: &str = "userbkt";

/// Lock namespace of the global index.
const GLOBAL_INDEX_LOCK_NS: &str = "bktidx";

/// Whether an index update adds or removes a bucket name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexChange {
    Add,
    Remove,
}

impl IndexChange {
    fn apply(self, buckets: &mut BTreeSet<String>, bucket: &str) {
        match self {
            Self::Add => {
                buckets.insert(bucket.to_owned());
            }
            Self::Remove => {
                buckets.remove(bucket);
            }
        }
    }

    fn undo(self) -> Self {
        match self {
            Self::Add => Self::Remove,
            Self::Remove => Self::Add,
        }
    }
}

/// Bucket lifecycle, policy and tagging.
#[derive(Debug)]
pub struct BucketMetadataSys {
    db: MetaDb,
    locks: NsLockMap,
    config: Arc<StoreConfig>,
    empty_probe: OnceLock<Weak<dyn EmptyBucketProbe>>,
}

impl BucketMetadataSys {
    /// Create the subsystem over `db`.
    #[must_use]
    pub fn new(db: MetaDb, config: Arc<StoreConfig>) -> Self {
        Self {
            db,
            locks: NsLockMap::new(),
            config,
            empty_probe: OnceLock::new(),
        }
    }

    /// Register the emptiness check used by [`delete_bucket`](Self::delete_bucket).
    ///
    /// Only the first registration takes effect.
    pub fn set_empty_probe(&self, probe: Weak<dyn EmptyBucketProbe>) {
        if self.empty_probe.set(probe).is_err() {
            warn!("empty-bucket probe already registered, ignoring");
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Create `bucket` owned by `owner`.
    ///
    /// `region` defaults to the configured region.
    pub async fn create_bucket(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        region: Option<&str>,
        owner: &str,
    ) -> StoreResult<BucketMetadata> {
        validate_bucket_name(bucket)?;
        let guard = self
            .bucket_ns_lock(bucket)
            .lock(cancel, self.config.operation_timeout())
            .await?;
        let token = guard.token();

        if let Some(existing) = self.db.get::<BucketMetadata>(&bucket_key(bucket))? {
            return Err(if existing.owner == owner {
                StoreError::BucketAlreadyOwnedByYou {
                    bucket: bucket.to_owned(),
                }
            } else {
                StoreError::BucketAlreadyExists {
                    bucket: bucket.to_owned(),
                }
            });
        }

        let meta = BucketMetadata::new(
            bucket,
            region.unwrap_or(&self.config.default_region),
            owner,
        );

        self.update_user_index(token, owner, bucket, IndexChange::Add)
            .await?;
        if let Err(e) = self.update_global_index(token, bucket, IndexChange::Add).await {
            self.rollback_user_index(token, owner, bucket, IndexChange::Add)
                .await;
            return Err(e);
        }
        if let Err(e) = self.db.put(&bucket_key(bucket), &meta) {
            self.rollback_global_index(token, bucket, IndexChange::Add)
                .await;
            self.rollback_user_index(token, owner, bucket, IndexChange::Add)
                .await;
            return Err(e.into());
        }

        info!(bucket, owner, region = %meta.region, "created bucket");
        Ok(meta)
    }

    /// Fetch the canonical record of `bucket`.
    pub async fn get_bucket_meta(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
    ) -> StoreResult<BucketMetadata> {
        let _guard = self
            .bucket_ns_lock(bucket)
            .read_lock(cancel, self.config.operation_timeout())
            .await?;
        self.load(bucket)
    }

    /// Whether `bucket` exists. Takes no lock.
    pub async fn has_bucket(&self, cancel: &CancellationToken, bucket: &str) -> StoreResult<bool> {
        if cancel.is_cancelled() {
            return Err(StoreError::Canceled);
        }
        Ok(self.db.contains(&bucket_key(bucket))?)
    }

    /// Delete an empty bucket.
    ///
    /// Fails with [`StoreError::BucketNotEmpty`] while objects remain.
    pub async fn delete_bucket(&self, cancel: &CancellationToken, bucket: &str) -> StoreResult<()> {
        let guard = self
            .bucket_ns_lock(bucket)
            .lock(cancel, self.config.delete_timeout())
            .await?;
        let token = guard.token();
        let meta = self.load(bucket)?;

        let probe = self
            .empty_probe
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| anyhow::anyhow!("no empty-bucket probe registered"))?;
        if !probe.empty_bucket(token, bucket).await? {
            return Err(StoreError::BucketNotEmpty {
                bucket: bucket.to_owned(),
            });
        }

        self.db.delete(&bucket_key(bucket))?;
        // The canonical record is gone; stale index entries are skipped on read.
        if let Err(e) = self
            .update_user_index(token, &meta.owner, bucket, IndexChange::Remove)
            .await
        {
            error!(bucket, owner = %meta.owner, error = %e, "failed to update user bucket index");
        }
        if let Err(e) = self
            .update_global_index(token, bucket, IndexChange::Remove)
            .await
        {
            error!(bucket, error = %e, "failed to update global bucket index");
        }

        info!(bucket, "deleted bucket");
        Ok(())
    }

    /// Every bucket owned by `owner`, in name order.
    pub async fn get_all_buckets_of_user(
        &self,
        cancel: &CancellationToken,
        owner: &str,
    ) -> StoreResult<Vec<BucketMetadata>> {
        let lock = self.locks.new_ns_lock(USER_INDEX_LOCK_NS, &[owner]);
        let index = {
            let _guard = lock.read_lock(cancel, self.config.operation_timeout()).await?;
            self.db
                .get::<UserBucketIndex>(&user_bucket_key(owner))?
                .unwrap_or_default()
        };
        self.load_many(&index.buckets)
    }

    /// Every bucket in the system, in name order.
    pub async fn get_all_bucket_info(
        &self,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<BucketMetadata>> {
        let lock = self.locks.new_ns_lock(GLOBAL_INDEX_LOCK_NS, &["all"]);
        let index = {
            let _guard = lock.read_lock(cancel, self.config.operation_timeout()).await?;
            self.db
                .get::<GlobalBucketIndex>(GLOBAL_BUCKET_INDEX_KEY)?
                .unwrap_or_default()
        };
        self.load_many(&index.buckets)
    }

    // -----------------------------------------------------------------------
    // Policy
    // -----------------------------------------------------------------------

    /// Attach a policy document. The document must be valid JSON.
    pub async fn update_bucket_policy(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        policy: &str,
    ) -> StoreResult<()> {
        serde_json::from_str::<serde_json::Value>(policy).map_err(|e| {
            StoreError::invalid_argument(format!("policy is not valid JSON: {e}"))
        })?;
        self.modify(cancel, bucket, |meta| meta.policy = Some(policy.to_owned()))
            .await
    }

    /// Detach the policy document, if any.
    pub async fn delete_bucket_policy(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
    ) -> StoreResult<()> {
        self.modify(cancel, bucket, |meta| meta.policy = None).await
    }

    /// The attached policy document.
    pub async fn get_policy_config(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
    ) -> StoreResult<String> {
        self.get_bucket_meta(cancel, bucket)
            .await?
            .policy
            .ok_or_else(|| StoreError::NoSuchBucketPolicy {
                bucket: bucket.to_owned(),
            })
    }

    // -----------------------------------------------------------------------
    // Tagging
    // -----------------------------------------------------------------------

    /// Replace the bucket's tag set.
    pub async fn update_bucket_tagging(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        tags: BTreeMap<String, String>,
    ) -> StoreResult<()> {
        self.modify(cancel, bucket, |meta| meta.tagging = Some(tags))
            .await
    }

    /// Remove the bucket's tag set, if any.
    pub async fn delete_bucket_tagging(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
    ) -> StoreResult<()> {
        self.modify(cancel, bucket, |meta| meta.tagging = None).await
    }

    /// The bucket's tag set.
    pub async fn get_tagging_config(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
    ) -> StoreResult<BTreeMap<String, String>> {
        self.get_bucket_meta(cancel, bucket)
            .await?
            .tagging
            .ok_or_else(|| StoreError::NoSuchTagSet {
                bucket: bucket.to_owned(),
            })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn load(&self, bucket: &str) -> StoreResult<BucketMetadata> {
        self.db
            .get::<BucketMetadata>(&bucket_key(bucket))?
            .ok_or_else(|| StoreError::NoSuchBucket {
                bucket: bucket.to_owned(),
            })
    }

    fn load_many(&self, names: &BTreeSet<String>) -> StoreResult<Vec<BucketMetadata>> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            match self.db.get::<BucketMetadata>(&bucket_key(name))? {
                Some(meta) => out.push(meta),
                None => debug!(bucket = %name, "skipping indexed bucket without record"),
            }
        }
        Ok(out)
    }

    async fn modify(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        f: impl FnOnce(&mut BucketMetadata) + Send,
    ) -> StoreResult<()> {
        let _guard = self
            .bucket_ns_lock(bucket)
            .lock(cancel, self.config.operation_timeout())
            .await?;
        let mut meta = self.load(bucket)?;
        f(&mut meta);
        self.db.put(&bucket_key(bucket), &meta)?;
        debug!(bucket, "updated bucket metadata");
        Ok(())
    }

    async fn update_user_index(
        &self,
        token: &CancellationToken,
        owner: &str,
        bucket: &str,
        change: IndexChange,
    ) -> StoreResult<()> {
        let lock = self.locks.new_ns_lock(USER_INDEX_LOCK_NS, &[owner]);
        let _guard = lock.lock(token, self.config.operation_timeout()).await?;

        let key = user_bucket_key(owner);
        let mut index = self
            .db
            .get::<UserBucketIndex>(&key)?
            .unwrap_or_else(|| UserBucketIndex {
                owner: owner.to_owned(),
                ..UserBucketIndex::default()
            });
        change.apply(&mut index.buckets, bucket);
        if index.buckets.is_empty() {
            self.db.delete(&key)?;
        } else {
            self.db.put(&key, &index)?;
        }
        Ok(())
    }

    async fn update_global_index(
        &self,
        token: &CancellationToken,
        bucket: &str,
        change: IndexChange,
    ) -> StoreResult<()> {
        let lock = self.locks.new_ns_lock(GLOBAL_INDEX_LOCK_NS, &["all"]);
        let _guard = lock.lock(token, self.config.operation_timeout()).await?;

        let mut index = self
            .db
            .get::<GlobalBucketIndex>(GLOBAL_BUCKET_INDEX_KEY)?
            .unwrap_or_default();
        change.apply(&mut index.buckets, bucket);
        self.db.put(GLOBAL_BUCKET_INDEX_KEY, &index)?;
        Ok(())
    }

    async fn rollback_user_index(
        &self,
        token: &CancellationToken,
        owner: &str,
        bucket: &str,
        change: IndexChange,
    ) {
        if let Err(e) = self
            .update_user_index(token, owner, bucket, change.undo())
            .await
        {
            error!(bucket, owner, error = %e, "failed to roll back user bucket index");
        }
    }

    async fn rollback_global_index(
        &self,
        token: &CancellationToken,
        bucket: &str,
        change: IndexChange,
    ) {
        if let Err(e) = self
            .update_global_index(token, bucket, change.undo())
            .await
        {
            error!(bucket, error = %e, "failed to roll back global bucket index");
        }
    }
}

#[async_trait]
impl BucketCatalog for BucketMetadataSys {
    async fn has_bucket(&self, cancel: &CancellationToken, bucket: &str) -> StoreResult<bool> {
        BucketMetadataSys::has_bucket(self, cancel, bucket).await
    }

    fn bucket_ns_lock(&self, bucket: &str) -> NsLock {
        self.locks.new_ns_lock(BUCKET_LOCK_NS, &[bucket])
    }
}
