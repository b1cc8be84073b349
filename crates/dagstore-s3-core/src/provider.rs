//! Engine facade.
//!
//! [`DagStore`] wires the bucket subsystem, the object store and the
//! garbage collector around one metadata store and one DAG pool. The
//! bucket subsystem backs the object store's bucket checks and locks; the
//! object store answers the bucket subsystem's emptiness checks.

use std::path::Path;
use std::sync::{Arc, Weak};

use dagstore_kv::{FjallMetaStore, MetaDb, MetaStore};
use dagstore_pool::DagPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bucket::BucketMetadataSys;
use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::gc::{GarbageCollector, GcReport, IdleProbe, SystemIdleProbe};
use crate::store::{BucketCatalog, EmptyBucketProbe, ObjectStore};

/// A complete storage engine instance.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use dagstore_kv::MemoryMetaStore;
/// use dagstore_pool::MemoryDagPool;
/// use dagstore_s3_core::DagStore;
/// use dagstore_s3_core::config::StoreConfig;
///
/// let store = DagStore::new(
///     Arc::new(MemoryMetaStore::new()),
///     Arc::new(MemoryDagPool::new()),
///     StoreConfig::default(),
/// );
/// assert_eq!(store.config().default_region, "us-east-1");
/// ```
#[derive(Debug)]
pub struct DagStore {
    buckets: Arc<BucketMetadataSys>,
    objects: Arc<ObjectStore>,
    gc: Arc<GarbageCollector>,
    config: Arc<StoreConfig>,
}

impl DagStore {
    /// Create an engine whose collector samples host load.
    #[must_use]
    pub fn new(meta: Arc<dyn MetaStore>, pool: Arc<dyn DagPool>, config: StoreConfig) -> Self {
        let probe = Arc::new(SystemIdleProbe::from_config(&config));
        Self::with_idle_probe(meta, pool, config, probe)
    }

    /// Create an engine with a custom collector idle probe.
    #[must_use]
    pub fn with_idle_probe(
        meta: Arc<dyn MetaStore>,
        pool: Arc<dyn DagPool>,
        config: StoreConfig,
        probe: Arc<dyn IdleProbe>,
    ) -> Self {
        let db = MetaDb::new(meta);
        let config = Arc::new(config);

        let buckets = Arc::new(BucketMetadataSys::new(db.clone(), Arc::clone(&config)));
        let catalog: Arc<dyn BucketCatalog> = buckets.clone();
        let objects = Arc::new(ObjectStore::new(
            db.clone(),
            Arc::clone(&pool),
            catalog,
            Arc::clone(&config),
        ));
        let empty_probe = Arc::downgrade(&objects);
        buckets.set_empty_probe(empty_probe as Weak<dyn EmptyBucketProbe>);

        let gc = Arc::new(GarbageCollector::from_config(db, pool, probe, &config));
        Self {
            buckets,
            objects,
            gc,
            config,
        }
    }

    /// Create an engine over a fjall metadata store at `path`.
    pub fn open(path: impl AsRef<Path>, pool: Arc<dyn DagPool>, config: StoreConfig) -> StoreResult<Self> {
        let meta = FjallMetaStore::open(path)?;
        Ok(Self::new(Arc::new(meta), pool, config))
    }

    /// Start the periodic garbage collector.
    ///
    /// The collector stops once `shutdown` is canceled.
    pub fn start(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        Arc::clone(&self.gc).spawn(shutdown)
    }

    /// Run one garbage collection cycle now.
    pub async fn run_gc_cycle(&self) -> StoreResult<GcReport> {
        self.gc.run_cycle(&CancellationToken::new()).await
    }

    /// The bucket subsystem.
    #[must_use]
    pub fn buckets(&self) -> &Arc<BucketMetadataSys> {
        &self.buckets
    }

    /// The object store.
    #[must_use]
    pub fn objects(&self) -> &Arc<ObjectStore> {
        &self.objects
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}
