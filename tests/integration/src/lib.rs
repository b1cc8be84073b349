//! End-to-end tests for the DagStore storage engine.
//!
//! Every test builds a fresh in-process engine over an in-memory metadata
//! store and an in-memory DAG pool, so no external service is needed:
//!
//! ```text
//! cargo test -p dagstore-integration
//! ```
//!
//! Set `RUST_LOG` to see engine logs.

use std::collections::HashMap;
use std::sync::{Arc, Once};

use dagstore_kv::{MemoryMetaStore, MetaDb, MetaStore};
use dagstore_pool::{DagReader, MemoryDagPool};
use dagstore_s3_core::DagStore;
use dagstore_s3_core::config::StoreConfig;
use dagstore_s3_core::gc::AlwaysIdle;
use dagstore_s3_core::state::PendingDelete;
use dagstore_s3_core::state::object::ObjectRecord;
use dagstore_s3_core::utils::PENDING_DELETE_PREFIX;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

static INIT: Once = Once::new();

/// Owner used for buckets created by tests.
pub const TEST_OWNER: &str = "integration-test";

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// An engine plus direct handles on its backing stores.
#[derive(Debug)]
pub struct TestEngine {
    /// The engine under test.
    pub store: DagStore,
    /// The pool behind the engine.
    pub pool: MemoryDagPool,
    /// The metadata store behind the engine.
    pub db: MetaDb,
    /// Token passed to every call.
    pub cancel: CancellationToken,
}

/// Engine with small pool chunks, a 4-byte part floor and an always-idle
/// collector.
#[must_use]
pub fn test_engine() -> TestEngine {
    test_engine_with(Arc::new(MemoryMetaStore::new()))
}

/// Same as [`test_engine`] over a caller-supplied metadata store.
#[must_use]
pub fn test_engine_with(meta: Arc<dyn MetaStore>) -> TestEngine {
    init_tracing();
    let pool = MemoryDagPool::with_layout(16, 4);
    let config = StoreConfig::builder().min_part_size(4).build();
    let store = DagStore::with_idle_probe(
        Arc::clone(&meta),
        Arc::new(pool.clone()),
        config,
        Arc::new(AlwaysIdle),
    );
    TestEngine {
        store,
        pool,
        db: MetaDb::new(meta),
        cancel: CancellationToken::new(),
    }
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

impl TestEngine {
    /// Create a bucket and return its name.
    pub async fn create_test_bucket(&self, prefix: &str) -> String {
        let name = test_bucket_name(prefix);
        self.store
            .buckets()
            .create_bucket(&self.cancel, &name, None, TEST_OWNER)
            .await
            .unwrap_or_else(|e| panic!("failed to create bucket {name}: {e}"));
        name
    }

    /// Store `data` at `bucket/key`, declaring its size.
    pub async fn put(&self, bucket: &str, key: &str, data: &[u8]) -> ObjectRecord {
        self.store
            .objects()
            .store_object(
                &self.cancel,
                bucket,
                key,
                reader(data),
                Some(data.len() as u64),
                &HashMap::new(),
                false,
            )
            .await
            .unwrap_or_else(|e| panic!("failed to store {bucket}/{key}: {e}"))
    }

    /// Read `bucket/key` back in full.
    pub async fn get(&self, bucket: &str, key: &str) -> Vec<u8> {
        let (_, mut body) = self
            .store
            .objects()
            .get_object(&self.cancel, bucket, key)
            .await
            .unwrap_or_else(|e| panic!("failed to get {bucket}/{key}: {e}"));
        let mut out = Vec::new();
        body.read_to_end(&mut out)
            .await
            .unwrap_or_else(|e| panic!("failed to read {bucket}/{key}: {e}"));
        out
    }

    /// Addresses currently in the pending-delete queue.
    pub async fn pending(&self) -> Vec<String> {
        let mut rx = self.db.read_all(PENDING_DELETE_PREFIX, None);
        let mut out = Vec::new();
        while let Some(entry) = rx.recv().await {
            let entry = entry.unwrap_or_else(|e| panic!("queue scan failed: {e}"));
            let pending: PendingDelete = entry
                .decode()
                .unwrap_or_else(|e| panic!("queue decode failed: {e}"));
            out.push(pending.address);
        }
        out
    }
}

/// Boxed reader over a copy of `data`.
#[must_use]
pub fn reader(data: &[u8]) -> DagReader {
    Box::new(std::io::Cursor::new(data.to_vec()))
}

mod test_bucket;
mod test_gc;
mod test_list;
mod test_multipart;
mod test_object;
