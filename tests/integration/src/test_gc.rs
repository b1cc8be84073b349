//! Garbage collection integration tests.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use dagstore_kv::MemoryMetaStore;
    use dagstore_pool::MemoryDagPool;
    use dagstore_s3_core::DagStore;
    use dagstore_s3_core::config::StoreConfig;
    use dagstore_s3_core::gc::AlwaysIdle;
    use tokio_util::sync::CancellationToken;

    use crate::{TEST_OWNER, reader, test_engine};

    #[tokio::test]
    async fn test_should_reclaim_overwritten_and_deleted_content() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("gc").await;
        engine.put(&bucket, "a", b"first version of a").await;
        engine.put(&bucket, "a", b"second version of a").await;
        engine.put(&bucket, "b", b"short-lived").await;
        engine
            .store
            .objects()
            .delete_object(&engine.cancel, &bucket, "b")
            .await
            .expect("delete_object");
        assert_eq!(engine.pending().await.len(), 2);

        let report = engine.store.run_gc_cycle().await.expect("gc cycle");
        assert_eq!(report.removed, 2);
        assert_eq!(report.skipped, 0);
        assert!(engine.pending().await.is_empty());

        // Only the live version of `a` remains.
        assert_eq!(engine.get(&bucket, "a").await, b"second version of a");
        engine
            .store
            .objects()
            .delete_object(&engine.cancel, &bucket, "a")
            .await
            .expect("delete_object");
        engine.store.run_gc_cycle().await.expect("gc cycle");
        assert_eq!(engine.pool.block_count(), 0);
    }

    #[tokio::test]
    async fn test_should_keep_shared_content_until_last_reference() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("dedup").await;
        let one = engine.put(&bucket, "one", b"identical bytes").await;
        let two = engine.put(&bucket, "two", b"identical bytes").await;
        assert_eq!(one.etag, two.etag);

        engine
            .store
            .objects()
            .delete_object(&engine.cancel, &bucket, "one")
            .await
            .expect("delete_object");
        engine.store.run_gc_cycle().await.expect("gc cycle");
        assert_eq!(engine.get(&bucket, "two").await, b"identical bytes");
    }

    #[tokio::test]
    async fn test_should_drain_queue_from_background_task() {
        let pool = MemoryDagPool::with_layout(16, 4);
        let config = StoreConfig::builder().gc_period_secs(1).build();
        let store = DagStore::with_idle_probe(
            Arc::new(MemoryMetaStore::new()),
            Arc::new(pool.clone()),
            config,
            Arc::new(AlwaysIdle),
        );
        let cancel = CancellationToken::new();
        store
            .buckets()
            .create_bucket(&cancel, "background", None, TEST_OWNER)
            .await
            .expect("create_bucket");
        store
            .objects()
            .store_object(
                &cancel,
                "background",
                "tmp",
                reader(b"temporary object"),
                None,
                &HashMap::new(),
                false,
            )
            .await
            .expect("store_object");
        store
            .objects()
            .delete_object(&cancel, "background", "tmp")
            .await
            .expect("delete_object");

        let shutdown = CancellationToken::new();
        let handle = store.start(shutdown.clone());
        tokio::time::timeout(Duration::from_secs(5), async {
            while pool.block_count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("collector drained the queue");

        shutdown.cancel();
        handle.await.expect("collector task");
    }
}
