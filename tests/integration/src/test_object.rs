//! Object CRUD integration tests.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use dagstore_kv::{FjallMetaStore, MemoryMetaStore};
    use dagstore_pool::MemoryDagPool;
    use dagstore_s3_core::DagStore;
    use dagstore_s3_core::config::StoreConfig;
    use dagstore_s3_core::error::{ErrorKind, StoreError};
    use dagstore_s3_core::gc::AlwaysIdle;
    use futures::future::join_all;
    use tokio::io::AsyncReadExt;
    use tokio_util::sync::CancellationToken;

    use crate::{TEST_OWNER, reader, test_bucket_name, test_engine, test_engine_with};

    #[tokio::test]
    async fn test_should_replace_readme_and_queue_old_content() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("readme").await;

        let first = engine.put(&bucket, "readme.txt", b"welcome").await;
        assert_eq!(first.size, 7);
        assert_eq!(engine.get(&bucket, "readme.txt").await, b"welcome");
        assert!(engine.pending().await.is_empty());

        let second = engine.put(&bucket, "readme.txt", b"bye").await;
        assert_eq!(second.size, 3);
        assert_eq!(engine.get(&bucket, "readme.txt").await, b"bye");

        assert_eq!(engine.pending().await, vec![first.etag]);
    }

    #[tokio::test]
    async fn test_should_return_metadata_with_object() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("meta").await;
        let meta = HashMap::from([
            ("content-type".to_owned(), "application/json".to_owned()),
            ("x-amz-meta-origin".to_owned(), "camera".to_owned()),
        ]);
        engine
            .store
            .objects()
            .store_object(&engine.cancel, &bucket, "doc.json", reader(b"{}"), Some(2), &meta, false)
            .await
            .expect("store_object");

        let info = engine
            .store
            .objects()
            .get_object_info(&engine.cancel, &bucket, "doc.json")
            .await
            .expect("get_object_info");
        assert_eq!(info.metadata.content_type.as_deref(), Some("application/json"));
        assert_eq!(
            info.metadata.user_metadata.get("origin").map(String::as_str),
            Some("camera")
        );
    }

    #[tokio::test]
    async fn test_should_stream_large_object_through_readahead() {
        let config = StoreConfig::builder()
            .big_file_threshold(1024)
            .readahead_chunk_size(100)
            .build();
        let pool = MemoryDagPool::with_layout(64, 8);
        let store = DagStore::with_idle_probe(
            Arc::new(MemoryMetaStore::new()),
            Arc::new(pool.clone()),
            config,
            Arc::new(AlwaysIdle),
        );
        let cancel = CancellationToken::new();
        let bucket = test_bucket_name("large");
        store
            .buckets()
            .create_bucket(&cancel, &bucket, None, TEST_OWNER)
            .await
            .expect("create_bucket");

        let data: Vec<u8> = (0..=250u8).cycle().take(3 * 1024 + 17).collect();
        let record = store
            .objects()
            .store_object(
                &cancel,
                &bucket,
                "blob.bin",
                reader(&data),
                Some(data.len() as u64),
                &HashMap::new(),
                false,
            )
            .await
            .expect("store_object");
        assert_eq!(record.size, data.len() as u64);
        assert!(pool.block_count() > 1);

        let (_, mut body) = store
            .objects()
            .get_object(&cancel, &bucket, "blob.bin")
            .await
            .expect("get_object");
        let mut out = Vec::new();
        body.read_to_end(&mut out).await.expect("read body");
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_should_linearize_concurrent_writes_to_one_key() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("race").await;
        let payloads: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 10 + usize::from(i)]).collect();
        let meta = HashMap::new();

        let writes = payloads.iter().map(|data| {
            engine.store.objects().store_object(
                &engine.cancel,
                &bucket,
                "hot-key",
                reader(data),
                None,
                &meta,
                false,
            )
        });
        let records: Vec<_> = join_all(writes)
            .await
            .into_iter()
            .map(|r| r.expect("store_object"))
            .collect();

        let live = engine.get(&bucket, "hot-key").await;
        assert!(payloads.contains(&live));

        // Every write except the surviving one was superseded exactly once.
        let mut queued = engine.pending().await;
        let info = engine
            .store
            .objects()
            .get_object_info(&engine.cancel, &bucket, "hot-key")
            .await
            .expect("get_object_info");
        queued.push(info.etag);
        queued.sort();
        let mut written: Vec<String> = records.into_iter().map(|r| r.etag).collect();
        written.sort();
        assert_eq!(queued, written);
    }

    #[tokio::test]
    async fn test_should_write_different_keys_in_parallel() {
        let engine = Arc::new(test_engine());
        let bucket = engine.create_test_bucket("parallel").await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let engine = Arc::clone(&engine);
            let bucket = bucket.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("key-{i:02}");
                let data = format!("value {i}").into_bytes();
                engine.put(&bucket, &key, &data).await;
                assert_eq!(engine.get(&bucket, &key).await, data);
            }));
        }
        for handle in handles {
            handle.await.expect("task panicked");
        }
        assert!(engine.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_should_classify_missing_object() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("missing").await;
        let err = engine
            .store
            .objects()
            .get_object(&engine.cancel, &bucket, "ghost")
            .await
            .err()
            .expect("get_object should fail");
        assert!(matches!(err, StoreError::NoSuchKey { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_should_honor_canceled_token() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("cancel").await;
        let canceled = CancellationToken::new();
        canceled.cancel();
        let err = engine
            .store
            .objects()
            .store_object(&canceled, &bucket, "k", reader(b"data"), None, &HashMap::new(), false)
            .await
            .err()
            .expect("store_object should fail");
        assert!(matches!(err, StoreError::Canceled));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_should_keep_metadata_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = {
            let meta = Arc::new(FjallMetaStore::open(dir.path()).expect("open fjall"));
            let engine = test_engine_with(meta.clone());
            let bucket = "durable";
            engine
                .store
                .buckets()
                .create_bucket(&engine.cancel, bucket, None, TEST_OWNER)
                .await
                .expect("create_bucket");
            engine.put(bucket, "kept.txt", b"still here").await;
            meta.persist().expect("persist");
            engine.pool.clone()
        };

        let meta = Arc::new(FjallMetaStore::open(dir.path()).expect("reopen fjall"));
        let store = DagStore::with_idle_probe(
            meta,
            Arc::new(pool),
            StoreConfig::default(),
            Arc::new(AlwaysIdle),
        );
        let cancel = CancellationToken::new();
        let (record, mut body) = store
            .objects()
            .get_object(&cancel, "durable", "kept.txt")
            .await
            .expect("get_object after reopen");
        let mut out = Vec::new();
        body.read_to_end(&mut out).await.expect("read body");
        assert_eq!(out, b"still here");
        assert_eq!(record.size, 10);
    }
}
