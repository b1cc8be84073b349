//! Listing integration tests.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::{reader, test_engine};

    #[tokio::test]
    async fn test_should_group_folders_under_delimiter() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("folders").await;
        engine.put(&bucket, "dir/a", b"leaf").await;
        engine
            .store
            .objects()
            .store_object(&engine.cancel, &bucket, "dir/b/", reader(b""), Some(0), &HashMap::new(), true)
            .await
            .expect("create folder");
        engine.put(&bucket, "dir/b/c", b"nested").await;
        engine.put(&bucket, "top", b"outside").await;

        let page = engine
            .store
            .objects()
            .list_objects(&engine.cancel, &bucket, "dir/", None, "/", 1000)
            .await
            .expect("list_objects");
        let names: Vec<&str> = page.objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["dir/a"]);
        assert_eq!(page.prefixes, vec!["dir/b/".to_owned()]);
        assert!(!page.is_truncated);
        assert!(page.next_marker.is_none());
    }

    #[tokio::test]
    async fn test_should_page_through_keys_with_v2_tokens() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("paging").await;
        for i in 0..7 {
            engine.put(&bucket, &format!("key-{i}"), b"x").await;
        }

        let mut seen = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0;
        loop {
            let page = engine
                .store
                .objects()
                .list_objects_v2(&engine.cancel, &bucket, "key-", token.as_deref(), "", 3, None)
                .await
                .expect("list_objects_v2");
            pages += 1;
            seen.extend(page.objects.into_iter().map(|o| o.name));
            if !page.is_truncated {
                break;
            }
            token = page.next_continuation_token;
        }
        assert_eq!(pages, 3);
        let expected: Vec<String> = (0..7).map(|i| format!("key-{i}")).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_should_start_after_key() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("after").await;
        for key in ["a", "b", "c", "d"] {
            engine.put(&bucket, key, b"x").await;
        }

        let page = engine
            .store
            .objects()
            .list_objects_v2(&engine.cancel, &bucket, "", None, "", 100, Some("b"))
            .await
            .expect("list_objects_v2");
        let names: Vec<&str> = page.objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_should_not_leak_keys_across_buckets() {
        let engine = test_engine();
        let b1 = engine.create_test_bucket("iso1").await;
        let b2 = engine.create_test_bucket("iso2").await;
        engine.put(&b1, "shared-name", b"one").await;
        engine.put(&b2, "shared-name", b"two").await;
        engine.put(&b2, "only-two", b"two").await;

        let page = engine
            .store
            .objects()
            .list_objects(&engine.cancel, &b1, "", None, "", 100)
            .await
            .expect("list_objects");
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].bucket, b1);
    }

    #[tokio::test]
    async fn test_should_empty_bucket_with_clean() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("clean").await;
        for i in 0..5 {
            engine.put(&bucket, &format!("obj-{i}"), format!("payload {i}").as_bytes()).await;
        }
        engine
            .store
            .objects()
            .new_multipart_upload(&engine.cancel, &bucket, "pending.bin", &HashMap::new())
            .await
            .expect("new_multipart_upload");

        let removed = engine
            .store
            .objects()
            .clean_objects_in_bucket(&engine.cancel, &bucket)
            .await
            .expect("clean_objects_in_bucket");
        assert_eq!(removed, 6);
        assert_eq!(engine.pending().await.len(), 5);

        let page = engine
            .store
            .objects()
            .list_objects(&engine.cancel, &bucket, "", None, "", 100)
            .await
            .expect("list_objects");
        assert!(page.objects.is_empty());

        engine
            .store
            .buckets()
            .delete_bucket(&engine.cancel, &bucket)
            .await
            .expect("delete_bucket");
        engine.store.run_gc_cycle().await.expect("gc cycle");
        assert_eq!(engine.pool.block_count(), 0);
    }
}
