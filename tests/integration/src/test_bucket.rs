//! Bucket CRUD integration tests.

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use dagstore_s3_core::error::{ErrorKind, StoreError};

    use crate::{TEST_OWNER, reader, test_bucket_name, test_engine};

    #[tokio::test]
    async fn test_should_create_and_delete_bucket() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("create").await;

        let meta = engine
            .store
            .buckets()
            .get_bucket_meta(&engine.cancel, &bucket)
            .await
            .expect("get_bucket_meta");
        assert_eq!(meta.owner, TEST_OWNER);
        assert_eq!(meta.region, engine.store.config().default_region);

        engine
            .store
            .buckets()
            .delete_bucket(&engine.cancel, &bucket)
            .await
            .expect("delete_bucket");
        let exists = engine
            .store
            .buckets()
            .has_bucket(&engine.cancel, &bucket)
            .await
            .expect("has_bucket");
        assert!(!exists);
    }

    #[tokio::test]
    async fn test_should_refuse_to_delete_non_empty_bucket() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("nonempty").await;
        engine.put(&bucket, "keep.txt", b"data").await;

        let err = engine
            .store
            .buckets()
            .delete_bucket(&engine.cancel, &bucket)
            .await
            .err()
            .expect("delete_bucket should fail");
        assert!(matches!(err, StoreError::BucketNotEmpty { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        engine
            .store
            .objects()
            .delete_object(&engine.cancel, &bucket, "keep.txt")
            .await
            .expect("delete_object");
        engine
            .store
            .buckets()
            .delete_bucket(&engine.cancel, &bucket)
            .await
            .expect("delete_bucket after emptying");
    }

    #[tokio::test]
    async fn test_should_count_folder_marker_as_bucket_content() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("folder").await;
        engine
            .store
            .objects()
            .store_object(&engine.cancel, &bucket, "photos", reader(b""), Some(0), &HashMap::new(), true)
            .await
            .expect("create folder");

        let err = engine
            .store
            .buckets()
            .delete_bucket(&engine.cancel, &bucket)
            .await
            .err()
            .expect("delete_bucket should fail");
        assert!(matches!(err, StoreError::BucketNotEmpty { .. }));

        engine
            .store
            .objects()
            .delete_object(&engine.cancel, &bucket, "photos/")
            .await
            .expect("delete folder");
        engine
            .store
            .buckets()
            .delete_bucket(&engine.cancel, &bucket)
            .await
            .expect("delete_bucket after removing folder");
    }

    #[tokio::test]
    async fn test_should_reject_duplicate_bucket_names() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("dup").await;

        let mine = engine
            .store
            .buckets()
            .create_bucket(&engine.cancel, &bucket, None, TEST_OWNER)
            .await;
        assert!(matches!(mine, Err(StoreError::BucketAlreadyOwnedByYou { .. })));

        let theirs = engine
            .store
            .buckets()
            .create_bucket(&engine.cancel, &bucket, None, "someone-else")
            .await;
        assert!(matches!(theirs, Err(StoreError::BucketAlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_should_list_buckets_per_owner() {
        let engine = test_engine();
        let b1 = engine.create_test_bucket("list1").await;
        let b2 = engine.create_test_bucket("list2").await;
        let other = test_bucket_name("other");
        engine
            .store
            .buckets()
            .create_bucket(&engine.cancel, &other, Some("eu-west-1"), "another-owner")
            .await
            .expect("create_bucket");

        let mine: Vec<String> = engine
            .store
            .buckets()
            .get_all_buckets_of_user(&engine.cancel, TEST_OWNER)
            .await
            .expect("get_all_buckets_of_user")
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(mine.len(), 2);
        assert!(mine.contains(&b1));
        assert!(mine.contains(&b2));

        let all = engine
            .store
            .buckets()
            .get_all_bucket_info(&engine.cancel)
            .await
            .expect("get_all_bucket_info");
        assert_eq!(all.len(), 3);
        let foreign = all
            .iter()
            .find(|b| b.name == other)
            .expect("other bucket listed");
        assert_eq!(foreign.region, "eu-west-1");
    }

    #[tokio::test]
    async fn test_should_reject_invalid_bucket_name() {
        let engine = test_engine();
        let err = engine
            .store
            .buckets()
            .create_bucket(&engine.cancel, "Bad_Name", None, TEST_OWNER)
            .await
            .err()
            .expect("create_bucket should fail");
        assert!(matches!(err, StoreError::InvalidBucketName { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_should_manage_policy_and_tagging() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("config").await;
        let buckets = engine.store.buckets();

        let missing = buckets.get_policy_config(&engine.cancel, &bucket).await;
        assert!(matches!(missing, Err(StoreError::NoSuchBucketPolicy { .. })));

        let policy = r#"{"Version":"2012-10-17","Statement":[]}"#;
        buckets
            .update_bucket_policy(&engine.cancel, &bucket, policy)
            .await
            .expect("update_bucket_policy");
        let stored = buckets
            .get_policy_config(&engine.cancel, &bucket)
            .await
            .expect("get_policy_config");
        assert_eq!(stored, policy);

        let tags = BTreeMap::from([("env".to_owned(), "test".to_owned())]);
        buckets
            .update_bucket_tagging(&engine.cancel, &bucket, tags.clone())
            .await
            .expect("update_bucket_tagging");
        let stored = buckets
            .get_tagging_config(&engine.cancel, &bucket)
            .await
            .expect("get_tagging_config");
        assert_eq!(stored, tags);

        buckets
            .delete_bucket_tagging(&engine.cancel, &bucket)
            .await
            .expect("delete_bucket_tagging");
        let gone = buckets.get_tagging_config(&engine.cancel, &bucket).await;
        assert!(matches!(gone, Err(StoreError::NoSuchTagSet { .. })));
    }

    #[tokio::test]
    async fn test_should_report_usage_across_buckets() {
        let engine = test_engine();
        let b1 = engine.create_test_bucket("usage1").await;
        let b2 = engine.create_test_bucket("usage2").await;
        engine.put(&b1, "a", b"12345").await;
        engine.put(&b1, "b", b"678").await;
        engine.put(&b2, "c", b"9").await;
        engine
            .store
            .objects()
            .store_object(&engine.cancel, &b2, "dir/", reader(b""), Some(0), &HashMap::new(), true)
            .await
            .expect("create folder");

        let names = vec![b1.clone(), b2.clone(), test_bucket_name("gone")];
        let usage = engine
            .store
            .objects()
            .store_stats(&engine.cancel, &names)
            .await
            .expect("store_stats");
        assert_eq!(usage.buckets_count, 2);
        assert_eq!(usage.objects_total_count, 3);
        assert_eq!(usage.objects_total_size, 9);
        assert!(usage.last_update.is_some());
        assert_eq!(usage.buckets_usage.get(&b1).map(|i| i.objects), Some(2));
    }
}
