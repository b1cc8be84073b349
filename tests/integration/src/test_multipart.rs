//! Multipart upload integration tests.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use dagstore_s3_core::error::StoreError;
    use dagstore_s3_core::state::multipart::{CompletePart, PartRecord};
    use dagstore_s3_core::validation::check_part_order;

    use crate::{TestEngine, reader, test_engine};

    async fn upload_part(
        engine: &TestEngine,
        bucket: &str,
        upload_id: &str,
        number: u32,
        data: &[u8],
    ) -> PartRecord {
        engine
            .store
            .objects()
            .put_object_part(
                &engine.cancel,
                bucket,
                "multipart.bin",
                upload_id,
                number,
                reader(data),
                Some(data.len() as u64),
            )
            .await
            .unwrap_or_else(|e| panic!("upload part {number}: {e}"))
    }

    fn completed(part: &PartRecord) -> CompletePart {
        CompletePart {
            part_number: part.number,
            etag: format!("\"{}\"", part.etag),
        }
    }

    #[tokio::test]
    async fn test_should_complete_multipart_upload() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("mpu").await;
        let meta = HashMap::from([("content-type".to_owned(), "application/octet-stream".to_owned())]);

        let session = engine
            .store
            .objects()
            .new_multipart_upload(&engine.cancel, &bucket, "multipart.bin", &meta)
            .await
            .expect("new_multipart_upload");

        let part1_data = vec![0xAAu8; 100];
        let part2_data = vec![0xBBu8; 37];
        let part1 = upload_part(&engine, &bucket, &session.upload_id, 1, &part1_data).await;
        let part2 = upload_part(&engine, &bucket, &session.upload_id, 2, &part2_data).await;

        let parts = [completed(&part1), completed(&part2)];
        check_part_order(&parts).expect("parts are ordered");
        let record = engine
            .store
            .objects()
            .complete_multipart_upload(&engine.cancel, &bucket, "multipart.bin", &session.upload_id, &parts)
            .await
            .expect("complete_multipart_upload");
        assert_eq!(record.size, 137);
        assert_eq!(record.metadata.content_type.as_deref(), Some("application/octet-stream"));

        let mut expected = part1_data;
        expected.extend_from_slice(&part2_data);
        assert_eq!(engine.get(&bucket, "multipart.bin").await, expected);

        let uploads = engine
            .store
            .objects()
            .list_multipart_uploads(&engine.cancel, &bucket, "", "", "", "", 100)
            .await
            .expect("list_multipart_uploads");
        assert!(!uploads.lookup(&session.upload_id));

        // Part references go through the queue; the object keeps the content alive.
        engine.store.run_gc_cycle().await.expect("gc cycle");
        assert!(engine.pending().await.is_empty());
        assert_eq!(engine.get(&bucket, "multipart.bin").await, expected);
    }

    #[test]
    fn test_should_reject_out_of_order_parts_before_completion() {
        let parts = [
            CompletePart {
                part_number: 2,
                etag: "b".to_owned(),
            },
            CompletePart {
                part_number: 1,
                etag: "a".to_owned(),
            },
        ];
        assert!(matches!(check_part_order(&parts), Err(StoreError::InvalidPartOrder)));
    }

    #[tokio::test]
    async fn test_should_enforce_part_floor_and_etags() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("floor").await;
        let session = engine
            .store
            .objects()
            .new_multipart_upload(&engine.cancel, &bucket, "multipart.bin", &HashMap::new())
            .await
            .expect("new_multipart_upload");
        let small = upload_part(&engine, &bucket, &session.upload_id, 1, b"abc").await;
        let last = upload_part(&engine, &bucket, &session.upload_id, 2, b"tail").await;

        let too_small = engine
            .store
            .objects()
            .complete_multipart_upload(
                &engine.cancel,
                &bucket,
                "multipart.bin",
                &session.upload_id,
                &[completed(&small), completed(&last)],
            )
            .await;
        assert!(matches!(too_small, Err(StoreError::EntityTooSmall { part_number: 1, .. })));

        let wrong_etag = CompletePart {
            part_number: 2,
            etag: small.etag.clone(),
        };
        let mismatch = engine
            .store
            .objects()
            .complete_multipart_upload(&engine.cancel, &bucket, "multipart.bin", &session.upload_id, &[wrong_etag])
            .await;
        assert!(matches!(mismatch, Err(StoreError::InvalidPart { part_number: 2 })));

        // The session survives failed completions.
        let info = engine
            .store
            .objects()
            .get_multipart_info(&engine.cancel, &bucket, "multipart.bin", &session.upload_id)
            .await
            .expect("get_multipart_info");
        assert_eq!(info.parts.len(), 2);
    }

    #[tokio::test]
    async fn test_should_abort_and_collect_all_parts() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("abort").await;
        let session = engine
            .store
            .objects()
            .new_multipart_upload(&engine.cancel, &bucket, "multipart.bin", &HashMap::new())
            .await
            .expect("new_multipart_upload");
        for n in 1..=3 {
            let data = vec![u8::try_from(n).unwrap_or(0); 50];
            upload_part(&engine, &bucket, &session.upload_id, n, &data).await;
        }
        assert!(engine.pool.block_count() > 0);

        engine
            .store
            .objects()
            .abort_multipart_upload(&engine.cancel, &bucket, "multipart.bin", &session.upload_id)
            .await
            .expect("abort_multipart_upload");
        assert_eq!(engine.pending().await.len(), 3);

        let report = engine.store.run_gc_cycle().await.expect("gc cycle");
        assert_eq!(report.removed, 3);
        assert_eq!(engine.pool.block_count(), 0);
        assert!(engine.pending().await.is_empty());

        let again = engine
            .store
            .objects()
            .abort_multipart_upload(&engine.cancel, &bucket, "multipart.bin", &session.upload_id)
            .await;
        assert!(matches!(again, Err(StoreError::NoSuchUpload { .. })));
    }

    #[tokio::test]
    async fn test_should_list_parts_after_marker() {
        let engine = test_engine();
        let bucket = engine.create_test_bucket("parts").await;
        let session = engine
            .store
            .objects()
            .new_multipart_upload(&engine.cancel, &bucket, "multipart.bin", &HashMap::new())
            .await
            .expect("new_multipart_upload");
        for n in [1, 2, 5, 7] {
            upload_part(&engine, &bucket, &session.upload_id, n, b"part data").await;
        }

        let listed = engine
            .store
            .objects()
            .list_object_parts(&engine.cancel, &bucket, "multipart.bin", &session.upload_id, 2, 1000)
            .await
            .expect("list_object_parts");
        let numbers: Vec<u32> = listed.parts.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![5, 7]);
        assert!(!listed.is_truncated);
        assert_eq!(listed.next_part_number_marker, 7);
    }
}
