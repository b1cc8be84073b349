//! Listing and bucket-wide aggregation over object records.

use std::collections::HashSet;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::state::bucket::{BucketInfo, DataUsageInfo};
use crate::state::multipart::MultipartSession;
use crate::state::object::{ListObjectsInfo, ListObjectsV2Info, ObjectRecord};
use crate::store::ObjectStore;
use crate::utils::{object_key, upload_prefix};

impl ObjectStore {
    /// List objects in `bucket` (S3 `ListObjects` semantics).
    ///
    /// Keys are returned in lexicographic order starting strictly after
    /// `marker`. With a non-empty `delimiter`, keys whose remainder past
    /// `prefix` contains it are folded into common prefixes; each new prefix
    /// counts toward `max_keys` like a leaf.
    pub async fn list_objects(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        prefix: &str,
        marker: Option<&str>,
        delimiter: &str,
        max_keys: usize,
    ) -> StoreResult<ListObjectsInfo> {
        let bucket_guard = self.lock_bucket_shared(cancel, bucket).await?;
        if max_keys == 0 {
            return Ok(ListObjectsInfo::default());
        }

        // A fully qualified key asked for on its own is a point lookup.
        if !prefix.is_empty() && max_keys == 1 && delimiter.is_empty() && marker.is_none() {
            if let Some(record) = self.db.get::<ObjectRecord>(&object_key(bucket, prefix))? {
                return Ok(ListObjectsInfo {
                    objects: vec![record],
                    ..ListObjectsInfo::default()
                });
            }
        }

        self.scan_objects(bucket_guard.token(), bucket, prefix, marker, delimiter, max_keys)
            .await
    }

    /// List objects in `bucket` (S3 `ListObjectsV2` semantics).
    ///
    /// `continuation_token` takes precedence over `start_after`.
    #[allow(clippy::too_many_arguments)]
    pub async fn list_objects_v2(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
        delimiter: &str,
        max_keys: usize,
        start_after: Option<&str>,
    ) -> StoreResult<ListObjectsV2Info> {
        let marker = continuation_token.or(start_after);
        let page = self
            .list_objects(cancel, bucket, prefix, marker, delimiter, max_keys)
            .await?;
        Ok(ListObjectsV2Info {
            is_truncated: page.is_truncated,
            continuation_token: continuation_token.map(str::to_owned),
            next_continuation_token: page.next_marker,
            objects: page.objects,
            prefixes: page.prefixes,
        })
    }

    /// Scan object records without taking any lock.
    ///
    /// Callers hold the bucket lock in either mode.
    pub(crate) async fn scan_objects(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        prefix: &str,
        marker: Option<&str>,
        delimiter: &str,
        max_keys: usize,
    ) -> StoreResult<ListObjectsInfo> {
        let mut page = ListObjectsInfo::default();
        if max_keys == 0 {
            return Ok(page);
        }

        let base_len = object_key(bucket, "").len();
        let seek = marker.map(|m| object_key(bucket, m));
        let mut rx = self
            .db
            .read_all(&object_key(bucket, prefix), seek.as_deref());
        let mut seen = HashSet::new();
        let mut emitted = 0usize;

        while let Some(entry) = rx.recv().await {
            if cancel.is_cancelled() {
                return Err(StoreError::Canceled);
            }
            let entry = entry?;
            let name = &entry.key[base_len..];

            if !delimiter.is_empty() {
                if let Some(pos) = name[prefix.len()..].find(delimiter) {
                    let common = &name[..prefix.len() + pos + delimiter.len()];
                    if marker.is_some_and(|m| common <= m) || seen.contains(common) {
                        continue;
                    }
                    if emitted == max_keys {
                        page.is_truncated = true;
                        break;
                    }
                    seen.insert(common.to_owned());
                    page.prefixes.push(common.to_owned());
                    page.next_marker = Some(common.to_owned());
                    emitted += 1;
                    continue;
                }
            }

            if emitted == max_keys {
                page.is_truncated = true;
                break;
            }
            page.objects.push(entry.decode::<ObjectRecord>()?);
            page.next_marker = Some(name.to_owned());
            emitted += 1;
        }

        if !page.is_truncated {
            page.next_marker = None;
        }
        Ok(page)
    }

    /// Object count and total size of `bucket`. Folder markers are not
    /// counted.
    pub async fn get_bucket_info(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
    ) -> StoreResult<BucketInfo> {
        let bucket_guard = self.lock_bucket_shared(cancel, bucket).await?;
        let token = bucket_guard.token();

        let mut info = BucketInfo {
            name: bucket.to_owned(),
            ..BucketInfo::default()
        };
        let mut rx = self.db.read_all(&object_key(bucket, ""), None);
        while let Some(entry) = rx.recv().await {
            if token.is_cancelled() {
                return Err(StoreError::Canceled);
            }
            let record: ObjectRecord = entry?.decode()?;
            if !record.is_dir() {
                info.objects += 1;
                info.size += record.size;
            }
        }
        Ok(info)
    }

    /// Aggregate usage over `buckets`. Buckets that no longer exist are
    /// skipped.
    pub async fn store_stats(
        &self,
        cancel: &CancellationToken,
        buckets: &[String],
    ) -> StoreResult<DataUsageInfo> {
        let mut usage = DataUsageInfo::default();
        for bucket in buckets {
            match self.get_bucket_info(cancel, bucket).await {
                Ok(info) => usage.add_bucket(info),
                Err(StoreError::NoSuchBucket { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        usage.last_update = Some(Utc::now());
        Ok(usage)
    }

    /// Remove every object and multipart session in `bucket`, queueing all
    /// referenced content. Returns the number of metadata entries removed.
    pub async fn clean_objects_in_bucket(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
    ) -> StoreResult<usize> {
        let bucket_guard = self.lock_bucket_shared(cancel, bucket).await?;
        let token = bucket_guard.token();
        let mut removed = 0;

        let mut names = Vec::new();
        let base_len = object_key(bucket, "").len();
        let mut rx = self.db.read_all(&object_key(bucket, ""), None);
        while let Some(entry) = rx.recv().await {
            names.push(entry?.key[base_len..].to_owned());
        }
        for name in names {
            let lock = self.new_ns_lock(bucket, &[&name]);
            let _guard = lock.lock(token, self.config.delete_timeout()).await?;
            let key = object_key(bucket, &name);
            if let Some(record) = self.db.get::<ObjectRecord>(&key)? {
                self.db.delete(&key)?;
                self.release_record(&record);
                removed += 1;
            }
        }

        let mut sessions = Vec::new();
        let mut rx = self.db.read_all(&upload_prefix(bucket, ""), None);
        while let Some(entry) = rx.recv().await {
            let entry = entry?;
            sessions.push((entry.key.clone(), entry.decode::<MultipartSession>()?));
        }
        for (key, session) in sessions {
            let lock = self.new_ns_lock(bucket, &[&session.object, &session.upload_id]);
            let _guard = lock.lock(token, self.config.delete_timeout()).await?;
            if self.db.contains(&key)? {
                self.db.delete(&key)?;
                self.release_parts(&session);
                removed += 1;
            }
        }

        info!(bucket, removed, "cleaned bucket contents");
        Ok(removed)
    }
}
