//! Multipart upload operations.
//!
//! A session lives at `uploadObj/{bucket}/{object}/{upload_id}` from
//! initiation until it is completed or aborted. Session mutations are
//! serialized by the upload lock `bucket/object/upload_id`; completion also
//! takes the object lock, always after the upload lock.

use std::collections::HashMap;

use chrono::Utc;
use dagstore_pool::{ContentAddress, DagReader, TreeInfo};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::state::multipart::{
    CompletePart, ListMultipartsInfo, ListPartsInfo, MultipartSession, PartRecord,
};
use crate::state::object::{EntryKind, ObjectMetadata, ObjectRecord};
use crate::store::ObjectStore;
use crate::utils::{canonicalize_etag, generate_upload_id, upload_key, upload_prefix};
use crate::validation::{validate_object_name, validate_part_number};

impl ObjectStore {
    /// Start a multipart upload and persist its empty session.
    pub async fn new_multipart_upload(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        object: &str,
        meta: &HashMap<String, String>,
    ) -> StoreResult<MultipartSession> {
        validate_object_name(object)?;
        let _bucket_guard = self.lock_bucket_shared(cancel, bucket).await?;

        let session = MultipartSession::new(
            bucket.to_owned(),
            object.to_owned(),
            generate_upload_id(),
            meta.clone(),
        );
        self.db
            .put(&upload_key(bucket, object, &session.upload_id), &session)?;
        info!(bucket, object, upload_id = %session.upload_id, "initiated multipart upload");
        Ok(session)
    }

    /// Read a multipart session.
    pub async fn get_multipart_info(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> StoreResult<MultipartSession> {
        let bucket_guard = self.lock_bucket_shared(cancel, bucket).await?;
        let lock = self.new_ns_lock(bucket, &[object, upload_id]);
        let _guard = lock
            .read_lock(bucket_guard.token(), self.config.operation_timeout())
            .await?;
        self.load_session(bucket, object, upload_id)
    }

    /// Upload one part.
    ///
    /// The part is streamed into the pool before the session lock is taken.
    /// Uploading the same part number again replaces the earlier record and
    /// queues its content for deletion.
    #[allow(clippy::too_many_arguments)]
    pub async fn put_object_part(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: u32,
        reader: DagReader,
        size: Option<u64>,
    ) -> StoreResult<PartRecord> {
        validate_part_number(part_number)?;
        let bucket_guard = self.lock_bucket_shared(cancel, bucket).await?;
        let token = bucket_guard.token();
        self.load_session(bucket, object, upload_id)?;

        let tree = self.add_content(token, reader, size).await?;
        match self
            .record_part(token, bucket, object, upload_id, part_number, &tree)
            .await
        {
            Ok(part) => Ok(part),
            Err(e) => {
                self.queue_delete(&tree.address);
                Err(e)
            }
        }
    }

    async fn record_part(
        &self,
        token: &CancellationToken,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: u32,
        tree: &TreeInfo,
    ) -> StoreResult<PartRecord> {
        let lock = self.new_ns_lock(bucket, &[object, upload_id]);
        let _guard = lock.lock(token, self.config.operation_timeout()).await?;

        let mut session = self.load_session(bucket, object, upload_id)?;
        let part = PartRecord {
            number: part_number,
            etag: tree.address.to_string(),
            size: tree.size,
            mod_time: Utc::now(),
        };
        let superseded = session.put_part(part.clone());
        self.db.put(&upload_key(bucket, object, upload_id), &session)?;

        if let Some(old) = superseded {
            self.release_part(&old);
        }
        debug!(bucket, object, upload_id, part_number, size = part.size, "stored part");
        Ok(part)
    }

    /// Assemble the declared parts into the final object.
    ///
    /// Parts are taken in the order given; callers reject unordered lists
    /// with [`check_part_order`](crate::validation::check_part_order). Every
    /// non-final part must reach the configured minimum part size.
    pub async fn complete_multipart_upload(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: &[CompletePart],
    ) -> StoreResult<ObjectRecord> {
        if parts.is_empty() {
            return Err(StoreError::invalid_argument(
                "you must specify at least one part",
            ));
        }
        let bucket_guard = self.lock_bucket_shared(cancel, bucket).await?;
        let token = bucket_guard.token();
        let lock = self.new_ns_lock(bucket, &[object, upload_id]);
        let _upload_guard = lock.lock(token, self.config.operation_timeout()).await?;

        let session = self.load_session(bucket, object, upload_id)?;
        let mut links = Vec::with_capacity(parts.len());
        let last = parts.len() - 1;
        for (idx, declared) in parts.iter().enumerate() {
            let part = session
                .get_part(declared.part_number)
                .filter(|p| canonicalize_etag(&p.etag) == canonicalize_etag(&declared.etag))
                .ok_or(StoreError::InvalidPart {
                    part_number: declared.part_number,
                })?;
            if idx != last && part.size < self.config.min_part_size {
                return Err(StoreError::EntityTooSmall {
                    part_number: part.number,
                    size: part.size,
                    min_size: self.config.min_part_size,
                });
            }
            let address = parse_part_address(part)?;
            links.push(self.pool.create_link_info(&address).await?);
        }

        let tree = self.pool.build_by_links(&links).await?;
        let record = ObjectRecord {
            bucket: bucket.to_owned(),
            name: object.to_owned(),
            kind: EntryKind::Object,
            etag: tree.address.to_string(),
            size: tree.size,
            mod_time: Utc::now(),
            metadata: ObjectMetadata::from_request(&session.metadata),
        };
        if let Err(e) = self.commit_record(token, &record).await {
            self.queue_delete(&tree.address);
            return Err(e);
        }

        self.db.delete(&upload_key(bucket, object, upload_id))?;
        self.release_parts(&session);
        info!(
            bucket,
            object,
            upload_id,
            parts = parts.len(),
            size = record.size,
            "completed multipart upload"
        );
        Ok(record)
    }

    /// Abort an upload, queueing every uploaded part for deletion.
    ///
    /// Aborting an upload that no longer exists fails with
    /// [`StoreError::NoSuchUpload`].
    pub async fn abort_multipart_upload(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> StoreResult<()> {
        let bucket_guard = self.lock_bucket_shared(cancel, bucket).await?;
        let lock = self.new_ns_lock(bucket, &[object, upload_id]);
        let _guard = lock
            .lock(bucket_guard.token(), self.config.delete_timeout())
            .await?;

        let session = self.load_session(bucket, object, upload_id)?;
        self.db.delete(&upload_key(bucket, object, upload_id))?;
        self.release_parts(&session);
        info!(bucket, object, upload_id, parts = session.parts.len(), "aborted multipart upload");
        Ok(())
    }

    /// List the parts of an upload with numbers above `part_number_marker`.
    pub async fn list_object_parts(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number_marker: u32,
        max_parts: usize,
    ) -> StoreResult<ListPartsInfo> {
        let session = self
            .get_multipart_info(cancel, bucket, object, upload_id)
            .await?;
        let max_parts = max_parts.min(self.config.max_parts_list);

        let mut remaining = session
            .parts
            .range(part_number_marker.saturating_add(1)..)
            .map(|(_, part)| part.clone());
        let parts: Vec<PartRecord> = remaining.by_ref().take(max_parts).collect();
        let is_truncated = remaining.next().is_some();
        let next_part_number_marker = parts.last().map_or(part_number_marker, |p| p.number);

        Ok(ListPartsInfo {
            bucket: session.bucket,
            object: session.object,
            upload_id: session.upload_id,
            part_number_marker,
            next_part_number_marker,
            max_parts,
            is_truncated,
            parts,
            metadata: session.metadata,
        })
    }

    /// List in-progress uploads in `bucket` whose object starts with
    /// `prefix`, resuming after `(key_marker, upload_id_marker)`.
    #[allow(clippy::too_many_arguments)]
    pub async fn list_multipart_uploads(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        prefix: &str,
        key_marker: &str,
        upload_id_marker: &str,
        delimiter: &str,
        max_uploads: usize,
    ) -> StoreResult<ListMultipartsInfo> {
        let bucket_guard = self.lock_bucket_shared(cancel, bucket).await?;
        let token = bucket_guard.token();

        let mut page = ListMultipartsInfo {
            key_marker: key_marker.to_owned(),
            upload_id_marker: upload_id_marker.to_owned(),
            max_uploads,
            prefix: prefix.to_owned(),
            delimiter: delimiter.to_owned(),
            ..ListMultipartsInfo::default()
        };
        if max_uploads == 0 {
            return Ok(page);
        }

        // Without an upload ID marker every upload of `key_marker` is skipped.
        let seek = match (key_marker.is_empty(), upload_id_marker.is_empty()) {
            (true, _) => None,
            (false, false) => Some(upload_key(bucket, key_marker, upload_id_marker)),
            (false, true) => Some(upload_prefix(bucket, key_marker)),
        };
        let skip_marker_key = !key_marker.is_empty() && upload_id_marker.is_empty();

        let mut rx = self
            .db
            .read_all(&upload_prefix(bucket, prefix), seek.as_deref());
        let mut emitted = 0usize;
        while let Some(entry) = rx.recv().await {
            if token.is_cancelled() {
                return Err(StoreError::Canceled);
            }
            let session: MultipartSession = entry?.decode()?;
            if skip_marker_key && session.object == key_marker {
                continue;
            }
            // The key scan also matches shorter objects, e.g. object `a` under prefix `a/`.
            let Some(rest) = session.object.strip_prefix(prefix) else {
                continue;
            };

            let common = (!delimiter.is_empty())
                .then(|| {
                    rest.find(delimiter)
                        .map(|pos| session.object[..prefix.len() + pos + delimiter.len()].to_owned())
                })
                .flatten();
            if let Some(common) = &common {
                let resumed = !key_marker.is_empty() && common.as_str() <= key_marker;
                if resumed || page.common_prefixes.last() == Some(common) {
                    continue;
                }
            }

            if emitted == max_uploads {
                page.is_truncated = true;
                break;
            }
            emitted += 1;
            match common {
                Some(common) => {
                    page.next_key_marker.clone_from(&common);
                    page.next_upload_id_marker.clear();
                    page.common_prefixes.push(common);
                }
                None => {
                    page.next_key_marker.clone_from(&session.object);
                    page.next_upload_id_marker.clone_from(&session.upload_id);
                    page.uploads.push(session);
                }
            }
        }

        if !page.is_truncated {
            page.next_key_marker.clear();
            page.next_upload_id_marker.clear();
        }
        Ok(page)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn load_session(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> StoreResult<MultipartSession> {
        self.db
            .get::<MultipartSession>(&upload_key(bucket, object, upload_id))?
            .ok_or_else(|| StoreError::NoSuchUpload {
                upload_id: upload_id.to_owned(),
            })
    }

    fn release_part(&self, part: &PartRecord) {
        match parse_part_address(part) {
            Ok(address) => self.queue_delete(&address),
            Err(e) => warn!(part = part.number, error = %e, "skipping release of corrupt part"),
        }
    }

    /// Queue the content of every part in `session`.
    pub(crate) fn release_parts(&self, session: &MultipartSession) {
        for part in session.parts.values() {
            self.release_part(part);
        }
    }
}

fn parse_part_address(part: &PartRecord) -> StoreResult<ContentAddress> {
    part.etag.parse().map_err(|e| {
        StoreError::Internal(anyhow::anyhow!(
            "corrupt content address for part {}: {e}",
            part.number
        ))
    })
}
