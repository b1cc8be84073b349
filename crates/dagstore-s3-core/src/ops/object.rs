//! Object operations: store, get, stat and delete.

use std::collections::HashMap;

use chrono::Utc;
use dagstore_pool::DagReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::state::object::{EntryKind, ObjectMetadata, ObjectRecord, is_folder_name};
use crate::store::ObjectStore;
use crate::utils::{SLASH_SEPARATOR, object_key};
use crate::validation::validate_object_name;

impl ObjectStore {
    /// Store an object, replacing any existing record at the key.
    ///
    /// Regular objects are streamed into the pool before any lock on the key
    /// is taken, so concurrent writers only serialize on the metadata
    /// commit. With `folder_marker` set, a folder marker is created instead:
    /// the name gets a trailing `/` if it lacks one, `reader` is not read,
    /// and every parent segment is checked for a conflicting regular object.
    /// A regular object may itself end in `/`; the flag alone picks the kind.
    ///
    /// The content of a replaced record is queued for deletion.
    #[allow(clippy::too_many_arguments)]
    pub async fn store_object(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        object: &str,
        reader: DagReader,
        size: Option<u64>,
        meta: &HashMap<String, String>,
        folder_marker: bool,
    ) -> StoreResult<ObjectRecord> {
        validate_object_name(object)?;
        let bucket_guard = self.lock_bucket_shared(cancel, bucket).await?;
        let token = bucket_guard.token();

        let record = if folder_marker {
            let name = if is_folder_name(object) {
                object.to_owned()
            } else {
                format!("{object}{SLASH_SEPARATOR}")
            };
            self.check_folder_path(bucket, &name)?;
            ObjectRecord {
                bucket: bucket.to_owned(),
                name,
                kind: EntryKind::FolderMarker,
                etag: String::new(),
                size: 0,
                mod_time: Utc::now(),
                metadata: ObjectMetadata::from_request(meta),
            }
        } else {
            let tree = self.add_content(token, reader, size).await?;
            ObjectRecord {
                bucket: bucket.to_owned(),
                name: object.to_owned(),
                kind: EntryKind::Object,
                etag: tree.address.to_string(),
                size: tree.size,
                mod_time: Utc::now(),
                metadata: ObjectMetadata::from_request(meta),
            }
        };

        if let Err(e) = self.commit_record(token, &record).await {
            self.release_record(&record);
            return Err(e);
        }
        debug!(bucket, object = %record.name, size = record.size, etag = %record.etag, "stored object");
        Ok(record)
    }

    /// Write `record` under the key's exclusive lock, queueing whatever it
    /// replaces.
    pub(crate) async fn commit_record(
        &self,
        token: &CancellationToken,
        record: &ObjectRecord,
    ) -> StoreResult<()> {
        let lock = self.new_ns_lock(&record.bucket, &[&record.name]);
        let _guard = lock.lock(token, self.config.operation_timeout()).await?;

        let key = object_key(&record.bucket, &record.name);
        let previous = self.db.get::<ObjectRecord>(&key)?;
        self.db.put(&key, record)?;
        if let Some(previous) = previous {
            self.release_record(&previous);
        }
        Ok(())
    }

    /// Reject a folder marker when a regular object occupies one of its
    /// parent segments (or the marker's own name without the slash).
    fn check_folder_path(&self, bucket: &str, name: &str) -> StoreResult<()> {
        let trimmed = name.trim_end_matches(SLASH_SEPARATOR);
        let mut end = 0;
        loop {
            let next = trimmed[end..].find(SLASH_SEPARATOR).map(|i| end + i);
            let segment = &trimmed[..next.unwrap_or(trimmed.len())];
            if !segment.is_empty() {
                if let Some(existing) = self.db.get::<ObjectRecord>(&object_key(bucket, segment))? {
                    if !existing.is_dir() {
                        return Err(StoreError::PathConflict {
                            bucket: bucket.to_owned(),
                            key: name.to_owned(),
                            conflict: segment.to_owned(),
                        });
                    }
                }
            }
            match next {
                Some(i) => end = i + SLASH_SEPARATOR.len(),
                None => return Ok(()),
            }
        }
    }

    /// Open an object for reading.
    ///
    /// The returned reader streams from the pool after the locks have been
    /// released. Folder markers yield an empty reader.
    pub async fn get_object(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        object: &str,
    ) -> StoreResult<(ObjectRecord, DagReader)> {
        let bucket_guard = self.lock_bucket_shared(cancel, bucket).await?;
        let lock = self.new_ns_lock(bucket, &[object]);
        let _guard = lock
            .read_lock(bucket_guard.token(), self.config.operation_timeout())
            .await?;

        let record = self.load_object(bucket, object)?;
        let reader: DagReader = match record.content_address()? {
            Some(address) => self.pool.open_reader(&address).await?,
            None => Box::new(tokio::io::empty()),
        };
        Ok((record, reader))
    }

    /// Fetch an object's record without opening its content.
    pub async fn get_object_info(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        object: &str,
    ) -> StoreResult<ObjectRecord> {
        let bucket_guard = self.lock_bucket_shared(cancel, bucket).await?;
        let lock = self.new_ns_lock(bucket, &[object]);
        let _guard = lock
            .read_lock(bucket_guard.token(), self.config.operation_timeout())
            .await?;
        self.load_object(bucket, object)
    }

    /// Delete an object.
    ///
    /// Uses the delete timeout class for the key lock. Deleting a folder
    /// marker removes every entry below it as well. Content is only queued
    /// for deletion, never removed inline.
    pub async fn delete_object(
        &self,
        cancel: &CancellationToken,
        bucket: &str,
        object: &str,
    ) -> StoreResult<()> {
        let bucket_guard = self.lock_bucket_shared(cancel, bucket).await?;
        let token = bucket_guard.token();
        let lock = self.new_ns_lock(bucket, &[object]);
        let _guard = lock.lock(token, self.config.delete_timeout()).await?;

        let record = self.load_object(bucket, object)?;
        if record.is_dir() {
            let removed = self.delete_prefix(token, bucket, &record.name).await?;
            info!(bucket, folder = %record.name, removed, "deleted folder");
        }

        self.db.delete(&object_key(bucket, object))?;
        self.release_record(&record);
        debug!(bucket, object, "deleted object");
        Ok(())
    }

    /// Remove every entry strictly below `prefix`, each under its own lock.
    async fn delete_prefix(
        &self,
        token: &CancellationToken,
        bucket: &str,
        prefix: &str,
    ) -> StoreResult<usize> {
        let prefix_key = object_key(bucket, prefix);
        let mut names = Vec::new();
        let mut rx = self.db.read_all(&prefix_key, Some(&prefix_key));
        while let Some(entry) = rx.recv().await {
            let entry = entry?;
            names.push(entry.key[object_key(bucket, "").len()..].to_owned());
        }

        let mut removed = 0;
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
        Ok(removed)
    }
}
