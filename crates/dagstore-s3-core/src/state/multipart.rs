//! Multipart upload sessions.
//!
//! A [`MultipartSession`] is persisted at
//! `uploadObj/{bucket}/{object}/{upload_id}` from `NewMultipartUpload` until
//! the upload is completed or aborted, and accumulates one [`PartRecord`]
//! per part number.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An in-progress multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartSession {
    /// The bucket the final object lands in.
    pub bucket: String,
    /// The object key this upload will create.
    pub object: String,
    /// Unique identifier for this upload.
    pub upload_id: String,
    /// When the upload was initiated.
    pub initiated: DateTime<Utc>,
    /// Request metadata captured at initiation, applied on completion.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Parts uploaded so far, keyed by part number.
    #[serde(default)]
    pub parts: BTreeMap<u32, PartRecord>,
}

impl MultipartSession {
    /// Create an empty session.
    #[must_use]
    pub fn new(bucket: String, object: String, upload_id: String, metadata: HashMap<String, String>) -> Self {
        Self {
            bucket,
            object,
            upload_id,
            initiated: Utc::now(),
            metadata,
            parts: BTreeMap::new(),
        }
    }

    /// Insert or replace a part, returning the record it superseded.
    pub fn put_part(&mut self, part: PartRecord) -> Option<PartRecord> {
        self.parts.insert(part.number, part)
    }

    /// Get a part by its number.
    #[must_use]
    pub fn get_part(&self, number: u32) -> Option<&PartRecord> {
        self.parts.get(&number)
    }
}

/// A single uploaded part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartRecord {
    /// The part number.
    pub number: u32,
    /// Content address of the part data.
    pub etag: String,
    /// Size of this part in bytes.
    pub size: u64,
    /// When this part was uploaded.
    pub mod_time: DateTime<Utc>,
}

/// A part as declared by the client when completing an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletePart {
    /// The part number.
    pub part_number: u32,
    /// The ETag the client received for the part, possibly quoted.
    pub etag: String,
}

/// Result of a `ListObjectParts` call.
#[derive(Debug, Clone, Default)]
pub struct ListPartsInfo {
    /// The bucket name.
    pub bucket: String,
    /// The object key.
    pub object: String,
    /// The upload ID.
    pub upload_id: String,
    /// Parts with a number at or below this were skipped.
    pub part_number_marker: u32,
    /// Marker for the next page when truncated.
    pub next_part_number_marker: u32,
    /// Effective page size.
    pub max_parts: usize,
    /// Whether more parts remain.
    pub is_truncated: bool,
    /// Parts on this page, in ascending order.
    pub parts: Vec<PartRecord>,
    /// Request metadata captured at initiation.
    pub metadata: HashMap<String, String>,
}

/// Result of a `ListMultipartUploads` call.
#[derive(Debug, Clone, Default)]
pub struct ListMultipartsInfo {
    /// Key marker the caller passed in.
    pub key_marker: String,
    /// Upload ID marker the caller passed in.
    pub upload_id_marker: String,
    /// Key marker for the next page.
    pub next_key_marker: String,
    /// Upload ID marker for the next page.
    pub next_upload_id_marker: String,
    /// Requested page size.
    pub max_uploads: usize,
    /// Whether more uploads remain.
    pub is_truncated: bool,
    /// Uploads on this page.
    pub uploads: Vec<MultipartSession>,
    /// Prefix filter.
    pub prefix: String,
    /// Delimiter used for grouping.
    pub delimiter: String,
    /// Grouped key prefixes.
    pub common_prefixes: Vec<String>,
}

impl ListMultipartsInfo {
    /// Whether `upload_id` appears on this page.
    #[must_use]
    pub fn lookup(&self, upload_id: &str) -> bool {
        self.uploads.iter().any(|upload| upload.upload_id == upload_id)
    }
}
