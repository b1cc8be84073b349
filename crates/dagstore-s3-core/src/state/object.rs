//! Object records and listing results.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use dagstore_pool::ContentAddress;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::utils::SLASH_SEPARATOR;

/// Request metadata key carrying the content type.
pub const META_CONTENT_TYPE: &str = "content-type";
/// Request metadata key carrying the content encoding.
pub const META_CONTENT_ENCODING: &str = "content-encoding";
/// Request metadata key carrying the expiry date (RFC 2822 / HTTP date).
pub const META_EXPIRES: &str = "expires";
/// Prefix of user-defined metadata keys.
pub const META_USER_PREFIX: &str = "x-amz-meta-";

// ---------------------------------------------------------------------------
// EntryKind
// ---------------------------------------------------------------------------

/// What a metadata entry under `obj/` represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    /// Regular object backed by a content tree.
    #[default]
    Object,
    /// Zero-byte directory placeholder; its name ends with `/`.
    FolderMarker,
}

// ---------------------------------------------------------------------------
// ObjectMetadata
// ---------------------------------------------------------------------------

/// Descriptive metadata recorded with an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    /// The MIME type of the object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Content encoding (e.g. `gzip`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// Expiration date/time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    /// User-defined metadata (`x-amz-meta-*`), keyed without the prefix.
    #[serde(default)]
    pub user_metadata: BTreeMap<String, String>,
}

impl ObjectMetadata {
    /// Extract metadata from a request header map.
    ///
    /// Keys are matched case-insensitively. An unparseable `expires` value is
    /// ignored.
    #[must_use]
    pub fn from_request(meta: &HashMap<String, String>) -> Self {
        let mut out = Self::default();
        for (key, value) in meta {
            let key = key.to_ascii_lowercase();
            match key.as_str() {
                META_CONTENT_TYPE => out.content_type = Some(value.clone()),
                META_CONTENT_ENCODING => out.content_encoding = Some(value.clone()),
                META_EXPIRES => {
                    out.expires = DateTime::parse_from_rfc2822(value.trim())
                        .ok()
                        .map(|t| t.with_timezone(&Utc));
                }
                _ => {
                    if let Some(name) = key.strip_prefix(META_USER_PREFIX) {
                        out.user_metadata.insert(name.to_owned(), value.clone());
                    }
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// ObjectRecord
// ---------------------------------------------------------------------------

/// The live metadata record stored at `obj/{bucket}/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    /// The bucket holding the object.
    pub bucket: String,
    /// The object name.
    pub name: String,
    /// Whether this is a regular object or a folder marker.
    #[serde(default)]
    pub kind: EntryKind,
    /// Content address of the object data. Empty for folder markers.
    pub etag: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time.
    pub mod_time: DateTime<Utc>,
    /// Descriptive metadata.
    #[serde(default)]
    pub metadata: ObjectMetadata,
}

impl ObjectRecord {
    /// Whether this record is a folder marker.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::FolderMarker
    }

    /// Decode the content address backing this record.
    ///
    /// Folder markers have none. A malformed address means the metadata is
    /// corrupt and is reported as an internal error.
    pub fn content_address(&self) -> StoreResult<Option<ContentAddress>> {
        if self.is_dir() {
            return Ok(None);
        }
        self.etag.parse().map(Some).map_err(|e| {
            StoreError::Internal(anyhow::anyhow!(
                "corrupt content address for {}/{}: {e}",
                self.bucket,
                self.name
            ))
        })
    }
}

/// Whether `name` denotes a folder marker.
#[must_use]
pub fn is_folder_name(name: &str) -> bool {
    name.ends_with(SLASH_SEPARATOR)
}

// ---------------------------------------------------------------------------
// Listing results
// ---------------------------------------------------------------------------

/// Result of a `ListObjects` call.
#[derive(Debug, Clone, Default)]
pub struct ListObjectsInfo {
    /// Whether more entries remain after this page.
    pub is_truncated: bool,
    /// Marker for the next page (last key or prefix returned).
    pub next_marker: Option<String>,
    /// Leaf entries on this page.
    pub objects: Vec<ObjectRecord>,
    /// Common prefixes on this page.
    pub prefixes: Vec<String>,
}

/// Result of a `ListObjectsV2` call.
#[derive(Debug, Clone, Default)]
pub struct ListObjectsV2Info {
    /// Whether more entries remain after this page.
    pub is_truncated: bool,
    /// The token the caller passed in.
    pub continuation_token: Option<String>,
    /// Token for the next page.
    pub next_continuation_token: Option<String>,
    /// Leaf entries on this page.
    pub objects: Vec<ObjectRecord>,
    /// Common prefixes on this page.
    pub prefixes: Vec<String>,
}
