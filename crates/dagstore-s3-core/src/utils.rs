//! Shared utilities for the storage engine.
//!
//! Provides the metadata key layout, ID generation, ETag canonicalization
//! and a helper to race a future against a cancellation token.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

// ---------------------------------------------------------------------------
// Key layout
// ---------------------------------------------------------------------------

/// Prefix of the pending-delete queue.
pub const PENDING_DELETE_PREFIX: &str = "delObj/";

/// Prefix of canonical bucket records.
pub const BUCKET_PREFIX: &str = "bkt/";

/// Prefix of per-owner bucket indexes.
pub const USER_BUCKET_PREFIX: &str = "userbkt/";

/// Key of the global bucket index.
pub const GLOBAL_BUCKET_INDEX_KEY: &str = "bktidx/all";

/// Path separator for object names.
pub const SLASH_SEPARATOR: &str = "/";

/// `obj/{bucket}/{object}`
#[must_use]
pub fn object_key(bucket: &str, object: &str) -> String {
    format!("obj/{bucket}/{object}")
}

/// `uploadObj/{bucket}/{object}/{upload_id}`
#[must_use]
pub fn upload_key(bucket: &str, object: &str, upload_id: &str) -> String {
    format!("uploadObj/{bucket}/{object}/{upload_id}")
}

/// `uploadObj/{bucket}/{object_prefix}`
#[must_use]
pub fn upload_prefix(bucket: &str, object_prefix: &str) -> String {
    format!("uploadObj/{bucket}/{object_prefix}")
}

/// Fresh `delObj/{uuid}` key.
#[must_use]
pub fn new_pending_delete_key() -> String {
    format!("{PENDING_DELETE_PREFIX}{}", Uuid::new_v4())
}

/// `bkt/{bucket}`
#[must_use]
pub fn bucket_key(bucket: &str) -> String {
    format!("{BUCKET_PREFIX}{bucket}")
}

/// `userbkt/{owner}`
#[must_use]
pub fn user_bucket_key(owner: &str) -> String {
    format!("{USER_BUCKET_PREFIX}{owner}")
}

// ---------------------------------------------------------------------------
// IDs and ETags
// ---------------------------------------------------------------------------

/// Generate a random upload ID for multipart uploads.
///
/// # Examples
///
/// ```
/// use dagstore_s3_core::utils::generate_upload_id;
///
/// let id = generate_upload_id();
/// assert_eq!(id.len(), 36);
/// assert_ne!(id, generate_upload_id());
/// ```
#[must_use]
pub fn generate_upload_id() -> String {
    Uuid::new_v4().to_string()
}

/// Strip surrounding quotes (and a weak `W/` marker) from an ETag.
///
/// # Examples
///
/// ```
/// use dagstore_s3_core::utils::canonicalize_etag;
///
/// assert_eq!(canonicalize_etag("\"abc\""), "abc");
/// assert_eq!(canonicalize_etag("W/\"abc\""), "abc");
/// assert_eq!(canonicalize_etag("abc"), "abc");
/// ```
#[must_use]
pub fn canonicalize_etag(etag: &str) -> &str {
    let etag = etag.trim();
    let etag = etag.strip_prefix("W/").unwrap_or(etag);
    etag.trim_matches('"')
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Drive `fut` to completion unless `token` is canceled first.
pub async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    tokio::select! {
        biased;
        () = token.cancelled() => Err(StoreError::Canceled),
        result = fut => result,
    }
}
