//! Storage engine error types.
//!
//! Defines [`StoreError`], the single error type returned by every engine
//! operation, and [`ErrorKind`], the closed classification callers use to
//! decide how to react (map to an HTTP status, retry, give up).
//!
//! # Usage
//!
//! ```
//! use dagstore_s3_core::error::{ErrorKind, StoreError};
//!
//! let err = StoreError::NoSuchBucket {
//!     bucket: "photos".to_owned(),
//! };
//! assert_eq!(err.kind(), ErrorKind::NotFound);
//! ```

use std::time::Duration;

use dagstore_kv::KvError;
use dagstore_pool::PoolError;

/// Coarse classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A bucket, object, upload or attachment does not exist.
    NotFound,
    /// The request collides with existing state.
    Conflict,
    /// The request itself is malformed.
    InvalidArgument,
    /// A lock or deadline expired, or the caller canceled. Retryable.
    Timeout,
    /// Backing-store failure or corrupt metadata.
    Internal,
}

/// Storage engine error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    // -----------------------------------------------------------------------
    // Bucket errors
    // -----------------------------------------------------------------------
    /// The specified bucket does not exist.
    #[error("The specified bucket does not exist: {bucket}")]
    NoSuchBucket {
        /// The bucket name that was not found.
        bucket: String,
    },

    /// The requested bucket name is not available (owned by another account).
    #[error("The requested bucket name is not available: {bucket}")]
    BucketAlreadyExists {
        /// The bucket name that already exists.
        bucket: String,
    },

    /// The bucket already exists and is owned by you.
    #[error(
        "Your previous request to create the named bucket succeeded and you already own it: {bucket}"
    )]
    BucketAlreadyOwnedByYou {
        /// The bucket name that already exists.
        bucket: String,
    },

    /// The bucket is not empty and cannot be deleted.
    #[error("The bucket you tried to delete is not empty: {bucket}")]
    BucketNotEmpty {
        /// The bucket name that is not empty.
        bucket: String,
    },

    /// The bucket name is not valid.
    #[error("The specified bucket is not valid: {bucket}: {reason}")]
    InvalidBucketName {
        /// The rejected bucket name.
        bucket: String,
        /// Why the name was rejected.
        reason: String,
    },

    /// The bucket has no policy attached.
    #[error("The bucket policy does not exist: {bucket}")]
    NoSuchBucketPolicy {
        /// The bucket name.
        bucket: String,
    },

    /// The bucket has no tag set attached.
    #[error("The TagSet does not exist: {bucket}")]
    NoSuchTagSet {
        /// The bucket name.
        bucket: String,
    },

    // -----------------------------------------------------------------------
    // Object / key errors
    // -----------------------------------------------------------------------
    /// The specified key does not exist.
    #[error("The specified key does not exist: {bucket}/{key}")]
    NoSuchKey {
        /// The bucket holding the key.
        bucket: String,
        /// The key that was not found.
        key: String,
    },

    /// A folder marker and a regular object collide on a path segment.
    #[error("Object path conflicts with an existing object: {bucket}/{key} (at {conflict})")]
    PathConflict {
        /// The bucket name.
        bucket: String,
        /// The key being written.
        key: String,
        /// The existing object occupying an intermediate segment.
        conflict: String,
    },

    /// The body length does not match the declared size.
    #[error("You did not provide the number of bytes specified: expected {expected}, got {actual}")]
    IncompleteBody {
        /// The declared size.
        expected: u64,
        /// The bytes actually received.
        actual: u64,
    },

    // -----------------------------------------------------------------------
    // Multipart errors
    // -----------------------------------------------------------------------
    /// The specified multipart upload does not exist.
    #[error("The specified multipart upload does not exist: {upload_id}")]
    NoSuchUpload {
        /// The upload ID that was not found.
        upload_id: String,
    },

    /// A declared part is missing or its ETag does not match.
    #[error("One or more of the specified parts could not be found: part {part_number}")]
    InvalidPart {
        /// The offending part number.
        part_number: u32,
    },

    /// Declared parts are not in strictly ascending order.
    #[error("The list of parts was not in ascending order")]
    InvalidPartOrder,

    /// A non-final part is below the minimum part size.
    #[error("Your proposed upload is smaller than the minimum allowed size: part {part_number} has {size} bytes, minimum is {min_size}")]
    EntityTooSmall {
        /// The offending part number.
        part_number: u32,
        /// The part size.
        size: u64,
        /// The minimum allowed size.
        min_size: u64,
    },

    // -----------------------------------------------------------------------
    // General errors
    // -----------------------------------------------------------------------
    /// Generic invalid argument.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of what is wrong.
        message: String,
    },

    /// A namespace lock could not be acquired in time.
    #[error("Timed out after {timeout:?} waiting for lock on {resource}")]
    LockTimeout {
        /// The locked path.
        resource: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The caller canceled the operation.
    #[error("Operation canceled")]
    Canceled,

    /// Metadata store failure.
    #[error("Metadata store error: {0}")]
    Kv(#[from] KvError),

    /// DAG pool failure.
    #[error("DAG pool error: {0}")]
    Pool(#[from] PoolError),

    /// Catch-all for unexpected internal failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl StoreError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoSuchBucket { .. }
            | Self::NoSuchKey { .. }
            | Self::NoSuchUpload { .. }
            | Self::NoSuchBucketPolicy { .. }
            | Self::NoSuchTagSet { .. } => ErrorKind::NotFound,
            Self::BucketAlreadyExists { .. }
            | Self::BucketAlreadyOwnedByYou { .. }
            | Self::BucketNotEmpty { .. }
            | Self::PathConflict { .. } => ErrorKind::Conflict,
            Self::InvalidBucketName { .. }
            | Self::IncompleteBody { .. }
            | Self::InvalidPart { .. }
            | Self::InvalidPartOrder
            | Self::EntityTooSmall { .. }
            | Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::LockTimeout { .. } | Self::Canceled => ErrorKind::Timeout,
            Self::Kv(_) | Self::Pool(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Create an [`InvalidArgument`](Self::InvalidArgument) error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

/// Convenience result alias for engine operations.
pub type StoreResult<T> = Result<T, StoreError>;
