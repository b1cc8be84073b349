//! Metadata store error types.

/// Errors raised by metadata store backends.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// The durable backend reported a failure.
    #[error("metadata backend error: {0}")]
    Backend(#[from] fjall::Error),

    /// A value could not be serialized before being written.
    #[error("failed to encode value for key {key}: {source}")]
    Encode {
        /// The key being written.
        key: String,
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// A stored value could not be deserialized.
    #[error("failed to decode value for key {key}: {source}")]
    Decode {
        /// The key being read.
        key: String,
        /// The underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },

    /// A stored key was not valid UTF-8.
    #[error("stored key is not valid utf-8: {0}")]
    InvalidKey(String),
}

/// Convenience result alias for metadata store operations.
pub type KvResult<T> = Result<T, KvError>;
