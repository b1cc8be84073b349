//! Typed JSON wrapper over a [`MetaStore`].

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::{KvError, KvResult, MetaStore, ScanEntry};

/// Handle to a metadata store that encodes values as JSON.
///
/// Cloning is cheap; all clones share the same backend.
#[derive(Debug, Clone)]
pub struct MetaDb {
    inner: Arc<dyn MetaStore>,
}

impl MetaDb {
    /// Wrap an existing backend.
    #[must_use]
    pub fn new(inner: Arc<dyn MetaStore>) -> Self {
        Self { inner }
    }

    /// Access the raw backend.
    #[must_use]
    pub fn raw(&self) -> &Arc<dyn MetaStore> {
        &self.inner
    }

    /// Encode `value` and store it under `key`.
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> KvResult<()> {
        let encoded = serde_json::to_vec(value).map_err(|source| KvError::Encode {
            key: key.to_owned(),
            source,
        })?;
        self.inner.put(key, Bytes::from(encoded))
    }

    /// Fetch and decode the value under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> KvResult<Option<T>> {
        let Some(raw) = self.inner.get(key)? else {
            return Ok(None);
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| KvError::Decode {
                key: key.to_owned(),
                source,
            })
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> KvResult<bool> {
        Ok(self.inner.get(key)?.is_some())
    }

    /// Remove `key`.
    pub fn delete(&self, key: &str) -> KvResult<()> {
        self.inner.delete(key)
    }

    /// Stream raw entries under `prefix`, see [`MetaStore::read_all`].
    #[must_use]
    pub fn read_all(&self, prefix: &str, seek: Option<&str>) -> mpsc::Receiver<KvResult<ScanEntry>> {
        self.inner.read_all(prefix, seek)
    }
}
