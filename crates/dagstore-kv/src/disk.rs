//! Durable [`MetaStore`] backend built on `fjall`.

use std::ops::Bound;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{KvError, KvResult, MetaStore, SCAN_CHANNEL_CAPACITY, ScanEntry, scan_start};

/// Name of the partition holding all metadata keys.
const PARTITION_NAME: &str = "meta";

/// LSM-tree metadata store persisted under a directory.
pub struct FjallMetaStore {
    path: PathBuf,
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl std::fmt::Debug for FjallMetaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FjallMetaStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FjallMetaStore {
    /// Open (or create) a store rooted at `path`.
    pub fn open(path: impl AsRef<Path>) -> KvResult<Self> {
        let path = path.as_ref().to_path_buf();
        let keyspace = Config::new(&path).open()?;
        let partition = keyspace.open_partition(PARTITION_NAME, PartitionCreateOptions::default())?;
        debug!(path = %path.display(), "opened fjall metadata store");
        Ok(Self {
            path,
            keyspace,
            partition,
        })
    }

    /// Flush the journal to disk.
    pub fn persist(&self) -> KvResult<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

impl MetaStore for FjallMetaStore {
    fn put(&self, key: &str, value: Bytes) -> KvResult<()> {
        self.partition.insert(key.as_bytes(), &value[..])?;
        Ok(())
    }

    fn get(&self, key: &str) -> KvResult<Option<Bytes>> {
        Ok(self
            .partition
            .get(key.as_bytes())?
            .map(|value| Bytes::copy_from_slice(&value)))
    }

    fn delete(&self, key: &str) -> KvResult<()> {
        self.partition.remove(key.as_bytes())?;
        Ok(())
    }

    fn read_all(&self, prefix: &str, seek: Option<&str>) -> mpsc::Receiver<KvResult<ScanEntry>> {
        let (start, exclusive) = scan_start(prefix, seek);
        let lower = if exclusive {
            Bound::Excluded(start.as_bytes().to_vec())
        } else {
            Bound::Included(start.as_bytes().to_vec())
        };
        let prefix = prefix.to_owned();
        let partition = self.partition.clone();
        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);

        tokio::task::spawn_blocking(move || {
            for item in partition.range((lower, Bound::<Vec<u8>>::Unbounded)) {
                let entry = match item {
                    Ok((key, value)) => match String::from_utf8(key.to_vec()) {
                        Ok(key) if key.starts_with(&prefix) => Ok(ScanEntry {
                            key,
                            value: Bytes::copy_from_slice(&value),
                        }),
                        Ok(_) => break,
                        Err(e) => Err(KvError::InvalidKey(e.to_string())),
                    },
                    Err(e) => Err(KvError::from(e)),
                };
                let failed = entry.is_err();
                if tx.blocking_send(entry).is_err() {
                    break;
                }
                if failed {
                    warn!(prefix = %prefix, "metadata scan stopped on error");
                    break;
                }
            }
        });

        rx
    }
}
