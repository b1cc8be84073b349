//! Content addresses of DAG nodes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::PoolError;

/// Length in bytes of a content address.
pub const ADDRESS_LEN: usize = 32;

/// SHA-256 digest identifying a node in the pool.
///
/// Renders as lowercase hex, which is also the ETag the storage engine hands
/// to clients.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentAddress([u8; ADDRESS_LEN]);

impl ContentAddress {
    /// Wrap a raw digest.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Hash a tagged node encoding.
    pub(crate) fn digest(tag: u8, parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update([tag]);
        for part in parts {
            hasher.update(*part);
        }
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({self})")
    }
}

impl FromStr for ContentAddress {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s).map_err(|_| PoolError::InvalidAddress(s.to_owned()))?;
        let bytes: [u8; ADDRESS_LEN] = raw
            .try_into()
            .map_err(|_| PoolError::InvalidAddress(s.to_owned()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for ContentAddress {
    type Error = PoolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentAddress> for String {
    fn from(value: ContentAddress) -> Self {
        value.to_string()
    }
}
