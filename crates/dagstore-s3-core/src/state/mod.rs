//! Persistent record types.
//!
//! Everything here is serialized as camelCase JSON into the metadata store.

pub mod bucket;
pub mod multipart;
pub mod object;

use serde::{Deserialize, Serialize};

/// An entry of the pending-delete queue, stored at `delObj/{uuid}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDelete {
    /// Root address of the orphaned tree.
    pub address: String,
}
