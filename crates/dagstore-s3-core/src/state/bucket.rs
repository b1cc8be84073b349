//! Bucket records, reverse indexes and usage statistics.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical bucket record stored at `bkt/{bucket}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketMetadata {
    /// Bucket name.
    pub name: String,
    /// Region the bucket was created in.
    pub region: String,
    /// Access key of the owner.
    pub owner: String,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Attached policy document (JSON), evaluated elsewhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    /// Attached tag set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagging: Option<BTreeMap<String, String>>,
}

impl BucketMetadata {
    /// Create a record with no policy or tags.
    #[must_use]
    pub fn new(name: &str, region: &str, owner: &str) -> Self {
        Self {
            name: name.to_owned(),
            region: region.to_owned(),
            owner: owner.to_owned(),
            created: Utc::now(),
            policy: None,
            tagging: None,
        }
    }
}

/// Buckets owned by one user, stored at `userbkt/{owner}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBucketIndex {
    /// Owner access key.
    pub owner: String,
    /// Owned bucket names.
    pub buckets: BTreeSet<String>,
}

/// Every bucket in the system, stored at `bktidx/all`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalBucketIndex {
    /// All bucket names.
    pub buckets: BTreeSet<String>,
}

/// Object count and size of one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// Sum of object sizes in bytes.
    pub size: u64,
    /// Number of objects (folder markers excluded).
    pub objects: u64,
}

/// Usage across a set of buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataUsageInfo {
    /// When the statistics were computed.
    pub last_update: Option<DateTime<Utc>>,
    /// Total number of objects.
    pub objects_total_count: u64,
    /// Total size of all objects.
    pub objects_total_size: u64,
    /// Number of buckets counted.
    pub buckets_count: u64,
    /// Per-bucket breakdown.
    pub buckets_usage: BTreeMap<String, BucketInfo>,
}

impl DataUsageInfo {
    /// Fold one bucket into the totals.
    pub fn add_bucket(&mut self, info: BucketInfo) {
        self.objects_total_count += info.objects;
        self.objects_total_size += info.size;
        self.buckets_count += 1;
        self.buckets_usage.insert(info.name.clone(), info);
    }
}
