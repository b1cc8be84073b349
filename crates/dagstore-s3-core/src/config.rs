//! Storage engine configuration.
//!
//! Provides [`StoreConfig`], covering lock timeouts, garbage collection
//! cadence and host-idleness thresholds, and the streaming and multipart
//! size limits. Values can be loaded from `DAGSTORE_*` environment
//! variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Storage engine configuration.
///
/// # Examples
///
/// ```
/// use dagstore_s3_core::config::StoreConfig;
///
/// let config = StoreConfig::default();
/// assert_eq!(config.min_part_size, 5 * 1024 * 1024);
/// assert_eq!(config.gc_max_cpu_percent, 60.0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Lock timeout for ordinary reads and writes, in seconds.
    #[builder(default = 60)]
    pub operation_timeout_secs: u64,

    /// Lock timeout for destructive operations, in seconds.
    #[builder(default = 300)]
    pub delete_timeout_secs: u64,

    /// Interval between garbage collection cycles, in seconds.
    #[builder(default = 900)]
    pub gc_period_secs: u64,

    /// Deadline for a single garbage collection cycle, in seconds.
    #[builder(default = 1800)]
    pub gc_timeout_secs: u64,

    /// A cycle only runs while host CPU usage stays below this percentage.
    #[builder(default = 60.0)]
    pub gc_max_cpu_percent: f32,

    /// A cycle only runs while host memory usage stays below this percentage.
    #[builder(default = 80.0)]
    pub gc_max_memory_percent: f32,

    /// Declared sizes above this go through the read-ahead stage.
    #[builder(default = 64 * 1024 * 1024)]
    pub big_file_threshold: u64,

    /// Chunk size used by the read-ahead stage.
    #[builder(default = 1024 * 1024)]
    pub readahead_chunk_size: usize,

    /// Minimum size of every multipart part except the last.
    #[builder(default = 5 * 1024 * 1024)]
    pub min_part_size: u64,

    /// Upper bound on parts returned by one `ListObjectParts` call.
    #[builder(default = 10_000)]
    pub max_parts_list: usize,

    /// Region recorded on new buckets when none is given.
    #[builder(default = String::from("us-east-1"))]
    pub default_region: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            operation_timeout_secs: 60,
            delete_timeout_secs: 300,
            gc_period_secs: 900,
            gc_timeout_secs: 1800,
            gc_max_cpu_percent: 60.0,
            gc_max_memory_percent: 80.0,
            big_file_threshold: 64 * 1024 * 1024,
            readahead_chunk_size: 1024 * 1024,
            min_part_size: 5 * 1024 * 1024,
            max_parts_list: 10_000,
            default_region: String::from("us-east-1"),
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DAGSTORE_OPERATION_TIMEOUT_SECS` | `60` |
    /// | `DAGSTORE_DELETE_TIMEOUT_SECS` | `300` |
    /// | `DAGSTORE_GC_PERIOD_SECS` | `900` |
    /// | `DAGSTORE_GC_TIMEOUT_SECS` | `1800` |
    /// | `DAGSTORE_GC_MAX_CPU_PERCENT` | `60` |
    /// | `DAGSTORE_GC_MAX_MEMORY_PERCENT` | `80` |
    /// | `DAGSTORE_BIG_FILE_THRESHOLD` | `67108864` |
    /// | `DAGSTORE_READAHEAD_CHUNK_SIZE` | `1048576` |
    /// | `DAGSTORE_MIN_PART_SIZE` | `5242880` |
    /// | `DEFAULT_REGION` | `us-east-1` |
    ///
    /// Unparseable numeric values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        read_env("DAGSTORE_OPERATION_TIMEOUT_SECS", &mut config.operation_timeout_secs);
        read_env("DAGSTORE_DELETE_TIMEOUT_SECS", &mut config.delete_timeout_secs);
        read_env("DAGSTORE_GC_PERIOD_SECS", &mut config.gc_period_secs);
        read_env("DAGSTORE_GC_TIMEOUT_SECS", &mut config.gc_timeout_secs);
        read_env("DAGSTORE_GC_MAX_CPU_PERCENT", &mut config.gc_max_cpu_percent);
        read_env("DAGSTORE_GC_MAX_MEMORY_PERCENT", &mut config.gc_max_memory_percent);
        read_env("DAGSTORE_BIG_FILE_THRESHOLD", &mut config.big_file_threshold);
        read_env("DAGSTORE_READAHEAD_CHUNK_SIZE", &mut config.readahead_chunk_size);
        read_env("DAGSTORE_MIN_PART_SIZE", &mut config.min_part_size);
        if let Ok(v) = std::env::var("DEFAULT_REGION") {
            config.default_region = v;
        }

        config
    }

    /// Lock timeout for ordinary operations.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Lock timeout for destructive operations.
    #[must_use]
    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }

    /// Interval between garbage collection cycles.
    #[must_use]
    pub fn gc_period(&self) -> Duration {
        Duration::from_secs(self.gc_period_secs)
    }

    /// Deadline for one garbage collection cycle.
    #[must_use]
    pub fn gc_timeout(&self) -> Duration {
        Duration::from_secs(self.gc_timeout_secs)
    }
}

/// Overwrite `target` with the parsed value of `name`, if set and valid.
fn read_env<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(v) = std::env::var(name) {
        if let Ok(parsed) = v.trim().parse::<T>() {
            *target = parsed;
        }
    }
}
