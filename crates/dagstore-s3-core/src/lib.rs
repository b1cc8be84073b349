//! S3-compatible storage engine over a content-addressed DAG pool.
//!
//! Object bytes live in a [`DagPool`](dagstore_pool::DagPool) as Merkle
//! trees; everything else (object records, multipart sessions, bucket
//! records and the pending-delete queue) lives in an ordered key-value
//! [`MetaStore`](dagstore_kv::MetaStore). The engine provides bucket and
//! object CRUD, listing, multipart uploads, per-path namespace locking and
//! deferred garbage collection of unreferenced content.
//!
//! # Architecture
//!
//! ```text
//!            DagStore (facade, owns the GC task)
//!            /                |                 \
//!           v                 v                  v
//! BucketMetadataSys <--> ObjectStore         GarbageCollector
//!   (bkt/, userbkt/,     (obj/, uploadObj/,   (drains delObj/)
//!    bktidx/)             queues delObj/)          |
//!           \                 |                    |
//!            v                v                    v
//!        NsLockMap        MetaDb + DagPool <-------+
//! ```
//!
//! Content is committed to the pool before the metadata that references it,
//! and a tree is queued for deletion only after the metadata change that
//! dereferences it. A crash between the two steps leaks content but never
//! leaves a dangling reference.

pub mod bucket;
pub mod config;
pub mod error;
pub mod gc;
pub mod nslock;
mod ops;
pub mod provider;
pub mod readahead;
pub mod state;
pub mod store;
pub mod utils;
pub mod validation;

pub use config::StoreConfig;
pub use error::{ErrorKind, StoreError, StoreResult};
pub use provider::DagStore;
