//! Content-addressed DAG block pool for DagStore.
//!
//! Object bytes are stored as Merkle trees: the source stream is cut into
//! fixed-size leaf chunks, leaves are linked by interior nodes of bounded
//! fan-out, and every tree is rooted at a `File` node. Each node is
//! identified by the SHA-256 of its tagged encoding, so identical content
//! always yields the same [`ContentAddress`].
//!
//! ```text
//!                 File (root)
//!               /     |      \
//!            File    File    File        <= at most `max_links` per node
//!           / | \    ...
//!        Leaf Leaf Leaf                  <= `chunk_size` bytes each
//! ```
//!
//! The [`DagPool`] trait is the contract the storage engine consumes.
//! [`MemoryDagPool`] is a reference-counted in-memory implementation: every
//! committed root holds one reference, [`DagPool::remove_dag`] releases one,
//! and nodes are reclaimed once nothing links to them.

mod address;
mod error;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

pub use address::{ADDRESS_LEN, ContentAddress};
pub use error::{PoolError, PoolResult};
pub use memory::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_LINKS, MemoryDagPool};

/// Boxed byte stream accepted and produced by the pool.
pub type DagReader = Box<dyn AsyncRead + Send + Unpin>;

/// Role of a node inside a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Raw data chunk.
    Leaf,
    /// Interior or root node linking to children.
    File,
}

impl NodeKind {
    pub(crate) const fn tag(self) -> u8 {
        match self {
            Self::Leaf => 0x00,
            Self::File => 0x01,
        }
    }
}

/// Reference from a parent node to a child subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfo {
    /// Address of the child.
    pub address: ContentAddress,
    /// Number of content bytes reachable through the child.
    pub size: u64,
}

/// A single node as stored in the pool.
#[derive(Debug, Clone)]
pub struct DagNode {
    /// Node role.
    pub kind: NodeKind,
    /// Payload bytes (leaves only).
    pub data: Bytes,
    /// Ordered children (file nodes only).
    pub links: Vec<LinkInfo>,
}

impl DagNode {
    /// Total content bytes reachable from this node.
    #[must_use]
    pub fn content_size(&self) -> u64 {
        match self.kind {
            NodeKind::Leaf => self.data.len() as u64,
            NodeKind::File => self.links.iter().map(|link| link.size).sum(),
        }
    }

    pub(crate) fn leaf(data: Bytes) -> (ContentAddress, Self) {
        let address = ContentAddress::digest(NodeKind::Leaf.tag(), &[&data[..]]);
        (
            address,
            Self {
                kind: NodeKind::Leaf,
                data,
                links: Vec::new(),
            },
        )
    }

    pub(crate) fn file(links: Vec<LinkInfo>) -> (ContentAddress, Self) {
        let mut encoded = Vec::with_capacity(links.len() * (ADDRESS_LEN + 8));
        for link in &links {
            encoded.extend_from_slice(link.address.as_bytes());
            encoded.extend_from_slice(&link.size.to_be_bytes());
        }
        let address = ContentAddress::digest(NodeKind::File.tag(), &[&encoded[..]]);
        (
            address,
            Self {
                kind: NodeKind::File,
                data: Bytes::new(),
                links,
            },
        )
    }
}

/// Root address and content size of a committed tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeInfo {
    /// Root address.
    pub address: ContentAddress,
    /// Content bytes in the tree.
    pub size: u64,
}

/// Contract of the external content-addressed block pool.
#[async_trait]
pub trait DagPool: Send + Sync + std::fmt::Debug {
    /// Chunk `reader` into a balanced tree and commit it, taking one
    /// reference on the root.
    async fn add_tree(&self, reader: DagReader) -> PoolResult<TreeInfo>;

    /// Fetch a single node.
    async fn get(&self, address: &ContentAddress) -> PoolResult<DagNode>;

    /// Stream the content bytes of the tree rooted at `address`.
    async fn open_reader(&self, address: &ContentAddress) -> PoolResult<DagReader>;

    /// Describe `address` as a link usable by [`build_by_links`](DagPool::build_by_links).
    async fn create_link_info(&self, address: &ContentAddress) -> PoolResult<LinkInfo>;

    /// Commit a new tree whose content is the concatenation of `links`,
    /// taking one reference on the root. No content bytes are copied.
    async fn build_by_links(&self, links: &[LinkInfo]) -> PoolResult<TreeInfo>;

    /// Release one reference on the tree rooted at `address`.
    async fn remove_dag(&self, address: &ContentAddress) -> PoolResult<()>;
}
