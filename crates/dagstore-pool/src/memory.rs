//! Reference-counted in-memory [`DagPool`].

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tracing::{debug, trace};

use crate::{
    ContentAddress, DagNode, DagPool, DagReader, LinkInfo, NodeKind, PoolError, PoolResult,
    TreeInfo,
};

/// Default leaf chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default maximum number of links per interior node.
pub const DEFAULT_MAX_LINKS: usize = 1024;

/// Nodes produced by a build, not yet visible in the pool.
type Staged = HashMap<ContentAddress, DagNode>;

#[derive(Debug, Default)]
struct PoolInner {
    blocks: DashMap<ContentAddress, Arc<DagNode>>,
    /// Reference counts. Every mutation of `blocks` happens under this lock.
    refs: Mutex<HashMap<ContentAddress, u64>>,
}

impl PoolInner {
    fn node(&self, address: &ContentAddress) -> PoolResult<Arc<DagNode>> {
        self.blocks
            .get(address)
            .map(|node| Arc::clone(node.value()))
            .ok_or(PoolError::NotFound { address: *address })
    }

    /// Take one reference on `root`, inserting staged nodes that are new.
    ///
    /// A node already in the pool only gains a reference; its children are
    /// untouched because they are already held by it.
    fn commit(&self, root: ContentAddress, mut staged: Staged) -> PoolResult<()> {
        let mut refs = self.refs.lock();
        let mut stack = vec![root];
        while let Some(address) = stack.pop() {
            if let Some(count) = refs.get_mut(&address) {
                *count += 1;
                continue;
            }
            let node = staged
                .remove(&address)
                .ok_or(PoolError::NotFound { address })?;
            stack.extend(node.links.iter().map(|link| link.address));
            refs.insert(address, 1);
            self.blocks.insert(address, Arc::new(node));
        }
        Ok(())
    }

    /// Drop one reference on `root`, reclaiming nodes that reach zero.
    fn release(&self, root: ContentAddress) -> PoolResult<usize> {
        let mut refs = self.refs.lock();
        if !refs.contains_key(&root) {
            return Err(PoolError::NotFound { address: root });
        }

        let mut reclaimed = 0;
        let mut stack = vec![root];
        while let Some(address) = stack.pop() {
            let Some(count) = refs.get_mut(&address) else {
                continue;
            };
            *count -= 1;
            if *count > 0 {
                continue;
            }
            refs.remove(&address);
            if let Some((_, node)) = self.blocks.remove(&address) {
                stack.extend(node.links.iter().map(|link| link.address));
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}

/// In-memory content-addressed pool.
///
/// Cloning is cheap; clones share the same blocks.
///
/// # Examples
///
/// ```
/// use dagstore_pool::{DagPool, MemoryDagPool};
/// use tokio::io::AsyncReadExt;
///
/// # tokio_test::block_on(async {
/// let pool = MemoryDagPool::with_layout(4, 2);
/// let tree = pool.add_tree(Box::new(&b"hello world"[..])).await.unwrap();
/// assert_eq!(tree.size, 11);
///
/// let mut out = Vec::new();
/// let mut reader = pool.open_reader(&tree.address).await.unwrap();
/// reader.read_to_end(&mut out).await.unwrap();
/// assert_eq!(out, b"hello world");
///
/// pool.remove_dag(&tree.address).await.unwrap();
/// assert_eq!(pool.block_count(), 0);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MemoryDagPool {
    inner: Arc<PoolInner>,
    chunk_size: usize,
    max_links: usize,
}

impl Default for MemoryDagPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDagPool {
    /// Create a pool with the default layout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_layout(DEFAULT_CHUNK_SIZE, DEFAULT_MAX_LINKS)
    }

    /// Create a pool with a custom leaf size and fan-out.
    ///
    /// Values below the minimum (1 byte, 2 links) are raised to it.
    #[must_use]
    pub fn with_layout(chunk_size: usize, max_links: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner::default()),
            chunk_size: chunk_size.max(1),
            max_links: max_links.max(2),
        }
    }

    /// Number of distinct nodes currently stored.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.inner.blocks.len()
    }

    /// Whether a node is stored under `address`.
    #[must_use]
    pub fn contains(&self, address: &ContentAddress) -> bool {
        self.inner.blocks.contains_key(address)
    }

    /// Current reference count of `address` (0 when absent).
    #[must_use]
    pub fn ref_count(&self, address: &ContentAddress) -> u64 {
        self.inner.refs.lock().get(address).copied().unwrap_or(0)
    }

    /// Link `level` upward until it fits in a single root `File` node.
    fn stage_root(&self, mut level: Vec<LinkInfo>, staged: &mut Staged) -> TreeInfo {
        while level.len() > self.max_links {
            level = level
                .chunks(self.max_links)
                .map(|group| {
                    let (address, node) = DagNode::file(group.to_vec());
                    let size = node.content_size();
                    staged.insert(address, node);
                    LinkInfo { address, size }
                })
                .collect();
        }
        let (address, node) = DagNode::file(level);
        let size = node.content_size();
        staged.insert(address, node);
        TreeInfo { address, size }
    }
}

#[async_trait]
impl DagPool for MemoryDagPool {
    async fn add_tree(&self, mut reader: DagReader) -> PoolResult<TreeInfo> {
        let mut staged = Staged::new();
        let mut leaves = Vec::new();
        loop {
            let mut chunk = Vec::with_capacity(self.chunk_size);
            (&mut reader)
                .take(self.chunk_size as u64)
                .read_to_end(&mut chunk)
                .await?;
            if chunk.is_empty() {
                break;
            }
            let last = chunk.len() < self.chunk_size;
            let (address, node) = DagNode::leaf(Bytes::from(chunk));
            leaves.push(LinkInfo {
                address,
                size: node.content_size(),
            });
            staged.insert(address, node);
            if last {
                break;
            }
        }

        let tree = self.stage_root(leaves, &mut staged);
        self.inner.commit(tree.address, staged)?;
        debug!(address = %tree.address, size = tree.size, "added tree");
        Ok(tree)
    }

    async fn get(&self, address: &ContentAddress) -> PoolResult<DagNode> {
        self.inner.node(address).map(|node| node.as_ref().clone())
    }

    async fn open_reader(&self, address: &ContentAddress) -> PoolResult<DagReader> {
        // Fail fast on a missing root; missing descendants surface as read errors.
        self.inner.node(address)?;
        let inner = Arc::clone(&self.inner);
        let chunks = stream::unfold(vec![*address], move |mut pending| {
            let inner = Arc::clone(&inner);
            async move {
                while let Some(next) = pending.pop() {
                    let node = match inner.node(&next) {
                        Ok(node) => node,
                        Err(e) => {
                            pending.clear();
                            return Some((Err(io::Error::new(io::ErrorKind::NotFound, e)), pending));
                        }
                    };
                    match node.kind {
                        NodeKind::Leaf => return Some((Ok(node.data.clone()), pending)),
                        NodeKind::File => {
                            pending.extend(node.links.iter().rev().map(|link| link.address));
                        }
                    }
                }
                None
            }
        });
        Ok(Box::new(StreamReader::new(chunks.boxed())))
    }

    async fn create_link_info(&self, address: &ContentAddress) -> PoolResult<LinkInfo> {
        let node = self.inner.node(address)?;
        Ok(LinkInfo {
            address: *address,
            size: node.content_size(),
        })
    }

    async fn build_by_links(&self, links: &[LinkInfo]) -> PoolResult<TreeInfo> {
        for link in links {
            self.inner.node(&link.address)?;
        }
        let mut staged = Staged::new();
        let tree = self.stage_root(links.to_vec(), &mut staged);
        self.inner.commit(tree.address, staged)?;
        debug!(address = %tree.address, size = tree.size, links = links.len(), "built tree from links");
        Ok(tree)
    }

    async fn remove_dag(&self, address: &ContentAddress) -> PoolResult<()> {
        let reclaimed = self.inner.release(*address)?;
        trace!(address = %address, reclaimed, "released tree");
        Ok(())
    }
}
