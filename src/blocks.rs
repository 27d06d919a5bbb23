//! Sample blocks and the interface to the external block store.
//!
//! Audio payload lives in immutable, content-addressed blocks. Tracks hold
//! `Arc<SampleBlock>` handles, so duplicating a track for a history
//! snapshot bumps reference counts instead of copying samples. Physical
//! storage of the blocks belongs to a [`BlockStore`]; this crate only asks
//! it to forget the blocks nobody references any more.

use crate::error::StoreError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier of a sample block inside the block store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(u64);

impl BlockId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}", self.0)
    }
}

/// Set of block ids, used both as a "seen" set while walking tracks and as
/// the retained set handed to [`BlockStore::delete_blocks_except`].
pub type BlockIdSet = HashSet<BlockId>;

/// An immutable run of samples.
///
/// Two blocks are equal when their ids are equal: blocks are
/// content-addressed, so the samples cannot differ.
#[derive(Debug, Serialize, Deserialize)]
pub struct SampleBlock {
    id: BlockId,
    samples: Box<[f32]>,
}

impl SampleBlock {
    pub fn new(id: BlockId, samples: impl Into<Box<[f32]>>) -> Self {
        Self {
            id,
            samples: samples.into(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Bytes this block occupies in the store.
    pub fn space_usage(&self) -> u64 {
        (self.samples.len() * std::mem::size_of::<f32>()) as u64
    }
}

impl PartialEq for SampleBlock {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SampleBlock {}

/// Storage engine that owns the physical sample blocks.
///
/// Implementations must be callable from the foreground thread while a
/// background thread is appending new blocks, hence `&self`.
pub trait BlockStore: Send + Sync {
    /// Deletes every stored block whose id is not in `retained`.
    ///
    /// # Returns
    ///
    /// Number of blocks deleted
    ///
    /// # Errors
    ///
    /// Returns an error if some blocks could not be deleted. Callers treat
    /// this as a disk-space leak, never as history corruption.
    fn delete_blocks_except(&self, retained: &BlockIdSet) -> Result<usize, StoreError>;
}

/// In-process block store.
///
/// Mints blocks with fresh ids and keeps track of which ids are still
/// stored. Deleting a block here only forgets its bookkeeping entry; any
/// surviving `Arc` handle still keeps the samples alive in memory.
#[derive(Debug)]
pub struct MemoryBlockStore {
    next_id: AtomicU64,
    blocks: Mutex<HashMap<BlockId, u64>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            blocks: Mutex::new(HashMap::new()),
        }
    }

    /// Stores a new block holding `samples` and returns a handle to it.
    pub fn create_block(&self, samples: impl Into<Box<[f32]>>) -> Arc<SampleBlock> {
        let id = BlockId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let block = Arc::new(SampleBlock::new(id, samples));
        self.blocks.lock().insert(id, block.space_usage());
        block
    }

    /// Returns true if the store still holds block `id`.
    pub fn contains(&self, id: BlockId) -> bool {
        self.blocks.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }

    /// Total bytes currently stored.
    pub fn space_usage(&self) -> u64 {
        self.blocks.lock().values().sum()
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for MemoryBlockStore {
    fn delete_blocks_except(&self, retained: &BlockIdSet) -> Result<usize, StoreError> {
        let mut blocks = self.blocks.lock();
        let before = blocks.len();
        blocks.retain(|id, _| retained.contains(id));
        let deleted = before - blocks.len();
        tracing::debug!(deleted, remaining = blocks.len(), "Deleted unreferenced blocks");
        Ok(deleted)
    }
}
