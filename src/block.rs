//! The data-block pool: a contiguous in-memory region partitioned into
//! fixed-size blocks, backed by a free-bitmap.
//!
//! This plays the role `easy-fs`'s `BlockCache`/`BlockDevice` pair plays on
//! top of a real disk, minus the caching: TFS's "disk" already lives in
//! memory, so there is nothing to cache and no block device trait to
//! abstract over. What's kept from the teacher is the shape of the
//! contract — callers never see a raw pointer into the pool, only a
//! closure-scoped borrow taken under the content lock.

use log::trace;
use parking_lot::RwLock;

use crate::bitmap::Bitmap;

/// Owns the raw bytes of every data block plus the free-bitmap that tracks
/// which ones are allocated.
///
/// Two locks, matching §5 of the spec: the free-blocks bitmap lock (here,
/// `bitmap`) and the data-blocks content lock (here, `data`). They are
/// acquired independently — allocating a block never needs to touch its
/// bytes, and copying into an already-allocated block never needs the
/// bitmap.
pub(crate) struct BlockPool {
    block_size: usize,
    bitmap: RwLock<Bitmap>,
    data: RwLock<Vec<u8>>,
}

impl BlockPool {
    pub fn new(block_size: usize, block_count: usize) -> Self {
        BlockPool {
            block_size,
            bitmap: RwLock::new(Bitmap::new(block_count)),
            data: RwLock::new(vec![0u8; block_size * block_count]),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// `data_block_alloc`. No zeroing: callers that need a clean block
    /// overwrite it themselves (directory init and indirection-block init
    /// both do this explicitly).
    pub fn alloc(&self) -> Option<u32> {
        let idx = self.bitmap.write().alloc()?;
        trace!("block {idx} allocated");
        Some(idx as u32)
    }

    /// `data_block_free`. Validity of `block` is the caller's
    /// responsibility, same as the original; an out-of-range index panics
    /// rather than silently succeeding, since that would mask a bookkeeping
    /// bug in the inode layer above.
    pub fn free(&self, block: u32) {
        self.bitmap.write().free(block as usize);
        trace!("block {block} freed");
    }

    /// `get_free_memory`.
    pub fn free_memory(&self) -> usize {
        self.block_size * self.bitmap.read().count_free()
    }

    pub fn total_blocks(&self) -> usize {
        self.bitmap.read().len()
    }

    fn range(&self, block: u32) -> std::ops::Range<usize> {
        let start = block as usize * self.block_size;
        start..start + self.block_size
    }

    /// `data_block_get`, reshaped as a scoped borrow: the lock is held only
    /// for the duration of `f`, never escapes as a raw pointer.
    pub fn with_block<R>(&self, block: u32, f: impl FnOnce(&[u8]) -> R) -> R {
        let data = self.data.read();
        f(&data[self.range(block)])
    }

    pub fn with_block_mut<R>(&self, block: u32, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut data = self.data.write();
        let range = self.range(block);
        f(&mut data[range])
    }

    /// Copies `src` into `block` at intra-block offset `at`. Used by the
    /// read/write engine's per-block copy step (§4.3 policy 4).
    pub fn copy_in(&self, block: u32, at: usize, src: &[u8]) {
        self.with_block_mut(block, |b| b[at..at + src.len()].copy_from_slice(src));
    }

    pub fn copy_out(&self, block: u32, at: usize, dst: &mut [u8]) {
        self.with_block(block, |b| dst.copy_from_slice(&b[at..at + dst.len()]));
    }

    /// Reads the `slot`-th `i32` block index out of an indirection block.
    pub fn read_index(&self, block: u32, slot: usize) -> i32 {
        self.with_block(block, |b| {
            let at = slot * 4;
            i32::from_le_bytes(b[at..at + 4].try_into().unwrap())
        })
    }

    /// Writes `value` as the `slot`-th `i32` block index of an indirection
    /// block.
    pub fn write_index(&self, block: u32, slot: usize, value: i32) {
        self.with_block_mut(block, |b| {
            let at = slot * 4;
            b[at..at + 4].copy_from_slice(&value.to_le_bytes());
        });
    }
}
