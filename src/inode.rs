//! The inode table and inode lifecycle/growth primitives.
//!
//! Mirrors `easy-fs`'s split between a `DiskInode` (the addressing logic:
//! `get_block_id`, `increase_size`, `clear_size`) and the table that owns
//! slots of it, but with a single indirection level (TFS files never need
//! `easy-fs`'s `indirect2`) and a dynamically sized direct-block vector
//! instead of a fixed `[u32; 28]`, per the original C layout's `int
//! *i_data_block`.

use parking_lot::RwLock;

use crate::bitmap::Bitmap;
use crate::block::BlockPool;
use crate::config::Geometry;
use crate::error::TfsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InodeKind {
    File,
    Directory,
}

/// An inode's in-memory bookkeeping: kind, size, and the block indices that
/// hold its bytes.
///
/// Invariant 3 (§3): `direct.len() == number_of_blocks`, and if
/// `number_indirect_blocks > 0` then `indirection_block` is `Some` and the
/// indirection block's first `number_indirect_blocks` entries are valid
/// block indices.
#[derive(Debug)]
pub(crate) struct Inode {
    pub kind: InodeKind,
    pub size: usize,
    pub direct: Vec<u32>,
    pub indirection_block: Option<u32>,
    pub number_indirect_blocks: usize,
}

impl Inode {
    pub(crate) fn empty(kind: InodeKind) -> Self {
        Inode {
            kind,
            size: 0,
            direct: Vec::new(),
            indirection_block: None,
            number_indirect_blocks: 0,
        }
    }

    /// `inode_alloc_first_block`: reserves exactly one data block and
    /// records it as direct slot 0. On failure the inode is left with no
    /// blocks at all, and the caller (inode table create) returns the slot
    /// to `FREE`.
    pub(crate) fn alloc_first_block(&mut self, pool: &BlockPool) -> Result<(), TfsError> {
        let block = pool.alloc().ok_or(TfsError::NoFreeBlocks)?;
        self.direct.push(block);
        Ok(())
    }

    /// Appends exactly one new block to the inode's addressable region:
    /// another direct slot while under `DIRECT_BLOCKS_COUNT`, otherwise a
    /// slot in the (lazily allocated) indirection block. This is the unit
    /// of growth the read/write engine calls on every "indirect miss" /
    /// frontier crossing (§4.3 policies 3 and 5).
    pub fn grow_one_block(&mut self, pool: &BlockPool, geometry: &Geometry) -> Result<(), TfsError> {
        if self.direct.len() < geometry.direct_blocks_count {
            let block = pool.alloc().ok_or(TfsError::NoFreeBlocks)?;
            self.direct.push(block);
            return Ok(());
        }

        if self.indirection_block.is_none() {
            let ind = pool.alloc().ok_or(TfsError::NoFreeBlocks)?;
            for slot in 0..geometry.indirect_capacity {
                pool.write_index(ind, slot, -1);
            }
            self.indirection_block = Some(ind);
        }

        if self.number_indirect_blocks >= geometry.indirect_capacity {
            return Err(TfsError::NoFreeBlocks);
        }

        let block = pool.alloc().ok_or(TfsError::NoFreeBlocks)?;
        let ind = self.indirection_block.expect("just allocated above");
        pool.write_index(ind, self.number_indirect_blocks, block as i32);
        self.number_indirect_blocks += 1;
        Ok(())
    }

    /// Resolves a byte offset to the data block that holds it, or `None` if
    /// the offset falls past the inode's currently allocated frontier.
    pub fn block_for_offset(&self, pool: &BlockPool, geometry: &Geometry, offset: usize) -> Option<u32> {
        let linear = offset / geometry.block_size;
        if linear < geometry.direct_blocks_count {
            return self.direct.get(linear).copied();
        }
        let ind = self.indirection_block?;
        let slot = linear - geometry.direct_blocks_count;
        if slot >= self.number_indirect_blocks {
            return None;
        }
        let value = pool.read_index(ind, slot);
        if value < 0 {
            None
        } else {
            Some(value as u32)
        }
    }

    /// Frees every block the inode owns — direct and indirect — and resets
    /// it to the empty state. Used by both `inode_delete` and `TRUNC`-reopen.
    ///
    /// The original frees the indirection block first (in `tfs_open`'s
    /// `TRUNC` path) but direct blocks first (in `inode_delete`), and
    /// `inode_delete` additionally frees direct slot 0 a second time
    /// (Open Question 4) — a plain double-free bug. TFS unifies both call
    /// sites on indirect-then-direct order and frees each block exactly
    /// once, governed by `direct.len()`/`number_indirect_blocks` rather
    /// than the fixed `DIRECT_BLOCKS_COUNT`.
    pub fn shrink_to_empty(&mut self, pool: &BlockPool) {
        if let Some(ind) = self.indirection_block.take() {
            for slot in 0..self.number_indirect_blocks {
                let b = pool.read_index(ind, slot);
                if b >= 0 {
                    pool.free(b as u32);
                }
            }
            pool.free(ind);
            self.number_indirect_blocks = 0;
        }
        for &b in &self.direct {
            pool.free(b);
        }
        self.direct.clear();
        self.size = 0;
    }
}

pub(crate) enum InodeSlot {
    Free,
    Taken(Inode),
}

/// Owns the fixed array of inode slots and their free-bitmap.
///
/// Per §5, two independent locks cover this component: `free_bitmap`
/// (analogous to `freeinode_ts_mutex`) gates allocation/deallocation of
/// inumbers, while `table_lock` is the coarse "inode-table lock" the
/// original also uses to serialise directory-entry reads/writes performed
/// by `add_dir_entry`/`find_in_dir` (see `directory.rs`) — unrelated to the
/// per-inode locks on `slots`, which guard structural changes to one
/// inode's own blocks.
pub(crate) struct InodeTable {
    free_bitmap: RwLock<Bitmap>,
    pub(crate) table_lock: RwLock<()>,
    slots: Vec<RwLock<InodeSlot>>,
}

impl InodeTable {
    pub fn new(size: usize) -> Self {
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, || RwLock::new(InodeSlot::Free));
        InodeTable {
            free_bitmap: RwLock::new(Bitmap::new(size)),
            table_lock: RwLock::new(()),
            slots,
        }
    }

    /// `inode_create`. Initializes a directory inode's first block with
    /// every entry set to the empty sentinel, or a file inode's lone
    /// direct block, matching §4.2.
    pub fn create(&self, kind: InodeKind, pool: &BlockPool, config: &crate::config::TfsConfig) -> Result<u32, TfsError> {
        let inumber = self
            .free_bitmap
            .write()
            .alloc()
            .ok_or(TfsError::NoFreeInodes)? as u32;

        let mut inode = Inode::empty(kind);
        if let Err(e) = inode.alloc_first_block(pool) {
            self.free_bitmap.write().free(inumber as usize);
            return Err(e);
        }

        if kind == InodeKind::Directory {
            inode.size = config.block_size;
            crate::directory::init_block(pool, config, inode.direct[0]);
        }

        *self.slots[inumber as usize].write() = InodeSlot::Taken(inode);
        Ok(inumber)
    }

    /// `inode_delete`. Idempotent against an already-free slot (returns
    /// `InvalidInumber`, the typed analogue of the original's `-1`).
    pub fn delete(&self, inumber: u32, pool: &BlockPool) -> Result<(), TfsError> {
        let slot = self.slot(inumber)?;
        let mut guard = slot.write();
        match &mut *guard {
            InodeSlot::Free => Err(TfsError::InvalidInumber),
            InodeSlot::Taken(inode) => {
                if inode.size > 0 || !inode.direct.is_empty() || inode.indirection_block.is_some() {
                    inode.shrink_to_empty(pool);
                }
                *guard = InodeSlot::Free;
                drop(guard);
                self.free_bitmap.write().free(inumber as usize);
                Ok(())
            }
        }
    }

    pub fn is_free(&self, inumber: u32) -> Result<bool, TfsError> {
        if inumber as usize >= self.slots.len() {
            return Err(TfsError::InvalidInumber);
        }
        Ok(self.free_bitmap.read().is_free(inumber as usize))
    }

    fn slot(&self, inumber: u32) -> Result<&RwLock<InodeSlot>, TfsError> {
        self.slots.get(inumber as usize).ok_or(TfsError::InvalidInumber)
    }

    pub fn read(&self, inumber: u32) -> Result<parking_lot::RwLockReadGuard<'_, InodeSlot>, TfsError> {
        Ok(self.slot(inumber)?.read())
    }

    pub fn write(&self, inumber: u32) -> Result<parking_lot::RwLockWriteGuard<'_, InodeSlot>, TfsError> {
        Ok(self.slot(inumber)?.write())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

impl InodeSlot {
    pub fn kind(&self) -> Option<InodeKind> {
        match self {
            InodeSlot::Taken(inode) => Some(inode.kind),
            InodeSlot::Free => None,
        }
    }

    pub fn inode(&self) -> Option<&Inode> {
        match self {
            InodeSlot::Taken(inode) => Some(inode),
            InodeSlot::Free => None,
        }
    }

    pub fn inode_mut(&mut self) -> Option<&mut Inode> {
        match self {
            InodeSlot::Taken(inode) => Some(inode),
            InodeSlot::Free => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(block_size: usize) -> Geometry {
        Geometry {
            block_size,
            direct_blocks_count: crate::config::DIRECT_BLOCKS_COUNT,
            indirect_capacity: block_size / 4,
        }
    }

    fn config(block_size: usize) -> crate::config::TfsConfig {
        crate::config::TfsConfig::default().with_block_size(block_size)
    }

    #[test]
    fn file_create_reserves_one_direct_block() {
        let pool = BlockPool::new(64, 16);
        let table = InodeTable::new(4);
        let cfg = config(64);
        let inum = table.create(InodeKind::File, &pool, &cfg).unwrap();
        let guard = table.read(inum).unwrap();
        let inode = guard.inode().unwrap();
        assert_eq!(inode.direct.len(), 1);
        assert_eq!(inode.size, 0);
    }

    #[test]
    fn grow_one_block_spills_into_indirection_after_direct_exhausted() {
        let pool = BlockPool::new(64, 64);
        let table = InodeTable::new(4);
        let geom = geometry(64);
        let cfg = config(64);
        let inum = table.create(InodeKind::File, &pool, &cfg).unwrap();
        let mut guard = table.write(inum).unwrap();
        let inode = guard.inode_mut().unwrap();
        // one block already reserved by create(); grow up through the
        // direct region and one step past it.
        for _ in 0..(geom.direct_blocks_count - 1) {
            inode.grow_one_block(&pool, &geom).unwrap();
        }
        assert_eq!(inode.direct.len(), geom.direct_blocks_count);
        assert!(inode.indirection_block.is_none());
        inode.grow_one_block(&pool, &geom).unwrap();
        assert!(inode.indirection_block.is_some());
        assert_eq!(inode.number_indirect_blocks, 1);
    }

    #[test]
    fn delete_frees_every_block_exactly_once() {
        let pool = BlockPool::new(64, 16);
        let table = InodeTable::new(4);
        let geom = geometry(64);
        let cfg = config(64);
        let inum = table.create(InodeKind::File, &pool, &cfg).unwrap();
        {
            let mut guard = table.write(inum).unwrap();
            let inode = guard.inode_mut().unwrap();
            for _ in 0..3 {
                inode.grow_one_block(&pool, &geom).unwrap();
            }
        }
        let free_before = pool.free_memory();
        table.delete(inum, &pool).unwrap();
        assert_eq!(pool.free_memory(), free_before + 4 * 64);
        assert!(table.is_free(inum).unwrap());
    }

    #[test]
    fn delete_is_idempotent_against_free_slot() {
        let pool = BlockPool::new(64, 16);
        let table = InodeTable::new(4);
        let cfg = config(64);
        let inum = table.create(InodeKind::File, &pool, &cfg).unwrap();
        table.delete(inum, &pool).unwrap();
        assert_eq!(table.delete(inum, &pool), Err(TfsError::InvalidInumber));
    }

    /// One thread deletes an inode while several others create and read
    /// unrelated ones; the unrelated slots must be unaffected, mirroring
    /// the original project's `mt_test_delete_file.c`.
    #[test]
    fn concurrent_delete_does_not_disturb_unrelated_inodes() {
        use std::sync::Arc;
        use std::thread;

        let pool = Arc::new(BlockPool::new(64, 64));
        let table = Arc::new(InodeTable::new(32));
        let cfg = config(64);

        let doomed = table.create(InodeKind::File, &pool, &cfg).unwrap();

        let deleter = {
            let table = Arc::clone(&table);
            let pool = Arc::clone(&pool);
            thread::spawn(move || table.delete(doomed, &pool).unwrap())
        };

        let others: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                let pool = Arc::clone(&pool);
                let cfg = cfg;
                thread::spawn(move || {
                    let inum = table.create(InodeKind::File, &pool, &cfg).unwrap();
                    assert!(!table.is_free(inum).unwrap());
                    inum
                })
            })
            .collect();

        deleter.join().unwrap();
        let survivors: Vec<u32> = others.into_iter().map(|t| t.join().unwrap()).collect();

        assert!(table.is_free(doomed).unwrap());
        for inum in survivors {
            assert!(!table.is_free(inum).unwrap());
        }
    }
}
