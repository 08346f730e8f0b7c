//! First-fit free-list allocator shared by the block pool, the inode table
//! and the open-file table.
//!
//! The original C source keeps this as a plain `char[]` of `FREE`/`TAKEN`
//! markers rather than a packed bitset (`easy-fs`'s `Bitmap` packs 4096
//! bits per block instead); TFS keeps the source's flat layout since none
//! of the three tables here are disk-resident and packing buys nothing but
//! bit-twiddling.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AllocState {
    Free,
    Taken,
}

#[derive(Debug)]
pub(crate) struct Bitmap {
    slots: Vec<AllocState>,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Bitmap {
            slots: vec![AllocState::Free; len],
        }
    }

    /// Scans left-to-right for the first `FREE` slot, flips it to `TAKEN`
    /// and returns its index. `None` once every slot is `TAKEN`.
    pub fn alloc(&mut self) -> Option<usize> {
        let idx = self.slots.iter().position(|s| *s == AllocState::Free)?;
        self.slots[idx] = AllocState::Taken;
        Some(idx)
    }

    /// Marks `idx` `FREE` again. Idempotent: freeing an already-free slot
    /// is not an error, but (per the original contract) callers must not
    /// rely on that to mean anything about prior ownership.
    pub fn free(&mut self, idx: usize) {
        self.slots[idx] = AllocState::Free;
    }

    pub fn is_free(&self, idx: usize) -> bool {
        self.slots[idx] == AllocState::Free
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn count_free(&self) -> usize {
        self.slots.iter().filter(|s| **s == AllocState::Free).count()
    }
}
