//! The open-file table: a fixed array of handle slots, each recording an
//! inumber and a byte offset.
//!
//! Laid out like `easy-fs`'s `BlockCacheManager` — a single outer lock over
//! a `Vec` of slots, each entry additionally wrapped so its own field (the
//! offset here, the cached bytes there) can be mutated without taking the
//! outer lock again — rather than one `RwLock` per slot as the inode table
//! uses, since open-file slots are claimed/released far more often than
//! inode slots and a per-slot lock would buy nothing the outer lock doesn't
//! already give for free.

use parking_lot::RwLock;

use crate::bitmap::Bitmap;
use crate::error::TfsError;

/// One open-file handle's mutable state: which inode it addresses and
/// where the next read/write will start.
pub(crate) struct OpenFileEntry {
    pub inumber: u32,
    pub offset: RwLock<usize>,
}

struct OpenFileTableInner {
    bitmap: Bitmap,
    slots: Vec<Option<OpenFileEntry>>,
}

/// `add_to_open_file_table` / `remove_from_open_file_table` /
/// `get_open_file_entry`, per §4.5.
pub(crate) struct OpenFileTable {
    inner: RwLock<OpenFileTableInner>,
}

impl OpenFileTable {
    pub fn new(size: usize) -> Self {
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, || None);
        OpenFileTable {
            inner: RwLock::new(OpenFileTableInner {
                bitmap: Bitmap::new(size),
                slots,
            }),
        }
    }

    /// First-fit over the free-bitmap; initialises the entry's inumber and
    /// starting offset.
    pub fn add(&self, inumber: u32, offset: usize) -> Result<u32, TfsError> {
        let mut inner = self.inner.write();
        let handle = inner.bitmap.alloc().ok_or(TfsError::NoFreeFileHandles)? as u32;
        inner.slots[handle as usize] = Some(OpenFileEntry {
            inumber,
            offset: RwLock::new(offset),
        });
        Ok(handle)
    }

    /// Validates the handle and marks its slot `FREE` again. Does not touch
    /// the inode the entry pointed at.
    pub fn remove(&self, handle: u32) -> Result<(), TfsError> {
        let mut inner = self.inner.write();
        let slot = inner
            .slots
            .get_mut(handle as usize)
            .ok_or(TfsError::InvalidHandle)?;
        if slot.take().is_none() {
            return Err(TfsError::InvalidHandle);
        }
        inner.bitmap.free(handle as usize);
        Ok(())
    }

    /// The entry's inumber, fixed for the handle's whole lifetime — reading
    /// it needs only a momentary brush with the table lock, never the
    /// entry's own offset lock.
    pub fn inumber(&self, handle: u32) -> Result<u32, TfsError> {
        let inner = self.inner.read();
        inner
            .slots
            .get(handle as usize)
            .and_then(|s| s.as_ref())
            .map(|entry| entry.inumber)
            .ok_or(TfsError::InvalidHandle)
    }

    /// Runs `f` with the handle's offset held under its own write-lock for
    /// `f`'s entire duration — not just the read-then-later-overwrite each
    /// call used to do. This is what makes a single handle's offset mutate
    /// atomically with the read/write engine call it wraps, matching the
    /// original's `of_lock` held around the whole body of `inode_write`/
    /// `inode_read`: two calls racing on the same handle fully serialise
    /// instead of one clobbering the other's advance.
    pub fn with_offset<R>(
        &self,
        handle: u32,
        f: impl FnOnce(&mut usize) -> Result<R, TfsError>,
    ) -> Result<R, TfsError> {
        let inner = self.inner.read();
        let entry = inner
            .slots
            .get(handle as usize)
            .and_then(|s| s.as_ref())
            .ok_or(TfsError::InvalidHandle)?;
        let mut offset = entry.offset.write();
        f(&mut offset)
    }

    /// `tfs_destroy`'s open-file half: every `TAKEN` slot reverts to
    /// `FREE`.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let len = inner.slots.len();
        inner.bitmap = Bitmap::new(len);
        for slot in inner.slots.iter_mut() {
            *slot = None;
        }
    }
}
