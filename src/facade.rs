//! The public facade: `FileSystem`, the single value the rest of the crate
//! is built to hide behind.
//!
//! Bundles the block pool, inode table, directory root, and open-file table
//! that used to be module-scope globals in the original C source into one
//! owned value, in the spirit of `easy-fs`'s `EasyFileSystem` wrapping a
//! `BlockDevice` plus its bitmaps and superblock. Every operation is
//! exposed twice: a typed `try_*` method that is the crate's own idiom, and
//! a literal `tfs_*`-shaped method returning `-1` on any failure, for
//! callers porting code written against the original contract.

use bitflags::bitflags;
use log::warn;

use crate::block::BlockPool;
use crate::config::{Geometry, TfsConfig, ROOT_DIR_INUM};
use crate::directory;
use crate::error::TfsError;
use crate::inode::{InodeKind, InodeSlot, InodeTable};
use crate::open_file::OpenFileTable;
use crate::rw;

bitflags! {
    /// Flags accepted by [`FileSystem::try_open`]. Any combination is
    /// legal, matching §6's "any bit set in isolation or combination".
    pub struct OpenFlags: u32 {
        const CREAT = 0b001;
        const TRUNC = 0b010;
        const APPEND = 0b100;
    }
}

/// An open-file handle, returned by `open` and consumed by `read`/`write`/
/// `close`.
pub type FileHandle = u32;

/// The filesystem's entire live state: the block pool, inode table, and
/// open-file table, plus the config that sized them.
///
/// Created by [`FileSystem::init`], which plays `tfs_init`'s role of
/// creating the root directory inode at [`crate::config::ROOT_DIR_INUM`].
pub struct FileSystem {
    config: TfsConfig,
    geometry: Geometry,
    pool: BlockPool,
    inodes: InodeTable,
    open_files: OpenFileTable,
}

impl FileSystem {
    /// `tfs_init`. The root directory inode is always created first, so it
    /// is guaranteed to land at inumber 0.
    pub fn init(config: TfsConfig) -> Result<Self, TfsError> {
        let geometry = Geometry::new(&config);
        let pool = BlockPool::new(config.block_size, config.data_blocks);
        let inodes = InodeTable::new(config.inode_table_size);
        let open_files = OpenFileTable::new(config.max_open_files);

        let root = inodes.create(InodeKind::Directory, &pool, &config)?;
        debug_assert_eq!(root, ROOT_DIR_INUM);

        Ok(FileSystem {
            config,
            geometry,
            pool,
            inodes,
            open_files,
        })
    }

    /// `tfs_destroy`. Deletes every taken inode and open-file entry; the
    /// value is then dropped, so there is nothing left to re-initialize
    /// except by calling [`FileSystem::init`] again on a fresh value.
    pub fn destroy(self) {
        for inumber in 0..self.inodes.len() as u32 {
            let _ = self.inodes.delete(inumber, &self.pool);
        }
        self.open_files.clear();
    }

    /// `tfs_lookup`. Validates the path grammar (`/name`, per §6) before
    /// delegating to the directory's linear scan.
    pub fn try_lookup(&self, path: &str) -> Result<u32, TfsError> {
        if path.len() <= 1 || !path.starts_with('/') {
            return Err(TfsError::InvalidArgument);
        }
        let name = &path[1..];
        directory::find_entry(&self.inodes, &self.pool, &self.config, ROOT_DIR_INUM, name)
    }

    pub fn lookup(&self, path: &str) -> i32 {
        self.try_lookup(path).map(|i| i as i32).unwrap_or(-1)
    }

    /// `tfs_open`. See §4.6 for the create/truncate/append decision tree.
    pub fn try_open(&self, name: &str, flags: OpenFlags) -> Result<FileHandle, TfsError> {
        let existing = directory::find_entry(&self.inodes, &self.pool, &self.config, ROOT_DIR_INUM, name);

        let (inumber, start_offset) = match existing {
            Ok(inumber) => {
                if flags.contains(OpenFlags::TRUNC) {
                    let mut guard = self.inodes.write(inumber)?;
                    if let InodeSlot::Taken(inode) = &mut *guard {
                        if inode.size > 0 {
                            inode.shrink_to_empty(&self.pool);
                            inode.alloc_first_block(&self.pool)?;
                        }
                    }
                }
                let size = match &*self.inodes.read(inumber)? {
                    InodeSlot::Taken(inode) => inode.size,
                    InodeSlot::Free => return Err(TfsError::InvalidInumber),
                };
                let offset = if flags.contains(OpenFlags::APPEND) { size } else { 0 };
                (inumber, offset)
            }
            Err(TfsError::NotFound) if flags.contains(OpenFlags::CREAT) => {
                let inumber = self.inodes.create(InodeKind::File, &self.pool, &self.config)?;
                if let Err(e) = directory::add_entry(
                    &self.inodes,
                    &self.pool,
                    &self.config,
                    ROOT_DIR_INUM,
                    inumber,
                    name,
                ) {
                    let _ = self.inodes.delete(inumber, &self.pool);
                    return Err(e);
                }
                (inumber, 0)
            }
            Err(e) => return Err(e),
        };

        // If the open-file table is full the inode stays in place: a
        // resource leak by design (§4.6).
        self.open_files.add(inumber, start_offset)
    }

    pub fn open(&self, name: &str, flags: OpenFlags) -> i32 {
        self.try_open(name, flags).map(|h| h as i32).unwrap_or(-1)
    }

    /// `tfs_close`.
    pub fn try_close(&self, handle: FileHandle) -> Result<(), TfsError> {
        self.open_files.remove(handle)
    }

    pub fn close(&self, handle: FileHandle) -> i32 {
        match self.try_close(handle) {
            Ok(()) => 0,
            Err(_) => -1,
        }
    }

    /// `tfs_write`. Takes the inode's write lock, then the handle's offset
    /// lock, and holds both across the whole call — per-inode before
    /// per-open-file, per the ordering rule (§5) — so a concurrent call on
    /// the same handle cannot observe or clobber a half-applied offset
    /// advance (ordering guarantee 4).
    pub fn try_write(&self, handle: FileHandle, buffer: &[u8]) -> Result<usize, TfsError> {
        let inumber = self.open_files.inumber(handle)?;
        let mut guard = self.inodes.write(inumber)?;
        let inode = match &mut *guard {
            InodeSlot::Taken(inode) => inode,
            InodeSlot::Free => return Err(TfsError::InvalidInumber),
        };

        let pool = &self.pool;
        let geometry = &self.geometry;
        let written = self
            .open_files
            .with_offset(handle, |offset| rw::write(inode, pool, geometry, offset, buffer))?;
        drop(guard);

        if written < buffer.len() {
            warn!("write on handle {handle} clamped to capacity ({written} of {} bytes)", buffer.len());
        }
        Ok(written)
    }

    pub fn write(&self, handle: FileHandle, buffer: &[u8]) -> isize {
        self.try_write(handle, buffer).map(|n| n as isize).unwrap_or(-1)
    }

    /// `tfs_read`. Same lock-holding shape as `try_write`: the per-inode
    /// read lock, then the handle's offset lock, held together for the
    /// whole call.
    pub fn try_read(&self, handle: FileHandle, buffer: &mut [u8]) -> Result<usize, TfsError> {
        let inumber = self.open_files.inumber(handle)?;
        let guard = self.inodes.read(inumber)?;
        let inode = match &*guard {
            InodeSlot::Taken(inode) => inode,
            InodeSlot::Free => return Err(TfsError::InvalidInumber),
        };

        let pool = &self.pool;
        let geometry = &self.geometry;
        let got = self
            .open_files
            .with_offset(handle, |offset| Ok(rw::read(inode, pool, geometry, offset, buffer)))?;
        drop(guard);

        Ok(got)
    }

    pub fn read(&self, handle: FileHandle, buffer: &mut [u8]) -> isize {
        self.try_read(handle, buffer).map(|n| n as isize).unwrap_or(-1)
    }

    /// `tfs_copy_to_external_fs`. Reads the whole source file into memory,
    /// then writes it out through a host `std::fs::File`. The host write
    /// path's collaborator (§6) is `std::fs::write` here, the natural
    /// Rust-idiomatic stand-in.
    pub fn try_copy_to_external_fs(&self, src_path: &str, dest_path: &str) -> Result<(), TfsError> {
        let inumber = self.try_lookup(src_path)?;
        let size = match &*self.inodes.read(inumber)? {
            InodeSlot::Taken(inode) => inode.size,
            InodeSlot::Free => return Err(TfsError::InvalidInumber),
        };

        let handle = self.open_files.add(inumber, 0)?;
        let mut buffer = vec![0u8; size];
        let mut filled = 0;
        while filled < buffer.len() {
            let n = self.try_read(handle, &mut buffer[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.open_files.remove(handle)?;

        std::fs::write(dest_path, &buffer[..filled])?;
        Ok(())
    }

    pub fn copy_to_external_fs(&self, src_path: &str, dest_path: &str) -> i32 {
        match self.try_copy_to_external_fs(src_path, dest_path) {
            Ok(()) => 0,
            Err(_) => -1,
        }
    }

    /// The pool's current free byte count, used by tests that assert
    /// against `get_free_memory` (§8 properties 3, 4, 7).
    pub fn free_memory(&self) -> usize {
        self.pool.free_memory()
    }

    pub fn config(&self) -> &TfsConfig {
        &self.config
    }
}
