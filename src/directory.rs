//! The root directory: a single directory inode whose first data block
//! holds a flat array of fixed-size `(name, inumber)` entries.
//!
//! There is no nested-directory support (a Non-goal, §1) so this module
//! never has to walk a path past the leading `/`; it is a linear scan over
//! one block, exactly like the original's `add_dir_entry`/`find_in_dir`.

use crate::block::BlockPool;
use crate::config::TfsConfig;
use crate::error::TfsError;
use crate::inode::{InodeKind, InodeSlot, InodeTable};

const EMPTY_INUMBER: i32 = -1;

fn entry_offset(config: &TfsConfig, index: usize) -> usize {
    index * config.dir_entry_size()
}

fn read_entry_inumber(pool: &BlockPool, config: &TfsConfig, block: u32, index: usize) -> i32 {
    let at = entry_offset(config, index) + config.max_file_name;
    pool.with_block(block, |b| i32::from_le_bytes(b[at..at + 4].try_into().unwrap()))
}

fn read_entry_name(pool: &BlockPool, config: &TfsConfig, block: u32, index: usize) -> String {
    let at = entry_offset(config, index);
    pool.with_block(block, |b| {
        let raw = &b[at..at + config.max_file_name];
        let len = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..len]).into_owned()
    })
}

fn write_entry(pool: &BlockPool, config: &TfsConfig, block: u32, index: usize, name: &str, inumber: i32) {
    let at = entry_offset(config, index);
    pool.with_block_mut(block, |b| {
        let name_field = &mut b[at..at + config.max_file_name];
        name_field.fill(0);
        let truncated = &name.as_bytes()[..name.len().min(config.max_file_name - 1)];
        name_field[..truncated.len()].copy_from_slice(truncated);
        let inumber_field = &mut b[at + config.max_file_name..at + config.max_file_name + 4];
        inumber_field.copy_from_slice(&inumber.to_le_bytes());
    });
}

/// Initializes a freshly allocated directory block so every entry slot
/// reads as empty (`inumber == -1`), matching invariant 5 (§3).
pub(crate) fn init_block(pool: &BlockPool, config: &TfsConfig, block: u32) {
    for i in 0..config.max_dir_entries() {
        write_entry(pool, config, block, i, "", EMPTY_INUMBER);
    }
}

fn dir_first_block(inodes: &InodeTable, dir_inumber: u32) -> Result<u32, TfsError> {
    let guard = inodes.read(dir_inumber)?;
    match &*guard {
        InodeSlot::Free => Err(TfsError::InvalidInumber),
        InodeSlot::Taken(inode) if inode.kind != InodeKind::Directory => Err(TfsError::NotADirectory),
        InodeSlot::Taken(inode) => Ok(inode.direct[0]),
    }
}

/// `add_dir_entry`. Holds the coarse inode-table lock for the duration of
/// the scan-and-write, exactly like the original's `inode_table_mutex` —
/// not the directory inode's own per-inode lock, which only guards
/// structural changes to the inode's *own* blocks (it never gains more
/// than its first one).
pub(crate) fn add_entry(
    inodes: &InodeTable,
    pool: &BlockPool,
    config: &TfsConfig,
    dir_inumber: u32,
    child_inumber: u32,
    name: &str,
) -> Result<(), TfsError> {
    if name.is_empty() {
        return Err(TfsError::InvalidArgument);
    }
    if inodes.is_free(child_inumber)? {
        return Err(TfsError::InvalidArgument);
    }

    let _guard = inodes.table_lock.write();
    let block = dir_first_block(inodes, dir_inumber)?;

    for i in 0..config.max_dir_entries() {
        if read_entry_inumber(pool, config, block, i) == EMPTY_INUMBER {
            write_entry(pool, config, block, i, name, child_inumber as i32);
            return Ok(());
        }
    }
    Err(TfsError::DirectoryFull)
}

/// `find_in_dir`. Read-locks the table lock, so concurrent lookups proceed
/// in parallel with each other but are excluded from a concurrent
/// `add_entry`.
pub(crate) fn find_entry(
    inodes: &InodeTable,
    pool: &BlockPool,
    config: &TfsConfig,
    dir_inumber: u32,
    name: &str,
) -> Result<u32, TfsError> {
    let _guard = inodes.table_lock.read();
    let block = dir_first_block(inodes, dir_inumber)?;

    for i in 0..config.max_dir_entries() {
        let inumber = read_entry_inumber(pool, config, block, i);
        if inumber != EMPTY_INUMBER && read_entry_name(pool, config, block, i) == name {
            return Ok(inumber as u32);
        }
    }
    Err(TfsError::NotFound)
}

/// Not reachable from the external API (there is no `tfs_unlink`, per the
/// spec's Non-goals) but implements the `clear_dir_entry` signature the
/// original header declares and never defines.
#[allow(dead_code)]
pub(crate) fn clear_entry(
    inodes: &InodeTable,
    pool: &BlockPool,
    config: &TfsConfig,
    dir_inumber: u32,
    child_inumber: u32,
) -> Result<(), TfsError> {
    let _guard = inodes.table_lock.write();
    let block = dir_first_block(inodes, dir_inumber)?;

    for i in 0..config.max_dir_entries() {
        if read_entry_inumber(pool, config, block, i) == child_inumber as i32 {
            write_entry(pool, config, block, i, "", EMPTY_INUMBER);
            return Ok(());
        }
    }
    Err(TfsError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (BlockPool, InodeTable, TfsConfig, u32) {
        // Small enough that `directory_full_is_reported` can actually reach
        // a full directory block without first running out of inodes or
        // data blocks: 8 entries per block, room for a dozen inodes.
        let config = TfsConfig::default()
            .with_block_size(128)
            .with_max_file_name(12)
            .with_data_blocks(16)
            .with_inode_table_size(12);
        let pool = BlockPool::new(config.block_size, config.data_blocks);
        let inodes = InodeTable::new(config.inode_table_size);
        let root = inodes.create(InodeKind::Directory, &pool, &config).unwrap();
        (pool, inodes, config, root)
    }

    #[test]
    fn add_then_find_round_trips() {
        let (pool, inodes, config, root) = setup();
        let child = inodes.create(InodeKind::File, &pool, &config).unwrap();
        add_entry(&inodes, &pool, &config, root, child, "f1").unwrap();
        assert_eq!(find_entry(&inodes, &pool, &config, root, "f1").unwrap(), child);
    }

    #[test]
    fn find_missing_name_fails() {
        let (pool, inodes, config, root) = setup();
        assert_eq!(
            find_entry(&inodes, &pool, &config, root, "nope"),
            Err(TfsError::NotFound)
        );
    }

    #[test]
    fn directory_full_is_reported() {
        let (pool, inodes, config, root) = setup();
        let max = config.max_dir_entries();
        for i in 0..max {
            let child = inodes.create(InodeKind::File, &pool, &config).unwrap();
            add_entry(&inodes, &pool, &config, root, child, &format!("f{i}")).unwrap();
        }
        let overflow = inodes.create(InodeKind::File, &pool, &config).unwrap();
        assert_eq!(
            add_entry(&inodes, &pool, &config, root, overflow, "one-too-many"),
            Err(TfsError::DirectoryFull)
        );
    }

    #[test]
    fn clear_entry_frees_the_slot_for_reuse() {
        let (pool, inodes, config, root) = setup();
        let child = inodes.create(InodeKind::File, &pool, &config).unwrap();
        add_entry(&inodes, &pool, &config, root, child, "f1").unwrap();
        clear_entry(&inodes, &pool, &config, root, child).unwrap();
        assert_eq!(
            find_entry(&inodes, &pool, &config, root, "f1"),
            Err(TfsError::NotFound)
        );
    }
}
