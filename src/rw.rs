//! The read/write engine: stateless addressing logic laid directly over a
//! `BlockPool` and one inode's direct/indirect block list.
//!
//! Kept as free functions rather than `Inode` methods — unlike
//! `alloc_first_block`/`grow_one_block`/`shrink_to_empty`, which mutate an
//! inode's own bookkeeping and so live on `Inode`, these two combine an
//! inode, the pool, and an external open-file offset, which is the facade's
//! to own, not the inode's.

use crate::block::BlockPool;
use crate::config::Geometry;
use crate::error::TfsError;
use crate::inode::Inode;

/// `inode_write`. Grows `inode` lazily, one block at a time, as the write
/// crosses each block boundary; never performs a short write except by
/// capacity clamping (policy 1, §4.3) or a block-allocation failure, which
/// aborts the call after whatever prefix was already copied in.
pub(crate) fn write(
    inode: &mut Inode,
    pool: &BlockPool,
    geometry: &Geometry,
    offset: &mut usize,
    buffer: &[u8],
) -> Result<usize, TfsError> {
    if *offset > inode.size {
        *offset = inode.size;
    }

    let capacity = geometry.capacity();
    if *offset >= capacity {
        return Ok(0);
    }
    let requested = buffer.len().min(capacity - *offset);

    let mut written = 0;
    while written < requested {
        if inode.block_for_offset(pool, geometry, *offset).is_none() {
            inode.grow_one_block(pool, geometry)?;
        }
        let block = inode
            .block_for_offset(pool, geometry, *offset)
            .expect("block_for_offset must resolve immediately after grow_one_block");

        let in_block = *offset % geometry.block_size;
        let room = geometry.block_size - in_block;
        let chunk = room.min(requested - written);

        pool.copy_in(block, in_block, &buffer[written..written + chunk]);
        written += chunk;
        *offset += chunk;
        inode.size = inode.size.max(*offset);
    }
    Ok(written)
}

/// `inode_read`. Never allocates and never modifies `inode`; stops at the
/// file's current size even if the caller asked for more.
pub(crate) fn read(
    inode: &Inode,
    pool: &BlockPool,
    geometry: &Geometry,
    offset: &mut usize,
    buffer: &mut [u8],
) -> usize {
    if *offset > inode.size {
        *offset = inode.size;
    }
    let requested = buffer.len().min(inode.size - *offset);

    let mut done = 0;
    while done < requested {
        let block = match inode.block_for_offset(pool, geometry, *offset) {
            Some(b) => b,
            None => break,
        };
        let in_block = *offset % geometry.block_size;
        let room = geometry.block_size - in_block;
        let chunk = room.min(requested - done);

        pool.copy_out(block, in_block, &mut buffer[done..done + chunk]);
        done += chunk;
        *offset += chunk;
    }
    done
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TfsConfig, DIRECT_BLOCKS_COUNT};
    use crate::inode::InodeKind;

    fn setup(block_size: usize, data_blocks: usize) -> (BlockPool, Geometry, Inode) {
        let config = TfsConfig::default()
            .with_block_size(block_size)
            .with_data_blocks(data_blocks);
        let geometry = Geometry::new(&config);
        let pool = BlockPool::new(block_size, data_blocks);
        let mut inode = Inode::empty(InodeKind::File);
        inode.alloc_first_block(&pool).unwrap();
        (pool, geometry, inode)
    }

    #[test]
    fn write_then_read_round_trips_within_one_block() {
        let (pool, geometry, mut inode) = setup(64, 16);
        let mut offset = 0;
        let n = write(&mut inode, &pool, &geometry, &mut offset, b"hello").unwrap();
        assert_eq!(n, 5);
        assert_eq!(offset, 5);
        assert_eq!(inode.size, 5);

        let mut read_offset = 0;
        let mut out = [0u8; 5];
        let got = read(&inode, &pool, &geometry, &mut read_offset, &mut out);
        assert_eq!(got, 5);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn write_spanning_multiple_blocks_grows_the_inode() {
        let (pool, geometry, mut inode) = setup(16, 32);
        let payload = vec![7u8; 40];
        let mut offset = 0;
        let n = write(&mut inode, &pool, &geometry, &mut offset, &payload).unwrap();
        assert_eq!(n, 40);
        assert_eq!(inode.direct.len(), 3);

        let mut out = vec![0u8; 40];
        let mut read_offset = 0;
        let got = read(&inode, &pool, &geometry, &mut read_offset, &mut out);
        assert_eq!(got, 40);
        assert_eq!(out, payload);
    }

    #[test]
    fn write_past_capacity_is_clamped_not_rejected() {
        let (pool, geometry, mut inode) = setup(8, DIRECT_BLOCKS_COUNT + 4);
        let capacity = geometry.capacity();
        let payload = vec![1u8; capacity + 100];
        let mut offset = 0;
        let n = write(&mut inode, &pool, &geometry, &mut offset, &payload).unwrap();
        assert_eq!(n, capacity);
        assert_eq!(inode.size, capacity);
    }

    #[test]
    fn read_past_end_of_file_returns_only_available_bytes() {
        let (pool, geometry, mut inode) = setup(16, 8);
        let mut offset = 0;
        write(&mut inode, &pool, &geometry, &mut offset, b"abc").unwrap();

        let mut read_offset = 0;
        let mut out = [0u8; 16];
        let got = read(&inode, &pool, &geometry, &mut read_offset, &mut out);
        assert_eq!(got, 3);
        assert_eq!(&out[..3], b"abc");
    }

    #[test]
    fn offset_past_size_is_clamped_down_before_reading_or_writing() {
        let (pool, geometry, mut inode) = setup(16, 8);
        let mut offset = 0;
        write(&mut inode, &pool, &geometry, &mut offset, b"abc").unwrap();

        let mut stale_offset = 999;
        let mut out = [0u8; 4];
        let got = read(&inode, &pool, &geometry, &mut stale_offset, &mut out);
        assert_eq!(got, 0);
        assert_eq!(stale_offset, inode.size);

        let mut stale_write_offset = 999;
        write(&mut inode, &pool, &geometry, &mut stale_write_offset, b"xyz").unwrap();
        assert_eq!(inode.size, 6);
    }
}
