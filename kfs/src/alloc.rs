//! Free-block bitmap allocator.
//!
//! The bitmap region sits directly after the inode table; one bit per data
//! block, most significant bit first within each byte. Data blocks are
//! addressed by absolute block number starting immediately after the bitmap,
//! so an allocation at map block `m`, byte `b`, bit `i` maps to
//! `map_base + map_blocks + m * 8 * BLOCK_SIZE + b * 8 + i`.

use crate::error::{FsError, Result};
use crate::fs::KFileSystem;
use crate::node::{Inode, INODES_PER_BLOCK};
use blockdev::{BlockDevice, BlockNumber, BLOCK_SIZE};
use log::debug;

/// Bits tracked by one bitmap block.
pub(crate) const BITS_PER_MAP_BLOCK: u32 = (BLOCK_SIZE * 8) as u32;

/// First block of the bitmap region: the bitmap starts right after the
/// inode table, whose size follows from the device's inode count.
pub(crate) fn map_base(meta: &Inode) -> u32 {
    let mut base = meta.n_refs / INODES_PER_BLOCK;
    if meta.n_refs % INODES_PER_BLOCK != 0 {
        base += 1;
    }
    base
}

impl<D: BlockDevice> KFileSystem<D> {
    /// Claims the lowest-numbered free data block on a device and returns
    /// its absolute block number. The linear scan order makes allocation
    /// deterministic. Exhaustion is reported, never retried here.
    pub fn alloc_block(&mut self, fs_nr: u8) -> Result<BlockNumber> {
        let meta = self.meta_inode(fs_nr)?;
        let base = map_base(&meta);

        for map_block in 0..meta.n_blocks {
            let dev = self.registry.resolve(fs_nr)?;
            dev.read_block(base + map_block, &mut self.data_buf)?;

            for byte_idx in 0..BLOCK_SIZE {
                if self.data_buf[byte_idx] == 0xFF {
                    continue;
                }
                for bit in 0..8u32 {
                    let mask = 0x80u8 >> bit;
                    if self.data_buf[byte_idx] & mask != 0 {
                        continue;
                    }
                    self.data_buf[byte_idx] |= mask;
                    dev.write_block(base + map_block, &self.data_buf)?;

                    let blocknr = base
                        + meta.n_blocks
                        + map_block * BITS_PER_MAP_BLOCK
                        + byte_idx as u32 * 8
                        + bit;
                    debug!("alloc_block: fs_nr={} block={}", fs_nr, blocknr);
                    return Ok(blocknr);
                }
            }
        }
        Err(FsError::NoFreeBlock(fs_nr))
    }

    /// Returns a data block to the free pool, clearing its bitmap bit with a
    /// read-modify-write of the one affected bitmap block.
    pub fn free_block(&mut self, fs_nr: u8, blocknr: BlockNumber) -> Result<()> {
        let meta = self.meta_inode(fs_nr)?;
        let base = map_base(&meta);
        let first_data = base + meta.n_blocks;
        if blocknr < first_data {
            return Err(FsError::IndexOutOfBounds {
                idx: blocknr,
                limit: first_data,
            });
        }

        let rel = blocknr - first_data;
        let map_block = rel / BITS_PER_MAP_BLOCK;
        if map_block >= meta.n_blocks {
            return Err(FsError::IndexOutOfBounds {
                idx: blocknr,
                limit: first_data + meta.n_blocks * BITS_PER_MAP_BLOCK,
            });
        }
        let byte_idx = ((rel % BITS_PER_MAP_BLOCK) / 8) as usize;
        let bit = rel % 8;

        let dev = self.registry.resolve(fs_nr)?;
        dev.read_block(base + map_block, &mut self.data_buf)?;
        self.data_buf[byte_idx] &= !(0x80u8 >> bit);
        dev.write_block(base + map_block, &self.data_buf)?;
        debug!("free_block: fs_nr={} block={}", fs_nr, blocknr);
        Ok(())
    }
}
