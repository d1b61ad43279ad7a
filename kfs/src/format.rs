//! Device formatting: lays down the inode table, the free-block bitmap, and
//! the two reserved nodes on a raw block device.
//!
//! On-disk order: inode table (metadata node at index 0, root directory at
//! index 1), bitmap region, data region. The bitmap is sized by handing
//! blocks from the data region over to the map until every remaining data
//! block has a bit; the excess bits at the tail of the map are pre-marked
//! allocated so the allocator can never hand out a block past the end of
//! the device.

use crate::error::{FsError, Result};
use crate::node::{
    DirEntry, Inode, InodeId, NodeType, INODES_PER_BLOCK, NODE_SIZE, NUM_DIRECT_POINTERS,
};
use crate::perm::PERM_ALL;
use blockdev::{BlockDevice, BLOCK_SIZE};
use log::debug;

pub struct FormatOptions {
    /// The filesystem number stamped into the metadata inode. Zero is
    /// reserved and rejected.
    pub fs_nr: u8,
    /// Total inode count, including the two reserved nodes.
    pub inode_count: u32,
    /// Extra root entries mapping a name to another device's root, so a
    /// multi-device namespace can be stitched together at format time.
    pub mounts: Vec<(String, u8)>,
}

impl FormatOptions {
    pub fn new(fs_nr: u8, inode_count: u32) -> Self {
        Self {
            fs_nr,
            inode_count,
            mounts: Vec::new(),
        }
    }

    pub fn mount(mut self, name: &str, fs_nr: u8) -> Self {
        self.mounts.push((name.to_string(), fs_nr));
        self
    }
}

/// Region sizes computed for a device, in blocks.
struct Regions {
    inode_blocks: u32,
    map_blocks: u32,
    data_blocks: u32,
}

fn split_regions(disk_blocks: u32, inode_count: u32) -> Result<Regions> {
    let mut inode_blocks = inode_count / INODES_PER_BLOCK;
    if inode_count % INODES_PER_BLOCK != 0 {
        inode_blocks += 1;
    }
    if disk_blocks <= inode_blocks {
        return Err(FsError::Format("device too small for its inode table"));
    }

    // Hand blocks from the data region to the map until the map covers it.
    let mut map_blocks = 0u32;
    let mut data_blocks = disk_blocks - inode_blocks;
    while map_blocks * (BLOCK_SIZE as u32) * 8 < data_blocks {
        map_blocks += 1;
        data_blocks -= 1;
        if data_blocks == 0 {
            return Err(FsError::Format("no data blocks left after the bitmap"));
        }
    }

    Ok(Regions {
        inode_blocks,
        map_blocks,
        data_blocks,
    })
}

/// Writes a fresh filesystem onto `dev`. Everything previously on the
/// device is destroyed.
pub fn format_device<D: BlockDevice>(dev: &mut D, opts: &FormatOptions) -> Result<()> {
    if opts.fs_nr == 0 {
        return Err(FsError::ReservedDeviceNr);
    }
    if opts.inode_count < 2 {
        return Err(FsError::Format("need at least the metadata and root inodes"));
    }
    // Record indices are 16 bit on disk; the count may not exceed them.
    if opts.inode_count > 1 << 16 {
        return Err(FsError::Format("inode count exceeds the 16 bit record index"));
    }
    if opts.mounts.len() >= NUM_DIRECT_POINTERS {
        return Err(FsError::Format("too many mount entries for the root node"));
    }

    let disk_blocks = dev.block_count();
    let regions = split_regions(disk_blocks, opts.inode_count)?;
    debug!(
        "format fs_nr={}: {} inode blocks, {} map blocks, {} data blocks",
        opts.fs_nr, regions.inode_blocks, regions.map_blocks, regions.data_blocks
    );

    let mut meta = Inode::new(InodeId::new(opts.fs_nr, 0), NodeType::Metadata);
    meta.n_blocks = regions.map_blocks;
    meta.n_bytes = disk_blocks * BLOCK_SIZE as u32;
    meta.n_refs = opts.inode_count;

    let mut root = Inode::new(InodeId::new(opts.fs_nr, 1), NodeType::Directory);
    root.n_refs = 1;
    root.permissions = PERM_ALL;
    root.set_entry_at(0, &DirEntry::new("..", root.id))?;
    root.n_bytes = 1;
    for (name, fs_nr) in &opts.mounts {
        root.set_entry_at(root.n_bytes, &DirEntry::new(name, InodeId::new(*fs_nr, 1)))?;
        root.n_bytes += 1;
    }

    // Inode table. The two reserved records share block 0.
    let mut buf = [0u8; BLOCK_SIZE];
    meta.store(&mut buf[..NODE_SIZE]);
    root.store(&mut buf[NODE_SIZE..2 * NODE_SIZE]);
    dev.write_block(0, &buf)?;

    let zero = [0u8; BLOCK_SIZE];
    for block in 1..regions.inode_blocks {
        dev.write_block(block, &zero)?;
    }

    // Bitmap region. Bits past the data region are pre-marked allocated, in
    // the allocator's scan order (MSB first from the front of the map).
    let map_bits = regions.map_blocks * BLOCK_SIZE as u32 * 8;
    for map_block in 0..regions.map_blocks {
        let mut buf = [0u8; BLOCK_SIZE];
        let block_first_bit = map_block * BLOCK_SIZE as u32 * 8;
        for bit in regions.data_blocks.max(block_first_bit)..map_bits {
            if bit >= block_first_bit + BLOCK_SIZE as u32 * 8 {
                break;
            }
            let rel = bit - block_first_bit;
            buf[(rel / 8) as usize] |= 0x80 >> (rel % 8);
        }
        dev.write_block(regions.inode_blocks + map_block, &buf)?;
    }

    // Data region.
    let data_start = regions.inode_blocks + regions.map_blocks;
    for block in data_start..disk_blocks {
        dev.write_block(block, &zero)?;
    }

    dev.sync()?;
    Ok(())
}
