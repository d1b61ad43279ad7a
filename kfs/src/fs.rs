//! The filesystem core: device registration, the inode access layer, and
//! inode allocation.

use crate::error::{FsError, Result};
use crate::node::{self, Inode, InodeId, NodeType, NODE_SIZE};
use crate::registry::DeviceRegistry;
use blockdev::{Block, BlockDevice, BLOCK_SIZE};
use log::debug;

/// One mounted filesystem universe: every registered device plus the scratch
/// blocks all operations stage their I/O through.
///
/// All mutating operations take `&mut self`, so a single instance serializes
/// its callers through the borrow checker; wrap the instance in a mutex to
/// share it across threads. The three scratch buffers are deliberately
/// per-instance state, not statics — they are the only block-sized memory
/// the filesystem ever uses.
pub struct KFileSystem<D: BlockDevice> {
    pub(crate) registry: DeviceRegistry<D>,
    /// Scratch block for inode table reads and writes.
    pub(crate) inode_buf: Block,
    /// Scratch block for file data and bitmap blocks.
    pub(crate) data_buf: Block,
    /// Scratch block for the metadata inode's block.
    pub(crate) meta_buf: Block,
}

impl<D: BlockDevice> KFileSystem<D> {
    pub fn new() -> Self {
        Self {
            registry: DeviceRegistry::new(),
            inode_buf: [0; BLOCK_SIZE],
            data_buf: [0; BLOCK_SIZE],
            meta_buf: [0; BLOCK_SIZE],
        }
    }

    /// Registers a formatted device. Its filesystem number is read from the
    /// metadata inode on the device itself. Returns the registry slot index.
    pub fn register_device(&mut self, dev: D) -> Result<usize> {
        self.registry.register(dev)
    }

    /// Reads the metadata inode (index 0) of a device.
    pub(crate) fn meta_inode(&mut self, fs_nr: u8) -> Result<Inode> {
        let dev = self.registry.resolve(fs_nr)?;
        dev.read_block(0, &mut self.meta_buf)?;
        Ok(Inode::parse(&self.meta_buf[..NODE_SIZE]))
    }

    /// Device number 0 is reserved; the only id it carries is `(0, 1)`,
    /// shorthand for the first registered device's root directory.
    fn resolve_id(&self, id: InodeId) -> Result<InodeId> {
        if id.dev != 0 {
            return Ok(id);
        }
        if id.idx == 1 {
            let fs_nr = self.registry.first().ok_or(FsError::DeviceNotFound(0))?;
            return Ok(InodeId::new(fs_nr, 1));
        }
        Err(FsError::DeviceNotFound(0))
    }

    fn check_bounds(&mut self, id: InodeId) -> Result<()> {
        let meta = self.meta_inode(id.dev)?;
        if u32::from(id.idx) >= meta.n_refs {
            return Err(FsError::IndexOutOfBounds {
                idx: id.idx.into(),
                limit: meta.n_refs,
            });
        }
        Ok(())
    }

    /// Reads one inode record from disk.
    pub fn get_inode(&mut self, id: InodeId) -> Result<Inode> {
        let id = self.resolve_id(id)?;
        self.check_bounds(id)?;

        let block = node::inode_block(id.idx.into());
        let dev = self.registry.resolve(id.dev)?;
        dev.read_block(block, &mut self.inode_buf)?;
        let offset = node::inode_offset(id.idx.into());
        Ok(Inode::parse(&self.inode_buf[offset..offset + NODE_SIZE]))
    }

    /// Writes one inode record to disk. The containing block is read first
    /// and only the record's 256 byte slice replaced — two records share
    /// each block, so blind writes would clobber the neighbor. The record is
    /// stamped with the resolved id, so the `(0, 1)` shorthand never lands
    /// on disk.
    pub fn set_inode(&mut self, inode: &Inode) -> Result<()> {
        let id = self.resolve_id(inode.id)?;
        self.check_bounds(id)?;

        let mut record = *inode;
        record.id = id;
        let block = node::inode_block(id.idx.into());
        let offset = node::inode_offset(id.idx.into());
        let dev = self.registry.resolve(id.dev)?;
        dev.read_block(block, &mut self.inode_buf)?;
        record.store(&mut self.inode_buf[offset..offset + NODE_SIZE]);
        dev.write_block(block, &self.inode_buf)?;
        Ok(())
    }

    /// Zeroes one inode record on disk, returning the slot to the free pool.
    pub fn clear_inode(&mut self, id: InodeId) -> Result<()> {
        let id = self.resolve_id(id)?;
        self.check_bounds(id)?;

        let block = node::inode_block(id.idx.into());
        let offset = node::inode_offset(id.idx.into());
        let dev = self.registry.resolve(id.dev)?;
        dev.read_block(block, &mut self.inode_buf)?;
        for byte in &mut self.inode_buf[offset..offset + NODE_SIZE] {
            *byte = 0;
        }
        dev.write_block(block, &self.inode_buf)?;
        Ok(())
    }

    /// Finds the lowest free inode slot on a device. Indices 0 and 1 are the
    /// metadata and root nodes and never allocated. The returned slot is
    /// still zeroed on disk; the caller initializes and persists it.
    pub fn alloc_inode(&mut self, fs_nr: u8) -> Result<InodeId> {
        let meta = self.meta_inode(fs_nr)?;

        let mut loaded_block = None;
        for idx in 2..meta.n_refs {
            let block = node::inode_block(idx);
            if loaded_block != Some(block) {
                let dev = self.registry.resolve(fs_nr)?;
                dev.read_block(block, &mut self.inode_buf)?;
                loaded_block = Some(block);
            }
            let offset = node::inode_offset(idx);
            let candidate = Inode::parse(&self.inode_buf[offset..offset + NODE_SIZE]);
            if candidate.is_free() {
                debug!("alloc_inode: fs_nr={} idx={}", fs_nr, idx);
                return Ok(InodeId::new(fs_nr, idx as u16));
            }
        }
        Err(FsError::NoFreeInode(fs_nr))
    }

    /// Frees an inode: releases its data blocks back to the bitmap, then
    /// zeroes the record. Reserved nodes and non-empty directories are
    /// refused.
    pub fn free_inode(&mut self, id: InodeId) -> Result<()> {
        let id = self.resolve_id(id)?;
        if id.idx < 2 {
            return Err(FsError::ReservedInode(id));
        }
        let inode = self.get_inode(id)?;

        match inode.node_type() {
            Some(NodeType::File) => {
                for i in 0..inode.n_blocks {
                    let blocknr = inode.block_at(i)?;
                    self.free_block(id.dev, blocknr)?;
                }
            }
            Some(NodeType::Directory) => {
                if inode.n_bytes != 0 {
                    return Err(FsError::NotEmpty(id));
                }
            }
            Some(NodeType::Metadata) => return Err(FsError::ReservedInode(id)),
            None => (),
        }

        self.clear_inode(id)
    }
}

impl<D: BlockDevice> Default for KFileSystem<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{format_device, FormatOptions};
    use crate::perm::PERM_ALL;
    use blockdev::MemDisk;

    fn formatted_disk(fs_nr: u8, inode_count: u32, block_count: u32) -> MemDisk {
        let mut disk = MemDisk::new(block_count);
        format_device(&mut disk, &FormatOptions::new(fs_nr, inode_count)).unwrap();
        disk
    }

    fn fresh_fs(fs_nr: u8) -> KFileSystem<MemDisk> {
        let mut fs = KFileSystem::new();
        fs.register_device(formatted_disk(fs_nr, 6, 16)).unwrap();
        fs
    }

    #[test]
    fn registration_reads_fs_nr_from_device() {
        let mut fs = KFileSystem::new();
        assert_eq!(fs.register_device(formatted_disk(4, 6, 16)).unwrap(), 0);
        assert_eq!(fs.register_device(formatted_disk(7, 6, 16)).unwrap(), 1);
    }

    #[test]
    fn duplicate_fs_nr_is_rejected() {
        let mut fs = KFileSystem::new();
        fs.register_device(formatted_disk(4, 6, 16)).unwrap();
        match fs.register_device(formatted_disk(4, 6, 16)) {
            Err(FsError::DeviceExists(4)) => (),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn unformatted_device_is_rejected() {
        let mut fs = KFileSystem::new();
        match fs.register_device(MemDisk::new(16)) {
            Err(FsError::ReservedDeviceNr) => (),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn registry_capacity_is_distinct_from_collision() {
        let mut fs = KFileSystem::new();
        for fs_nr in 1..=10 {
            fs.register_device(formatted_disk(fs_nr, 6, 16)).unwrap();
        }
        match fs.register_device(formatted_disk(11, 6, 16)) {
            Err(FsError::RegistryFull) => (),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn inode_set_then_get_round_trips() {
        let mut fs = fresh_fs(2);
        let mut node = Inode::new(InodeId::new(2, 3), NodeType::File);
        node.uid = 5;
        node.gid = 2;
        node.permissions = PERM_ALL;
        node.n_bytes = 123;
        fs.set_inode(&node).unwrap();

        let read_back = fs.get_inode(InodeId::new(2, 3)).unwrap();
        assert_eq!(read_back.id, node.id);
        assert_eq!(read_back.uid, 5);
        assert_eq!(read_back.gid, 2);
        assert_eq!(read_back.n_bytes, 123);
    }

    #[test]
    fn set_inode_preserves_block_neighbor() {
        let mut fs = fresh_fs(2);
        // Indices 2 and 3 share a block.
        let a = Inode::new(InodeId::new(2, 2), NodeType::File);
        let b = Inode::new(InodeId::new(2, 3), NodeType::File);
        fs.set_inode(&a).unwrap();
        fs.set_inode(&b).unwrap();

        assert_eq!(fs.get_inode(a.id).unwrap().id, a.id);
        assert_eq!(fs.get_inode(b.id).unwrap().id, b.id);
    }

    #[test]
    fn set_inode_stamps_the_resolved_id() {
        let mut fs = fresh_fs(2);
        let mut root = fs.get_inode(InodeId::new(0, 1)).unwrap();
        root.id = InodeId::new(0, 1);
        root.uid = 7;
        fs.set_inode(&root).unwrap();

        // The shorthand id is rewritten to the real device number on disk.
        let stored = fs.get_inode(InodeId::new(2, 1)).unwrap();
        assert_eq!(stored.id, InodeId::new(2, 1));
        assert_eq!(stored.uid, 7);
    }

    #[test]
    fn out_of_bounds_index_is_reported() {
        let mut fs = fresh_fs(2);
        match fs.get_inode(InodeId::new(2, 6)) {
            Err(FsError::IndexOutOfBounds { idx: 6, limit: 6 }) => (),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn default_device_redirect_reaches_first_root() {
        let mut fs = KFileSystem::new();
        fs.register_device(formatted_disk(3, 6, 16)).unwrap();
        fs.register_device(formatted_disk(5, 6, 16)).unwrap();

        let root = fs.get_inode(InodeId::new(0, 1)).unwrap();
        assert_eq!(root.id, InodeId::new(3, 1));
        assert_eq!(root.node_type(), Some(NodeType::Directory));
    }

    #[test]
    fn alloc_inode_scans_from_index_two() {
        let mut fs = fresh_fs(2);
        let id = fs.alloc_inode(2).unwrap();
        assert_eq!(id, InodeId::new(2, 2));

        // Until the slot is persisted non-zero, allocation returns it again.
        fs.set_inode(&Inode::new(id, NodeType::File)).unwrap();
        assert_eq!(fs.alloc_inode(2).unwrap(), InodeId::new(2, 3));
    }

    #[test]
    fn inode_pool_exhaustion_is_reported() {
        let mut fs = fresh_fs(2);
        for _ in 0..4 {
            let id = fs.alloc_inode(2).unwrap();
            fs.set_inode(&Inode::new(id, NodeType::File)).unwrap();
        }
        match fs.alloc_inode(2) {
            Err(FsError::NoFreeInode(2)) => (),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn freed_inode_returns_to_the_pool() {
        let mut fs = fresh_fs(2);
        let id = fs.alloc_inode(2).unwrap();
        fs.set_inode(&Inode::new(id, NodeType::File)).unwrap();
        assert_eq!(fs.alloc_inode(2).unwrap(), InodeId::new(2, 3));

        fs.free_inode(id).unwrap();
        assert_eq!(fs.alloc_inode(2).unwrap(), id);
    }

    #[test]
    fn reserved_inodes_cannot_be_freed() {
        let mut fs = fresh_fs(2);
        match fs.free_inode(InodeId::new(2, 0)) {
            Err(FsError::ReservedInode(_)) => (),
            other => panic!("unexpected result: {:?}", other.err()),
        }
        match fs.free_inode(InodeId::new(2, 1)) {
            Err(FsError::ReservedInode(_)) => (),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }
}
