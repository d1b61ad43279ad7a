//! On-disk record layout.
//!
//! Every node on a device — file, directory, or the device metadata node —
//! is one fixed 256 byte record. Two records share each 512 byte block, so
//! all record updates are read-modify-write at the block level.

use crate::error::{FsError, Result};
use blockdev::BLOCK_SIZE;
use std::fmt;
use zerocopy::{AsBytes, FromBytes};

/// Size of one inode record on disk.
pub const NODE_SIZE: usize = 256;

/// How many inode records fit in one block.
pub const INODES_PER_BLOCK: u32 = (BLOCK_SIZE / NODE_SIZE) as u32;

/// Direct pointer slots per inode.
pub const NUM_DIRECT_POINTERS: usize = 14;

/// Raw block pointers packed into one direct pointer slot.
pub const BLOCKS_PER_SLOT: usize = 4;

/// The most data blocks a file can reference without the (unsupported)
/// indirect block.
pub const MAX_FILE_BLOCKS: usize = NUM_DIRECT_POINTERS * BLOCKS_PER_SLOT;

/// Directory entry names are fixed 12 byte, NUL padded fields.
pub const MAX_FILENAME_SIZE: usize = 12;

/// Block containing the inode record at `idx`.
pub fn inode_block(idx: u32) -> u32 {
    idx / INODES_PER_BLOCK
}

/// Byte offset of the inode record at `idx` inside its containing block.
pub fn inode_offset(idx: u32) -> usize {
    let offset = (idx % INODES_PER_BLOCK) as usize * NODE_SIZE;
    debug_assert!(offset + NODE_SIZE <= BLOCK_SIZE);
    offset
}

/// What a node is, recorded in the low byte of the on-disk type field. The
/// interpretation of the direct pointer slots hangs off this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    File,
    Directory,
    Metadata,
}

impl NodeType {
    pub(crate) fn from_raw(raw: u8) -> Option<NodeType> {
        match raw {
            1 => Some(NodeType::File),
            2 => Some(NodeType::Directory),
            3 => Some(NodeType::Metadata),
            _ => None,
        }
    }

    pub(crate) fn raw(self) -> u8 {
        match self {
            NodeType::File => 1,
            NodeType::Directory => 2,
            NodeType::Metadata => 3,
        }
    }
}

/// Globally stable node identity: the device's filesystem number plus the
/// record index on that device. An all-zero id marks a free inode slot.
#[repr(C)]
#[derive(AsBytes, FromBytes, Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeId {
    pub dev: u8,
    reserved: u8,
    pub idx: u16,
}

impl InodeId {
    pub const fn new(dev: u8, idx: u16) -> Self {
        Self {
            dev,
            reserved: 0,
            idx,
        }
    }

    /// The free-slot sentinel.
    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn is_none(&self) -> bool {
        self.dev == 0 && self.idx == 0
    }
}

impl fmt::Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dev, self.idx)
    }
}

/// One directory entry: a NUL padded name and the node it links to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; MAX_FILENAME_SIZE],
    pub id: InodeId,
}

impl DirEntry {
    pub fn new(name: &str, id: InodeId) -> Self {
        Self {
            name: pack_name(name),
            id,
        }
    }

    /// The entry name as a string, stopping at the first NUL.
    pub fn name_str(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_FILENAME_SIZE);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

/// Truncates at 12 bytes and NUL pads, matching the on-disk name field.
pub(crate) fn pack_name(name: &str) -> [u8; MAX_FILENAME_SIZE] {
    let mut packed = [0u8; MAX_FILENAME_SIZE];
    let bytes = name.as_bytes();
    let len = bytes.len().min(MAX_FILENAME_SIZE);
    packed[..len].copy_from_slice(&bytes[..len]);
    packed
}

/// One 16 byte direct pointer slot. Files and the metadata node treat a slot
/// as four raw block numbers; directories treat it as one directory entry.
/// The typed accessors on [`Inode`] enforce that split — nothing outside this
/// module reinterprets the bytes directly.
#[repr(C)]
#[derive(AsBytes, FromBytes, Clone, Copy)]
pub struct DataSlot {
    bytes: [u8; 16],
}

impl DataSlot {
    fn zeroed() -> Self {
        Self { bytes: [0; 16] }
    }

    fn block(&self, sub: usize) -> u32 {
        debug_assert!(sub < BLOCKS_PER_SLOT);
        let off = sub * 4;
        u32::from_le_bytes([
            self.bytes[off],
            self.bytes[off + 1],
            self.bytes[off + 2],
            self.bytes[off + 3],
        ])
    }

    fn set_block(&mut self, sub: usize, blocknr: u32) {
        debug_assert!(sub < BLOCKS_PER_SLOT);
        let off = sub * 4;
        self.bytes[off..off + 4].copy_from_slice(&blocknr.to_le_bytes());
    }

    fn dir_entry(&self) -> DirEntry {
        let mut name = [0u8; MAX_FILENAME_SIZE];
        name.copy_from_slice(&self.bytes[..MAX_FILENAME_SIZE]);
        let id = InodeId {
            dev: self.bytes[12],
            reserved: self.bytes[13],
            idx: u16::from_le_bytes([self.bytes[14], self.bytes[15]]),
        };
        DirEntry { name, id }
    }

    fn set_dir_entry(&mut self, entry: &DirEntry) {
        self.bytes[..MAX_FILENAME_SIZE].copy_from_slice(&entry.name);
        self.bytes[12] = entry.id.dev;
        self.bytes[13] = 0;
        self.bytes[14..16].copy_from_slice(&entry.id.idx.to_le_bytes());
    }
}

/// The fixed 256 byte on-disk inode record.
///
/// The same layout serves files, directories, and the two reserved nodes on
/// each device (metadata at index 0, root directory at index 1). Field
/// meaning shifts with the node type:
///
/// * files: `n_bytes` is content length, `n_blocks` counts allocated data
///   blocks, `n_refs` is the link count;
/// * directories: `n_bytes` counts occupied entry slots (contiguous from
///   slot 0), `n_blocks` is unused;
/// * metadata node: `n_bytes` is the device byte size, `n_blocks` the bitmap
///   block count, `n_refs` the device inode count.
#[repr(C)]
#[derive(AsBytes, FromBytes, Clone, Copy)]
pub struct Inode {
    pub id: InodeId,
    pub n_blocks: u32,
    pub n_bytes: u32,
    pub n_refs: u32,

    pub uid: u16,
    pub gid: u16,
    /// Six meaningful bits: owner/group/other read and write.
    pub permissions: u8,
    perm_pad: [u8; 2],
    node_type: u8,

    lock: u8,
    pad: [u8; 3],

    /// Reserved single indirect block pointer. Present in the layout but
    /// unimplemented; any path that would need it fails with `Unsupported`.
    pub ext_block: u32,

    direct: [DataSlot; NUM_DIRECT_POINTERS],
}

impl Inode {
    pub fn zeroed() -> Self {
        Self {
            id: InodeId::none(),
            n_blocks: 0,
            n_bytes: 0,
            n_refs: 0,
            uid: 0,
            gid: 0,
            permissions: 0,
            perm_pad: [0; 2],
            node_type: 0,
            lock: 0,
            pad: [0; 3],
            ext_block: 0,
            direct: [DataSlot::zeroed(); NUM_DIRECT_POINTERS],
        }
    }

    pub fn new(id: InodeId, node_type: NodeType) -> Self {
        let mut node = Self::zeroed();
        node.id = id;
        node.node_type = node_type.raw();
        node
    }

    /// Copies a record out of a block buffer slice of exactly `NODE_SIZE`.
    pub fn parse(src: &[u8]) -> Self {
        let mut node = Self::zeroed();
        node.as_bytes_mut().copy_from_slice(src);
        node
    }

    /// Serializes this record into a `NODE_SIZE` slice of a block buffer.
    pub fn store(&self, dst: &mut [u8]) {
        dst.copy_from_slice(self.as_bytes());
    }

    pub fn node_type(&self) -> Option<NodeType> {
        NodeType::from_raw(self.node_type)
    }

    pub fn set_node_type(&mut self, node_type: NodeType) {
        self.node_type = node_type.raw();
    }

    /// Whether this record is the free-slot sentinel.
    pub fn is_free(&self) -> bool {
        self.id.is_none()
    }

    fn require_file(&self) -> Result<()> {
        match self.node_type() {
            Some(NodeType::File) | Some(NodeType::Metadata) => Ok(()),
            _ => Err(FsError::NotAFile(self.id)),
        }
    }

    fn require_dir(&self) -> Result<()> {
        match self.node_type() {
            Some(NodeType::Directory) => Ok(()),
            _ => Err(FsError::NotADirectory(self.id)),
        }
    }

    /// The `idx`th data block number of a file node.
    pub fn block_at(&self, idx: u32) -> Result<u32> {
        self.require_file()?;
        if idx as usize >= MAX_FILE_BLOCKS {
            return Err(FsError::Unsupported);
        }
        if idx >= self.n_blocks {
            return Err(FsError::IndexOutOfBounds {
                idx,
                limit: self.n_blocks,
            });
        }
        let slot = idx as usize / BLOCKS_PER_SLOT;
        Ok(self.direct[slot].block(idx as usize % BLOCKS_PER_SLOT))
    }

    /// Records a data block number into a file node's pointer array. Does
    /// not touch `n_blocks`; the caller owns the accounting.
    pub fn set_block_at(&mut self, idx: u32, blocknr: u32) -> Result<()> {
        self.require_file()?;
        if idx as usize >= MAX_FILE_BLOCKS {
            return Err(FsError::Unsupported);
        }
        let slot = idx as usize / BLOCKS_PER_SLOT;
        self.direct[slot].set_block(idx as usize % BLOCKS_PER_SLOT, blocknr);
        Ok(())
    }

    /// The `idx`th directory entry of a directory node.
    pub fn entry_at(&self, idx: u32) -> Result<DirEntry> {
        self.require_dir()?;
        if idx >= self.n_bytes {
            return Err(FsError::IndexOutOfBounds {
                idx,
                limit: self.n_bytes,
            });
        }
        Ok(self.direct[idx as usize].dir_entry())
    }

    /// Writes a directory entry into slot `idx`. Does not touch `n_bytes`;
    /// the caller owns the accounting.
    pub fn set_entry_at(&mut self, idx: u32, entry: &DirEntry) -> Result<()> {
        self.require_dir()?;
        if idx as usize >= NUM_DIRECT_POINTERS {
            return Err(FsError::DirectoryFull);
        }
        self.direct[idx as usize].set_dir_entry(entry);
        Ok(())
    }

    pub fn clear_entry_at(&mut self, idx: u32) -> Result<()> {
        self.require_dir()?;
        if idx as usize >= NUM_DIRECT_POINTERS {
            return Err(FsError::IndexOutOfBounds {
                idx,
                limit: NUM_DIRECT_POINTERS as u32,
            });
        }
        self.direct[idx as usize] = DataSlot::zeroed();
        Ok(())
    }
}
