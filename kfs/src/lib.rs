//! An on-disk inode filesystem over raw block devices.
//!
//! The format is fixed: 512 byte blocks, 256 byte inode records (two per
//! block), a free-block bitmap between the inode table and the data region,
//! and 14 direct pointer slots per inode that double as either raw block
//! pointers or packed directory entries. Up to ten devices register into
//! one [`KFileSystem`], each routed by the filesystem number stored in its
//! own metadata inode.
//!
//! Path traversal and descriptor tables belong to the calling layer; this
//! crate exposes the node-level operations they are built from.

mod alloc;
mod dir;
mod error;
mod file;
mod format;
mod fs;
mod node;
mod perm;
mod registry;

pub use crate::error::{FsError, Result};
pub use crate::file::FileHandle;
pub use crate::format::{format_device, FormatOptions};
pub use crate::fs::KFileSystem;
pub use crate::node::{
    DirEntry, Inode, InodeId, NodeType, INODES_PER_BLOCK, MAX_FILENAME_SIZE, MAX_FILE_BLOCKS,
    NODE_SIZE, NUM_DIRECT_POINTERS,
};
pub use crate::perm::{
    node_permission, Access, GID_SUDO, GID_USER, PERM_ALL, PERM_GROUP_READ, PERM_GROUP_WRITE,
    PERM_OTHER_READ, PERM_OTHER_WRITE, PERM_OWNER_READ, PERM_OWNER_WRITE, UID_ROOT,
};
pub use crate::registry::MAX_DISKS;
pub use blockdev::{
    Block, BlockDevice, BlockNumber, FileDisk, FileDiskBuilder, MemDisk, BLOCK_SIZE,
};
