//! Directory operations.
//!
//! A directory keeps its entries in the same 16 byte slots a file uses for
//! block pointers: one entry per slot, `n_bytes` counting occupied slots.
//! Entries stay contiguous from slot 0 — removal moves the last entry into
//! the vacated slot instead of leaving a hole.

use crate::error::{FsError, Result};
use crate::fs::KFileSystem;
use crate::node::{pack_name, DirEntry, Inode, InodeId, NodeType, NUM_DIRECT_POINTERS};
use blockdev::BlockDevice;

impl<D: BlockDevice> KFileSystem<D> {
    /// Links `target` into a directory under `name`. Two on-disk updates:
    /// the directory gains the entry, then the target's reference count is
    /// bumped. A failure in the second step leaves the entry in place and
    /// surfaces as `RefUpdate` so the caller can tell the steps apart.
    pub fn add_dir_entry(&mut self, dir: InodeId, name: &str, target: InodeId) -> Result<()> {
        let mut dnode = self.get_inode(dir)?;
        if dnode.node_type() != Some(NodeType::Directory) {
            return Err(FsError::NotADirectory(dir));
        }
        if dnode.n_bytes as usize >= NUM_DIRECT_POINTERS {
            return Err(FsError::DirectoryFull);
        }

        let packed = pack_name(name);
        for i in 0..dnode.n_bytes {
            if dnode.entry_at(i)?.name == packed {
                return Err(FsError::NameCollision(name.to_string()));
            }
        }

        let slot = dnode.n_bytes;
        dnode.set_entry_at(slot, &DirEntry { name: packed, id: target })?;
        dnode.n_bytes += 1;
        self.set_inode(&dnode)?;

        let bump = self.get_inode(target).and_then(|mut tnode| {
            tnode.n_refs += 1;
            self.set_inode(&tnode)
        });
        bump.map_err(|e| FsError::RefUpdate(Box::new(e)))
    }

    /// Unlinks `name` from a directory. The target's reference count drops;
    /// at zero the target inode is freed along with its data blocks. The
    /// directory is then compacted by moving its last entry into the gap.
    pub fn remove_dir_entry(&mut self, dir: InodeId, name: &str) -> Result<()> {
        let mut dnode = self.get_inode(dir)?;
        if dnode.node_type() != Some(NodeType::Directory) {
            return Err(FsError::NotADirectory(dir));
        }

        let packed = pack_name(name);
        let mut found = None;
        for i in 0..dnode.n_bytes {
            if dnode.entry_at(i)?.name == packed {
                found = Some(i);
                break;
            }
        }
        let slot = found.ok_or_else(|| FsError::NameNotFound(name.to_string()))?;
        let target = dnode.entry_at(slot)?.id;

        let tnode = self.get_inode(target)?;
        if tnode.n_refs <= 1 {
            // Last link: collapse the node. Refuses non-empty directories.
            self.free_inode(target)?;
        } else {
            let mut tnode = tnode;
            tnode.n_refs -= 1;
            self.set_inode(&tnode)?;
        }

        let last = dnode.n_bytes - 1;
        if slot != last {
            let moved = dnode.entry_at(last)?;
            dnode.set_entry_at(slot, &moved)?;
        }
        dnode.clear_entry_at(last)?;
        dnode.n_bytes -= 1;
        self.set_inode(&dnode)
    }

    /// Resolves `name` inside a directory to the node it links to.
    pub fn lookup(&mut self, dir: InodeId, name: &str) -> Result<InodeId> {
        let dnode = self.get_inode(dir)?;
        if dnode.node_type() != Some(NodeType::Directory) {
            return Err(FsError::NotADirectory(dir));
        }
        let packed = pack_name(name);
        for i in 0..dnode.n_bytes {
            let entry = dnode.entry_at(i)?;
            if entry.name == packed {
                return Ok(entry.id);
            }
        }
        Err(FsError::NameNotFound(name.to_string()))
    }

    /// Positional entry access for directory enumeration.
    pub fn dir_entry_at(&mut self, dir: InodeId, idx: u32) -> Result<DirEntry> {
        let dnode = self.get_inode(dir)?;
        dnode.entry_at(idx)
    }

    /// Allocates and initializes a fresh node, then links it into `dir`
    /// under `name`. The new node starts with a zero reference count; the
    /// link bumps it to one. The link is validated up front, so a failed
    /// create leaves the inode pool untouched.
    pub fn create_node(
        &mut self,
        dir: InodeId,
        name: &str,
        node_type: NodeType,
        uid: u16,
        gid: u16,
        permissions: u8,
    ) -> Result<InodeId> {
        let dnode = self.get_inode(dir)?;
        if dnode.node_type() != Some(NodeType::Directory) {
            return Err(FsError::NotADirectory(dir));
        }
        // Validate the link before touching the inode pool: a persisted
        // record with no directory entry can never be freed.
        if dnode.n_bytes as usize >= NUM_DIRECT_POINTERS {
            return Err(FsError::DirectoryFull);
        }
        let packed = pack_name(name);
        for i in 0..dnode.n_bytes {
            if dnode.entry_at(i)?.name == packed {
                return Err(FsError::NameCollision(name.to_string()));
            }
        }

        let id = self.alloc_inode(dnode.id.dev)?;
        let mut node = Inode::new(id, node_type);
        node.uid = uid;
        node.gid = gid;
        node.permissions = permissions;
        self.set_inode(&node)?;

        self.add_dir_entry(dnode.id, name, id)?;
        Ok(id)
    }
}
