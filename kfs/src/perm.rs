//! The permission model: a pure function of one inode and the caller's
//! credentials. Bits only ever accumulate across the owner/group/other
//! tiers — a caller can gain access through several matching tiers but
//! never lose it.

use crate::error::Result;
use crate::fs::KFileSystem;
use crate::node::{Inode, InodeId};
use blockdev::BlockDevice;

/// The superuser: bypasses every check.
pub const UID_ROOT: u16 = 0;
/// Members of the sudo group bypass every check too.
pub const GID_SUDO: u16 = 1;
/// A caller running under gid 0 is in their own private "user group"; group
/// bits then apply against ownership rather than a shared group.
pub const GID_USER: u16 = 0;

pub const PERM_OWNER_READ: u8 = 0x01;
pub const PERM_OWNER_WRITE: u8 = 0x02;
pub const PERM_GROUP_READ: u8 = 0x04;
pub const PERM_GROUP_WRITE: u8 = 0x08;
pub const PERM_OTHER_READ: u8 = 0x10;
pub const PERM_OTHER_WRITE: u8 = 0x20;
/// All six permission bits set.
pub const PERM_ALL: u8 = 0x3F;

/// What a given caller may do with a node. `meta` covers changing
/// ownership, permissions, and other attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub read: bool,
    pub write: bool,
    pub meta: bool,
}

impl Access {
    const ALL: Access = Access {
        read: true,
        write: true,
        meta: true,
    };
}

/// Computes a caller's access to a node. Root and sudo bypass everything;
/// otherwise meta access requires ownership, and read/write build up from
/// the "other" bits through the group and owner tiers.
pub fn node_permission(node: &Inode, uid: u16, gid: u16) -> Access {
    if uid == UID_ROOT || gid == GID_SUDO {
        return Access::ALL;
    }

    let perms = node.permissions;
    let mut read = perms & PERM_OTHER_READ != 0;
    let mut write = perms & PERM_OTHER_WRITE != 0;

    if (gid == GID_USER && node.uid == uid) || gid == node.gid {
        read |= perms & PERM_GROUP_READ != 0;
        write |= perms & PERM_GROUP_WRITE != 0;
    }
    if uid == node.uid {
        read |= perms & PERM_OWNER_READ != 0;
        write |= perms & PERM_OWNER_WRITE != 0;
    }

    Access {
        read,
        write,
        meta: uid == node.uid,
    }
}

impl<D: BlockDevice> KFileSystem<D> {
    /// [`node_permission`] against an inode loaded from disk.
    pub fn check_permission(&mut self, id: InodeId, uid: u16, gid: u16) -> Result<Access> {
        let node = self.get_inode(id)?;
        Ok(node_permission(&node, uid, gid))
    }
}
