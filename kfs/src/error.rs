use crate::node::InodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FsError>;

/// Every failure a filesystem operation can surface. Callers routing on a
/// failure (directory removal, the syscall layer) need the kinds to stay
/// distinguishable, so there is no catch-all variant.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("no device registered with filesystem number {0}")]
    DeviceNotFound(u8),
    #[error("filesystem number {0} is already registered")]
    DeviceExists(u8),
    #[error("device table is full")]
    RegistryFull,
    #[error("filesystem number 0 is reserved")]
    ReservedDeviceNr,
    #[error("index {idx} out of bounds (limit {limit})")]
    IndexOutOfBounds { idx: u32, limit: u32 },
    #[error("inode {0} is reserved and cannot be freed")]
    ReservedInode(InodeId),
    #[error("device i/o failed")]
    Io(#[from] std::io::Error),
    #[error("inode {0} is not a directory")]
    NotADirectory(InodeId),
    #[error("inode {0} is not a file")]
    NotAFile(InodeId),
    #[error("directory already has an entry named {0:?}")]
    NameCollision(String),
    #[error("no directory entry named {0:?}")]
    NameNotFound(String),
    #[error("directory {0} is not empty")]
    NotEmpty(InodeId),
    #[error("no free inode on device {0}")]
    NoFreeInode(u8),
    #[error("no free data block on device {0}")]
    NoFreeBlock(u8),
    #[error("directory entry table is full")]
    DirectoryFull,
    #[error("operation requires the indirect block, which is unsupported")]
    Unsupported,
    #[error("permission denied")]
    PermissionDenied,
    #[error("descriptor desynchronized: {0}")]
    Desync(&'static str),
    #[error("end of file")]
    EndOfFile,
    #[error("entry added but the target reference count update failed")]
    RefUpdate(#[source] Box<FsError>),
    #[error("cannot format device: {0}")]
    Format(&'static str),
}
