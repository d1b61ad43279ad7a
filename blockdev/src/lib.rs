mod file;
mod mem;

pub use file::{FileDisk, FileDiskBuilder};
pub use mem::MemDisk;

/// Size in bytes of a single device block. Disk drivers for this format
/// address storage in 512 byte sectors, so the filesystem block matches the
/// hardware block one to one.
pub const BLOCK_SIZE: usize = 512;

/// One device block worth of bytes.
pub type Block = [u8; BLOCK_SIZE];

/// The block number to access ranging from 0 (the first block) to n - 1 (the
/// last block) where n is number of blocks available.
pub type BlockNumber = u32;

/// The contract a disk driver exposes to the filesystem layer. Devices are
/// dumb block stores; all structure above the block level belongs to the
/// filesystem.
pub trait BlockDevice {
    /// Total number of addressable blocks on this device.
    fn block_count(&self) -> BlockNumber;

    /// Reads one block into the provided buffer.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range will return an error.
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut Block) -> std::io::Result<()>;

    /// Writes the provided buffer into the specified block.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range will return an error.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &Block) -> std::io::Result<()>;

    /// Flush any buffered disk IO from memory. This is useful if it must be
    /// guaranteed the writes actually occurred, for instance, if being
    /// re-read from disk.
    fn sync(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
