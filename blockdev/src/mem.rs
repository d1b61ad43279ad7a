use crate::{Block, BlockDevice, BlockNumber, BLOCK_SIZE};
use std::io::ErrorKind;

/// An in-memory block device, the userspace stand-in for a ramdisk driver.
/// Every block starts zeroed.
pub struct MemDisk {
    blocks: Vec<Block>,
}

impl MemDisk {
    pub fn new(block_count: BlockNumber) -> Self {
        Self {
            blocks: vec![[0; BLOCK_SIZE]; block_count as usize],
        }
    }
}

impl BlockDevice for MemDisk {
    fn block_count(&self) -> BlockNumber {
        self.blocks.len() as BlockNumber
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut Block) -> std::io::Result<()> {
        match self.blocks.get(blocknr as usize) {
            Some(block) => {
                buf.copy_from_slice(block);
                Ok(())
            }
            None => Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block out of range",
            )),
        }
    }

    fn write_block(&mut self, blocknr: BlockNumber, buf: &Block) -> std::io::Result<()> {
        match self.blocks.get_mut(blocknr as usize) {
            Some(block) => {
                block.copy_from_slice(buf);
                Ok(())
            }
            None => Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block out of range",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_start_zeroed() {
        let mut disk = MemDisk::new(4);
        let mut buf = [0xAA; BLOCK_SIZE];
        disk.read_block(3, &mut buf).unwrap();
        assert_eq!(&buf[..], &[0u8; BLOCK_SIZE][..]);
    }

    #[test]
    fn written_blocks_read_back() {
        let mut disk = MemDisk::new(4);
        let block = [0x55; BLOCK_SIZE];
        disk.write_block(2, &block).unwrap();

        let mut read_back = [0; BLOCK_SIZE];
        disk.read_block(2, &mut read_back).unwrap();
        assert_eq!(&read_back[..], &block[..]);

        // A neighboring block stays untouched.
        disk.read_block(1, &mut read_back).unwrap();
        assert_eq!(&read_back[..], &[0u8; BLOCK_SIZE][..]);
    }

    #[test]
    fn out_of_range_access_fails() {
        let mut disk = MemDisk::new(2);
        let mut buf = [0; BLOCK_SIZE];
        assert!(disk.read_block(2, &mut buf).is_err());
        assert!(disk.write_block(7, &buf).is_err());
    }
}
