use crate::{Block, BlockDevice, BlockNumber, BLOCK_SIZE};
use std::fs::File;
use std::io::prelude::*;
use std::io::{BufWriter, ErrorKind, SeekFrom};

/// Emulates block disk/flash storage in userspace using a file as block
/// storage. This is only meant to be used for filesystem development and
/// testing.
pub struct FileDisk {
    /// The file must be a fixed-size file some exact multiple of the size of
    /// a block.
    fd: File,
    /// The total number of blocks available in the file store.
    block_count: BlockNumber,
}

impl FileDisk {
    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }
}

impl BlockDevice for FileDisk {
    fn block_count(&self) -> BlockNumber {
        self.block_count
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut Block) -> std::io::Result<()> {
        if blocknr >= self.block_count {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block out of range",
            ));
        }
        self.fd
            .seek(SeekFrom::Start(blocknr as u64 * BLOCK_SIZE as u64))?;
        self.fd.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&mut self, blocknr: BlockNumber, buf: &Block) -> std::io::Result<()> {
        if blocknr >= self.block_count {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block out of range",
            ));
        }
        self.fd
            .seek(SeekFrom::Start(blocknr as u64 * BLOCK_SIZE as u64))?;
        self.fd.write_all(buf)?;
        Ok(())
    }

    fn sync(&mut self) -> std::io::Result<()> {
        self.fd.sync_all()
    }
}

pub struct FileDiskBuilder {
    fd: File,
    block_count: BlockNumber,
    clear_medium: bool,
}

impl From<File> for FileDiskBuilder {
    fn from(fd: File) -> Self {
        FileDiskBuilder {
            fd,
            block_count: 0,
            clear_medium: true,
        }
    }
}

impl FileDiskBuilder {
    /// Sets the number of desired blocks in the block store device.
    pub fn with_block_count(mut self, blocks: BlockNumber) -> Self {
        self.block_count = blocks;
        self
    }

    /// Controls whether the backing file is zeroed during build. Disable to
    /// reopen an already initialized disk.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear_medium = clear;
        self
    }

    /// This builder assumes ownership of the file descriptor used and does
    /// destructive things to prepare the file for use. Ownership of the file
    /// is transferred to the emulator, meaning this builder can only be used
    /// to create one emulator.
    pub fn build(mut self) -> std::io::Result<FileDisk> {
        debug_assert!(self.block_count > 0);
        if self.clear_medium {
            self.zero_blocks()?;
        }
        Ok(FileDisk {
            fd: self.fd,
            block_count: self.block_count,
        })
    }

    fn zero_blocks(&mut self) -> std::io::Result<()> {
        self.fd.seek(SeekFrom::Start(0))?;
        let mut bfd = BufWriter::new(&self.fd);
        // Zero out the "disk" blocks, buffering each write to prevent
        // excessive syscalls.
        for _ in 0..self.block_count {
            bfd.write_all(&[0x00; BLOCK_SIZE])?;
        }
        bfd.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_disk_allocates_correct_num_bytes() {
        let backing = tempfile::tempfile().unwrap();
        let mut disk = FileDiskBuilder::from(backing)
            .with_block_count(4)
            .build()
            .expect("failed to allocate file disk");
        disk.sync().unwrap();
        assert_eq!(
            disk.into_file().metadata().unwrap().len(),
            4 * BLOCK_SIZE as u64
        );
    }

    #[test]
    fn can_read_and_write_blocks() {
        let backing = tempfile::tempfile().unwrap();
        let mut disk = FileDiskBuilder::from(backing)
            .with_block_count(4)
            .build()
            .expect("failed to allocate file disk");

        let block = [0x55; BLOCK_SIZE];
        disk.write_block(2, &block).unwrap();
        disk.sync().unwrap();

        // A different block stays zeroed.
        let mut read_back = [0xFF; BLOCK_SIZE];
        disk.read_block(3, &mut read_back).unwrap();
        assert_eq!(&read_back[..], &[0u8; BLOCK_SIZE][..]);

        disk.read_block(2, &mut read_back).unwrap();
        assert_eq!(&read_back[..], &block[..]);
    }

    #[test]
    fn block_beyond_range_fails() {
        let backing = tempfile::tempfile().unwrap();
        let mut disk = FileDiskBuilder::from(backing)
            .with_block_count(1)
            .build()
            .expect("failed to allocate file disk");

        let block = [0x55; BLOCK_SIZE];
        assert!(disk.write_block(1, &block).is_err());
    }

    #[test]
    fn reopened_disk_preserves_contents() {
        let backing = tempfile::NamedTempFile::new().unwrap();
        let mut disk = FileDiskBuilder::from(backing.reopen().unwrap())
            .with_block_count(2)
            .build()
            .unwrap();
        let block = [0x42; BLOCK_SIZE];
        disk.write_block(1, &block).unwrap();
        disk.sync().unwrap();

        let mut reopened = FileDiskBuilder::from(backing.reopen().unwrap())
            .with_block_count(2)
            .clear_medium(false)
            .build()
            .unwrap();
        let mut read_back = [0; BLOCK_SIZE];
        reopened.read_block(1, &mut read_back).unwrap();
        assert_eq!(&read_back[..], &block[..]);
    }
}
