//! File data I/O through an inode's direct block pointers.

use crate::error::{FsError, Result};
use crate::fs::KFileSystem;
use crate::node::{Inode, InodeId, NodeType, MAX_FILE_BLOCKS};
use blockdev::{BlockDevice, BLOCK_SIZE};
use log::warn;

/// A caller-held cursor over one file: the inode id plus the byte offset the
/// next read or write starts at. The filesystem holds no per-file state of
/// its own; descriptor tables live in the calling layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle {
    pub id: InodeId,
    pub offset: u32,
}

impl FileHandle {
    pub fn new(id: InodeId) -> Self {
        Self { id, offset: 0 }
    }
}

impl<D: BlockDevice> KFileSystem<D> {
    /// Reads from the handle's offset into `buf`, advancing the offset.
    /// Returns the number of bytes read, which may be short of the buffer:
    /// the read stops at end of file and at the direct-pointer capacity
    /// boundary (a partial read is not an error). A read starting exactly at
    /// end of file reports `EndOfFile` instead of a zero-length success.
    pub fn read(&mut self, handle: &mut FileHandle, buf: &mut [u8]) -> Result<usize> {
        let inode = self.get_inode(handle.id)?;
        if inode.node_type() != Some(NodeType::File) {
            return Err(FsError::NotAFile(handle.id));
        }
        if handle.offset == inode.n_bytes {
            return Err(FsError::EndOfFile);
        }
        let n = self.read_node(&inode, handle.offset, buf)?;
        handle.offset += n as u32;
        Ok(n)
    }

    /// Positional read without a descriptor, used by callers that walk a
    /// file from arbitrary offsets (path resolution, loaders).
    pub fn read_at(&mut self, id: InodeId, offset: u32, buf: &mut [u8]) -> Result<usize> {
        let inode = self.get_inode(id)?;
        if inode.node_type() != Some(NodeType::File) {
            return Err(FsError::NotAFile(id));
        }
        if offset == inode.n_bytes {
            return Err(FsError::EndOfFile);
        }
        self.read_node(&inode, offset, buf)
    }

    fn read_node(&mut self, inode: &Inode, offset: u32, buf: &mut [u8]) -> Result<usize> {
        if offset > inode.n_bytes {
            return Err(FsError::Desync("read cursor past end of file"));
        }
        let want = (buf.len() as u32).min(inode.n_bytes - offset) as usize;

        let mut nread = 0;
        while nread < want {
            let pos = offset + nread as u32;
            let block_idx = pos / BLOCK_SIZE as u32;
            if block_idx as usize >= MAX_FILE_BLOCKS {
                // Content past the direct pointers would need the indirect
                // block; stop with what we have.
                break;
            }
            let blocknr = inode.block_at(block_idx)?;
            let dev = self.registry.resolve(inode.id.dev)?;
            dev.read_block(blocknr, &mut self.data_buf)?;

            let intra = (pos as usize) % BLOCK_SIZE;
            let chunk = (BLOCK_SIZE - intra).min(want - nread);
            buf[nread..nread + chunk].copy_from_slice(&self.data_buf[intra..intra + chunk]);
            nread += chunk;
        }
        Ok(nread)
    }

    /// Appends `buf` at the handle's offset, which must sit exactly at the
    /// end of the file — interior writes are unsupported and fail with
    /// `Desync`. Data blocks are allocated on demand; when the direct
    /// pointers run out the count written so far is returned rather than an
    /// error. The inode is persisted once after the loop, so on an I/O
    /// failure partway through it still reflects every block that made it to
    /// disk.
    pub fn write(&mut self, handle: &mut FileHandle, buf: &[u8]) -> Result<usize> {
        let mut inode = self.get_inode(handle.id)?;
        if inode.node_type() != Some(NodeType::File) {
            return Err(FsError::NotAFile(handle.id));
        }
        if handle.offset != inode.n_bytes {
            return Err(FsError::Desync("write cursor must sit at end of file"));
        }

        let mut written = 0;
        let outcome = loop {
            if written == buf.len() {
                break Ok(());
            }
            let pos = inode.n_bytes;
            let block_idx = pos / BLOCK_SIZE as u32;
            if block_idx as usize >= MAX_FILE_BLOCKS {
                // Direct pointers exhausted: report the partial count.
                break Ok(());
            }

            let blocknr = if block_idx == inode.n_blocks {
                match self.alloc_block(inode.id.dev) {
                    Ok(blocknr) => {
                        inode.set_block_at(block_idx, blocknr)?;
                        inode.n_blocks += 1;
                        blocknr
                    }
                    Err(e) => break Err(e),
                }
            } else if block_idx < inode.n_blocks {
                match inode.block_at(block_idx) {
                    Ok(blocknr) => blocknr,
                    Err(e) => break Err(e),
                }
            } else {
                break Err(FsError::Desync("block index ran ahead of allocation count"));
            };

            let intra = (pos as usize) % BLOCK_SIZE;
            if intra != 0 {
                // Tail block already holds content; fetch it before patching.
                let dev = match self.registry.resolve(inode.id.dev) {
                    Ok(dev) => dev,
                    Err(e) => break Err(e),
                };
                if let Err(e) = dev.read_block(blocknr, &mut self.data_buf) {
                    break Err(e.into());
                }
            } else {
                self.data_buf = [0; BLOCK_SIZE];
            }

            let chunk = (BLOCK_SIZE - intra).min(buf.len() - written);
            self.data_buf[intra..intra + chunk].copy_from_slice(&buf[written..written + chunk]);

            let dev = match self.registry.resolve(inode.id.dev) {
                Ok(dev) => dev,
                Err(e) => break Err(e),
            };
            if let Err(e) = dev.write_block(blocknr, &self.data_buf) {
                break Err(e.into());
            }
            written += chunk;
            inode.n_bytes += chunk as u32;
        };

        // Persist the accounting for whatever succeeded, even on the error
        // path — the inode must never claim bytes that did not reach disk.
        if let Err(e) = &outcome {
            warn!("write to {} stopped early: {}", inode.id, e);
        }
        self.set_inode(&inode)?;
        handle.offset = inode.n_bytes;
        outcome.map(|_| written)
    }
}
