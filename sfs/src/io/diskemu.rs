use crate::config::DEFAULT_BLOCK_SIZE;
use crate::io::block::{check_extent, BlockNumber, BlockStorage};
use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{BufWriter, ErrorKind, SeekFrom};
use std::path::Path;

/// Emulates block disk/flash storage in userspace using a file as block storage.
/// This is only meant to be used for file system development and testing.
pub struct FileBlockEmulator {
    /// The file must be a fixed-size file some exact multiple of the size of a block.
    fd: File,
    /// The size of each block in bytes.
    block_size: usize,
    /// The total number of blocks available in the file store.
    block_count: usize,
}

impl FileBlockEmulator {
    /// Creates a fresh store of `nblocks` zeroed blocks at `dest`. Fails if a file
    /// already exists at that path.
    pub fn create_disk<P: AsRef<Path>>(
        dest: P,
        block_size: usize,
        nblocks: usize,
    ) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(dest)?;
        FileBlockEmulatorBuilder::from(file)
            .with_block_size(block_size)
            .with_block_count(nblocks)
            .build()
    }

    /// Opens a disk at the specified path. This method does not validate the
    /// storage blocks, it is up for clients to ensure disks are appropriately
    /// initialized.
    pub fn open_disk<P: AsRef<Path>>(
        dest: P,
        block_size: usize,
        nblocks: usize,
    ) -> std::io::Result<Self> {
        // Return error if the file does not exist rather than create one.
        let file = OpenOptions::new().read(true).write(true).open(dest)?;
        FileBlockEmulatorBuilder::from(file)
            .with_block_size(block_size)
            .with_block_count(nblocks)
            .clear_medium(false)
            .build()
    }

    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }
}

impl BlockStorage for FileBlockEmulator {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        self.block_count
    }

    fn read_blocks(&mut self, start: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        check_extent(start, buf.len(), self.block_size, self.block_count)?;
        self.fd
            .seek(SeekFrom::Start((start * self.block_size) as u64))?;
        self.fd.read_exact(buf)
    }

    fn write_blocks(&mut self, start: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        check_extent(start, buf.len(), self.block_size, self.block_count)?;
        self.fd
            .seek(SeekFrom::Start((start * self.block_size) as u64))?;
        self.fd.write_all(buf)
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        self.fd.sync_all()?;
        Ok(())
    }
}

pub struct FileBlockEmulatorBuilder {
    fd: File,
    block_size: usize,
    block_count: usize,
    clear_medium: bool,
}

impl From<File> for FileBlockEmulatorBuilder {
    fn from(fd: File) -> Self {
        FileBlockEmulatorBuilder {
            fd,
            block_size: DEFAULT_BLOCK_SIZE,
            // A better default here might be the size of the file rounded down
            // to the nearest block.
            block_count: 0,
            clear_medium: true,
        }
    }
}

impl FileBlockEmulatorBuilder {
    /// Sets the size in bytes of each block.
    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    /// Sets the number of desired blocks in the block store device.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// Whether to zero the whole medium when building. Turn this off to reattach
    /// to a disk that already holds data.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear_medium = clear;
        self
    }

    /// This builder assumed ownership of the file descriptor used and does
    /// destructive things to prepare the file for use. Additionally, ownership
    /// of the file is transfered to the emulator meaning this builder can only
    /// be used to create one emulator.
    pub fn build(mut self) -> std::io::Result<FileBlockEmulator> {
        if self.block_size == 0 || self.block_count == 0 {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block size and block count must be non-zero",
            ));
        }
        if self.clear_medium {
            self.zero_blocks()?;
        } else {
            let expected = (self.block_size * self.block_count) as u64;
            if self.fd.metadata()?.len() < expected {
                return Err(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "disk file is smaller than the requested geometry",
                ));
            }
        }
        Ok(FileBlockEmulator {
            fd: self.fd,
            block_size: self.block_size,
            block_count: self.block_count,
        })
    }

    fn zero_blocks(&mut self) -> std::io::Result<()> {
        self.fd.seek(SeekFrom::Start(0))?;
        let zeroes = vec![0x00; self.block_size];
        let mut bfd = BufWriter::new(&self.fd);
        // Zero out the "disk" block, buffering each write to prevent excessive writes.
        for _ in 0..self.block_count {
            bfd.write_all(&zeroes)?;
        }
        bfd.flush()?;
        Ok(())
    }
}
