use crate::io::block::{check_extent, BlockNumber, BlockStorage};

/// A disk held entirely in memory. Contents are lost when it is dropped, which
/// makes it the cheapest device for exercising the file system in tests.
#[derive(Debug, Clone)]
pub struct MemoryDisk {
    data: Vec<u8>,
    block_size: usize,
}

impl MemoryDisk {
    /// Creates a zeroed disk of `nblocks` blocks of `block_size` bytes.
    pub fn new(block_size: usize, nblocks: usize) -> Self {
        Self {
            data: vec![0; block_size * nblocks],
            block_size,
        }
    }

    /// Raw view of the whole medium.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw view of the whole medium, for simulating corruption.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl BlockStorage for MemoryDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        if self.block_size == 0 {
            0
        } else {
            self.data.len() / self.block_size
        }
    }

    fn read_blocks(&mut self, start: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        check_extent(start, buf.len(), self.block_size, self.block_count())?;
        let offset = start * self.block_size;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, start: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        check_extent(start, buf.len(), self.block_size, self.block_count())?;
        let offset = start * self.block_size;
        self.data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
