/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = usize;

/// Tried to map as closely as possible to the read/write/create block interface the
/// file system layer expects from a disk: runs of whole blocks addressed by the
/// number of the first block.
///
/// The number of blocks transferred by a call is derived from the buffer length,
/// which must be an exact multiple of [`BlockStorage::block_size`].
pub trait BlockStorage {
    /// Size in bytes of a single block on this device.
    fn block_size(&self) -> usize;
    /// Total number of blocks available on this device.
    fn block_count(&self) -> usize;
    /// Reads `buf.len() / block_size()` consecutive blocks starting at `start`.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range, or passing a buffer that is not a
    /// whole number of blocks, will return an error.
    fn read_blocks(&mut self, start: BlockNumber, buf: &mut [u8]) -> std::io::Result<()>;
    /// Writes `buf.len() / block_size()` consecutive blocks starting at `start`.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range, or passing a buffer that is not a
    /// whole number of blocks, will return an error.
    fn write_blocks(&mut self, start: BlockNumber, buf: &[u8]) -> std::io::Result<()>;
    /// Flush any buffered disk IO from memory. This is useful if it must guaranteed
    /// the disk writes actually occurred, for instance, if being re-read from
    /// disk.
    fn sync_disk(&mut self) -> std::io::Result<()>;
}

/// Validates a transfer of `len` bytes at `start` against a device geometry and
/// returns the number of blocks it spans.
pub(crate) fn check_extent(
    start: BlockNumber,
    len: usize,
    block_size: usize,
    block_count: usize,
) -> std::io::Result<usize> {
    use std::io::{Error, ErrorKind};

    if len == 0 || len % block_size != 0 {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "buffer is not a whole number of blocks",
        ));
    }
    let count = len / block_size;
    if start.checked_add(count).map_or(true, |end| end > block_count) {
        return Err(Error::new(ErrorKind::InvalidInput, "block out of range"));
    }
    Ok(count)
}
