use crate::error::{Result, SFSError};
use crate::sb::Layout;

pub const SB_MAGIC: u32 = 0xACBD_0005;

/// Inode 0 describes the flat root directory and is never handed out to files.
pub const ROOT_INODE: usize = 0;
/// Descriptor 0 is permanently bound to the root directory.
pub const ROOT_FD: usize = 0;

pub const NUM_DIRECT_PTRS: usize = 12;
/// Block pointers are stored as 32-bit block numbers.
pub const POINTER_SIZE: usize = 4;

pub const MAX_FILENAME: usize = 20;
/// Bytes reserved for a name inside an on-disk directory entry.
pub const NAME_FIELD_LEN: usize = 24;

pub const INODE_SIZE: usize = 64;
pub const DIR_ENTRY_SIZE: usize = 32;

pub const DEFAULT_BLOCK_SIZE: usize = 1024;
pub const DEFAULT_MAX_FILES: usize = 64;

/// Every fixed size record must tile a block exactly.
const MIN_BLOCK_SIZE: usize = INODE_SIZE;
/// Keeps the capacity of a file within a 32-bit size.
const MAX_BLOCK_SIZE: usize = 64 * 1024;

/// The tunable shape of a volume. Everything else in the layout is derived from
/// the block size and the number of files the volume can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    block_size: usize,
    max_files: usize,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl Geometry {
    pub fn new(block_size: usize, max_files: usize) -> Result<Self> {
        Geometry::default()
            .with_block_size(block_size)
            .with_max_files(max_files)
            .validate()
    }

    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    /// Number of regular files, not counting the root directory.
    pub fn with_max_files(mut self, files: usize) -> Self {
        self.max_files = files;
        self
    }

    /// Checks the geometry describes a volume that can be laid out on disk.
    pub fn validate(self) -> Result<Self> {
        if self.block_size < MIN_BLOCK_SIZE
            || self.block_size > MAX_BLOCK_SIZE
            || self.block_size % MIN_BLOCK_SIZE != 0
        {
            return Err(SFSError::InvalidArgument(format!(
                "block size {} must be a multiple of {} no larger than {}",
                self.block_size, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE
            )));
        }
        if self.max_files == 0 {
            return Err(SFSError::InvalidArgument(
                "volume must hold at least one file".to_string(),
            ));
        }
        let data = self
            .max_files
            .checked_mul(self.blocks_per_file())
            .filter(|&blocks| blocks <= u32::MAX as usize / 2);
        if data.is_none() {
            return Err(SFSError::InvalidArgument(format!(
                "{} files of {} byte blocks do not fit 32-bit block numbers",
                self.max_files, self.block_size
            )));
        }
        Ok(self)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    /// Inode slots including the root's.
    pub fn inode_count(&self) -> usize {
        self.max_files + 1
    }

    /// K: how many block pointers fit in the indirect block.
    pub fn pointers_per_block(&self) -> usize {
        self.block_size / POINTER_SIZE
    }

    /// Data blocks a single file can address.
    pub fn blocks_per_file(&self) -> usize {
        NUM_DIRECT_PTRS + self.pointers_per_block()
    }

    /// Largest size in bytes any file can reach.
    pub fn file_capacity(&self) -> usize {
        self.block_size * self.blocks_per_file()
    }

    /// Blocks a device needs to hold a volume of this geometry.
    pub fn volume_blocks(&self) -> usize {
        Layout::new(*self).total_blocks
    }
}
