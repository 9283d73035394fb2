use crate::alloc::Bitmap;
use crate::config::{Geometry, DIR_ENTRY_SIZE, INODE_SIZE, ROOT_INODE, SB_MAGIC};
use crate::error::{Result, SFSError};

/// Bytes of a block the encoded superblock occupies; the rest is zero.
const SB_ENCODED_LEN: usize = 40;

pub const SUPERBLOCK_INDEX: usize = 0;

fn blocks_for(bytes: usize, block_size: usize) -> usize {
    (bytes + block_size - 1) / block_size
}

/// Where every region of a volume starts and how long it is, in blocks.
///
/// # Layout
/// ==============================================================================
/// | SuperBlock | Inode table | Directory table |  Data Region  | Bitmap (data) |
/// ==============================================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub geometry: Geometry,
    pub inode_start: usize,
    pub inode_blocks: usize,
    pub dir_start: usize,
    pub dir_blocks: usize,
    pub data_start: usize,
    pub data_blocks: usize,
    pub bitmap_start: usize,
    pub bitmap_blocks: usize,
    pub total_blocks: usize,
}

impl Layout {
    pub fn new(geometry: Geometry) -> Self {
        let bs = geometry.block_size();
        let inode_start = SUPERBLOCK_INDEX + 1;
        let inode_blocks = blocks_for(geometry.inode_count() * INODE_SIZE, bs);
        let dir_start = inode_start + inode_blocks;
        let dir_blocks = blocks_for(geometry.max_files() * DIR_ENTRY_SIZE, bs);
        let data_start = dir_start + dir_blocks;
        let data_blocks = geometry.max_files() * geometry.blocks_per_file();
        let bitmap_start = data_start + data_blocks;
        let bitmap_blocks = blocks_for(Bitmap::byte_len(data_blocks), bs);
        Self {
            geometry,
            inode_start,
            inode_blocks,
            dir_start,
            dir_blocks,
            data_start,
            data_blocks,
            bitmap_start,
            bitmap_blocks,
            total_blocks: bitmap_start + bitmap_blocks,
        }
    }

    pub fn block_size(&self) -> usize {
        self.geometry.block_size()
    }
}

/// The first block of the file system storing information critical for mounting
/// the file system and verifying the underlying disk is formatted correctly.
///
/// It is written once when the volume is formatted and only read afterwards. The
/// region sizes are redundant with the block size and file count; they are kept
/// so a mount can check the layout it derives against the one that was written.
#[derive(Debug, PartialEq)]
pub struct SuperBlock {
    /// A 32-bit identifying constant.
    pub sb_magic: u32,
    pub block_size: u32,
    /// Total number of blocks the volume spans.
    pub fs_size: u32,
    /// Blocks taken by the inode table.
    pub inode_table_len: u32,
    /// Blocks taken by the directory table.
    pub dir_table_len: u32,
    pub root_dir_inode: u32,
    pub max_files: u32,
    /// First block of the data region.
    pub data_start: u32,
    /// Number of bits tracked by the free block bitmap, one per data block.
    pub bitmap_len: u32,
    /// Blocks taken by the free block bitmap.
    pub bitmap_blocks: u32,
}

impl SuperBlock {
    pub fn new(layout: &Layout) -> Self {
        Self {
            sb_magic: SB_MAGIC,
            block_size: layout.block_size() as u32,
            fs_size: layout.total_blocks as u32,
            inode_table_len: layout.inode_blocks as u32,
            dir_table_len: layout.dir_blocks as u32,
            root_dir_inode: ROOT_INODE as u32,
            max_files: layout.geometry.max_files() as u32,
            data_start: layout.data_start as u32,
            bitmap_len: layout.data_blocks as u32,
            bitmap_blocks: layout.bitmap_blocks as u32,
        }
    }

    /// Reads a superblock from the start of a buffer. Any buffer shorter than
    /// the encoded superblock is rejected.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < SB_ENCODED_LEN {
            return Err(SFSError::InvalidSuperBlock(format!(
                "buffer of {} bytes is too short",
                buf.len()
            )));
        }
        let field = |i: usize| {
            let mut word = [0; 4];
            word.copy_from_slice(&buf[i * 4..i * 4 + 4]);
            u32::from_be_bytes(word)
        };

        let sb = Self {
            sb_magic: field(0),
            block_size: field(1),
            fs_size: field(2),
            inode_table_len: field(3),
            dir_table_len: field(4),
            root_dir_inode: field(5),
            max_files: field(6),
            data_start: field(7),
            bitmap_len: field(8),
            bitmap_blocks: field(9),
        };
        if sb.sb_magic != SB_MAGIC {
            return Err(SFSError::InvalidSuperBlock(format!(
                "magic {:#010x} does not match {:#010x}",
                sb.sb_magic, SB_MAGIC
            )));
        }
        Ok(sb)
    }

    /// Serializes the SuperBlock into a `block_size` buffer for writing to disk.
    /// The encoding is a series of struct fields with big endian alignment.
    pub fn serialize(&self, block_size: usize) -> Vec<u8> {
        let mut sb_encoded = Vec::with_capacity(block_size);
        for field in [
            self.sb_magic,
            self.block_size,
            self.fs_size,
            self.inode_table_len,
            self.dir_table_len,
            self.root_dir_inode,
            self.max_files,
            self.data_start,
            self.bitmap_len,
            self.bitmap_blocks,
        ] {
            sb_encoded.extend_from_slice(&field.to_be_bytes());
        }
        sb_encoded.resize(block_size.max(SB_ENCODED_LEN), 0);
        sb_encoded
    }

    /// Recomputes the layout from the stored geometry and checks every stored
    /// region size against it.
    pub fn layout(&self) -> Result<Layout> {
        let geometry = Geometry::new(self.block_size as usize, self.max_files as usize)
            .map_err(|e| SFSError::InvalidSuperBlock(e.to_string()))?;
        let layout = Layout::new(geometry);
        if SuperBlock::new(&layout) != *self {
            return Err(SFSError::InvalidSuperBlock(
                "stored region sizes disagree with the volume geometry".to_string(),
            ));
        }
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_layout() -> Layout {
        Layout::new(Geometry::new(1024, 64).unwrap())
    }

    #[test]
    fn layout_regions_are_contiguous() {
        let layout = small_layout();
        assert_eq!(layout.inode_start, 1);
        // 65 inodes of 64 bytes.
        assert_eq!(layout.inode_blocks, 5);
        assert_eq!(layout.dir_start, 6);
        // 64 entries of 32 bytes.
        assert_eq!(layout.dir_blocks, 2);
        assert_eq!(layout.data_start, 8);
        assert_eq!(layout.data_blocks, 64 * 268);
        assert_eq!(layout.bitmap_start, 8 + 64 * 268);
        // 17152 bits pack into 268 words of 8 bytes.
        assert_eq!(layout.bitmap_blocks, 3);
        assert_eq!(layout.total_blocks, layout.bitmap_start + 3);
    }

    #[test]
    fn can_encode_and_decode_superblocks() {
        let layout = small_layout();
        let sb = SuperBlock::new(&layout);
        let encoded = sb.serialize(1024);
        assert_eq!(encoded.len(), 1024);

        let parsed = SuperBlock::parse(&encoded).unwrap();
        assert_eq!(parsed, sb);
        assert_eq!(parsed.layout().unwrap(), layout);
    }

    #[test]
    fn parsing_buffer_with_invalid_magic_fails() {
        let zero_buffer_with_right_size = vec![0; 1024];
        match SuperBlock::parse(&zero_buffer_with_right_size) {
            Err(SFSError::InvalidSuperBlock(_)) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn parsing_buffer_with_invalid_size_fails() {
        assert!(SuperBlock::parse(&[0; 12]).is_err());
    }

    #[test]
    fn tampered_region_sizes_are_rejected() {
        let mut sb = SuperBlock::new(&small_layout());
        sb.bitmap_blocks += 1;
        assert!(sb.layout().is_err());
    }
}
