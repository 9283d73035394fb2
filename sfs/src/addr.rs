use std::num::NonZeroU32;

use crate::config::NUM_DIRECT_PTRS;

/// A physical block number inside the data region. Zero is never a data block
/// (the superblock lives there), which lets `Option<BlockAddr>` stand in for an
/// unallocated pointer at no cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockAddr(NonZeroU32);

impl BlockAddr {
    /// Decodes an on-disk pointer, where 0 means unallocated.
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(BlockAddr)
    }

    /// Encodes an optional pointer for disk.
    pub fn to_raw(addr: Option<Self>) -> u32 {
        addr.map_or(0, |a| a.0.get())
    }

    pub fn get(self) -> usize {
        self.0.get() as usize
    }
}

impl std::fmt::Display for BlockAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the pointer for a logical block of a file lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Index into the inode's direct pointers.
    Direct(usize),
    /// Index into the pointer block named by the inode's indirect pointer.
    Indirect(usize),
}

impl Slot {
    /// Maps a logical block to its pointer slot, or `None` when the block lies
    /// beyond what a file can address.
    pub fn of(logical_block: usize, pointers_per_block: usize) -> Option<Slot> {
        if logical_block < NUM_DIRECT_PTRS {
            Some(Slot::Direct(logical_block))
        } else if logical_block - NUM_DIRECT_PTRS < pointers_per_block {
            Some(Slot::Indirect(logical_block - NUM_DIRECT_PTRS))
        } else {
            None
        }
    }
}

/// Splits a byte offset within a file into its logical block and the offset
/// within that block.
pub fn locate(offset: usize, block_size: usize) -> (usize, usize) {
    (offset / block_size, offset % block_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_unallocated() {
        assert_eq!(BlockAddr::from_raw(0), None);
        assert_eq!(BlockAddr::to_raw(None), 0);
        let addr = BlockAddr::from_raw(42).unwrap();
        assert_eq!(addr.get(), 42);
        assert_eq!(BlockAddr::to_raw(Some(addr)), 42);
    }

    #[test]
    fn offsets_split_on_block_boundaries() {
        assert_eq!(locate(0, 1024), (0, 0));
        assert_eq!(locate(1023, 1024), (0, 1023));
        assert_eq!(locate(1024, 1024), (1, 0));
        assert_eq!(locate(2000, 1024), (1, 976));
    }

    #[test]
    fn direct_blocks_come_first() {
        assert_eq!(Slot::of(0, 256), Some(Slot::Direct(0)));
        assert_eq!(Slot::of(11, 256), Some(Slot::Direct(11)));
        assert_eq!(Slot::of(12, 256), Some(Slot::Indirect(0)));
        assert_eq!(Slot::of(267, 256), Some(Slot::Indirect(255)));
    }

    #[test]
    fn blocks_past_the_indirect_table_are_unaddressable() {
        assert_eq!(Slot::of(268, 256), None);
        assert_eq!(Slot::of(usize::MAX, 16), None);
    }
}
