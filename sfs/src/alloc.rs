use log::warn;
use zerocopy::AsBytes;

use crate::addr::BlockAddr;

#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

const WORD_BITS: usize = 64;

/// A bitset of arbitrary length where each bit maps to one block of the data
/// region. Storage is a run of `u64` words but nothing outside this type depends
/// on that width.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    bitmap: Vec<u64>,
    /// Number of meaningful bits. Trailing bits in the last word are always zero.
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Self {
            bitmap: vec![0; Self::words_for(len)],
            len,
        }
    }

    /// Bytes the serialized form of a bitmap of `len` bits occupies.
    pub fn byte_len(len: usize) -> usize {
        Self::words_for(len) * std::mem::size_of::<u64>()
    }

    fn words_for(len: usize) -> usize {
        (len + WORD_BITS - 1) / WORD_BITS
    }

    /// Restores a bitmap of `len` bits from its serialized form. `buf` may be
    /// longer than needed, trailing bytes are ignored.
    pub fn parse(buf: &[u8], len: usize) -> Self {
        let mut map = Self::new(len);
        let bytes = map.bitmap.as_bytes_mut();
        let n = bytes.len().min(buf.len());
        bytes[..n].copy_from_slice(&buf[..n]);
        // Bits past `len` would otherwise read as allocated blocks that do not exist.
        let tail = len % WORD_BITS;
        if tail != 0 {
            if let Some(last) = map.bitmap.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
        map
    }

    pub fn serialize(&self) -> &[u8] {
        self.bitmap.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn get(&self, bit: usize) -> State {
        assert!(bit < self.len, "bit {} out of range for bitmap of {}", bit, self.len);
        match (self.bitmap[bit / WORD_BITS] >> (bit % WORD_BITS)) & 1 {
            0 => State::Free,
            _ => State::Used,
        }
    }

    pub fn set_reserved(&mut self, bit: usize) {
        assert!(bit < self.len, "bit {} out of range for bitmap of {}", bit, self.len);
        self.bitmap[bit / WORD_BITS] |= 1u64 << (bit % WORD_BITS);
    }

    pub fn set_free(&mut self, bit: usize) {
        assert!(bit < self.len, "bit {} out of range for bitmap of {}", bit, self.len);
        self.bitmap[bit / WORD_BITS] &= !(1u64 << (bit % WORD_BITS));
    }

    /// Index of the lowest clear bit.
    pub fn find_first_zero(&self) -> Option<usize> {
        self.bitmap
            .iter()
            .enumerate()
            .find(|&(_, &word)| word != u64::MAX)
            .map(|(i, word)| i * WORD_BITS + word.trailing_ones() as usize)
            .filter(|&bit| bit < self.len)
    }

    pub fn count_used(&self) -> usize {
        self.bitmap.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Indices of every set bit, lowest first.
    pub fn iter_used(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&bit| self.get(bit) == State::Used)
    }
}

/// Hands out data blocks lowest address first. The bitmap is the only record of
/// which blocks are taken; there is no cached free list.
#[derive(Debug, Clone)]
pub struct DataAllocator {
    bitmap: Bitmap,
    /// Physical block number of the first block in the data region.
    base: usize,
}

impl DataAllocator {
    pub fn new(bitmap: Bitmap, base: usize) -> Self {
        Self { bitmap, base }
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// Claims the lowest free block, or `None` when the region is full.
    pub fn allocate(&mut self) -> Option<BlockAddr> {
        let bit = self.bitmap.find_first_zero()?;
        let addr = u32::try_from(self.base + bit)
            .ok()
            .and_then(BlockAddr::from_raw)?;
        self.bitmap.set_reserved(bit);
        Some(addr)
    }

    /// Returns a block to the pool. Releasing a block outside the data region or
    /// one that is already free changes nothing. Returns whether the bitmap changed.
    pub fn release(&mut self, addr: BlockAddr) -> bool {
        match self.bit_of(addr) {
            Some(bit) if self.bitmap.get(bit) == State::Used => {
                self.bitmap.set_free(bit);
                true
            }
            Some(_) => {
                warn!("released block {} that was already free", addr);
                false
            }
            None => {
                warn!("released block {} outside the data region", addr);
                false
            }
        }
    }

    #[cfg(test)]
    pub fn is_allocated(&self, addr: BlockAddr) -> bool {
        self.bit_of(addr)
            .map_or(false, |bit| self.bitmap.get(bit) == State::Used)
    }

    /// Whether `addr` names a block of the data region at all.
    pub fn contains(&self, addr: BlockAddr) -> bool {
        self.bit_of(addr).is_some()
    }

    pub fn used_count(&self) -> usize {
        self.bitmap.count_used()
    }

    pub fn free_count(&self) -> usize {
        self.bitmap.len() - self.used_count()
    }

    /// Every allocated block, lowest address first.
    pub fn allocated(&self) -> impl Iterator<Item = usize> + '_ {
        self.bitmap.iter_used().map(move |bit| self.base + bit)
    }

    fn bit_of(&self, addr: BlockAddr) -> Option<usize> {
        addr.get()
            .checked_sub(self.base)
            .filter(|&bit| bit < self.bitmap.len())
    }
}
