use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::addr::BlockAddr;
use crate::config::{INODE_SIZE, NUM_DIRECT_PTRS, ROOT_INODE};
use crate::error::{Result, SFSError};

/// Index of an inode in the inode table.
pub type InodeIndex = usize;

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Copy, Clone, Default)]
/// On-disk form of an inode. This structure __must be exactly 64 bytes.__
struct RawInode {
    /// Non-zero when the slot holds a file.
    live: u32,
    /// The total size of the file in bytes.
    size: u32,
    /// Pointers for the first data blocks of the file, 0 when unallocated.
    direct: [u32; NUM_DIRECT_PTRS],
    /// Block holding the pointers for every data block past the direct ones.
    indirect: u32,
    reserved: u32,
}

const _: () = assert!(std::mem::size_of::<RawInode>() == INODE_SIZE);

/// Per-file metadata: the size of the file and where its blocks live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Inode {
    /// Logical end of file; the furthest any write has reached.
    pub size: usize,
    pub direct: [Option<BlockAddr>; NUM_DIRECT_PTRS],
    /// The pointer block for logical blocks past the direct ones.
    pub indirect: Option<BlockAddr>,
}

impl Inode {
    fn from_raw(raw: &RawInode) -> Self {
        let mut direct = [None; NUM_DIRECT_PTRS];
        for (ptr, &raw_ptr) in direct.iter_mut().zip(raw.direct.iter()) {
            *ptr = BlockAddr::from_raw(raw_ptr);
        }
        Self {
            size: raw.size as usize,
            direct,
            indirect: BlockAddr::from_raw(raw.indirect),
        }
    }

    fn to_raw(&self) -> RawInode {
        let mut direct = [0; NUM_DIRECT_PTRS];
        for (raw_ptr, &ptr) in direct.iter_mut().zip(self.direct.iter()) {
            *raw_ptr = BlockAddr::to_raw(ptr);
        }
        RawInode {
            live: 1,
            size: self.size as u32,
            direct,
            indirect: BlockAddr::to_raw(self.indirect),
            reserved: 0,
        }
    }

    /// Allocated direct pointers, in logical order.
    pub fn direct_blocks(&self) -> impl Iterator<Item = BlockAddr> + '_ {
        self.direct.iter().flatten().copied()
    }
}

/// The whole inode table, held in memory and written back in full whenever it
/// changes. A slot is `None` when no file owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct InodeTable {
    nodes: Vec<Option<Inode>>,
}

impl InodeTable {
    /// An empty table of `count` slots where only the root is live.
    pub fn new(count: usize) -> Self {
        let mut nodes = vec![None; count];
        nodes[ROOT_INODE] = Some(Inode::default());
        Self { nodes }
    }

    /// Restores a table of `count` slots from its serialized form.
    pub fn parse(buf: &[u8], count: usize) -> Result<Self> {
        let mut raw = vec![RawInode::default(); count];
        let bytes = raw.as_bytes_mut();
        if buf.len() < bytes.len() {
            return Err(SFSError::Corrupted(format!(
                "inode table needs {} bytes, found {}",
                bytes.len(),
                buf.len()
            )));
        }
        bytes.copy_from_slice(&buf[..bytes.len()]);

        let mut nodes: Vec<Option<Inode>> = raw
            .iter()
            .map(|r| if r.live != 0 { Some(Inode::from_raw(r)) } else { None })
            .collect();
        if nodes[ROOT_INODE].is_none() {
            return Err(SFSError::Corrupted("root inode is not live".to_string()));
        }
        // The root never owns data.
        nodes[ROOT_INODE] = Some(Inode::default());
        Ok(Self { nodes })
    }

    /// Serializes every slot, live or not, in index order.
    pub fn serialize(&self) -> Vec<u8> {
        let raw: Vec<RawInode> = self
            .nodes
            .iter()
            .map(|n| n.as_ref().map(Inode::to_raw).unwrap_or_default())
            .collect();
        raw.as_bytes().to_vec()
    }

    /// Claims the lowest free slot for a new, empty file.
    pub fn create(&mut self) -> Result<InodeIndex> {
        let (idx, slot) = self
            .nodes
            .iter_mut()
            .enumerate()
            .skip(ROOT_INODE + 1)
            .find(|(_, slot)| slot.is_none())
            .ok_or(SFSError::NoFreeInode)?;
        *slot = Some(Inode::default());
        Ok(idx)
    }

    /// Frees a slot and hands back what it held so the caller can release the
    /// blocks. The root cannot be taken.
    pub fn take(&mut self, idx: InodeIndex) -> Option<Inode> {
        if idx == ROOT_INODE {
            return None;
        }
        self.nodes.get_mut(idx).and_then(Option::take)
    }

    pub fn get(&self, idx: InodeIndex) -> Option<&Inode> {
        self.nodes.get(idx).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, idx: InodeIndex) -> Option<&mut Inode> {
        self.nodes.get_mut(idx).and_then(Option::as_mut)
    }

    /// Live files, excluding the root.
    pub fn files(&self) -> impl Iterator<Item = (InodeIndex, &Inode)> {
        self.nodes
            .iter()
            .enumerate()
            .skip(ROOT_INODE + 1)
            .filter_map(|(idx, n)| n.as_ref().map(|n| (idx, n)))
    }
}

/// Decodes the contents of an indirect block into its `K` pointers.
pub fn parse_pointer_block(buf: &[u8]) -> Vec<Option<BlockAddr>> {
    let mut raw = vec![0u32; buf.len() / std::mem::size_of::<u32>()];
    let bytes = raw.as_bytes_mut();
    let n = bytes.len();
    bytes.copy_from_slice(&buf[..n]);
    raw.into_iter().map(BlockAddr::from_raw).collect()
}

/// Encodes pointers as the contents of an indirect block.
pub fn serialize_pointer_block(ptrs: &[Option<BlockAddr>]) -> Vec<u8> {
    let raw: Vec<u32> = ptrs.iter().map(|&p| BlockAddr::to_raw(p)).collect();
    raw.as_bytes().to_vec()
}
