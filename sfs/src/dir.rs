use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::config::{DIR_ENTRY_SIZE, MAX_FILENAME, NAME_FIELD_LEN};
use crate::error::{Result, SFSError};
use crate::node::InodeIndex;

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Copy, Clone, Default)]
struct RawDirEntry {
    /// Name bytes, zero padded.
    name: [u8; NAME_FIELD_LEN],
    inode: u32,
    live: u32,
}

const _: () = assert!(std::mem::size_of::<RawDirEntry>() == DIR_ENTRY_SIZE);

/// Binds a file name to the inode describing the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub inode: InodeIndex,
}

impl DirEntry {
    fn from_raw(raw: &RawDirEntry) -> Result<Self> {
        let len = raw
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_FIELD_LEN);
        let name = std::str::from_utf8(&raw.name[..len])
            .map_err(|_| SFSError::Corrupted("directory entry name is not UTF-8".to_string()))?;
        Ok(Self {
            name: name.to_string(),
            inode: raw.inode as usize,
        })
    }

    fn to_raw(&self) -> RawDirEntry {
        let mut raw = RawDirEntry {
            inode: self.inode as u32,
            live: 1,
            ..RawDirEntry::default()
        };
        let bytes = self.name.as_bytes();
        raw.name[..bytes.len()].copy_from_slice(bytes);
        raw
    }
}

/// Checks a name can be stored in a directory entry: 1 to `MAX_FILENAME` bytes
/// and no NUL, which terminates names on disk.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_FILENAME {
        return Err(SFSError::InvalidArgument(format!(
            "file name must be 1 to {} bytes long, got {}",
            MAX_FILENAME,
            name.len()
        )));
    }
    if name.bytes().any(|b| b == 0) {
        return Err(SFSError::InvalidArgument(
            "file name must not contain NUL".to_string(),
        ));
    }
    Ok(())
}

/// The single flat directory of the volume, cached in memory in full.
#[derive(Debug, Clone, PartialEq)]
pub struct Directory {
    entries: Vec<Option<DirEntry>>,
    /// Slot enumeration resumes its scan from.
    cursor: usize,
}

impl Directory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![None; capacity],
            cursor: 0,
        }
    }

    pub fn parse(buf: &[u8], capacity: usize) -> Result<Self> {
        let mut raw = vec![RawDirEntry::default(); capacity];
        let bytes = raw.as_bytes_mut();
        let n = bytes.len();
        if buf.len() < n {
            return Err(SFSError::Corrupted(format!(
                "directory table needs {} bytes, found {}",
                n,
                buf.len()
            )));
        }
        bytes.copy_from_slice(&buf[..n]);

        let entries = raw
            .iter()
            .map(|r| {
                if r.live != 0 {
                    DirEntry::from_raw(r).map(Some)
                } else {
                    Ok(None)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries, cursor: 0 })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let raw: Vec<RawDirEntry> = self
            .entries
            .iter()
            .map(|e| e.as_ref().map(DirEntry::to_raw).unwrap_or_default())
            .collect();
        raw.as_bytes().to_vec()
    }

    /// Finds the inode of the live entry named exactly `name`.
    pub fn lookup(&self, name: &str) -> Option<InodeIndex> {
        self.iter().find(|e| e.name == name).map(|e| e.inode)
    }

    /// Records `name` as the name of inode `idx` in the first free slot.
    pub fn insert(&mut self, name: &str, idx: InodeIndex) -> Result<()> {
        validate_name(name)?;
        if self.lookup(name).is_some() {
            return Err(SFSError::AlreadyExists(name.to_string()));
        }
        let slot = self
            .entries
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(SFSError::DirectoryFull)?;
        *slot = Some(DirEntry {
            name: name.to_string(),
            inode: idx,
        });
        Ok(())
    }

    /// Drops the entry naming inode `idx`, returning it.
    pub fn remove(&mut self, idx: InodeIndex) -> Option<DirEntry> {
        self.entries
            .iter_mut()
            .find(|slot| matches!(slot, Some(e) if e.inode == idx))
            .and_then(Option::take)
    }

    /// Hands out the next live name in slot order. After the last one it
    /// returns `None` once and starts over on the following call. Removing a
    /// name mid-cycle never makes it skip a live name further along.
    pub fn next_name(&mut self) -> Option<String> {
        let found = self
            .entries
            .iter()
            .enumerate()
            .skip(self.cursor)
            .find_map(|(slot, e)| e.as_ref().map(|e| (slot, e.name.clone())));
        match found {
            Some((slot, name)) => {
                self.cursor = slot + 1;
                Some(name)
            }
            None => {
                self.cursor = 0;
                None
            }
        }
    }

    /// Live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }
}
