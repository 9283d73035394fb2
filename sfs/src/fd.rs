use crate::config::{ROOT_FD, ROOT_INODE};
use crate::error::{Result, SFSError};
use crate::node::InodeIndex;

/// A caller visible handle for one open file session.
pub type Fd = usize;

/// One session on a file: which file, and where the next read or write lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFile {
    pub inode: InodeIndex,
    pub cursor: usize,
}

/// Open file sessions, indexed by descriptor. Several descriptors may refer to
/// the same inode, each with its own cursor. Descriptor 0 always refers to the
/// root directory.
#[derive(Debug, Clone)]
pub struct OpenFileTable {
    slots: Vec<Option<OpenFile>>,
}

impl OpenFileTable {
    pub fn new(capacity: usize) -> Self {
        let mut slots = vec![None; capacity];
        slots[ROOT_FD] = Some(OpenFile {
            inode: ROOT_INODE,
            cursor: 0,
        });
        Self { slots }
    }

    pub fn has_free_slot(&self) -> bool {
        self.slots.iter().any(Option::is_none)
    }

    /// Binds the lowest free descriptor to `inode` with its cursor at `cursor`.
    pub fn open(&mut self, inode: InodeIndex, cursor: usize) -> Result<Fd> {
        let (fd, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .ok_or(SFSError::NoFreeDescriptor)?;
        *slot = Some(OpenFile { inode, cursor });
        Ok(fd)
    }

    /// Releases a descriptor. The root descriptor can never be closed.
    pub fn close(&mut self, fd: Fd) -> Result<OpenFile> {
        if fd == ROOT_FD {
            return Err(SFSError::InvalidArgument(
                "the root descriptor cannot be closed".to_string(),
            ));
        }
        self.slots
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(SFSError::BadDescriptor(fd))
    }

    pub fn get(&self, fd: Fd) -> Result<&OpenFile> {
        self.slots
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(SFSError::BadDescriptor(fd))
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(SFSError::BadDescriptor(fd))
    }

    /// Closes every descriptor referring to `inode`, returning how many were open.
    pub fn close_inode(&mut self, inode: InodeIndex) -> usize {
        let mut closed = 0;
        for slot in self.slots.iter_mut().skip(ROOT_FD + 1) {
            if matches!(slot, Some(f) if f.inode == inode) {
                *slot = None;
                closed += 1;
            }
        }
        closed
    }

    /// Descriptors currently open, the root's included.
    pub fn open_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_descriptor_is_always_open() {
        let mut table = OpenFileTable::new(3);
        assert_eq!(table.get(ROOT_FD).unwrap().inode, ROOT_INODE);
        assert!(table.close(ROOT_FD).is_err());
        assert!(table.get(ROOT_FD).is_ok());
    }

    #[test]
    fn same_inode_gets_independent_descriptors() {
        let mut table = OpenFileTable::new(4);
        let a = table.open(1, 0).unwrap();
        let b = table.open(1, 10).unwrap();
        assert_ne!(a, b);

        table.get_mut(a).unwrap().cursor = 5;
        assert_eq!(table.get(b).unwrap().cursor, 10);

        table.close(a).unwrap();
        assert_eq!(table.get(b).unwrap().cursor, 10);
    }

    #[test]
    fn double_close_fails() {
        let mut table = OpenFileTable::new(2);
        let fd = table.open(1, 0).unwrap();
        table.close(fd).unwrap();
        match table.close(fd) {
            Err(SFSError::BadDescriptor(bad)) => assert_eq!(bad, fd),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(table.close(99).is_err());
    }

    #[test]
    fn full_table_is_reported() {
        let mut table = OpenFileTable::new(2);
        table.open(1, 0).unwrap();
        assert!(!table.has_free_slot());
        match table.open(2, 0) {
            Err(SFSError::NoFreeDescriptor) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn closing_an_inode_closes_all_of_its_descriptors() {
        let mut table = OpenFileTable::new(5);
        let a = table.open(1, 0).unwrap();
        let b = table.open(2, 0).unwrap();
        let c = table.open(1, 3).unwrap();

        assert_eq!(table.close_inode(1), 2);
        assert!(table.get(a).is_err());
        assert!(table.get(c).is_err());
        assert!(table.get(b).is_ok());
        assert_eq!(table.open_count(), 2);
    }
}
