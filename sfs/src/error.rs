use thiserror::Error;

/// Coarse classification of failures, independent of the detail each error
/// variant carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    ResourceExhausted,
    InvalidVolume,
    Io,
}

#[derive(Error, Debug)]
pub enum SFSError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("found no file named {0:?}")]
    DoesNotExist(String),
    #[error("descriptor {0} is not open")]
    BadDescriptor(usize),
    #[error("a file named {0:?} already exists")]
    AlreadyExists(String),
    #[error("all file descriptors are in use")]
    NoFreeDescriptor,
    #[error("all inodes are in use")]
    NoFreeInode,
    #[error("directory table is full")]
    DirectoryFull,
    #[error("invalid superblock: {0}")]
    InvalidSuperBlock(String),
    #[error("volume is inconsistent: {0}")]
    Corrupted(String),
    #[error("block device failure")]
    Io(#[from] std::io::Error),
}

impl SFSError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SFSError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            SFSError::DoesNotExist(_) | SFSError::BadDescriptor(_) => ErrorKind::NotFound,
            SFSError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            SFSError::NoFreeDescriptor
            | SFSError::NoFreeInode
            | SFSError::DirectoryFull => ErrorKind::ResourceExhausted,
            SFSError::InvalidSuperBlock(_) | SFSError::Corrupted(_) => ErrorKind::InvalidVolume,
            SFSError::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, SFSError>;
