//! A small inode file system with a single flat directory, laid out over any
//! fixed size block device.
//!
//! ```no_run
//! use sfs::io::FileBlockEmulator;
//! use sfs::{Geometry, SFS};
//!
//! let geometry = Geometry::default();
//! let dev = FileBlockEmulator::create_disk(
//!     "volume.img",
//!     geometry.block_size(),
//!     geometry.volume_blocks(),
//! )?;
//! let mut fs = SFS::create(dev)?;
//! let fd = fs.open_file("hello.txt")?;
//! fs.write(fd, b"hello")?;
//! fs.close(fd)?;
//! # Ok::<(), sfs::SFSError>(())
//! ```
mod addr;
mod alloc;
mod config;
mod dir;
mod error;
mod fd;
mod fs;
pub mod io;
mod node;
mod sb;

pub use crate::config::{
    Geometry, DEFAULT_BLOCK_SIZE, DEFAULT_MAX_FILES, MAX_FILENAME, NUM_DIRECT_PTRS, ROOT_FD,
    SB_MAGIC,
};
pub use crate::error::{ErrorKind, Result, SFSError};
pub use crate::fd::Fd;
pub use crate::fs::{VolumeStats, SFS};
pub use crate::sb::SuperBlock;
