use std::collections::BTreeSet;

use log::{debug, info, warn};

use crate::addr::{locate, BlockAddr, Slot};
use crate::alloc::{Bitmap, DataAllocator};
use crate::config::{Geometry, ROOT_INODE};
use crate::dir::{validate_name, Directory};
use crate::error::{Result, SFSError};
use crate::fd::{Fd, OpenFile, OpenFileTable};
use crate::io::BlockStorage;
use crate::node::{parse_pointer_block, serialize_pointer_block, Inode, InodeIndex, InodeTable};
use crate::sb::{Layout, SuperBlock, SUPERBLOCK_INDEX};

/// A snapshot of how full a volume is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeStats {
    pub block_size: usize,
    pub total_blocks: usize,
    pub data_blocks: usize,
    pub used_blocks: usize,
    pub free_blocks: usize,
    pub files: usize,
    pub max_files: usize,
    /// Open descriptors, the root's included.
    pub open_handles: usize,
    pub file_capacity: usize,
}

/// A flat, single directory file system on top of a block device.
///
/// Every table (inodes, directory, free block bitmap, open files) is held in
/// memory in full and each call that changes one writes it back to the device
/// before returning. Calls are not interruptible; callers sharing an `SFS` must
/// serialize access to the whole value.
pub struct SFS<T: BlockStorage> {
    dev: T,
    layout: Layout,
    super_block: SuperBlock,
    inodes: InodeTable,
    dir: Directory,
    data_map: DataAllocator,
    files: OpenFileTable,
}

impl<T: BlockStorage> SFS<T> {
    /// Formats the device with the default geometry.
    pub fn create(dev: T) -> Result<Self> {
        SFS::create_with(dev, Geometry::default())
    }

    /// Initializes the file system onto owned block storage.
    pub fn create_with(mut dev: T, geometry: Geometry) -> Result<Self> {
        let layout = Layout::new(geometry.validate()?);
        check_device(&dev, &layout).map_err(SFSError::InvalidArgument)?;

        let super_block = SuperBlock::new(&layout);
        dev.write_blocks(SUPERBLOCK_INDEX, &super_block.serialize(layout.block_size()))?;

        let mut fs = SFS {
            dev,
            layout,
            super_block,
            inodes: InodeTable::new(geometry.inode_count()),
            dir: Directory::new(geometry.max_files()),
            data_map: DataAllocator::new(Bitmap::new(layout.data_blocks), layout.data_start),
            files: OpenFileTable::new(geometry.inode_count()),
        };
        fs.write_inode_table()?;
        fs.write_dir_table()?;
        fs.write_free_block_list()?;
        fs.dev.sync_disk()?;

        info!(
            "formatted volume: {} blocks of {} bytes, {} files of up to {} bytes",
            layout.total_blocks,
            layout.block_size(),
            geometry.max_files(),
            geometry.file_capacity()
        );
        Ok(fs)
    }

    /// Mounts a volume previously written by [`SFS::create_with`], restoring
    /// every table from the device. All descriptors but the root's start closed.
    pub fn open(mut dev: T) -> Result<Self> {
        let bs = dev.block_size();
        let mut block_buf = vec![0; bs];
        dev.read_blocks(SUPERBLOCK_INDEX, &mut block_buf)?;
        let super_block = SuperBlock::parse(&block_buf)?;
        if super_block.block_size as usize != bs {
            return Err(SFSError::InvalidSuperBlock(format!(
                "volume uses {} byte blocks but the device has {} byte blocks",
                super_block.block_size, bs
            )));
        }
        let layout = super_block.layout()?;
        check_device(&dev, &layout).map_err(SFSError::InvalidSuperBlock)?;
        let geometry = layout.geometry;

        let buf = read_region(&mut dev, layout.inode_start, layout.inode_blocks)?;
        let inodes = InodeTable::parse(&buf, geometry.inode_count())?;

        let buf = read_region(&mut dev, layout.dir_start, layout.dir_blocks)?;
        let dir = Directory::parse(&buf, geometry.max_files())?;

        let buf = read_region(&mut dev, layout.bitmap_start, layout.bitmap_blocks)?;
        let data_map = DataAllocator::new(Bitmap::parse(&buf, layout.data_blocks), layout.data_start);

        info!(
            "mounted volume: {} files, {} of {} data blocks in use",
            dir.len(),
            data_map.used_count(),
            layout.data_blocks
        );
        Ok(SFS {
            dev,
            layout,
            super_block,
            inodes,
            dir,
            data_map,
            files: OpenFileTable::new(geometry.inode_count()),
        })
    }

    /// Formats a fresh volume with the default geometry when `fresh` is set,
    /// otherwise mounts the existing one.
    pub fn mount(dev: T, fresh: bool) -> Result<Self> {
        if fresh {
            SFS::create(dev)
        } else {
            SFS::open(dev)
        }
    }

    /// Flushes the device and hands it back. Open descriptors are dropped.
    pub fn unmount(mut self) -> Result<T> {
        self.dev.sync_disk()?;
        debug!("unmounted volume");
        Ok(self.dev)
    }

    pub fn geometry(&self) -> Geometry {
        self.layout.geometry
    }

    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    /// Opens the file called `name`, creating it empty when it does not exist.
    /// An existing file is opened with the cursor at its end; every call hands
    /// out a new descriptor with its own cursor.
    pub fn open_file(&mut self, name: &str) -> Result<Fd> {
        validate_name(name)?;
        // Checked up front so a failed open never leaves a file behind.
        if !self.files.has_free_slot() {
            return Err(SFSError::NoFreeDescriptor);
        }

        let (inum, cursor) = match self.dir.lookup(name) {
            Some(inum) => (inum, self.inode(inum)?.size),
            None => {
                let inum = self.inodes.create()?;
                if let Err(e) = self.dir.insert(name, inum) {
                    self.inodes.take(inum);
                    return Err(e);
                }
                self.write_inode_table()?;
                self.write_dir_table()?;
                debug!("created {:?} as inode {}", name, inum);
                (inum, 0)
            }
        };
        let fd = self.files.open(inum, cursor)?;
        debug!("opened {:?} as fd {} at offset {}", name, fd, cursor);
        Ok(fd)
    }

    /// Releases a descriptor. The file itself is untouched.
    pub fn close(&mut self, fd: Fd) -> Result<()> {
        let file = self.files.close(fd)?;
        debug!("closed fd {} on inode {}", fd, file.inode);
        Ok(())
    }

    /// Writes `buf` at the descriptor's cursor, allocating blocks as needed, and
    /// returns how many bytes landed. Writing stops early at the end of a file's
    /// capacity or when the volume runs out of blocks; the bytes written before
    /// that stay written. A full volume shows up as a short count, 0 when not a
    /// single byte could be placed.
    ///
    /// # Errors
    ///
    /// Fails on a closed descriptor and on the root descriptor.
    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let OpenFile { inode: inum, mut cursor } = *self.writable(fd)?;
        let geometry = self.layout.geometry;
        let bs = geometry.block_size();
        if cursor >= geometry.file_capacity() {
            debug!("fd {} is at capacity, nothing written", fd);
            return Ok(0);
        }

        let start_size = self.inode(inum)?.size;
        let mut written = 0;
        let mut exhausted = false;
        let mut block_buf = vec![0; bs];
        while written < buf.len() {
            let (logical, offset) = locate(cursor, bs);
            let slot = match Slot::of(logical, geometry.pointers_per_block()) {
                Some(slot) => slot,
                None => break,
            };
            let (addr, fresh) = match self.block_for_write(inum, slot)? {
                Some(found) => found,
                None => {
                    exhausted = true;
                    break;
                }
            };

            let n = (bs - offset).min(buf.len() - written);
            if fresh {
                // Recycled blocks still hold whatever their last owner wrote.
                block_buf.fill(0);
            } else if n < bs {
                self.dev.read_blocks(addr.get(), &mut block_buf)?;
            }
            block_buf[offset..offset + n].copy_from_slice(&buf[written..written + n]);
            self.dev.write_blocks(addr.get(), &block_buf)?;

            written += n;
            cursor += n;
            self.files.get_mut(fd)?.cursor = cursor;
            let node = self.inode_mut(inum)?;
            node.size = node.size.max(cursor);
        }

        let size = self.inode(inum)?.size;
        if size != start_size {
            self.write_inode_table()?;
        }
        if exhausted {
            warn!("fd {}: volume is full after {} bytes", fd, written);
        }
        debug!("fd {}: wrote {} bytes, file is {} bytes", fd, written, size);
        Ok(written)
    }

    /// Reads from the descriptor's cursor into `buf`, never past the end of the
    /// file, and returns how many bytes were read. Unallocated blocks inside the
    /// file read as zeros.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let OpenFile { inode: inum, mut cursor } = *self.writable(fd)?;
        let node = *self.inode(inum)?;
        if cursor >= node.size {
            return Ok(0);
        }

        let geometry = self.layout.geometry;
        let bs = geometry.block_size();
        let want = buf.len().min(node.size - cursor);
        let mut done = 0;
        let mut block_buf = vec![0; bs];
        let mut indirect: Option<Vec<Option<BlockAddr>>> = None;
        while done < want {
            let (logical, offset) = locate(cursor, bs);
            let addr = match Slot::of(logical, geometry.pointers_per_block()) {
                Some(Slot::Direct(i)) => node.direct[i],
                Some(Slot::Indirect(i)) => {
                    if indirect.is_none() {
                        indirect = Some(self.indirect_pointers(&node)?);
                    }
                    indirect.as_ref().and_then(|ptrs| ptrs[i])
                }
                None => break,
            };

            let n = (bs - offset).min(want - done);
            match addr {
                Some(addr) => self.dev.read_blocks(addr.get(), &mut block_buf)?,
                None => block_buf.fill(0),
            }
            buf[done..done + n].copy_from_slice(&block_buf[offset..offset + n]);
            done += n;
            cursor += n;
        }

        self.files.get_mut(fd)?.cursor = cursor;
        Ok(done)
    }

    /// Moves the descriptor's cursor to `pos`. Positions past the end of the
    /// file are fine; only the file's capacity bounds them.
    pub fn seek(&mut self, fd: Fd, pos: usize) -> Result<()> {
        let capacity = self.layout.geometry.file_capacity();
        if pos >= capacity {
            return Err(SFSError::InvalidArgument(format!(
                "offset {} is beyond the file capacity of {} bytes",
                pos, capacity
            )));
        }
        self.writable(fd)?;
        self.files.get_mut(fd)?.cursor = pos;
        Ok(())
    }

    /// Current cursor of a descriptor.
    pub fn tell(&self, fd: Fd) -> Result<usize> {
        Ok(self.files.get(fd)?.cursor)
    }

    /// Deletes a file: frees its blocks and inode, drops its name and closes
    /// every descriptor still open on it.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let inum = self
            .dir
            .lookup(name)
            .ok_or_else(|| SFSError::DoesNotExist(name.to_string()))?;

        let released = self.destroy_inode(inum)?;
        let closed = self.files.close_inode(inum);
        self.dir.remove(inum);

        self.write_inode_table()?;
        self.write_dir_table()?;
        self.write_free_block_list()?;
        debug!(
            "removed {:?}: released {} blocks, closed {} descriptors",
            name, released, closed
        );
        Ok(())
    }

    /// Size in bytes of the file called `name`, or 0 if there is none.
    pub fn file_size(&self, name: &str) -> usize {
        self.dir
            .lookup(name)
            .and_then(|inum| self.inodes.get(inum))
            .map_or(0, |node| node.size)
    }

    /// Hands out the next file name each call, in directory order. Once every
    /// name was handed out it returns `None` and the following call starts over.
    pub fn next_file_name(&mut self) -> Option<String> {
        self.dir.next_name()
    }

    /// Every file name, in directory order.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.dir.iter().map(|e| e.name.as_str())
    }

    pub fn stats(&self) -> VolumeStats {
        let geometry = self.layout.geometry;
        VolumeStats {
            block_size: geometry.block_size(),
            total_blocks: self.layout.total_blocks,
            data_blocks: self.layout.data_blocks,
            used_blocks: self.data_map.used_count(),
            free_blocks: self.data_map.free_count(),
            files: self.dir.len(),
            max_files: geometry.max_files(),
            open_handles: self.files.open_count(),
            file_capacity: geometry.file_capacity(),
        }
    }

    /// Cross checks the tables: every pointer of a live file lies in the data
    /// region and is owned once, the bitmap marks exactly those blocks, and
    /// directory entries and live inodes correspond one to one.
    pub fn verify(&mut self) -> Result<()> {
        let capacity = self.layout.geometry.file_capacity();
        let nodes: Vec<(InodeIndex, Inode)> =
            self.inodes.files().map(|(idx, node)| (idx, *node)).collect();

        let mut owned = BTreeSet::new();
        for (idx, node) in nodes.iter() {
            if node.size > capacity {
                return Err(SFSError::Corrupted(format!(
                    "inode {} is {} bytes, over the {} byte capacity",
                    idx, node.size, capacity
                )));
            }
            let mut blocks: Vec<BlockAddr> = node.direct_blocks().collect();
            if let Some(table) = node.indirect {
                self.check_in_region(*idx, table)?;
                blocks.extend(self.indirect_pointers(node)?.into_iter().flatten());
                blocks.push(table);
            }
            for addr in blocks {
                self.check_in_region(*idx, addr)?;
                if !owned.insert(addr.get()) {
                    return Err(SFSError::Corrupted(format!(
                        "block {} is claimed twice, again by inode {}",
                        addr, idx
                    )));
                }
            }
        }

        let marked: BTreeSet<usize> = self.data_map.allocated().collect();
        if marked != owned {
            let leaked = marked.difference(&owned).count();
            let unmarked = owned.difference(&marked).count();
            return Err(SFSError::Corrupted(format!(
                "bitmap disagrees with inodes: {} blocks leaked, {} blocks unmarked",
                leaked, unmarked
            )));
        }

        for entry in self.dir.iter() {
            if entry.inode == ROOT_INODE || self.inodes.get(entry.inode).is_none() {
                return Err(SFSError::Corrupted(format!(
                    "{:?} names dead inode {}",
                    entry.name, entry.inode
                )));
            }
        }
        if self.dir.len() != nodes.len() {
            return Err(SFSError::Corrupted(format!(
                "{} names for {} live inodes",
                self.dir.len(),
                nodes.len()
            )));
        }
        Ok(())
    }

    /// Descriptor lookup for data operations, which the root never allows.
    fn writable(&self, fd: Fd) -> Result<&OpenFile> {
        let file = self.files.get(fd)?;
        if file.inode == ROOT_INODE {
            return Err(SFSError::InvalidArgument(
                "the root directory cannot be read, written or seeked".to_string(),
            ));
        }
        Ok(file)
    }

    fn inode(&self, inum: InodeIndex) -> Result<&Inode> {
        self.inodes
            .get(inum)
            .ok_or_else(|| SFSError::Corrupted(format!("inode {} is not live", inum)))
    }

    fn inode_mut(&mut self, inum: InodeIndex) -> Result<&mut Inode> {
        self.inodes
            .get_mut(inum)
            .ok_or_else(|| SFSError::Corrupted(format!("inode {} is not live", inum)))
    }

    /// Finds the block behind `slot` of a file, allocating it (and the indirect
    /// block on the way) when missing. The flag tells whether the block is new.
    /// `None` means the volume is out of blocks.
    fn block_for_write(
        &mut self,
        inum: InodeIndex,
        slot: Slot,
    ) -> Result<Option<(BlockAddr, bool)>> {
        match slot {
            Slot::Direct(i) => {
                if let Some(addr) = self.inode(inum)?.direct[i] {
                    return Ok(Some((addr, false)));
                }
                let addr = match self.allocate_block()? {
                    Some(addr) => addr,
                    None => return Ok(None),
                };
                self.inode_mut(inum)?.direct[i] = Some(addr);
                self.write_inode_table()?;
                Ok(Some((addr, true)))
            }
            Slot::Indirect(i) => {
                let table = match self.inode(inum)?.indirect {
                    Some(table) => table,
                    None => {
                        let table = match self.allocate_block()? {
                            Some(table) => table,
                            None => return Ok(None),
                        };
                        let empty = vec![0; self.layout.block_size()];
                        self.dev.write_blocks(table.get(), &empty)?;
                        self.inode_mut(inum)?.indirect = Some(table);
                        self.write_inode_table()?;
                        table
                    }
                };

                let mut ptrs = self.read_pointer_block(table)?;
                if let Some(addr) = ptrs[i] {
                    return Ok(Some((addr, false)));
                }
                let addr = match self.allocate_block()? {
                    Some(addr) => addr,
                    None => return Ok(None),
                };
                ptrs[i] = Some(addr);
                self.dev
                    .write_blocks(table.get(), &serialize_pointer_block(&ptrs))?;
                Ok(Some((addr, true)))
            }
        }
    }

    /// Claims the lowest free data block and persists the bitmap.
    fn allocate_block(&mut self) -> Result<Option<BlockAddr>> {
        match self.data_map.allocate() {
            Some(addr) => {
                self.write_free_block_list()?;
                debug!("allocated block {}", addr);
                Ok(Some(addr))
            }
            None => {
                warn!("no free data blocks left");
                Ok(None)
            }
        }
    }

    /// Frees an inode slot and every block it owns. The caller persists the
    /// tables. Returns the number of blocks released.
    fn destroy_inode(&mut self, inum: InodeIndex) -> Result<usize> {
        let node = *self.inode(inum)?;
        let mut blocks: Vec<BlockAddr> = node.direct_blocks().collect();
        if let Some(table) = node.indirect {
            blocks.extend(self.indirect_pointers(&node)?.into_iter().flatten());
            blocks.push(table);
        }

        self.inodes.take(inum);
        let released = blocks
            .into_iter()
            .filter(|&addr| self.data_map.release(addr))
            .count();
        Ok(released)
    }

    /// The pointers held in a file's indirect block, all `None` when it has none.
    fn indirect_pointers(&mut self, node: &Inode) -> Result<Vec<Option<BlockAddr>>> {
        match node.indirect {
            Some(table) => self.read_pointer_block(table),
            None => Ok(vec![None; self.layout.geometry.pointers_per_block()]),
        }
    }

    fn read_pointer_block(&mut self, table: BlockAddr) -> Result<Vec<Option<BlockAddr>>> {
        let mut block_buf = vec![0; self.layout.block_size()];
        self.dev.read_blocks(table.get(), &mut block_buf)?;
        Ok(parse_pointer_block(&block_buf))
    }

    fn check_in_region(&self, inum: InodeIndex, addr: BlockAddr) -> Result<()> {
        if self.data_map.contains(addr) {
            Ok(())
        } else {
            Err(SFSError::Corrupted(format!(
                "inode {} points at block {} outside the data region",
                inum, addr
            )))
        }
    }

    fn write_inode_table(&mut self) -> Result<()> {
        let bytes = self.inodes.serialize();
        self.write_region(self.layout.inode_start, self.layout.inode_blocks, bytes)
    }

    fn write_dir_table(&mut self) -> Result<()> {
        let bytes = self.dir.serialize();
        self.write_region(self.layout.dir_start, self.layout.dir_blocks, bytes)
    }

    fn write_free_block_list(&mut self) -> Result<()> {
        let bytes = self.data_map.bitmap().serialize().to_vec();
        self.write_region(self.layout.bitmap_start, self.layout.bitmap_blocks, bytes)
    }

    /// Pads `bytes` to whole blocks and writes them over a table region.
    fn write_region(&mut self, start: usize, blocks: usize, mut bytes: Vec<u8>) -> Result<()> {
        bytes.resize(blocks * self.layout.block_size(), 0);
        self.dev.write_blocks(start, &bytes)?;
        Ok(())
    }
}

fn read_region<T: BlockStorage>(dev: &mut T, start: usize, blocks: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0; blocks * dev.block_size()];
    dev.read_blocks(start, &mut buf)?;
    Ok(buf)
}

/// Checks the device can hold `layout`, describing the mismatch otherwise.
fn check_device<T: BlockStorage>(dev: &T, layout: &Layout) -> std::result::Result<(), String> {
    if dev.block_size() != layout.block_size() {
        return Err(format!(
            "device has {} byte blocks, volume needs {} byte blocks",
            dev.block_size(),
            layout.block_size()
        ));
    }
    if dev.block_count() < layout.total_blocks {
        return Err(format!(
            "device has {} blocks, volume needs {}",
            dev.block_count(),
            layout.total_blocks
        ));
    }
    Ok(())
}
