use sfs::io::{BlockStorage, FileBlockEmulator, FileBlockEmulatorBuilder, MemoryDisk};
use sfs::{ErrorKind, Geometry, SFSError, NUM_DIRECT_PTRS, SB_MAGIC, SFS};
use tempfile::NamedTempFile;

fn init_logger() {
  let _ = env_logger::builder().is_test(true).try_init();
}

fn memory_disk(geometry: Geometry) -> MemoryDisk {
  MemoryDisk::new(geometry.block_size(), geometry.volume_blocks())
}

fn file_disk(tf: &NamedTempFile, geometry: Geometry, clear: bool) -> FileBlockEmulator {
  FileBlockEmulatorBuilder::from(tf.reopen().unwrap())
    .with_block_size(geometry.block_size())
    .with_block_count(geometry.volume_blocks())
    .clear_medium(clear)
    .build()
    .expect("Could not initialize disk emulator.")
}

#[test]
fn can_initialize_disk_with_filesystem() {
  init_logger();
  let tf = NamedTempFile::new().unwrap();
  let geometry = Geometry::default();

  // Prepare the block with filesystem layout.
  let fs = SFS::create(file_disk(&tf, geometry, true)).unwrap();
  fs.unmount().unwrap();

  // Open filesystem and verify init layout.
  let mut fs = SFS::open(file_disk(&tf, geometry, false)).unwrap();
  assert_eq!(fs.super_block().sb_magic, SB_MAGIC);
  assert_eq!(fs.super_block().fs_size as usize, geometry.volume_blocks());
  let stats = fs.stats();
  assert_eq!(stats.files, 0);
  assert_eq!(stats.used_blocks, 0);
  assert_eq!(stats.data_blocks, 64 * (NUM_DIRECT_PTRS + 256));
  assert_eq!(fs.next_file_name(), None);
  fs.verify().unwrap();
}

#[test]
fn unformatted_blocks_are_rejected() {
  init_logger();
  let tf = NamedTempFile::new().unwrap();
  match SFS::open(file_disk(&tf, Geometry::default(), true)) {
    Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidVolume),
    Ok(_) => panic!("mounted a zeroed disk"),
  }
}

#[test]
fn corrupted_magic_is_rejected() {
  init_logger();
  let geometry = Geometry::default();
  let fs = SFS::create(memory_disk(geometry)).unwrap();
  let mut dev = fs.unmount().unwrap();
  dev.as_bytes_mut()[0] ^= 0xff;
  match SFS::open(dev) {
    Err(SFSError::InvalidSuperBlock(_)) => (),
    Err(e) => panic!("unexpected error {:?}", e),
    Ok(_) => panic!("mounted a volume with a bad magic number"),
  }
}

#[test]
fn write_seek_read_remove_round() {
  init_logger();
  let mut fs = SFS::mount(memory_disk(Geometry::default()), true).unwrap();

  let fd = fs.open_file("a.txt").unwrap();
  assert_eq!(fs.write(fd, &[0x41; 2000]).unwrap(), 2000);
  assert_eq!(fs.file_size("a.txt"), 2000);
  // 2000 bytes span two 1k blocks.
  assert_eq!(fs.stats().used_blocks, 2);

  fs.seek(fd, 1024).unwrap();
  let mut buf = [0; 100];
  assert_eq!(fs.read(fd, &mut buf).unwrap(), 100);
  assert!(buf.iter().all(|&b| b == 0x41));
  assert_eq!(fs.tell(fd).unwrap(), 1124);

  fs.remove("a.txt").unwrap();
  assert_eq!(fs.file_size("a.txt"), 0);
  assert_eq!(fs.stats().used_blocks, 0);
  match fs.write(fd, b"late") {
    Err(SFSError::BadDescriptor(bad)) => assert_eq!(bad, fd),
    other => panic!("unexpected result {:?}", other),
  }

  let fd = fs.open_file("a.txt").unwrap();
  assert_eq!(fs.tell(fd).unwrap(), 0);
  assert_eq!(fs.file_size("a.txt"), 0);
  fs.verify().unwrap();
}

#[test]
fn crossing_into_the_indirect_block() {
  init_logger();
  let geometry = Geometry::default();
  let bs = geometry.block_size();
  let mut fs = SFS::create(memory_disk(geometry)).unwrap();

  let fd = fs.open_file("edge").unwrap();
  fs.write(fd, &vec![7; NUM_DIRECT_PTRS * bs]).unwrap();
  assert_eq!(fs.stats().used_blocks, NUM_DIRECT_PTRS);

  fs.write(fd, &[8; 10]).unwrap();
  assert_eq!(fs.stats().used_blocks, NUM_DIRECT_PTRS + 2);
  assert_eq!(fs.file_size("edge"), NUM_DIRECT_PTRS * bs + 10);

  fs.seek(fd, NUM_DIRECT_PTRS * bs - 2).unwrap();
  let mut buf = [0; 6];
  assert_eq!(fs.read(fd, &mut buf).unwrap(), 6);
  assert_eq!(buf, [7, 7, 8, 8, 8, 8]);
  fs.verify().unwrap();
}

#[test]
fn running_out_of_blocks() {
  init_logger();
  // 64 byte blocks: 28 blocks and 1792 bytes per file, 140 data blocks.
  let geometry = Geometry::new(64, 5).unwrap();
  let capacity = geometry.file_capacity();
  let mut fs = SFS::create_with(memory_disk(geometry), geometry).unwrap();
  assert_eq!(fs.stats().data_blocks, 140);

  // A full file also holds its pointer block.
  for name in ["a", "b", "c", "d"] {
    let fd = fs.open_file(name).unwrap();
    assert_eq!(fs.write(fd, &vec![1; capacity]).unwrap(), capacity);
    fs.close(fd).unwrap();
  }
  assert_eq!(fs.stats().used_blocks, 4 * 29);

  // 24 blocks remain: 12 direct, the pointer block and 11 indirect.
  let fd = fs.open_file("e").unwrap();
  assert_eq!(fs.write(fd, &vec![2; capacity]).unwrap(), 23 * 64);
  assert_eq!(fs.stats().free_blocks, 0);
  // A full volume is a short count, never an error.
  assert_eq!(fs.write(fd, b"more").unwrap(), 0);
  assert_eq!(fs.file_size("e"), 23 * 64);
  assert_eq!(fs.tell(fd).unwrap(), 23 * 64);

  fs.remove("a").unwrap();
  assert_eq!(fs.write(fd, b"more").unwrap(), 4);
  fs.verify().unwrap();
}

#[test]
fn descriptors_are_independent() {
  init_logger();
  let mut fs = SFS::create(memory_disk(Geometry::default())).unwrap();
  let writer = fs.open_file("shared").unwrap();
  fs.write(writer, b"0123456789").unwrap();

  let reader = fs.open_file("shared").unwrap();
  assert_ne!(writer, reader);
  assert_eq!(fs.tell(reader).unwrap(), 10);
  fs.seek(reader, 2).unwrap();

  fs.write(writer, b"abc").unwrap();
  let mut buf = [0; 4];
  fs.read(reader, &mut buf).unwrap();
  assert_eq!(&buf, b"2345");
  assert_eq!(fs.tell(writer).unwrap(), 13);

  fs.close(writer).unwrap();
  assert!(fs.close(writer).is_err());
  assert_eq!(fs.tell(reader).unwrap(), 6);
}

#[test]
fn enumeration_cycles_through_files() {
  init_logger();
  let mut fs = SFS::create(memory_disk(Geometry::default())).unwrap();
  for name in ["one", "two", "three"] {
    let fd = fs.open_file(name).unwrap();
    fs.close(fd).unwrap();
  }
  fs.remove("two").unwrap();

  assert_eq!(fs.next_file_name().as_deref(), Some("one"));
  assert_eq!(fs.next_file_name().as_deref(), Some("three"));
  assert_eq!(fs.next_file_name(), None);
  assert_eq!(fs.next_file_name().as_deref(), Some("one"));

  let names: Vec<&str> = fs.file_names().collect();
  assert_eq!(names, ["one", "three"]);

  // Removing a name already listed leaves the rest of the cycle intact.
  fs.remove("one").unwrap();
  assert_eq!(fs.next_file_name().as_deref(), Some("three"));
  assert_eq!(fs.next_file_name(), None);
}

#[test]
fn bad_names_are_rejected() {
  init_logger();
  let mut fs = SFS::create(memory_disk(Geometry::default())).unwrap();
  for name in ["", "this-name-is-far-too-long", "nul\0"] {
    match fs.open_file(name) {
      Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidArgument),
      Ok(fd) => panic!("opened {:?} as {}", name, fd),
    }
  }
  assert_eq!(fs.stats().files, 0);
  assert!(fs.remove("missing").is_err());
}

#[test]
fn files_persist_across_mounts() {
  init_logger();
  let tf = NamedTempFile::new().unwrap();
  let geometry = Geometry::new(512, 8).unwrap();
  let data: Vec<u8> = (0..9000).map(|i| (i % 253) as u8).collect();

  let mut fs = SFS::create_with(file_disk(&tf, geometry, true), geometry).unwrap();
  let fd = fs.open_file("payload").unwrap();
  fs.write(fd, &data).unwrap();
  let fd = fs.open_file("removed").unwrap();
  fs.write(fd, b"bye").unwrap();
  fs.remove("removed").unwrap();
  let used = fs.stats().used_blocks;
  let mut dev = fs.unmount().unwrap();
  dev.sync_disk().unwrap();

  let mut fs = SFS::mount(file_disk(&tf, geometry, false), false).unwrap();
  assert_eq!(fs.geometry(), geometry);
  assert_eq!(fs.stats().used_blocks, used);
  assert_eq!(fs.stats().files, 1);
  assert_eq!(fs.file_size("removed"), 0);

  let fd = fs.open_file("payload").unwrap();
  assert_eq!(fs.tell(fd).unwrap(), data.len());
  fs.seek(fd, 0).unwrap();
  let mut out = vec![0; data.len()];
  assert_eq!(fs.read(fd, &mut out).unwrap(), data.len());
  assert_eq!(out, data);
  fs.verify().unwrap();
}

#[test]
fn verify_catches_a_leaked_block() {
  init_logger();
  let geometry = Geometry::new(64, 4).unwrap();
  let mut fs = SFS::create_with(memory_disk(geometry), geometry).unwrap();
  let fd = fs.open_file("f").unwrap();
  fs.write(fd, b"x").unwrap();
  let stats = fs.stats();
  let mut dev = fs.unmount().unwrap();

  // The bitmap is the last block. Mark the first 64 data blocks used.
  let bitmap_start = (stats.total_blocks - 1) * geometry.block_size();
  dev.as_bytes_mut()[bitmap_start..bitmap_start + 8].fill(0xff);

  let mut fs = SFS::open(dev).unwrap();
  match fs.verify() {
    Err(SFSError::Corrupted(_)) => (),
    other => panic!("unexpected result {:?}", other),
  }
}
