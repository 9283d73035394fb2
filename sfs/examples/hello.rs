use sfs::io::FileBlockEmulatorBuilder;
use sfs::{Geometry, SFS};

pub fn main() -> sfs::Result<()> {
    let geometry = Geometry::default();
    let tmp = tempfile::tempfile()?;
    let dev = FileBlockEmulatorBuilder::from(tmp)
        .with_block_size(geometry.block_size())
        .with_block_count(geometry.volume_blocks())
        .build()?;

    let mut fs = SFS::create_with(dev, geometry)?;
    let fd = fs.open_file("hello.txt")?;
    fs.write(fd, b"hello, world\n")?;
    fs.seek(fd, 0)?;

    let mut buf = vec![0; fs.file_size("hello.txt")];
    fs.read(fd, &mut buf)?;
    fs.close(fd)?;
    print!("{}", String::from_utf8_lossy(&buf));

    let stats = fs.stats();
    println!(
        "{} file(s), {} of {} data blocks used",
        stats.files, stats.used_blocks, stats.data_blocks
    );
    fs.unmount()?;
    Ok(())
}
