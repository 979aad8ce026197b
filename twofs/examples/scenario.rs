use tempfile::NamedTempFile;

use twofs::TwoFs;

pub fn main() {
    let tmp = NamedTempFile::new().unwrap();

    // 10240 blocks, the default image size.
    let mut fs = TwoFs::format(tmp.path(), 10_240).expect("should format");

    fs.create_subdirectory("docs").unwrap();
    fs.create_file("docs", "a", "txt").unwrap();

    let data: Vec<u8> = (0..600).map(|i| b'a' + (i % 26) as u8).collect();
    fs.write("docs", "a", "txt", 0, &data).unwrap();

    let attrs = fs.attributes("docs", "a", "txt").unwrap();
    let blocks = fs.file_blocks("docs", "a", "txt").unwrap();
    println!("/docs/a.txt: {} bytes in {} data blocks", attrs.size, blocks.len());

    let back = fs.read("docs", "a", "txt", 0, 600).unwrap();
    assert_eq!(back, data);
    println!("{} free blocks", fs.free_block_count().unwrap());
}
