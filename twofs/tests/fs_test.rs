use std::collections::HashSet;

use tempfile::NamedTempFile;
use twofs::alloc::{Allocator, State};
use twofs::node::MAX_DATA_IN_BLOCK;
use twofs::{BlockAddr, DiskImage, FsError, TwoFs};

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'a' + (i % 26) as u8).collect()
}

#[test]
fn can_initialize_disk_with_filesystem() {
    let tf = NamedTempFile::new().unwrap();

    // Prepare the image with the file system layout.
    TwoFs::format(tf.path(), 64).unwrap();

    // Open the file system and verify the initial layout.
    let fs = TwoFs::open_image(tf.path()).unwrap();
    assert!(fs.list_subdirectories().unwrap().is_empty());
}

#[test]
fn corrupt_root_table_is_rejected_on_open() {
    let tf = NamedTempFile::new().unwrap();
    TwoFs::format(tf.path(), 64).unwrap();
    std::fs::write(tf.path(), vec![0xff; 64 * 512]).unwrap();

    assert!(matches!(
        TwoFs::open_image(tf.path()),
        Err(FsError::CorruptImage(_))
    ));
}

#[test]
fn docs_scenario_round_trips_six_hundred_bytes() {
    let tf = NamedTempFile::new().unwrap();
    let mut fs = TwoFs::format(tf.path(), 10_240).unwrap();

    fs.create_subdirectory("docs").unwrap();
    fs.create_file("docs", "a", "txt").unwrap();
    assert_eq!(fs.attributes("docs", "a", "txt").unwrap().size, 0);

    let data = payload(600);
    assert_eq!(fs.write("docs", "a", "txt", 0, &data).unwrap(), 600);
    assert_eq!(fs.file_blocks("docs", "a", "txt").unwrap().len(), 2);
    assert_eq!(fs.attributes("docs", "a", "txt").unwrap().size, 600);
    assert_eq!(fs.read("docs", "a", "txt", 0, 600).unwrap(), data);
}

#[test]
fn contents_survive_reopening_the_image() {
    let tf = NamedTempFile::new().unwrap();
    let data = payload(3 * MAX_DATA_IN_BLOCK + 17);
    {
        let mut fs = TwoFs::format(tf.path(), 128).unwrap();
        fs.create_subdirectory("src").unwrap();
        fs.create_subdirectory("docs").unwrap();
        fs.create_file("docs", "notes", "md").unwrap();
        fs.create_file("docs", "readme", "").unwrap();
        fs.write("docs", "notes", "md", 0, &data).unwrap();
    }

    let fs = TwoFs::open_image(tf.path()).unwrap();
    assert_eq!(fs.list_subdirectories().unwrap(), vec!["src", "docs"]);
    assert_eq!(
        fs.list_files("docs").unwrap(),
        vec![
            ("notes".to_string(), "md".to_string()),
            ("readme".to_string(), String::new())
        ]
    );
    assert!(fs.list_files("src").unwrap().is_empty());
    assert_eq!(fs.read("docs", "notes", "md", 0, data.len()).unwrap(), data);
}

#[test]
fn live_structures_never_share_a_block() {
    let tf = NamedTempFile::new().unwrap();
    let mut fs = TwoFs::format(tf.path(), 256).unwrap();

    for dir in ["a", "b", "c"] {
        fs.create_subdirectory(dir).unwrap();
        for (i, file) in ["x", "y"].iter().enumerate() {
            fs.create_file(dir, file, "bin").unwrap();
            fs.write(dir, file, "bin", 0, &payload(700 * (i + 1))).unwrap();
        }
    }
    fs.remove_file("b", "x", "bin").unwrap();
    fs.create_file("c", "z", "bin").unwrap();
    fs.write("c", "z", "bin", 0, &payload(1500)).unwrap();

    let mut seen = HashSet::new();
    let mut used = 0;
    for dir in fs.list_subdirectories().unwrap() {
        let addr = fs.lookup_subdirectory(&dir).unwrap();
        assert!(seen.insert(addr), "directory {} shares {:?}", dir, addr);
        for (name, ext) in fs.list_files(&dir).unwrap() {
            for block in fs.file_blocks(&dir, &name, &ext).unwrap() {
                assert!(seen.insert(block), "{}/{} shares {:?}", dir, name, block);
            }
            used += 1; // inode
        }
    }
    used += seen.len();

    // Every referenced block is marked, and nothing else is.
    let alloc = Allocator::new(fs.device());
    for &addr in &seen {
        assert_eq!(alloc.state(addr).unwrap(), State::Used);
    }
    let allocatable = alloc.allocatable();
    let total = (allocatable.end - allocatable.start) as usize;
    assert_eq!(fs.free_block_count().unwrap(), total - used);
}

#[test]
fn duplicate_file_leaves_directory_unchanged() {
    let tf = NamedTempFile::new().unwrap();
    let mut fs = TwoFs::format(tf.path(), 64).unwrap();
    fs.create_subdirectory("docs").unwrap();
    fs.create_file("docs", "a", "txt").unwrap();
    fs.write("docs", "a", "txt", 0, b"keep me").unwrap();
    let free = fs.free_block_count().unwrap();

    assert!(matches!(
        fs.create_file("docs", "a", "txt"),
        Err(FsError::AlreadyExists)
    ));

    assert_eq!(fs.list_files("docs").unwrap().len(), 1);
    assert_eq!(fs.attributes("docs", "a", "txt").unwrap().size, 7);
    assert_eq!(fs.free_block_count().unwrap(), free);
}

#[test]
fn removed_file_blocks_become_allocatable_again() {
    let tf = NamedTempFile::new().unwrap();
    let mut fs = TwoFs::format(tf.path(), 64).unwrap();
    fs.create_subdirectory("docs").unwrap();
    let free_before = fs.free_block_count().unwrap();

    fs.create_file("docs", "big", "dat").unwrap();
    fs.write("docs", "big", "dat", 0, &payload(2000)).unwrap();
    let blocks = fs.file_blocks("docs", "big", "dat").unwrap();
    assert_eq!(blocks.len(), 4);

    fs.remove_file("docs", "big", "dat").unwrap();
    assert!(matches!(
        fs.lookup_file("docs", "big", "dat"),
        Err(FsError::NotFound)
    ));
    assert_eq!(fs.free_block_count().unwrap(), free_before);

    let alloc = Allocator::new(fs.device());
    for block in &blocks {
        assert_eq!(alloc.state(*block).unwrap(), State::Free);
    }
    // The inode block (3) is the lowest free block again.
    assert_eq!(alloc.allocate().unwrap(), BlockAddr::from_block(3));
}

#[test]
fn read_beyond_recorded_size_transfers_nothing() {
    let tf = NamedTempFile::new().unwrap();
    let mut fs = TwoFs::format(tf.path(), 64).unwrap();
    fs.create_subdirectory("docs").unwrap();
    fs.create_file("docs", "a", "txt").unwrap();
    fs.write("docs", "a", "txt", 0, b"tiny").unwrap();

    let mut buf = [0u8; 16];
    assert!(matches!(
        fs.read_at("docs", "a", "txt", 5, &mut buf),
        Err(FsError::OffsetBeyondEnd { offset: 5, size: 4 })
    ));
    assert_eq!(buf, [0u8; 16]);
}

#[test]
fn attributes_distinguish_directories_and_files() {
    let tf = NamedTempFile::new().unwrap();
    let mut fs = TwoFs::format(tf.path(), 64).unwrap();
    fs.create_subdirectory("docs").unwrap();
    fs.create_file("docs", "a", "txt").unwrap();
    fs.write("docs", "a", "txt", 0, &payload(42)).unwrap();

    assert!(fs.attributes("", "", "").unwrap().is_directory);
    assert!(fs.attributes("docs", "", "").unwrap().is_directory);
    let file = fs.attributes("docs", "a", "txt").unwrap();
    assert!(!file.is_directory);
    assert_eq!(file.size, 42);
    assert!(matches!(
        fs.attributes("docs", "b", "txt"),
        Err(FsError::NotFound)
    ));
}

#[test]
fn image_file_is_opened_per_transfer() {
    let tf = NamedTempFile::new().unwrap();
    let mut fs = TwoFs::format(tf.path(), 64).unwrap();
    fs.create_subdirectory("docs").unwrap();

    // A second handle sees the change immediately since nothing is cached.
    let other: TwoFs<DiskImage> = TwoFs::open_image(tf.path()).unwrap();
    assert_eq!(other.list_subdirectories().unwrap(), vec!["docs"]);
}

#[test]
fn failed_transfers_surface_as_io_errors() {
    let tf = NamedTempFile::new().unwrap();
    let mut fs = TwoFs::format(tf.path(), 64).unwrap();
    fs.create_subdirectory("docs").unwrap();
    fs.create_file("docs", "a", "txt").unwrap();
    fs.write("docs", "a", "txt", 0, b"gone soon").unwrap();

    // Root, directory table and inode stay readable, the data block does not.
    let fs = TwoFs::open_image(tf.path()).unwrap();
    std::fs::OpenOptions::new()
        .write(true)
        .open(tf.path())
        .unwrap()
        .set_len(4 * 512)
        .unwrap();

    assert!(matches!(
        fs.read("docs", "a", "txt", 0, 9),
        Err(FsError::Io(_))
    ));
}
