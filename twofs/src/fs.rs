use crate::alloc::Allocator;
use crate::dir::{DirectoryTable, FileEntry};
use crate::io::{Block, BlockAddr, BlockStorage, DiskImage, DiskImageBuilder};
use crate::name::{self, Kind};
use crate::node::{Inode, INODE_TAG};
use crate::root::RootTable;
use crate::{BITMAP_SIZE, BLOCK_SIZE};

use log::{debug, info, warn};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("found no file or directory at path")]
    NotFound,
    #[error("file or directory already exists")]
    AlreadyExists,
    #[error("name {name:?} is longer than {max} bytes")]
    NameTooLong { name: String, max: usize },
    #[error("invalid name: {0:?}")]
    InvalidName(String),
    #[error("{0} is full")]
    CapacityExceeded(&'static str),
    #[error("offset {offset} is beyond the end of the file ({size} bytes)")]
    OffsetBeyondEnd { offset: u64, size: u64 },
    #[error("no free blocks left in the disk image")]
    OutOfSpace,
    #[error("invalid file system block layout: {0}")]
    CorruptImage(String),
    #[error("disk image transfer failed")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// What the adapter layer needs to answer a stat call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub is_directory: bool,
    /// Recorded size for files, always 0 for directories.
    pub size: u64,
}

/// A file resolved down to its slot in a directory table. The index is only
/// valid until `table` is modified.
pub(crate) struct Located {
    pub dir_addr: BlockAddr,
    pub table: DirectoryTable,
    pub index: usize,
}

impl Located {
    pub fn entry(&self) -> FileEntry {
        self.table.entries()[self.index]
    }
}

/// A two-level file system over block storage.
///
/// The handle owns the storage and nothing else: every call re-reads the tables
/// it needs and writes each change back before returning. Mutating calls take
/// `&mut self`, there is no locking and one image must only ever be driven by a
/// single handle at a time.
///
/// # Layout
/// ========================================================================
/// | RootTable | Directory tables / Inodes / Data blocks | Bitmap (tail) |
/// ========================================================================
pub struct TwoFs<S: BlockStorage> {
    dev: S,
}

impl TwoFs<DiskImage> {
    /// Creates a zeroed image file of `blocks` blocks at `path` and formats it.
    pub fn format<P: AsRef<Path>>(path: P, blocks: u64) -> Result<Self> {
        let dev = DiskImageBuilder::new(path)
            .with_block_count(blocks)
            .build()?;
        Self::create(dev)
    }

    /// Opens a previously formatted image file.
    pub fn open_image<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(DiskImage::open(path)?)
    }
}

impl<S: BlockStorage> TwoFs<S> {
    /// Initializes the file system onto owned block storage: an empty root table
    /// in block 0 and a bitmap with every block free.
    pub fn create(dev: S) -> Result<Self> {
        dev.write_block(BlockAddr::ROOT, &RootTable::new().serialize())?;
        dev.write_bitmap(&[0; BITMAP_SIZE])?;
        info!("formatted image with {} blocks", dev.block_count());
        Ok(TwoFs { dev })
    }

    /// Wraps storage that already holds a file system, checking the root table.
    pub fn open(dev: S) -> Result<Self> {
        let fs = TwoFs { dev };
        let root = fs.load_root()?;
        debug!("opened image holding {} subdirectories", root.len());
        Ok(fs)
    }

    pub fn device(&self) -> &S {
        &self.dev
    }

    pub(crate) fn allocator(&self) -> Allocator<'_, S> {
        Allocator::new(&self.dev)
    }

    pub(crate) fn read_raw(&self, addr: BlockAddr) -> Result<Block> {
        let mut block = [0; BLOCK_SIZE];
        self.dev.read_block(addr, &mut block)?;
        Ok(block)
    }

    fn load_root(&self) -> Result<RootTable> {
        RootTable::parse(&self.read_raw(BlockAddr::ROOT)?)
    }

    fn store_root(&self, root: &RootTable) -> Result<()> {
        self.dev.write_block(BlockAddr::ROOT, &root.serialize())?;
        Ok(())
    }

    pub(crate) fn load_dir(&self, addr: BlockAddr) -> Result<DirectoryTable> {
        DirectoryTable::parse(&self.read_raw(addr)?)
    }

    pub(crate) fn store_dir(&self, addr: BlockAddr, table: &DirectoryTable) -> Result<()> {
        self.dev.write_block(addr, &table.serialize())?;
        Ok(())
    }

    pub(crate) fn load_inode(&self, addr: BlockAddr) -> Result<Inode> {
        let node = Inode::parse(&self.read_raw(addr)?)?;
        if node.tag() != INODE_TAG {
            warn!("inode {:?} carries tag {:#x}", addr, node.tag());
        }
        Ok(node)
    }

    pub(crate) fn store_inode(&self, addr: BlockAddr, node: &Inode) -> Result<()> {
        self.dev.write_block(addr, &node.serialize())?;
        Ok(())
    }

    /// Finds the table of subdirectory `name`.
    pub fn lookup_subdirectory(&self, name: &str) -> Result<BlockAddr> {
        self.load_root()?.find(name).ok_or(FsError::NotFound)
    }

    /// Creates an empty subdirectory and returns where its table lives.
    pub fn create_subdirectory(&mut self, name: &str) -> Result<BlockAddr> {
        name::validate(name, Kind::Directory)?;
        let mut root = self.load_root()?;
        if root.find(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if root.is_full() {
            return Err(FsError::CapacityExceeded("root directory"));
        }

        let alloc = self.allocator();
        let addr = alloc.allocate()?;
        alloc.set_allocated(addr)?;
        self.store_dir(addr, &DirectoryTable::new())?;
        root.push(name, addr)?;
        self.store_root(&root)?;
        info!("created subdirectory {:?} at {:?}", name, addr);
        Ok(addr)
    }

    /// Accepted for any name and never changes anything: subdirectories, and
    /// the block holding their table, live as long as the image.
    pub fn remove_subdirectory(&mut self, name: &str) -> Result<()> {
        debug!("ignoring removal of subdirectory {:?}", name);
        Ok(())
    }

    pub(crate) fn locate(&self, dir: &str, name: &str, ext: &str) -> Result<Located> {
        let dir_addr = self.lookup_subdirectory(dir)?;
        let table = self.load_dir(dir_addr)?;
        let index = table.find(name, ext).ok_or(FsError::NotFound)?;
        Ok(Located {
            dir_addr,
            table,
            index,
        })
    }

    /// Position of `name.ext` within the table of `dir`. The index is stale as
    /// soon as a file in that directory is created or removed.
    pub fn lookup_file(&self, dir: &str, name: &str, ext: &str) -> Result<usize> {
        Ok(self.locate(dir, name, ext)?.index)
    }

    /// Creates an empty file with a fresh, childless inode.
    pub fn create_file(&mut self, dir: &str, name: &str, ext: &str) -> Result<()> {
        name::validate(name, Kind::File)?;
        name::validate(ext, Kind::Extension)?;
        let dir_addr = self.lookup_subdirectory(dir)?;
        let mut table = self.load_dir(dir_addr)?;
        if table.find(name, ext).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if table.is_full() {
            return Err(FsError::CapacityExceeded("directory"));
        }

        let alloc = self.allocator();
        let inode_addr = alloc.allocate()?;
        alloc.set_allocated(inode_addr)?;
        self.store_inode(inode_addr, &Inode::new())?;
        table.push(name, ext, inode_addr)?;
        self.store_dir(dir_addr, &table)?;
        info!("created {}/{}.{} with inode {:?}", dir, name, ext, inode_addr);
        Ok(())
    }

    /// Deletes a file and returns its inode and data blocks to the allocator.
    pub fn remove_file(&mut self, dir: &str, name: &str, ext: &str) -> Result<()> {
        let Located {
            dir_addr,
            mut table,
            index,
        } = self.locate(dir, name, ext)?;
        self.remove_entry(dir_addr, &mut table, index)?;
        info!("removed {}/{}.{}", dir, name, ext);
        Ok(())
    }

    /// Removes entry `index` of the table stored at `dir_addr`, shifting later
    /// entries down. The entry is unlinked and the table persisted before any
    /// block is freed. Every index previously taken from `table` is invalid
    /// afterwards.
    fn remove_entry(
        &mut self,
        dir_addr: BlockAddr,
        table: &mut DirectoryTable,
        index: usize,
    ) -> Result<()> {
        let entry = table.remove(index).ok_or(FsError::NotFound)?;
        let inode_addr = entry.inode()?;
        let node = self.load_inode(inode_addr)?;
        self.store_dir(dir_addr, table)?;

        let alloc = self.allocator();
        for block in node.blocks() {
            alloc.free(block)?;
        }
        alloc.free(inode_addr)?;
        debug!(
            "released inode {:?} and {} data blocks",
            inode_addr,
            node.len()
        );
        Ok(())
    }

    /// Attributes of the root (`dir` empty), a subdirectory (`name` and `ext`
    /// empty) or a file. An extension without a name never names anything.
    pub fn attributes(&self, dir: &str, name: &str, ext: &str) -> Result<Attributes> {
        if dir.is_empty() {
            return Ok(Attributes {
                is_directory: true,
                size: 0,
            });
        }
        if name.is_empty() {
            if !ext.is_empty() {
                return Err(FsError::NotFound);
            }
            self.lookup_subdirectory(dir)?;
            return Ok(Attributes {
                is_directory: true,
                size: 0,
            });
        }
        let located = self.locate(dir, name, ext)?;
        Ok(Attributes {
            is_directory: false,
            size: located.entry().size(),
        })
    }

    pub fn list_subdirectories(&self) -> Result<Vec<String>> {
        Ok(self
            .load_root()?
            .entries()
            .iter()
            .map(|entry| entry.name())
            .collect())
    }

    /// Every `(name, extension)` pair in `dir`, in table order.
    pub fn list_files(&self, dir: &str) -> Result<Vec<(String, String)>> {
        let table = self.load_dir(self.lookup_subdirectory(dir)?)?;
        Ok(table
            .entries()
            .iter()
            .map(|entry| (entry.name(), entry.ext()))
            .collect())
    }

    /// The data blocks of a file in logical order.
    pub fn file_blocks(&self, dir: &str, name: &str, ext: &str) -> Result<Vec<BlockAddr>> {
        let located = self.locate(dir, name, ext)?;
        Ok(self.load_inode(located.entry().inode()?)?.blocks())
    }

    pub fn free_block_count(&self) -> Result<usize> {
        self.allocator().free_count()
    }
}
