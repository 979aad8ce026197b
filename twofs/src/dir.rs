use crate::fs::{FsError, Result};
use crate::io::{Block, BlockAddr};
use crate::name::{self, EXT_FIELD, NAME_FIELD};
use crate::BLOCK_SIZE;

use std::mem::size_of;
use zerocopy::byteorder::{LittleEndian, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

const ENTRY_SIZE: usize = NAME_FIELD + EXT_FIELD + 2 * size_of::<u64>();

/// How many files one subdirectory can hold.
pub const MAX_FILES_IN_DIR: usize =
    (BLOCK_SIZE - NAME_FIELD - size_of::<u32>()) / ENTRY_SIZE;

const PADDING: usize = BLOCK_SIZE - size_of::<u32>() - MAX_FILES_IN_DIR * ENTRY_SIZE;

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy, Debug)]
pub struct FileEntry {
    name: [u8; NAME_FIELD],
    ext: [u8; EXT_FIELD],
    /// Number of valid bytes in the file.
    size: U64<LittleEndian>,
    /// Byte offset of the file's inode.
    inode: U64<LittleEndian>,
}

impl FileEntry {
    pub fn name(&self) -> String {
        name::decode(&self.name)
    }

    pub fn ext(&self) -> String {
        name::decode(&self.ext)
    }

    pub fn size(&self) -> u64 {
        self.size.get()
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = U64::new(size);
    }

    pub fn inode(&self) -> Result<BlockAddr> {
        BlockAddr::from_offset(self.inode.get()).ok_or_else(|| {
            FsError::CorruptImage(format!(
                "inode of {}.{} at unaligned offset {:#x}",
                self.name(),
                self.ext(),
                self.inode.get()
            ))
        })
    }

    fn matches(&self, name: &str, ext: &str) -> bool {
        name::raw(&self.name) == name.as_bytes() && name::raw(&self.ext) == ext.as_bytes()
    }
}

/// The file table of one subdirectory, occupying exactly one block.
///
/// Entries are kept densely packed in insertion order. Removing an entry shifts
/// every later entry down one slot, so an index is only meaningful until the
/// table is next modified.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy)]
pub struct DirectoryTable {
    count: U32<LittleEndian>,
    entries: [FileEntry; MAX_FILES_IN_DIR],
    padding: [u8; PADDING],
}

const _: () = assert!(size_of::<DirectoryTable>() == BLOCK_SIZE);

impl DirectoryTable {
    pub fn new() -> Self {
        Self::new_zeroed()
    }

    pub fn parse(block: &Block) -> Result<Self> {
        let table = Self::read_from(block.as_slice()).unwrap_or_else(Self::new_zeroed);
        if table.count.get() as usize > MAX_FILES_IN_DIR {
            return Err(FsError::CorruptImage(format!(
                "directory table claims {} entries",
                table.count.get()
            )));
        }
        Ok(table)
    }

    pub fn serialize(&self) -> Block {
        let mut block = [0; BLOCK_SIZE];
        block.copy_from_slice(self.as_bytes());
        block
    }

    pub fn len(&self) -> usize {
        self.count.get() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= MAX_FILES_IN_DIR
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries[..self.len().min(MAX_FILES_IN_DIR)]
    }

    pub fn get(&self, index: usize) -> Option<&FileEntry> {
        self.entries().get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut FileEntry> {
        let len = self.len().min(MAX_FILES_IN_DIR);
        self.entries[..len].get_mut(index)
    }

    /// Linear scan for an exact (name, extension) match.
    pub fn find(&self, name: &str, ext: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.matches(name, ext))
    }

    /// Appends a zero-size entry and returns its index. Names must already be
    /// validated.
    pub fn push(&mut self, name: &str, ext: &str, inode: BlockAddr) -> Result<usize> {
        if self.find(name, ext).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if self.is_full() {
            return Err(FsError::CapacityExceeded("directory"));
        }
        let len = self.len();
        self.entries[len] = FileEntry {
            name: name::encode(name),
            ext: name::encode(ext),
            size: U64::new(0),
            inode: U64::new(inode.offset()),
        };
        self.count = U32::new(len as u32 + 1);
        Ok(len)
    }

    /// Removes the entry at `index`, shifting later entries down by one.
    pub fn remove(&mut self, index: usize) -> Option<FileEntry> {
        let len = self.len();
        if index >= len {
            return None;
        }
        let removed = self.entries[index];
        self.entries.copy_within(index + 1..len, index);
        self.entries[len - 1] = FileEntry::new_zeroed();
        self.count = U32::new(len as u32 - 1);
        Some(removed)
    }
}

impl Default for DirectoryTable {
    fn default() -> Self {
        Self::new()
    }
}
