use crate::fs::{FsError, Result};
use crate::io::{Block, BlockAddr};
use crate::name::{self, NAME_FIELD};
use crate::BLOCK_SIZE;

use std::mem::size_of;
use zerocopy::byteorder::{LittleEndian, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

const ENTRY_SIZE: usize = NAME_FIELD + size_of::<u64>();

/// How many subdirectories fit in the root table's single block.
pub const MAX_DIRS_IN_ROOT: usize = (BLOCK_SIZE - size_of::<u32>()) / ENTRY_SIZE;

const PADDING: usize = BLOCK_SIZE - size_of::<u32>() - MAX_DIRS_IN_ROOT * ENTRY_SIZE;

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy, Debug)]
pub struct RootEntry {
    name: [u8; NAME_FIELD],
    /// Byte offset of the subdirectory's table.
    start: U64<LittleEndian>,
}

impl RootEntry {
    pub fn name(&self) -> String {
        name::decode(&self.name)
    }

    pub fn start(&self) -> BlockAddr {
        BlockAddr::from_offset(self.start.get()).unwrap_or(BlockAddr::ROOT)
    }
}

/// The table of subdirectories, always stored in block 0.
///
/// # Layout
/// =========================================================
/// | count: u32 | 29 x { name[9], start: u64 } | padding   |
/// =========================================================
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy)]
pub struct RootTable {
    count: U32<LittleEndian>,
    entries: [RootEntry; MAX_DIRS_IN_ROOT],
    padding: [u8; PADDING],
}

const _: () = assert!(size_of::<RootTable>() == BLOCK_SIZE);

impl RootTable {
    pub fn new() -> Self {
        Self::new_zeroed()
    }

    /// Decodes block 0, rejecting tables whose entry count overflows the fixed
    /// capacity or whose entries point at unaligned blocks.
    pub fn parse(block: &Block) -> Result<Self> {
        let table = Self::read_from(block.as_slice()).unwrap_or_else(Self::new_zeroed);
        if table.count.get() as usize > MAX_DIRS_IN_ROOT {
            return Err(FsError::CorruptImage(format!(
                "root table claims {} entries",
                table.count.get()
            )));
        }
        if let Some(entry) = table
            .entries()
            .iter()
            .find(|e| BlockAddr::from_offset(e.start.get()).is_none())
        {
            return Err(FsError::CorruptImage(format!(
                "subdirectory {:?} starts at unaligned offset {:#x}",
                entry.name(),
                entry.start.get()
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
        self.len() >= MAX_DIRS_IN_ROOT
    }

    pub fn entries(&self) -> &[RootEntry] {
        &self.entries[..self.len().min(MAX_DIRS_IN_ROOT)]
    }

    /// Linear scan for an exact name match.
    pub fn find(&self, name: &str) -> Option<BlockAddr> {
        self.entries()
            .iter()
            .find(|entry| name::raw(&entry.name) == name.as_bytes())
            .map(RootEntry::start)
    }

    /// Appends an entry. The name must already be validated.
    pub fn push(&mut self, name: &str, start: BlockAddr) -> Result<()> {
        if self.find(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if self.is_full() {
            return Err(FsError::CapacityExceeded("root directory"));
        }
        let len = self.len();
        self.entries[len] = RootEntry {
            name: name::encode(name),
            start: U64::new(start.offset()),
        };
        self.count = U32::new(len as u32 + 1);
        Ok(())
    }
}

impl Default for RootTable {
    fn default() -> Self {
        Self::new()
    }
}
