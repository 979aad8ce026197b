use crate::fs::{FsError, Result};
use crate::io::{Block, BlockAddr};
use crate::BLOCK_SIZE;

use std::mem::size_of;
use zerocopy::byteorder::{LittleEndian, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Tag stored at the start of every inode block.
pub const INODE_TAG: u64 = 0xFFFF_FFFF;
/// Tag stored at the start of every data block.
pub const DATA_TAG: u64 = 0xF113_DA7A;

/// How many data block pointers fit in one inode.
pub const NUM_POINTERS_IN_INODE: usize =
    (BLOCK_SIZE - size_of::<u32>() - size_of::<u64>()) / size_of::<u64>();

/// Payload bytes carried by one data block.
pub const MAX_DATA_IN_BLOCK: usize = BLOCK_SIZE - size_of::<u64>();

/// Largest file an inode can describe.
pub const MAX_FILE_SIZE: u64 = (NUM_POINTERS_IN_INODE * MAX_DATA_IN_BLOCK) as u64;

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy)]
/// The extent map of one file: a single level of pointers to data blocks in
/// logical order. Only the first `children` pointers are meaningful.
///
/// # Layout
/// ==============================================================
/// | tag: u64 | children: u32 | (4 pad) | 62 x pointer: u64     |
/// ==============================================================
pub struct Inode {
    tag: U64<LittleEndian>,
    children: U32<LittleEndian>,
    /// Keeps the pointers 8 byte aligned as they are on disk.
    _pad: [u8; 4],
    pointers: [U64<LittleEndian>; NUM_POINTERS_IN_INODE],
}

const _: () = assert!(size_of::<Inode>() == BLOCK_SIZE);

impl Inode {
    /// An inode with no children.
    pub fn new() -> Self {
        let mut node = Self::new_zeroed();
        node.tag = U64::new(INODE_TAG);
        node
    }

    pub fn parse(block: &Block) -> Result<Self> {
        let node = Self::read_from(block.as_slice()).unwrap_or_else(Self::new_zeroed);
        if node.children.get() as usize > NUM_POINTERS_IN_INODE {
            return Err(FsError::CorruptImage(format!(
                "inode claims {} children",
                node.children.get()
            )));
        }
        if let Some(ptr) = node.pointers().find_map(|p| p.err()) {
            return Err(FsError::CorruptImage(format!(
                "inode points at unaligned offset {:#x}",
                ptr
            )));
        }
        Ok(node)
    }

    pub fn serialize(&self) -> Block {
        let mut block = [0; BLOCK_SIZE];
        block.copy_from_slice(self.as_bytes());
        block
    }

    pub fn tag(&self) -> u64 {
        self.tag.get()
    }

    pub fn len(&self) -> usize {
        self.children.get() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= NUM_POINTERS_IN_INODE
    }

    fn pointers(&self) -> impl Iterator<Item = std::result::Result<BlockAddr, u64>> + '_ {
        self.pointers[..self.len().min(NUM_POINTERS_IN_INODE)]
            .iter()
            .map(|p| BlockAddr::from_offset(p.get()).ok_or(p.get()))
    }

    /// The populated pointers, in logical order.
    pub fn blocks(&self) -> Vec<BlockAddr> {
        self.pointers().filter_map(|p| p.ok()).collect()
    }

    /// Data block holding extent `slot`, if the map reaches that far.
    pub fn get(&self, slot: usize) -> Option<BlockAddr> {
        if slot >= self.len() {
            return None;
        }
        BlockAddr::from_offset(self.pointers[slot].get())
    }

    pub fn push(&mut self, addr: BlockAddr) -> Result<()> {
        if self.is_full() {
            return Err(FsError::CapacityExceeded("inode extent map"));
        }
        let len = self.len();
        self.pointers[len] = U64::new(addr.offset());
        self.children = U32::new(len as u32 + 1);
        Ok(())
    }
}

impl Default for Inode {
    fn default() -> Self {
        Self::new()
    }
}

/// One chunk of file content behind a tag.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy)]
pub struct DataBlock {
    tag: U64<LittleEndian>,
    data: [u8; MAX_DATA_IN_BLOCK],
}

const _: () = assert!(size_of::<DataBlock>() == BLOCK_SIZE);

impl DataBlock {
    /// A tagged block with an all-zero payload.
    pub fn new() -> Self {
        let mut block = Self::new_zeroed();
        block.tag = U64::new(DATA_TAG);
        block
    }

    pub fn parse(block: &Block) -> Self {
        Self::read_from(block.as_slice()).unwrap_or_else(Self::new_zeroed)
    }

    pub fn serialize(&self) -> Block {
        let mut block = [0; BLOCK_SIZE];
        block.copy_from_slice(self.as_bytes());
        block
    }

    pub fn has_valid_tag(&self) -> bool {
        self.tag.get() == DATA_TAG
    }

    pub fn payload(&self) -> &[u8; MAX_DATA_IN_BLOCK] {
        &self.data
    }

    pub fn payload_mut(&mut self) -> &mut [u8; MAX_DATA_IN_BLOCK] {
        &mut self.data
    }
}

impl Default for DataBlock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_matches_block_size() {
        assert_eq!(NUM_POINTERS_IN_INODE, 62);
        assert_eq!(MAX_DATA_IN_BLOCK, 504);
        assert_eq!(MAX_FILE_SIZE, 31_248);
    }

    #[test]
    fn fresh_inode_is_tagged_and_empty() {
        let node = Inode::new();
        let block = node.serialize();
        assert_eq!(&block[0..8], &INODE_TAG.to_le_bytes());
        assert_eq!(&block[8..12], &0u32.to_le_bytes());
        assert!(node.is_empty());
        assert_eq!(node.get(0), None);
    }

    #[test]
    fn pointers_start_at_offset_sixteen() {
        let mut node = Inode::new();
        node.push(BlockAddr::from_block(7)).unwrap();
        node.push(BlockAddr::from_block(3)).unwrap();

        let block = node.serialize();
        assert_eq!(&block[8..12], &2u32.to_le_bytes());
        assert_eq!(&block[16..24], &(7u64 * 512).to_le_bytes());
        assert_eq!(&block[24..32], &(3u64 * 512).to_le_bytes());

        let parsed = Inode::parse(&block).unwrap();
        assert_eq!(
            parsed.blocks(),
            vec![BlockAddr::from_block(7), BlockAddr::from_block(3)]
        );
        assert_eq!(parsed.get(1), Some(BlockAddr::from_block(3)));
        assert_eq!(parsed.get(2), None);
    }

    #[test]
    fn extent_map_is_bounded() {
        let mut node = Inode::new();
        for i in 0..NUM_POINTERS_IN_INODE {
            node.push(BlockAddr::from_block(i as u64 + 2)).unwrap();
        }
        assert!(node.is_full());
        assert!(matches!(
            node.push(BlockAddr::from_block(99)),
            Err(FsError::CapacityExceeded(_))
        ));
    }

    #[test]
    fn garbage_beyond_children_is_ignored() {
        let mut block = Inode::new().serialize();
        // A stale, unaligned pointer past the child count.
        block[16..24].copy_from_slice(&123u64.to_le_bytes());
        let node = Inode::parse(&block).unwrap();
        assert!(node.blocks().is_empty());
    }

    #[test]
    fn parsing_overfull_inode_is_corruption() {
        let mut block = Inode::new().serialize();
        block[8..12].copy_from_slice(&63u32.to_le_bytes());
        assert!(matches!(Inode::parse(&block), Err(FsError::CorruptImage(_))));
    }

    #[test]
    fn data_block_payload_follows_tag() {
        let mut data = DataBlock::new();
        data.payload_mut()[0] = b'x';
        data.payload_mut()[MAX_DATA_IN_BLOCK - 1] = b'y';

        let block = data.serialize();
        assert_eq!(&block[0..8], &DATA_TAG.to_le_bytes());
        assert_eq!(block[8], b'x');
        assert_eq!(block[BLOCK_SIZE - 1], b'y');

        let parsed = DataBlock::parse(&block);
        assert!(parsed.has_valid_tag());
        assert!(!DataBlock::parse(&[0; BLOCK_SIZE]).has_valid_tag());
    }
}
