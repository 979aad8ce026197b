use std::fmt;

use crate::{BITMAP_SIZE, BLOCK_SIZE};

/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = u64;

/// One raw disk block.
pub type Block = [u8; BLOCK_SIZE];

/// The raw bytes of the free-space bitmap found at the tail of the image.
pub type BitmapBytes = [u8; BITMAP_SIZE];

/// Location of a block expressed as a byte offset into the disk image. This is
/// the form every on-disk table stores, so it is always a multiple of the block
/// size.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockAddr(u64);

impl BlockAddr {
    /// The address of block 0, home of the root table.
    pub const ROOT: BlockAddr = BlockAddr(0);

    pub fn from_block(blocknr: BlockNumber) -> Self {
        BlockAddr(blocknr * BLOCK_SIZE as u64)
    }

    /// Interprets a raw byte offset read from disk. Returns `None` for offsets
    /// that do not land on a block boundary.
    pub fn from_offset(offset: u64) -> Option<Self> {
        if offset % BLOCK_SIZE as u64 == 0 {
            Some(BlockAddr(offset))
        } else {
            None
        }
    }

    pub fn offset(self) -> u64 {
        self.0
    }

    pub fn block(self) -> BlockNumber {
        self.0 / BLOCK_SIZE as u64
    }
}

impl fmt::Debug for BlockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockAddr({} @ {:#x})", self.block(), self.0)
    }
}

/// Tried to map as closely as possible to the prescribed interface found here:
/// http://web.mit.edu/6.033/1997/handouts/html/04sfs.html.
///
/// Blocks are addressed by byte offset rather than block number since that is
/// what the metadata tables store. Besides whole blocks the device also exposes
/// the fixed bitmap region that trails the last block.
pub trait BlockStorage {
    /// Total number of whole blocks in the image, including block 0 and the final
    /// block holding the bitmap.
    fn block_count(&self) -> u64;
    /// Reads the block at `addr` into the provided buffer.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range, or a short read, will return an
    /// error.
    fn read_block(&self, addr: BlockAddr, buf: &mut Block) -> std::io::Result<()>;
    /// Writes the provided buffer into the block at `addr`.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range, or a short write, will return an
    /// error.
    fn write_block(&self, addr: BlockAddr, buf: &Block) -> std::io::Result<()>;
    fn read_bitmap(&self, buf: &mut BitmapBytes) -> std::io::Result<()>;
    fn write_bitmap(&self, buf: &BitmapBytes) -> std::io::Result<()>;
}
