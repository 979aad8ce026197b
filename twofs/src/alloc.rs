use crate::fs::{FsError, Result};
use crate::io::{BitmapBytes, BlockAddr, BlockNumber, BlockStorage};
use crate::BITMAP_SIZE;

use bitvec::prelude::*;
use log::debug;
use std::ops::Range;

/// Block 1 is never handed out, block 0 holds the root table.
const FIRST_ALLOCATABLE: BlockNumber = 2;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State {
    Free,
    Used,
}

/// The free-space bitmap stored in the last `BITMAP_SIZE` bytes of the image.
///
/// Bits are ordered most significant first within each byte and bit `i` tracks
/// block `i + 1`, so block 0 has no bit at all. 150 bytes describe blocks 1 to
/// 1200.
#[derive(Clone)]
pub struct Bitmap {
    bits: BitArray<BitmapBytes, Msb0>,
}

impl Bitmap {
    /// The highest block number the bitmap can describe.
    pub const LAST_TRACKED: BlockNumber = (BITMAP_SIZE * 8) as BlockNumber;

    pub fn new() -> Self {
        Self::parse([0; BITMAP_SIZE])
    }

    pub fn parse(buf: BitmapBytes) -> Self {
        Self {
            bits: BitArray::new(buf),
        }
    }

    pub fn serialize(&self) -> BitmapBytes {
        let mut out = [0; BITMAP_SIZE];
        out.copy_from_slice(self.bits.as_raw_slice());
        out
    }

    fn index(blocknr: BlockNumber) -> Option<usize> {
        if blocknr == 0 || blocknr > Self::LAST_TRACKED {
            return None;
        }
        Some((blocknr - 1) as usize)
    }

    /// Returns `None` for blocks the bitmap does not cover.
    pub fn get(&self, blocknr: BlockNumber) -> Option<State> {
        let index = Self::index(blocknr)?;
        Some(if self.bits[index] {
            State::Used
        } else {
            State::Free
        })
    }

    /// Records the state of a block, returning `false` if the block is not
    /// covered by the bitmap.
    pub fn set(&mut self, blocknr: BlockNumber, state: State) -> bool {
        match Self::index(blocknr) {
            Some(index) => {
                self.bits.set(index, state == State::Used);
                true
            }
            None => false,
        }
    }

    /// Lowest free block inside `range`.
    pub fn first_free(&self, range: Range<BlockNumber>) -> Option<BlockNumber> {
        let bits = self.tracked(range.clone())?;
        bits.first_zero().map(|i| range.start + i as BlockNumber)
    }

    pub fn count_free(&self, range: Range<BlockNumber>) -> usize {
        self.tracked(range).map_or(0, |bits| bits.count_zeros())
    }

    fn tracked(&self, range: Range<BlockNumber>) -> Option<&BitSlice<u8, Msb0>> {
        if range.start >= range.end {
            return None;
        }
        let start = Self::index(range.start)?;
        let end = Self::index(range.end - 1)? + 1;
        Some(&self.bits[start..end])
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.bits.as_raw_slice() == other.bits.as_raw_slice()
    }
}

impl Default for Bitmap {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear-scan block allocator over the on-disk bitmap.
///
/// Nothing is cached: every call reads the bitmap from the image and every
/// change is written straight back. `allocate` only picks a block, callers then
/// mark it with `set_allocated` before linking it into any table, and unlink a
/// block from its table before calling `free`.
pub struct Allocator<'a, S: BlockStorage> {
    dev: &'a S,
}

impl<'a, S: BlockStorage> Allocator<'a, S> {
    pub fn new(dev: &'a S) -> Self {
        Self { dev }
    }

    /// Blocks that may ever be handed out. Excludes block 0, block 1, the final
    /// block (it holds the bitmap) and anything the bitmap cannot describe.
    pub fn allocatable(&self) -> Range<BlockNumber> {
        let end = self
            .dev
            .block_count()
            .saturating_sub(1)
            .min(Bitmap::LAST_TRACKED + 1)
            .max(FIRST_ALLOCATABLE);
        FIRST_ALLOCATABLE..end
    }

    pub fn load(&self) -> Result<Bitmap> {
        let mut buf = [0; BITMAP_SIZE];
        self.dev.read_bitmap(&mut buf)?;
        Ok(Bitmap::parse(buf))
    }

    fn store(&self, bitmap: &Bitmap) -> Result<()> {
        self.dev.write_bitmap(&bitmap.serialize())?;
        Ok(())
    }

    /// Returns the lowest-numbered free block without marking it.
    pub fn allocate(&self) -> Result<BlockAddr> {
        let bitmap = self.load()?;
        let blocknr = bitmap
            .first_free(self.allocatable())
            .ok_or(FsError::OutOfSpace)?;
        debug!("picked free block {}", blocknr);
        Ok(BlockAddr::from_block(blocknr))
    }

    pub fn set_allocated(&self, addr: BlockAddr) -> Result<()> {
        self.update(addr, State::Used)
    }

    pub fn free(&self, addr: BlockAddr) -> Result<()> {
        self.update(addr, State::Free)
    }

    pub fn state(&self, addr: BlockAddr) -> Result<State> {
        let blocknr = self.check(addr)?;
        let bitmap = self.load()?;
        Ok(bitmap.get(blocknr).unwrap_or(State::Used))
    }

    pub fn free_count(&self) -> Result<usize> {
        Ok(self.load()?.count_free(self.allocatable()))
    }

    fn check(&self, addr: BlockAddr) -> Result<BlockNumber> {
        let blocknr = addr.block();
        if !self.allocatable().contains(&blocknr) {
            return Err(FsError::CorruptImage(format!(
                "block {} is outside the allocatable range",
                blocknr
            )));
        }
        Ok(blocknr)
    }

    fn update(&self, addr: BlockAddr, state: State) -> Result<()> {
        let blocknr = self.check(addr)?;
        let mut bitmap = self.load()?;
        bitmap.set(blocknr, state);
        self.store(&bitmap)?;
        debug!("block {} marked {:?}", blocknr, state);
        Ok(())
    }
}
