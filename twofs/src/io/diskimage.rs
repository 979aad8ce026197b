use crate::io::block::{BitmapBytes, Block, BlockAddr, BlockStorage};
use crate::{BITMAP_SIZE, BLOCK_SIZE};

use log::trace;
use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{BufWriter, Error, ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

/// The smallest usable image: the root table plus the block holding the bitmap.
pub const MIN_BLOCKS: u64 = 2;

/// A fixed-size disk image stored in a regular file.
///
/// No file descriptor is held between calls. Every transfer opens the image,
/// seeks, moves exactly one block (or the bitmap region) and closes it again,
/// so each block write stands on its own but nothing spans more than one
/// transfer.
#[derive(Debug, Clone)]
pub struct DiskImage {
    path: PathBuf,
    /// The total number of blocks available in the image.
    block_count: u64,
}

impl DiskImage {
    /// Opens an existing image, deriving the block count from its length. The
    /// contents are not validated, that is up to the file system layer.
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = std::fs::metadata(&path)?.len();
        if len % BLOCK_SIZE as u64 != 0 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("image length {} is not a multiple of {}", len, BLOCK_SIZE),
            ));
        }
        let block_count = len / BLOCK_SIZE as u64;
        if block_count < MIN_BLOCKS {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("image holds {} blocks, need at least {}", block_count, MIN_BLOCKS),
            ));
        }

        Ok(DiskImage { path, block_count })
    }

    fn image_len(&self) -> u64 {
        self.block_count * BLOCK_SIZE as u64
    }

    fn bitmap_offset(&self) -> u64 {
        self.image_len() - BITMAP_SIZE as u64
    }

    fn check_range(&self, offset: u64, len: usize) -> std::io::Result<()> {
        if offset + len as u64 > self.image_len() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("transfer at {:#x} exceeds image bounds", offset),
            ));
        }
        Ok(())
    }

    fn block_offset(&self, addr: BlockAddr) -> std::io::Result<u64> {
        if addr.block() >= self.block_count {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "block requested exceeds image upper bound",
            ));
        }
        Ok(addr.offset())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        self.check_range(offset, buf.len())?;
        let mut fd = File::open(&self.path)?;
        fd.seek(SeekFrom::Start(offset))?;
        // A short read surfaces as UnexpectedEof.
        fd.read_exact(buf)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
        self.check_range(offset, buf.len())?;
        // Return error if the file does not exist rather than create one.
        let mut fd = OpenOptions::new().write(true).open(&self.path)?;
        fd.seek(SeekFrom::Start(offset))?;
        fd.write_all(buf)?;
        fd.flush()
    }
}

impl BlockStorage for DiskImage {
    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn read_block(&self, addr: BlockAddr, buf: &mut Block) -> std::io::Result<()> {
        let offset = self.block_offset(addr)?;
        trace!("read block {:?}", addr);
        self.read_at(offset, buf)
    }

    fn write_block(&self, addr: BlockAddr, buf: &Block) -> std::io::Result<()> {
        let offset = self.block_offset(addr)?;
        trace!("write block {:?}", addr);
        self.write_at(offset, buf)
    }

    fn read_bitmap(&self, buf: &mut BitmapBytes) -> std::io::Result<()> {
        self.read_at(self.bitmap_offset(), buf)
    }

    fn write_bitmap(&self, buf: &BitmapBytes) -> std::io::Result<()> {
        self.write_at(self.bitmap_offset(), buf)
    }
}

/// Creates a fresh zero-filled image file of a fixed number of blocks.
pub struct DiskImageBuilder {
    path: PathBuf,
    block_count: u64,
}

impl DiskImageBuilder {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        DiskImageBuilder {
            path: path.as_ref().to_path_buf(),
            block_count: 0,
        }
    }

    /// Sets the number of desired blocks in the image.
    pub fn with_block_count(mut self, blocks: u64) -> Self {
        self.block_count = blocks;
        self
    }

    /// This builder does destructive things to prepare the file for use: an
    /// existing file at the path is truncated and zeroed.
    pub fn build(self) -> std::io::Result<DiskImage> {
        if self.block_count < MIN_BLOCKS {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("an image needs at least {} blocks", MIN_BLOCKS),
            ));
        }
        let fd = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        let mut bfd = BufWriter::new(fd);
        // Zero out the image, buffering each write to prevent excessive syscalls.
        let zeros = [0x00; BLOCK_SIZE];
        for _ in 0..self.block_count {
            bfd.write_all(&zeros)?;
        }
        bfd.flush()?;

        Ok(DiskImage {
            path: self.path,
            block_count: self.block_count,
        })
    }
}
