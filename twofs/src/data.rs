//! The data path: mapping file offsets onto extent slots and moving bytes
//! across block boundaries.

use crate::fs::{FsError, Located, Result, TwoFs};
use crate::io::{BlockAddr, BlockStorage};
use crate::node::{DataBlock, Inode, MAX_DATA_IN_BLOCK, MAX_FILE_SIZE, NUM_POINTERS_IN_INODE};

use log::{debug, warn};

const PAYLOAD: u64 = MAX_DATA_IN_BLOCK as u64;

/// Extent slot and offset within that slot's payload for a file offset.
fn position(offset: u64) -> (usize, usize) {
    ((offset / PAYLOAD) as usize, (offset % PAYLOAD) as usize)
}

/// Number of data blocks needed to hold `end` bytes.
fn blocks_needed(end: u64) -> u64 {
    (end + PAYLOAD - 1) / PAYLOAD
}

impl<S: BlockStorage> TwoFs<S> {
    fn load_data(&self, addr: BlockAddr) -> Result<DataBlock> {
        let block = DataBlock::parse(&self.read_raw(addr)?);
        if !block.has_valid_tag() {
            warn!("data block {:?} carries an unexpected tag", addr);
        }
        Ok(block)
    }

    fn store_data(&self, addr: BlockAddr, block: &DataBlock) -> Result<()> {
        self.device().write_block(addr, &block.serialize())?;
        Ok(())
    }

    /// Reads from `offset` into `buf`, returning how many bytes were copied.
    ///
    /// The transfer stops at whichever comes first: the end of `buf`, the
    /// recorded file size, or the end of the extent map.
    ///
    /// # Errors
    ///
    /// `OffsetBeyondEnd` when `offset` is past the recorded size, in which case
    /// nothing is copied.
    pub fn read_at(
        &self,
        dir: &str,
        name: &str,
        ext: &str,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        let entry = self.locate(dir, name, ext)?.entry();
        let size = entry.size();
        if offset > size {
            return Err(FsError::OffsetBeyondEnd { offset, size });
        }
        let node = self.load_inode(entry.inode()?)?;

        let want = (buf.len() as u64).min(size - offset) as usize;
        let mut done = 0;
        let mut pos = offset;
        while done < want {
            let (slot, start) = position(pos);
            let addr = match node.get(slot) {
                Some(addr) => addr,
                None => break,
            };
            let block = self.load_data(addr)?;
            let chunk = (MAX_DATA_IN_BLOCK - start).min(want - done);
            buf[done..done + chunk].copy_from_slice(&block.payload()[start..start + chunk]);
            done += chunk;
            pos += chunk as u64;
        }
        Ok(done)
    }

    /// Reads up to `length` bytes starting at `offset`.
    pub fn read(
        &self,
        dir: &str,
        name: &str,
        ext: &str,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>> {
        let mut buf = vec![0; length.min(MAX_FILE_SIZE as usize)];
        let read = self.read_at(dir, name, ext, offset, &mut buf)?;
        buf.truncate(read);
        Ok(buf)
    }

    /// Writes `data` at `offset`, growing the extent map as needed, and returns
    /// the number of bytes written.
    ///
    /// Each touched data block is written back as soon as it is filled. The
    /// recorded size becomes `data.len()` when `offset` is 0 and grows by
    /// `data.len()` otherwise; it is not recomputed from the write's end. An
    /// `offset` past the recorded size is pulled back to it, so the bytes are
    /// appended.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` if the file would need more extents than an inode
    /// holds and `OutOfSpace` if there are not enough free blocks. Both are
    /// detected before anything is written.
    pub fn write(
        &mut self,
        dir: &str,
        name: &str,
        ext: &str,
        offset: u64,
        data: &[u8],
    ) -> Result<usize> {
        let Located {
            dir_addr,
            mut table,
            index,
        } = self.locate(dir, name, ext)?;
        let entry = table.entries()[index];
        let size = entry.size();
        if offset > size {
            debug!(
                "write at {} is past the end of {}/{}.{}, appending at {}",
                offset, dir, name, ext, size
            );
        }
        let offset = offset.min(size);
        let inode_addr = entry.inode()?;
        let mut node = self.load_inode(inode_addr)?;

        let needed = blocks_needed(offset + data.len() as u64);
        if needed > NUM_POINTERS_IN_INODE as u64 {
            return Err(FsError::CapacityExceeded("inode extent map"));
        }
        let needed = needed as usize;
        let missing = needed.saturating_sub(node.len());
        if missing > self.allocator().free_count()? {
            return Err(FsError::OutOfSpace);
        }
        self.grow(inode_addr, &mut node, needed)?;

        let mut done = 0;
        let mut pos = offset;
        while done < data.len() {
            let (slot, start) = position(pos);
            let addr = node.get(slot).ok_or_else(|| {
                FsError::CorruptImage(format!("extent slot {} of {:?} is empty", slot, inode_addr))
            })?;
            let mut block = self.load_data(addr)?;
            let chunk = (MAX_DATA_IN_BLOCK - start).min(data.len() - done);
            block.payload_mut()[start..start + chunk].copy_from_slice(&data[done..done + chunk]);
            self.store_data(addr, &block)?;
            done += chunk;
            pos += chunk as u64;
        }

        let new_size = if offset == 0 {
            data.len() as u64
        } else {
            size + data.len() as u64
        };
        if let Some(entry) = table.get_mut(index) {
            entry.set_size(new_size);
        }
        self.store_dir(dir_addr, &table)?;
        self.store_inode(inode_addr, &node)?;
        debug!(
            "wrote {} bytes at {} to {}/{}.{}, size now {}",
            data.len(),
            offset,
            dir,
            name,
            ext,
            new_size
        );
        Ok(data.len())
    }

    /// Appends freshly allocated, zeroed data blocks until the extent map holds
    /// `needed` of them. The inode is persisted after every new pointer.
    fn grow(&self, inode_addr: BlockAddr, node: &mut Inode, needed: usize) -> Result<()> {
        let alloc = self.allocator();
        while node.len() < needed {
            let addr = alloc.allocate()?;
            alloc.set_allocated(addr)?;
            self.store_data(addr, &DataBlock::new())?;
            node.push(addr)?;
            self.store_inode(inode_addr, node)?;
            debug!("extent {} of {:?} is {:?}", node.len() - 1, inode_addr, addr);
        }
        Ok(())
    }
}
