//! A two-level file system stored in a single fixed-size disk image.
//!
//! The root directory holds named subdirectories, each subdirectory holds files
//! named with an 8.3 name. Everything lives in 512 byte blocks:
//!
//! ```text
//! ===========================================================================
//! | RootTable | directory tables, inodes, data blocks ... | final block     |
//! | block 0   |                                           | (bitmap at tail)|
//! ===========================================================================
//! ```
//!
//! Every operation reads what it needs from the image and writes every change
//! back before returning. No state survives between calls.

pub mod alloc;
mod data;
pub mod dir;
pub mod fs;
pub mod io;
pub mod name;
pub mod node;
pub mod root;

/// Size of one disk block in bytes.
pub const BLOCK_SIZE: usize = 512;
/// Bytes of free-space bitmap at the very end of the image.
pub const BITMAP_SIZE: usize = 150;

pub use crate::fs::{Attributes, FsError, Result, TwoFs};
pub use crate::io::{BlockAddr, BlockStorage, DiskImage, DiskImageBuilder};
