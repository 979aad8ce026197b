mod block;
mod diskimage;

pub use block::{BitmapBytes, Block, BlockAddr, BlockNumber, BlockStorage};
pub use diskimage::{DiskImage, DiskImageBuilder, MIN_BLOCKS};
