use crate::sdmmc_proto::SECTOR_LEN;

/// Represents a standard 512 byte block (also known as a sector).
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    /// The 512 bytes in this block (or sector).
    pub contents: [u8; Block::LEN],
}

/// Represents the linear numeric address of a block (or sector).
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockIdx(pub u32);

/// Represents a number of blocks (or sectors).
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockCount(pub u32);

impl Block {
    /// All our blocks are a fixed length of 512 bytes.
    pub const LEN: usize = SECTOR_LEN;

    /// Create a new block full of zeros.
    pub fn new() -> Block {
        Block {
            contents: [0u8; Self::LEN],
        }
    }
}

impl Default for Block {
    fn default() -> Self {
        Block::new()
    }
}

impl From<[u8; Block::LEN]> for Block {
    fn from(contents: [u8; Block::LEN]) -> Self {
        Block { contents }
    }
}

impl From<Block> for [u8; Block::LEN] {
    fn from(block: Block) -> Self {
        block.contents
    }
}

impl core::ops::Deref for Block {
    type Target = [u8; Block::LEN];
    fn deref(&self) -> &[u8; Block::LEN] {
        &self.contents
    }
}

impl core::ops::DerefMut for Block {
    fn deref_mut(&mut self) -> &mut [u8; Block::LEN] {
        &mut self.contents
    }
}

impl core::fmt::Debug for Block {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        writeln!(fmt, "Block:")?;
        for line in self.contents.chunks(32) {
            for b in line {
                write!(fmt, "{:02x}", b)?;
            }
            writeln!(fmt)?;
        }
        Ok(())
    }
}

impl BlockIdx {
    /// The block `count` blocks on from this one. Wraps past the last block
    /// the same way sector byte offsets do.
    pub fn offset(self, count: BlockCount) -> BlockIdx {
        BlockIdx(self.0.wrapping_add(count.0))
    }
}
