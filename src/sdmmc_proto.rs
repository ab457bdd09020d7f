//! sdspi-block - Constants for the SD card SPI protocol
//!
//! Command numbers, tokens and response bit layouts used on the wire. Only
//! the subset needed for single block transfers is listed here.

use bitflags::bitflags;

//==============================================================================

// SD Card Commands

/// GO_IDLE_STATE - init card in spi mode if CS low
pub const CMD0: u8 = 0x00;
/// SEND_OP_COND - activates the card's initialization process
pub const CMD1: u8 = 0x01;
/// SEND_STATUS - read the card status register
pub const CMD13: u8 = 0x0D;
/// READ_SINGLE_BLOCK - read a single data block from the card
pub const CMD17: u8 = 0x11;
/// WRITE_BLOCK - write a single data block to the card
pub const CMD24: u8 = 0x18;

/// Transmission bit, ORed into every command index
pub const CMD_START: u8 = 0x40;

/// Checksum sent with every command. Only valid for CMD0, the card ignores
/// it afterwards because CRC checking is off in SPI mode.
pub const CMD_CRC: u8 = 0x95;

/// Largest command index that fits the 6 bit field
pub const CMD_INDEX_MASK: u8 = 0x3F;

//==============================================================================

/// What the line reads when nobody is driving it
pub const IDLE_BYTE: u8 = 0xFF;

/// status for card in the ready state
pub const R1_READY_STATE: u8 = 0x00;

/// status for card in the idle state
pub const R1_IDLE_STATE: u8 = 0x01;

/// start data token for read or write single block
pub const DATA_START_BLOCK: u8 = 0xFE;

/// Filler sent in place of the data block CRC
pub const DUMMY_CRC: [u8; 2] = [0xFF, 0xFF];

/// Size of a sector. There is no variable geometry.
pub const SECTOR_LEN: usize = 512;

//==============================================================================

// Poll budgets

/// Polls for an R1 response before giving up on a single command
pub const R1_POLLS: usize = 8;

/// CMD0 attempts before the card is considered missing
pub const RESET_ATTEMPTS: u32 = 512;

/// CMD1 attempts before the card is considered stuck initialising
pub const OP_COND_ATTEMPTS: u32 = 32_000;

/// Polls for the data start token of a read
pub const TOKEN_POLLS: u16 = 0xFFFF;

/// Polls for the card to release the line after a write
pub const BUSY_POLLS: u32 = 1_000_000;

//==============================================================================

bitflags! {
    /// The bits of an R1 response. Several may be set at once.
    pub struct R1Flags: u8 {
        /// Card is initialising
        const IN_IDLE_STATE = 0x01;
        /// Erase sequence was cleared before executing
        const ERASE_RESET = 0x02;
        /// Illegal command code detected
        const ILLEGAL_COMMAND = 0x04;
        /// CRC check of the last command failed
        const COMMAND_CRC_ERROR = 0x08;
        /// Error in the sequence of erase commands
        const ERASE_SEQUENCE_ERROR = 0x10;
        /// Misaligned address
        const ADDRESS_ERROR = 0x20;
        /// Command argument outside the allowed range
        const PARAMETER_ERROR = 0x40;
    }
}

bitflags! {
    /// The card status bits in the low byte of an R2 response.
    pub struct R2Flags: u8 {
        /// Card is locked
        const CARD_LOCKED = 0x01;
        /// Write protect erase skip or lock/unlock command failed
        const WP_ERASE_SKIP = 0x02;
        /// General or unknown error
        const ERROR = 0x04;
        /// Internal card controller error
        const CC_ERROR = 0x08;
        /// Card ECC failed to correct the data
        const CARD_ECC_FAILED = 0x10;
        /// Write to a protected block
        const WP_VIOLATION = 0x20;
        /// Invalid selection of sectors for erase
        const ERASE_PARAM = 0x40;
        /// Out of range or CSD overwrite
        const OUT_OF_RANGE = 0x80;
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
