//! Maps R1 and R2 responses onto the conditions they report.
//!
//! Matching is on exact values, the way SanDisk documents them. A response
//! with more than one bit set is reported as unknown, carrying the raw value
//! so the individual flags can still be inspected.

use core::fmt;

use crate::sdmmc_proto::{R1Flags, R2Flags};

/// A condition reported by the card in an R1 or R2 response.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CardError {
    /// Argument out of bounds
    ArgumentOutOfBounds,
    /// Address out of bounds
    AddressOutOfBounds,
    /// Error during erase sequence
    EraseSequence,
    /// Command CRC failed
    CrcFailed,
    /// Illegal command
    IllegalCommand,
    /// Erase reset
    EraseReset,
    /// Card is still initialising
    Initializing,
    /// Card is locked
    Locked,
    /// Write protect erase skip, or a lock/unlock command failed
    LockFailed,
    /// General or unknown error
    General,
    /// Internal card controller error
    Controller,
    /// Card internal ECC was applied but failed to correct the data
    EccFailed,
    /// Write protect violation
    WriteProtect,
    /// Invalid selection of sectors for erase
    InvalidEraseSelection,
    /// Out of range, or CSD overwrite
    OutOfRange,
    /// Nothing we know about. Holds the raw response.
    Unknown(u16),
}

impl CardError {
    /// Classify an R1 response byte.
    pub fn from_r1(value: u8) -> CardError {
        match R1Flags::from_bits(value) {
            Some(R1Flags::PARAMETER_ERROR) => CardError::ArgumentOutOfBounds,
            Some(R1Flags::ADDRESS_ERROR) => CardError::AddressOutOfBounds,
            Some(R1Flags::ERASE_SEQUENCE_ERROR) => CardError::EraseSequence,
            Some(R1Flags::COMMAND_CRC_ERROR) => CardError::CrcFailed,
            Some(R1Flags::ILLEGAL_COMMAND) => CardError::IllegalCommand,
            Some(R1Flags::ERASE_RESET) => CardError::EraseReset,
            Some(R1Flags::IN_IDLE_STATE) => CardError::Initializing,
            _ => CardError::Unknown(u16::from(value)),
        }
    }

    /// Classify an R2 response. The high byte is R1 compatible and is only
    /// looked at when the low byte matches nothing.
    pub fn from_r2(value: u16) -> CardError {
        let status = if value > 0x00FF {
            None
        } else {
            R2Flags::from_bits(value as u8)
        };
        match status {
            Some(R2Flags::CARD_LOCKED) => CardError::Locked,
            Some(R2Flags::WP_ERASE_SKIP) => CardError::LockFailed,
            Some(R2Flags::ERROR) => CardError::General,
            Some(R2Flags::CC_ERROR) => CardError::Controller,
            Some(R2Flags::CARD_ECC_FAILED) => CardError::EccFailed,
            Some(R2Flags::WP_VIOLATION) => CardError::WriteProtect,
            Some(R2Flags::ERASE_PARAM) => CardError::InvalidEraseSelection,
            Some(R2Flags::OUT_OF_RANGE) => CardError::OutOfRange,
            _ if value > 0x00FF => CardError::from_r1((value >> 8) as u8),
            _ => CardError::Unknown(value),
        }
    }

    /// The individual bits behind an unknown single byte response.
    pub fn r1_flags(&self) -> Option<R1Flags> {
        match *self {
            CardError::Unknown(raw) if raw <= 0xFF => Some(R1Flags::from_bits_truncate(raw as u8)),
            _ => None,
        }
    }
}

impl fmt::Display for CardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardError::ArgumentOutOfBounds => f.write_str("argument out of bounds"),
            CardError::AddressOutOfBounds => f.write_str("address out of bounds"),
            CardError::EraseSequence => f.write_str("error during erase sequence"),
            CardError::CrcFailed => f.write_str("CRC failed"),
            CardError::IllegalCommand => f.write_str("illegal command"),
            CardError::EraseReset => f.write_str("erase reset"),
            CardError::Initializing => f.write_str("card is initialising"),
            CardError::Locked => f.write_str("card is locked"),
            CardError::LockFailed => f.write_str("WP erase skip, lock/unlock cmd failed"),
            CardError::General => f.write_str("general or unknown error, card broken?"),
            CardError::Controller => f.write_str("internal card controller error"),
            CardError::EccFailed => f.write_str("card internal ECC failed to correct the data"),
            CardError::WriteProtect => f.write_str("write protect violation"),
            CardError::InvalidEraseSelection => f.write_str("invalid selection of sectors for erase"),
            CardError::OutOfRange => f.write_str("out of range, CSD overwrite"),
            CardError::Unknown(raw) => write!(f, "unknown error 0x{:x}", raw),
        }
    }
}

/// Somewhere to send the conditions the card reports. Purely advisory: the
/// protocol behaves the same whatever the sink does.
pub trait Diagnostics {
    /// Called once for every classified response.
    fn report(&mut self, error: CardError);
}

/// Discards everything.
impl Diagnostics for () {
    fn report(&mut self, _error: CardError) {}
}

impl<D> Diagnostics for &mut D
where
    D: Diagnostics,
{
    fn report(&mut self, error: CardError) {
        (*self).report(error)
    }
}
