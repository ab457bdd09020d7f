//! sdspi-block - SD card SPI protocol
//!
//! Implements single block reads and writes to an SD card over any
//! byte-at-a-time transport.
//!
//! Everything here is synchronous and polling. No operation can be
//! abandoned half way through a frame, so each one runs until it succeeds
//! or a poll budget runs out. After a failure the whole operation may be
//! retried from the start; if the card state is in doubt, run
//! [`SdSpi::initialize`] again first.

mod classify;
mod command;
mod init;

pub use classify::{CardError, Diagnostics};
pub use command::Command;
pub use init::{InitError, InitLimits, InitState, Initializer};

use command::CardBus;

use crate::sdmmc_proto::*;
use crate::transport::Transport;
use crate::{Block, BlockCount, BlockDevice, BlockIdx};

#[cfg(feature = "log")]
use log::{debug, trace, warn};

#[cfg(feature = "defmt-log")]
use defmt::{debug, trace, warn};

/// The possible errors a block transfer can generate.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// We got an error from the transport
    Transport,
    /// The card never answered the command
    NoResponse,
    /// The card rejected the command
    Command(CardError),
    /// We didn't get a data start token when reading from the card
    TokenTimeout,
    /// The card sent something other than a data start token
    BadToken(CardError),
    /// We didn't get a response when waiting for the card to not be busy
    BusyTimeout,
}

/// How much to trust the acknowledgement of a write command.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AckCheck {
    /// Send the data block whatever the card said
    Permissive,
    /// Only send the data block if the card accepted the command
    Strict,
}

/// Options for talking to the card.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Options {
    /// Retry ceilings for initialisation
    pub init: InitLimits,
    /// Polls for the data start token on a read
    pub token_polls: u16,
    /// Polls for the card to finish programming after a write
    pub busy_polls: u32,
    /// What to do when a write command is not acknowledged
    pub write_ack: AckCheck,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            init: InitLimits::default(),
            token_polls: TOKEN_POLLS,
            busy_polls: BUSY_POLLS,
            write_ack: AckCheck::Permissive,
        }
    }
}

/// Auxiliary requests for [`SdSpi::control`].
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Control {
    /// Do nothing
    Noop,
    /// Ask how many sectors the medium holds
    QuerySectorCount,
}

/// Answers from [`SdSpi::control`].
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControlValue {
    /// Nothing to report
    None,
    /// Number of sectors, if known at this layer
    SectorCount(Option<BlockCount>),
}

/// An SD card on a byte transport.
///
/// Holds nothing between calls besides the transport, the diagnostic sink
/// and the options. Callers sharing a card must serialise their access.
pub struct SdSpi<T, D = ()>
where
    T: Transport,
    D: Diagnostics,
{
    transport: T,
    diagnostics: D,
    options: Options,
}

/// Pass a classified condition to the sink, and log it.
pub(crate) fn report<D>(diagnostics: &mut D, error: CardError)
where
    D: Diagnostics,
{
    debug!("Card reported {:?}", error);
    diagnostics.report(error);
}

impl<T> SdSpi<T>
where
    T: Transport,
{
    /// Create a new SD card protocol context over `transport`.
    pub fn new(transport: T) -> Self {
        SdSpi::with_options(transport, Options::default())
    }

    /// As `new`, with non-default options.
    pub fn with_options(transport: T, options: Options) -> Self {
        SdSpi {
            transport,
            diagnostics: (),
            options,
        }
    }
}

impl<T, D> SdSpi<T, D>
where
    T: Transport,
    D: Diagnostics,
{
    /// Send every classified card condition to `diagnostics`.
    pub fn with_diagnostics<D2>(self, diagnostics: D2) -> SdSpi<T, D2>
    where
        D2: Diagnostics,
    {
        SdSpi {
            transport: self.transport,
            diagnostics,
            options: self.options,
        }
    }

    /// The options in use.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Get at the transport directly.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Get at the diagnostic sink.
    pub fn diagnostics_mut(&mut self) -> &mut D {
        &mut self.diagnostics
    }

    /// Give the transport back.
    pub fn release(self) -> T {
        self.transport
    }

    /// Bring the card from power on to ready.
    pub fn initialize(&mut self) -> Result<(), InitError> {
        debug!("Initialising card with limits {:?}", self.options.init);
        Initializer::new(self.options.init).run(&mut self.transport, &mut self.diagnostics)
    }

    /// Read one sector into `buffer`.
    ///
    /// `buffer` is only written once the whole sector and its checksum have
    /// arrived, so any failure leaves it untouched.
    pub fn read_sector(&mut self, address: u32, buffer: &mut [u8; SECTOR_LEN]) -> Result<(), Error> {
        trace!("Reading sector {}", address);
        let token_polls = self.options.token_polls;
        let diagnostics = &mut self.diagnostics;
        let mut bus = CardBus::new(&mut self.transport);

        bus.card_command(Command::with_arg(CMD17, byte_offset(address)))?;
        let ack = bus.read_r1()?;

        // Get first non-FF byte.
        let mut token = IDLE_BYTE;
        for _ in 0..token_polls {
            token = bus.receive()?;
            if token != IDLE_BYTE {
                break;
            }
        }

        if ack == IDLE_BYTE {
            warn!("No response to read of sector {}", address);
            return Err(Error::NoResponse);
        }
        if ack != R1_READY_STATE {
            let e = CardError::from_r1(ack);
            report(diagnostics, e);
            return Err(Error::Command(e));
        }
        if token == IDLE_BYTE {
            warn!("Timed out waiting for data from sector {}", address);
            return Err(Error::TokenTimeout);
        }
        if token != DATA_START_BLOCK {
            let e = CardError::from_r1(token);
            report(diagnostics, e);
            return Err(Error::BadToken(e));
        }

        let mut staging = [0u8; SECTOR_LEN];
        for b in staging.iter_mut() {
            *b = bus.receive()?;
        }

        // CRC is not checked
        bus.receive()?;
        bus.receive()?;

        buffer.copy_from_slice(&staging);
        Ok(())
    }

    /// Write one sector from `buffer`.
    ///
    /// Succeeds once the card stops signalling busy. The card's verdict on
    /// the data itself is not checked.
    pub fn write_sector(&mut self, address: u32, buffer: &[u8; SECTOR_LEN]) -> Result<(), Error> {
        trace!("Writing sector {}", address);
        let busy_polls = self.options.busy_polls;
        let strict = self.options.write_ack == AckCheck::Strict;
        let diagnostics = &mut self.diagnostics;
        let mut bus = CardBus::new(&mut self.transport);

        bus.card_command(Command::with_arg(CMD24, byte_offset(address)))?;
        let ack = bus.read_r1()?;
        if ack != R1_READY_STATE {
            if strict && ack == IDLE_BYTE {
                return Err(Error::NoResponse);
            }
            let e = CardError::from_r1(ack);
            report(diagnostics, e);
            if strict {
                return Err(Error::Command(e));
            }
            warn!("Write of sector {} got ack {:x}, sending anyway", address, ack);
        }

        bus.send(DATA_START_BLOCK)?;
        for &b in buffer.iter() {
            bus.send(b)?;
        }
        for &b in DUMMY_CRC.iter() {
            bus.send(b)?;
        }

        let response = bus.receive()?;
        trace!("Data response {:x}", response);

        // Spin until the card releases the line.
        for _ in 0..busy_polls {
            if bus.receive()? == IDLE_BYTE {
                return Ok(());
            }
        }
        warn!("Card still busy after writing sector {}", address);
        Err(Error::BusyTimeout)
    }

    /// Auxiliary requests. Nothing here touches the card.
    pub fn control(&mut self, op: Control) -> Result<ControlValue, Error> {
        match op {
            Control::Noop => Ok(ControlValue::None),
            Control::QuerySectorCount => Ok(ControlValue::SectorCount(None)),
        }
    }
}

/// Byte address of a sector, as standard capacity cards expect.
fn byte_offset(address: u32) -> u32 {
    address.wrapping_mul(SECTOR_LEN as u32)
}

impl<T, D> BlockDevice for SdSpi<T, D>
where
    T: Transport,
    D: Diagnostics,
{
    type Error = Error;

    /// Read one or more blocks, starting at the given block index.
    fn read(
        &mut self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        reason: &str,
    ) -> Result<(), Self::Error> {
        debug!("Read {} blocks @ {} for {}", blocks.len(), start_block_idx.0, reason);
        for (i, block) in blocks.iter_mut().enumerate() {
            let idx = start_block_idx.0.wrapping_add(i as u32);
            self.read_sector(idx, &mut block.contents)?;
        }
        Ok(())
    }

    /// Write one or more blocks, starting at the given block index.
    fn write(&mut self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        debug!("Write {} blocks @ {}", blocks.len(), start_block_idx.0);
        for (i, block) in blocks.iter().enumerate() {
            let idx = start_block_idx.0.wrapping_add(i as u32);
            self.write_sector(idx, &block.contents)?;
        }
        Ok(())
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
