//! sdspi-block - Byte transport
//!
//! Everything the protocol does is built on exchanging single bytes with
//! the card. This module defines that capability and an implementation on
//! top of an `embedded-hal` SPI bus and chip select pin.

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

#[cfg(feature = "log")]
use log::trace;

#[cfg(feature = "defmt-log")]
use defmt::trace;

use crate::sdmmc_proto::IDLE_BYTE;

/// Something which can clock one byte out to the card and one byte back in.
pub trait Transport {
    /// The errors the transport can return. Must be debug formattable.
    type Error: core::fmt::Debug;

    /// Bring the bus up so the card can be addressed.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Send `out` and return the byte shifted in at the same time.
    fn exchange(&mut self, out: u8) -> Result<u8, Self::Error>;
}

impl<T> Transport for &mut T
where
    T: Transport,
{
    type Error = T::Error;

    fn init(&mut self) -> Result<(), Self::Error> {
        (*self).init()
    }

    fn exchange(&mut self, out: u8) -> Result<u8, Self::Error> {
        (*self).exchange(out)
    }
}

/// The errors `SpiTransport` can generate.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SpiTransportError {
    /// We got an error from the SPI peripheral
    Spi,
    /// Couldn't set the chip select pin
    Gpio,
}

/// A `Transport` built from an SPI peripheral and a Chip Select pin. We need
/// Chip Select to be separate so we can clock out some bytes without Chip
/// Select asserted (which puts the card into SPI mode).
pub struct SpiTransport<SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> SpiTransport<SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    /// Wrap a raw SPI interface and its chip select.
    pub fn new(spi: SPI, cs: CS) -> Self {
        SpiTransport { spi, cs }
    }

    /// Deassert chip select and hand the peripherals back.
    pub fn release(mut self) -> (SPI, CS) {
        self.cs_high().ok();
        (self.spi, self.cs)
    }

    fn cs_high(&mut self) -> Result<(), SpiTransportError> {
        self.cs.set_high().map_err(|_| SpiTransportError::Gpio)
    }

    fn cs_low(&mut self) -> Result<(), SpiTransportError> {
        self.cs.set_low().map_err(|_| SpiTransportError::Gpio)
    }
}

impl<SPI, CS> Transport for SpiTransport<SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    type Error = SpiTransportError;

    fn init(&mut self) -> Result<(), Self::Error> {
        trace!("Clocking card into SPI mode..");
        // Supply minimum of 74 clock cycles without CS asserted.
        self.cs_high()?;
        for _ in 0..10 {
            self.exchange(IDLE_BYTE)?;
        }
        self.cs_low()
    }

    fn exchange(&mut self, out: u8) -> Result<u8, Self::Error> {
        self.spi
            .transfer(&mut [out])
            .map(|b| b[0])
            .map_err(|_e| SpiTransportError::Spi)
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
