//! # sdspi-block
//!
//! > An SD card SPI block protocol driver written in Embedded Rust
//!
//! This crate turns a byte-at-a-time SPI link into 512-byte sector reads and
//! writes on an SD card. It is `#![no_std]`, does not use `alloc`, and never
//! holds on to sector data: bytes are streamed straight between the card and
//! the caller's buffer.
//!
//! The protocol is strictly synchronous. Every call polls the card until it
//! completes or a retry budget runs out, and has no internal state beyond
//! the transport, so any failed call can simply be made again.
//!
//! ## Using the crate
//!
//! You will need something that implements the `Transport` trait. We supply
//! `SpiTransport`, built from an `embedded-hal` SPI peripheral and a chip
//! select pin.
//!
//! ```rust,ignore
//! let transport = sdspi_block::SpiTransport::new(spi, cs);
//! let mut card = sdspi_block::SdSpi::new(transport);
//! match card.initialize() {
//!     Ok(()) => {
//!         let mut sector = [0u8; 512];
//!         card.read_sector(0, &mut sector)?;
//!     }
//!     Err(e) => writeln!(uart, "{:?}!", e).unwrap(),
//! };
//! ```
//!
//! `SdSpi` also implements `BlockDevice`, for block caches and filesystems
//! sitting on top.
//!
//! ## Features
//!
//! * `defmt-log`: By turning off the default features and enabling the `defmt-log` feature you can
//! configure this crate to log messages over defmt instead.
//! * `refcell-blockdevice`: `BlockDevice` for `RefCell`, so one card can be
//! shared between several users.
//!
//! Make sure that either the `log` feature or the `defmt-log` feature is enabled.

#![cfg_attr(not(test), no_std)]
// #![deny(missing_docs)]

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

#[cfg(doctest)]
doc_comment::doctest!("../README.md");

pub mod block_device;
pub mod sdmmc;
pub mod sdmmc_proto;
pub mod transport;

pub use crate::block_device::{Block, BlockCount, BlockDevice, BlockIdx};
pub use crate::sdmmc::{
    AckCheck, CardError, Control, ControlValue, Diagnostics, Error as SdSpiError, InitError,
    InitLimits, InitState, Initializer, Options, SdSpi,
};
pub use crate::transport::{SpiTransport, SpiTransportError, Transport};

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
