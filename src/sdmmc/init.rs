//! Power-on initialisation, as a state machine.
//!
//! Card power-up timing is not specified, so every stage polls until the
//! card converges or a retry ceiling is hit. Each call to
//! [`Initializer::step`] performs at most one command exchange.
//!
//! SEND_OP_COND keeps being sent through any non-zero answer, error bits
//! and silence included, until the card reports ready or the ceiling is
//! reached. Older drivers stopped at the first answer other than idle;
//! here such answers are only reported to the diagnostics sink.

#[cfg(feature = "log")]
use log::{debug, trace, warn};

#[cfg(feature = "defmt-log")]
use defmt::{debug, trace, warn};

use crate::sdmmc_proto::*;
use crate::transport::Transport;

use super::command::{CardBus, Command};
use super::{report, CardError, Diagnostics};

/// Why initialisation failed.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InitError {
    /// The line stayed idle through every reset attempt
    NoResponse,
    /// The card answered the reset, but never with the idle state
    UnexpectedResetResponse(CardError),
    /// The card never left the idle state
    CardNotReady(CardError),
    /// The status register was not clear once the card came up
    StatusNotReady(CardError),
    /// We got an error from the transport
    Transport,
}

/// Retry ceilings for the two polling stages.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InitLimits {
    /// How many times to send GO_IDLE_STATE
    pub reset_attempts: u32,
    /// How many times to send SEND_OP_COND
    pub op_cond_attempts: u32,
}

impl Default for InitLimits {
    fn default() -> Self {
        InitLimits {
            reset_attempts: RESET_ATTEMPTS,
            op_cond_attempts: OP_COND_ATTEMPTS,
        }
    }
}

/// Where the initialisation sequence has got to.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InitState {
    /// Transport not yet brought up
    PowerOn,
    /// Sending GO_IDLE_STATE until the card reports idle
    ResetWait,
    /// Sending SEND_OP_COND until the card reports ready
    OpCondWait,
    /// About to check the status register
    StatusCheck,
    /// Card is ready for block transfers
    Ready,
    /// Gave up
    Failed(InitError),
}

impl InitState {
    /// No further steps will change this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InitState::Ready | InitState::Failed(_))
    }
}

/// Drives a card from power-on to ready.
#[derive(Debug, Clone)]
pub struct Initializer {
    limits: InitLimits,
    state: InitState,
    reset_attempts: u32,
    op_cond_attempts: u32,
    last: u8,
}

impl Initializer {
    /// A fresh sequence, starting at power on.
    pub fn new(limits: InitLimits) -> Self {
        Initializer {
            limits,
            state: InitState::PowerOn,
            reset_attempts: 0,
            op_cond_attempts: 0,
            last: IDLE_BYTE,
        }
    }

    /// The current state.
    pub fn state(&self) -> InitState {
        self.state
    }

    /// Number of GO_IDLE_STATE commands sent so far.
    pub fn reset_attempts(&self) -> u32 {
        self.reset_attempts
    }

    /// Number of SEND_OP_COND commands sent so far.
    pub fn op_cond_attempts(&self) -> u32 {
        self.op_cond_attempts
    }

    /// Advance by one command exchange and return the new state.
    pub fn step<T, D>(&mut self, transport: &mut T, diagnostics: &mut D) -> InitState
    where
        T: Transport,
        D: Diagnostics,
    {
        let next = match self.state {
            InitState::PowerOn => self.power_on(transport),
            InitState::ResetWait => self.reset_wait(transport, diagnostics),
            InitState::OpCondWait => self.op_cond_wait(transport, diagnostics),
            InitState::StatusCheck => self.status_check(transport, diagnostics),
            done @ InitState::Ready | done @ InitState::Failed(_) => Ok(done),
        };
        self.state = next.unwrap_or_else(|_| {
            warn!("Transport failed during init");
            InitState::Failed(InitError::Transport)
        });
        self.state
    }

    /// Step until the card is ready or we give up.
    pub fn run<T, D>(&mut self, transport: &mut T, diagnostics: &mut D) -> Result<(), InitError>
    where
        T: Transport,
        D: Diagnostics,
    {
        loop {
            match self.step(transport, diagnostics) {
                InitState::Ready => return Ok(()),
                InitState::Failed(e) => return Err(e),
                _ => {}
            }
        }
    }

    fn power_on<T>(&mut self, transport: &mut T) -> Result<InitState, super::Error>
    where
        T: Transport,
    {
        trace!("Init transport..");
        transport.init().map_err(|_e| super::Error::Transport)?;
        Ok(InitState::ResetWait)
    }

    fn reset_wait<T, D>(&mut self, transport: &mut T, diagnostics: &mut D) -> Result<InitState, super::Error>
    where
        T: Transport,
        D: Diagnostics,
    {
        if self.reset_attempts >= self.limits.reset_attempts {
            return Ok(self.reset_failed(diagnostics));
        }
        trace!("Reset card, attempt: {}..", self.reset_attempts);
        let mut bus = CardBus::new(transport);
        bus.card_command(Command::new(CMD0))?;
        self.last = bus.read_r1()?;
        self.reset_attempts += 1;

        if self.last == R1_IDLE_STATE {
            debug!("Card idle after {} resets", self.reset_attempts);
            self.last = IDLE_BYTE;
            Ok(InitState::OpCondWait)
        } else if self.reset_attempts >= self.limits.reset_attempts {
            Ok(self.reset_failed(diagnostics))
        } else {
            Ok(InitState::ResetWait)
        }
    }

    fn reset_failed<D>(&self, diagnostics: &mut D) -> InitState
    where
        D: Diagnostics,
    {
        if self.last == IDLE_BYTE {
            warn!("No response from card");
            InitState::Failed(InitError::NoResponse)
        } else {
            let e = CardError::from_r1(self.last);
            report(diagnostics, e);
            InitState::Failed(InitError::UnexpectedResetResponse(e))
        }
    }

    fn op_cond_wait<T, D>(&mut self, transport: &mut T, diagnostics: &mut D) -> Result<InitState, super::Error>
    where
        T: Transport,
        D: Diagnostics,
    {
        if self.op_cond_attempts >= self.limits.op_cond_attempts {
            return Ok(InitState::Failed(InitError::CardNotReady(CardError::from_r1(self.last))));
        }
        let mut bus = CardBus::new(transport);
        bus.card_command(Command::new(CMD1))?;
        self.last = bus.read_r1()?;
        self.op_cond_attempts += 1;

        if self.last == R1_READY_STATE {
            debug!("Card ready after {} polls", self.op_cond_attempts);
            return Ok(InitState::StatusCheck);
        }
        let e = CardError::from_r1(self.last);
        report(diagnostics, e);
        if self.op_cond_attempts >= self.limits.op_cond_attempts {
            Ok(InitState::Failed(InitError::CardNotReady(e)))
        } else {
            Ok(InitState::OpCondWait)
        }
    }

    fn status_check<T, D>(&mut self, transport: &mut T, diagnostics: &mut D) -> Result<InitState, super::Error>
    where
        T: Transport,
        D: Diagnostics,
    {
        let mut bus = CardBus::new(transport);
        bus.card_command(Command::new(CMD13))?;
        let status = bus.read_r2()?;
        if status == 0 {
            Ok(InitState::Ready)
        } else {
            let e = CardError::from_r2(status);
            report(diagnostics, e);
            warn!("Card didn't return the ready state: {:x}", status);
            Ok(InitState::Failed(InitError::StatusNotReady(e)))
        }
    }
}
