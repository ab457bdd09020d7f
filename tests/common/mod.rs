//! A simulated SD card, speaking the SPI protocol one byte at a time.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

use sdspi_block::{CardError, Diagnostics, Transport};

#[derive(Debug, Copy, Clone, PartialEq)]
enum Phase {
    Idle,
    Command { frame: [u8; 6], len: usize },
    AwaitToken { sector: u32, accept: bool },
    Data { sector: u32, accept: bool, len: usize },
    Crc { sector: u32, accept: bool, left: usize },
}

/// Replies come from per-command scripts. The last entry of a script
/// repeats forever, and 0xFF means stay silent.
pub struct SimCard {
    pub reset: Vec<u8>,
    pub op_cond: Vec<u8>,
    pub status: u16,
    pub read_ack: u8,
    pub write_ack: u8,
    /// Token sent before read data; `None` never sends one
    pub token: Option<u8>,
    /// Idle bytes between the read ack and the token
    pub token_delay: usize,
    /// Busy bytes after a write is accepted
    pub busy_cycles: usize,
    /// Never come out of busy after a write
    pub stuck_busy: bool,
    pub sectors: HashMap<u32, [u8; 512]>,
    /// Every command received, with its argument
    pub commands: Vec<(u8, u32)>,
    /// Number of bytes exchanged since the last `clear_counters`
    pub exchanged: usize,
    pub inited: bool,
    pending: VecDeque<u8>,
    holding_busy: bool,
    incoming: [u8; 512],
    phase: Phase,
}

impl SimCard {
    /// A card that comes up straight away.
    pub fn new() -> SimCard {
        SimCard {
            reset: vec![0x01],
            op_cond: vec![0x00],
            status: 0x0000,
            read_ack: 0x00,
            write_ack: 0x00,
            token: Some(0xFE),
            token_delay: 3,
            busy_cycles: 5,
            stuck_busy: false,
            sectors: HashMap::new(),
            commands: Vec::new(),
            exchanged: 0,
            inited: false,
            pending: VecDeque::new(),
            holding_busy: false,
            incoming: [0; 512],
            phase: Phase::Idle,
        }
    }

    /// A card nobody has plugged in.
    pub fn silent() -> SimCard {
        let mut card = SimCard::new();
        card.reset = vec![0xFF];
        card
    }

    pub fn count(&self, index: u8) -> usize {
        self.commands.iter().filter(|(i, _)| *i == index).count()
    }

    pub fn clear_counters(&mut self) {
        self.commands.clear();
        self.exchanged = 0;
    }

    fn script(script: &[u8], n: usize) -> u8 {
        match script.get(n) {
            Some(b) => *b,
            None => script.last().cloned().unwrap_or(0xFF),
        }
    }

    fn respond(&mut self, bytes: &[u8]) {
        // The card takes at least one byte time to answer.
        self.pending.push_back(0xFF);
        self.pending.extend(bytes.iter().cloned());
    }

    fn command(&mut self, frame: [u8; 6]) {
        let index = frame[0] & 0x3F;
        let arg = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
        let nth = self.count(index);
        self.commands.push((index, arg));
        self.pending.clear();
        self.holding_busy = false;

        let r1 = match index {
            0 => Self::script(&self.reset, nth),
            1 => Self::script(&self.op_cond, nth),
            13 => {
                let [hi, lo] = self.status.to_be_bytes();
                self.respond(&[hi, lo]);
                return;
            }
            17 => self.read_ack,
            24 => self.write_ack,
            _ => 0x04,
        };
        if r1 == 0xFF {
            return;
        }
        self.respond(&[r1]);

        let sector = arg / 512;
        match index {
            17 if r1 == 0x00 => {
                for _ in 0..self.token_delay {
                    self.pending.push_back(0xFF);
                }
                match self.token {
                    Some(0xFE) => {
                        let data = self.sectors.get(&sector).cloned().unwrap_or([0u8; 512]);
                        self.pending.push_back(0xFE);
                        self.pending.extend(data.iter().cloned());
                        self.pending.extend([0x12, 0x34].iter().cloned());
                    }
                    Some(other) => self.pending.push_back(other),
                    None => {}
                }
            }
            24 => {
                self.phase = Phase::AwaitToken {
                    sector,
                    accept: r1 == 0x00,
                };
            }
            _ => {}
        }
    }

    fn consume(&mut self, out: u8) {
        let phase = self.phase;
        self.phase = match phase {
            Phase::Idle | Phase::AwaitToken { .. } if out & 0xC0 == 0x40 => Phase::Command {
                frame: [out, 0, 0, 0, 0, 0],
                len: 1,
            },
            Phase::Idle => Phase::Idle,
            Phase::Command { mut frame, len } => {
                frame[len] = out;
                if len + 1 == frame.len() {
                    self.phase = Phase::Idle;
                    self.command(frame);
                    return;
                }
                Phase::Command { frame, len: len + 1 }
            }
            Phase::AwaitToken { sector, accept } if out == 0xFE => Phase::Data {
                sector,
                accept,
                len: 0,
            },
            p @ Phase::AwaitToken { .. } => p,
            Phase::Data { sector, accept, len } => {
                self.incoming[len] = out;
                if len + 1 == 512 {
                    Phase::Crc {
                        sector,
                        accept,
                        left: 2,
                    }
                } else {
                    Phase::Data {
                        sector,
                        accept,
                        len: len + 1,
                    }
                }
            }
            Phase::Crc { sector, accept, left } if left > 1 => Phase::Crc {
                sector,
                accept,
                left: left - 1,
            },
            Phase::Crc { sector, accept, .. } => {
                if accept {
                    self.sectors.insert(sector, self.incoming);
                    // Data accepted, then busy while programming.
                    self.pending.push_back(0x05);
                    for _ in 0..self.busy_cycles {
                        self.pending.push_back(0x00);
                    }
                    self.holding_busy = self.stuck_busy;
                }
                Phase::Idle
            }
        };
    }
}

impl Transport for SimCard {
    type Error = ();

    fn init(&mut self) -> Result<(), ()> {
        self.inited = true;
        Ok(())
    }

    fn exchange(&mut self, out: u8) -> Result<u8, ()> {
        self.exchanged += 1;
        let idle = if self.holding_busy { 0x00 } else { 0xFF };
        let reply = self.pending.pop_front().unwrap_or(idle);
        self.consume(out);
        Ok(reply)
    }
}

/// Keeps every condition the driver reports.
#[derive(Default)]
pub struct Recorder(pub Vec<CardError>);

impl Diagnostics for Recorder {
    fn report(&mut self, error: CardError) {
        self.0.push(error);
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A sector where every byte is different from its neighbours.
pub fn pattern(seed: u8) -> [u8; 512] {
    let mut data = [0u8; 512];
    for (i, b) in data.iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(7).wrapping_add(seed);
    }
    data
}

/// Passes bytes through to a card until its budget runs out, then fails
/// every exchange.
pub struct FailAfter {
    pub card: SimCard,
    pub budget: usize,
}

impl Transport for FailAfter {
    type Error = ();

    fn init(&mut self) -> Result<(), ()> {
        self.card.init()
    }

    fn exchange(&mut self, out: u8) -> Result<u8, ()> {
        if self.budget == 0 {
            return Err(());
        }
        self.budget -= 1;
        self.card.exchange(out)
    }
}
