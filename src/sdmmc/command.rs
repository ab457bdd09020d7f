//! Command framing and response polling.

use crate::sdmmc_proto::*;
use crate::transport::Transport;

use super::Error;

/// A command ready to go on the wire.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command number, 0 to 63
    pub index: u8,
    /// Top half of the argument
    pub arg_hi: u16,
    /// Bottom half of the argument
    pub arg_lo: u16,
}

impl Command {
    /// Length of a frame including the leading and trailing pad bytes.
    pub const FRAME_LEN: usize = 8;

    /// A command with a zero argument.
    pub fn new(index: u8) -> Command {
        Command::with_arg(index, 0)
    }

    /// A command with a 32-bit argument, split into its two halves.
    pub fn with_arg(index: u8, arg: u32) -> Command {
        debug_assert!(index <= CMD_INDEX_MASK);
        Command {
            index: index & CMD_INDEX_MASK,
            arg_hi: (arg >> 16) as u16,
            arg_lo: arg as u16,
        }
    }

    /// The bytes clocked out for this command, in order.
    pub fn frame(&self) -> [u8; Self::FRAME_LEN] {
        let [hi_msb, hi_lsb] = self.arg_hi.to_be_bytes();
        let [lo_msb, lo_lsb] = self.arg_lo.to_be_bytes();
        [
            IDLE_BYTE,
            CMD_START | (self.index & CMD_INDEX_MASK),
            hi_msb,
            hi_lsb,
            lo_msb,
            lo_lsb,
            CMD_CRC,
            IDLE_BYTE,
        ]
    }
}

/// Borrows the transport for the length of one operation and speaks the
/// command/response layer over it.
pub(crate) struct CardBus<'t, T>
where
    T: Transport,
{
    transport: &'t mut T,
}

impl<'t, T> CardBus<'t, T>
where
    T: Transport,
{
    pub fn new(transport: &'t mut T) -> Self {
        CardBus { transport }
    }

    /// Send one byte and receive one byte.
    fn transfer(&mut self, out: u8) -> Result<u8, Error> {
        self.transport.exchange(out).map_err(|_e| Error::Transport)
    }

    /// Clock out an idle byte and return what the card sent back.
    pub fn receive(&mut self) -> Result<u8, Error> {
        self.transfer(IDLE_BYTE)
    }

    /// Send a byte to the SD card.
    pub fn send(&mut self, out: u8) -> Result<(), Error> {
        let _ = self.transfer(out)?;
        Ok(())
    }

    /// Clock out a command frame. Whatever the card sends back meanwhile is
    /// dropped.
    pub fn card_command(&mut self, command: Command) -> Result<(), Error> {
        for b in command.frame().iter() {
            self.send(*b)?;
        }
        Ok(())
    }

    /// Poll for an R1 response. Gives back 0xFF if the card stayed silent.
    pub fn read_r1(&mut self) -> Result<u8, Error> {
        let mut result = IDLE_BYTE;
        for _ in 0..R1_POLLS {
            result = self.receive()?;
            if result != IDLE_BYTE {
                break;
            }
        }
        Ok(result)
    }

    /// Poll for an R2 response: an R1 byte followed by one status byte.
    pub fn read_r2(&mut self) -> Result<u16, Error> {
        let high = self.read_r1()?;
        let low = self.receive()?;
        Ok(u16::from(high) << 8 | u16::from(low))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    /// Replays canned bytes and records what was sent.
    struct Script {
        replies: Vec<u8>,
        sent: Vec<u8>,
    }

    impl Script {
        fn new(replies: &[u8]) -> Script {
            Script {
                replies: replies.iter().rev().cloned().collect(),
                sent: Vec::new(),
            }
        }
    }

    impl Transport for Script {
        type Error = ();

        fn init(&mut self) -> Result<(), ()> {
            Ok(())
        }

        fn exchange(&mut self, out: u8) -> Result<u8, ()> {
            self.sent.push(out);
            Ok(self.replies.pop().unwrap_or(0xFF))
        }
    }

    #[test]
    fn reset_frame() {
        assert_eq!(Command::new(CMD0).frame(), hex!("FF 40 00 00 00 00 95 FF"));
    }

    #[test]
    fn read_frame_splits_argument() {
        let cmd = Command::with_arg(CMD17, 0x1234_5678);
        assert_eq!(cmd.arg_hi, 0x1234);
        assert_eq!(cmd.arg_lo, 0x5678);
        assert_eq!(cmd.frame(), hex!("FF 51 12 34 56 78 95 FF"));
    }

    #[test]
    fn frames_for_every_index() {
        for index in 0..64u8 {
            for &(hi, lo) in [(0u16, 0u16), (0xFFFF, 0x0001), (0x00A5, 0x5A00), (0x8000, 0xFFFF)].iter() {
                let frame = Command { index, arg_hi: hi, arg_lo: lo }.frame();
                assert_eq!(frame.len(), 8);
                assert_eq!(frame[0], 0xFF);
                assert_eq!(frame[1], 0x40 | index);
                assert_eq!(frame[2..4], hi.to_be_bytes());
                assert_eq!(frame[4..6], lo.to_be_bytes());
                assert_eq!(frame[6], 0x95);
                assert_eq!(frame[7], 0xFF);
            }
        }
    }

    #[test]
    fn card_command_sends_frame() {
        let mut t = Script::new(&[]);
        CardBus::new(&mut t).card_command(Command::new(CMD13)).unwrap();
        assert_eq!(t.sent, hex!("FF 4D 00 00 00 00 95 FF"));
    }

    #[test]
    fn r1_first_non_idle_byte() {
        let mut t = Script::new(&[0xFF, 0xFF, 0x01, 0x00]);
        assert_eq!(CardBus::new(&mut t).read_r1(), Ok(0x01));
        assert_eq!(t.sent.len(), 3);
    }

    #[test]
    fn r1_gives_up_after_eight_polls() {
        let mut t = Script::new(&[]);
        assert_eq!(CardBus::new(&mut t).read_r1(), Ok(0xFF));
        assert_eq!(t.sent, [0xFF; 8]);
    }

    #[test]
    fn r1_answer_on_last_poll() {
        let mut t = Script::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x04]);
        assert_eq!(CardBus::new(&mut t).read_r1(), Ok(0x04));
    }

    #[test]
    fn r2_composes_two_bytes() {
        let mut t = Script::new(&[0xFF, 0x04, 0x20]);
        assert_eq!(CardBus::new(&mut t).read_r2(), Ok(0x0420));
    }
}
