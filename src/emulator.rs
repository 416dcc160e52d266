//! In-process LX200 device emulator
//!
//! Reproduces the framing and canned replies of a simple LX200 mount
//! firmware so the tester can be exercised without hardware:
//!
//! - a command starts at `:` and ends at `#`; bytes outside a frame are ignored
//! - a frame longer than the device buffer is dropped and parsing restarts
//! - the `0x06` probe outside a frame is answered with `G` immediately
//! - information queries answer with fixed values, set commands with `1`,
//!   slew-to-target with `0`, everything else is silent

use std::collections::VecDeque;

use crate::catalog::{escape_bytes, parse_guide_duration};
use crate::constants::{ACK, COMMAND_START, DEVICE_COMMAND_BUFFER_SIZE, TERMINATOR};
use crate::error::{ConnectionError, ConnectionResult};
use crate::transport::Transport;

/// Prefix-matched replies, checked in order
const REPLIES: &[(&[u8], &[u8])] = &[
    (b":GR#", b"12:34:56#"),
    (b":GD#", b"+45*30:45#"),
    (b":GM#", b"STM32 Site#"),
    (b":Gt#", b"+50*30:00#"),
    (b":Gg#", b"+010*15:30#"),
    (b":GT#", b"60.1#"),
    (b":Sr", b"1"),
    (b":Sd", b"1"),
    (b":MS#", b"0"),
];

/// Commands the device accepts silently
const SILENT: &[&[u8]] = &[
    b":Q#", b":Qn#", b":Qs#", b":Qe#", b":Qw#",
    b":Mn#", b":Ms#", b":Me#", b":Mw#",
    b":Mg",
    b":RS#", b":RM#", b":RC#", b":RG#",
    b":CM#", b":U#",
];

/// Device-side command parser and responder
#[derive(Debug, Default)]
pub struct Lx200Emulator {
    frame: Vec<u8>,
    in_frame: bool,
    commands: Vec<Vec<u8>>,
}

impl Lx200Emulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed received bytes, returning whatever the device transmits back
    pub fn feed(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();

        for &b in data {
            if self.in_frame {
                if self.frame.len() < DEVICE_COMMAND_BUFFER_SIZE - 1 {
                    self.frame.push(b);
                    if b == TERMINATOR {
                        let command = std::mem::take(&mut self.frame);
                        self.in_frame = false;
                        out.extend_from_slice(self.process(command));
                    }
                } else {
                    log::debug!("Emulator: command buffer overflow, frame dropped");
                    self.frame.clear();
                    self.in_frame = false;
                }
            } else if b == COMMAND_START {
                self.in_frame = true;
                self.frame.clear();
                self.frame.push(b);
            } else if b == ACK {
                log::debug!("Emulator: ACK (0x06) received -> G");
                out.push(b'G');
            }
        }

        out
    }

    fn process(&mut self, command: Vec<u8>) -> &'static [u8] {
        let reply = reply_for(&command);
        if let Some(r) = reply {
            log::debug!("Emulator: {} -> {}", escape_bytes(&command), escape_bytes(r));
        } else if let Some((direction, ms)) = parse_guide_duration(&command) {
            log::debug!("Emulator: guide {} for {} ms", direction.name(), ms);
        } else if SILENT.iter().any(|p| command.starts_with(p)) {
            log::debug!("Emulator: {} accepted", escape_bytes(&command));
        } else {
            log::debug!("Emulator: unknown command {}", escape_bytes(&command));
        }
        self.commands.push(command);
        reply.unwrap_or(&[])
    }

    /// Every complete frame received so far, in order
    pub fn commands(&self) -> &[Vec<u8>] {
        &self.commands
    }
}

/// Canned reply for a complete command frame
pub fn reply_for(command: &[u8]) -> Option<&'static [u8]> {
    REPLIES
        .iter()
        .find(|(prefix, _)| command.starts_with(prefix))
        .map(|(_, reply)| *reply)
}

/// [`Transport`] backed by an [`Lx200Emulator`]; replies are available
/// immediately after the write that triggered them.
#[derive(Debug, Default)]
pub struct EmulatorTransport {
    device: Lx200Emulator,
    outbound: VecDeque<u8>,
    closed: bool,
}

impl EmulatorTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(&self) -> &Lx200Emulator {
        &self.device
    }
}

impl Transport for EmulatorTransport {
    fn write(&mut self, bytes: &[u8]) -> ConnectionResult<()> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        let reply = self.device.feed(bytes);
        self.outbound.extend(reply);
        Ok(())
    }

    fn bytes_available(&mut self) -> ConnectionResult<usize> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        Ok(self.outbound.len())
    }

    fn read(&mut self, n: usize) -> ConnectionResult<Vec<u8>> {
        let take = n.min(self.outbound.len());
        Ok(self.outbound.drain(..take).collect())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn describe(&self) -> String {
        "emulator".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_information_replies() {
        let mut dev = Lx200Emulator::new();
        assert_eq!(dev.feed(b":GR#"), b"12:34:56#");
        assert_eq!(dev.feed(b":GD#"), b"+45*30:45#");
        assert_eq!(dev.feed(b":Gg#"), b"+010*15:30#");
        assert_eq!(dev.feed(b":Sr 12:34:56#"), b"1");
        assert_eq!(dev.feed(b":MS#"), b"0");
    }

    #[test]
    fn test_silent_commands() {
        let mut dev = Lx200Emulator::new();
        assert!(dev.feed(b":Mn#").is_empty());
        assert!(dev.feed(b":Mgn1000#").is_empty());
        assert!(dev.feed(b":CM#").is_empty());
        assert_eq!(dev.commands().len(), 3);
    }

    #[test]
    fn test_ack_and_noise() {
        let mut dev = Lx200Emulator::new();
        assert_eq!(dev.feed(&[0x06]), b"G");
        assert!(dev.feed(b"junk").is_empty());
        assert!(dev.commands().is_empty());
    }

    #[test]
    fn test_frame_split_across_writes() {
        let mut dev = Lx200Emulator::new();
        assert!(dev.feed(b":G").is_empty());
        assert_eq!(dev.feed(b"T#"), b"60.1#");
    }

    #[test]
    fn test_overflow_resets_parser() {
        let mut dev = Lx200Emulator::new();
        let mut long = vec![b':'];
        long.extend(std::iter::repeat(b'x').take(80));
        long.push(b'#');
        assert!(dev.feed(&long).is_empty());
        assert!(dev.commands().is_empty());
        assert_eq!(dev.feed(b":GR#"), b"12:34:56#");
    }

    #[test]
    fn test_closed_transport_fails() {
        let mut t = EmulatorTransport::new();
        t.close();
        assert_eq!(t.write(b":GR#"), Err(ConnectionError::Closed));
    }
}
