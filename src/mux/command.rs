//! Prefix commands

use std::io;

use crate::core::session::MAX_SESSIONS;

pub const ESC: u8 = 0x1B;

/// What the byte after the command prefix asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Bring a session to the foreground
    Select(usize),
    New,
    Kill(usize),
    ToggleSplit,
    Help,
    /// Escape; only meaningful on the help screen
    LeaveHelp,
    Quit,
    /// Prefix pressed twice: pass one prefix byte through
    SendPrefix,
    Unknown(u8),
}

/// Session slot named by a digit key
pub fn slot_for(byte: u8) -> Option<usize> {
    match byte {
        b'0'..=b'9' => Some((byte - b'0') as usize).filter(|&i| i < MAX_SESSIONS),
        _ => None,
    }
}

impl Command {
    /// Decode the byte that followed the prefix. `k` needs one more byte,
    /// which is pulled from `next`.
    pub fn parse<F>(byte: u8, prefix: u8, next: F) -> io::Result<Command>
    where
        F: FnOnce() -> io::Result<u8>,
    {
        if let Some(slot) = slot_for(byte) {
            return Ok(Command::Select(slot));
        }
        if byte == prefix {
            return Ok(Command::SendPrefix);
        }

        let command = match byte {
            b'n' => Command::New,
            b'k' => {
                let target = next()?;
                match slot_for(target) {
                    Some(slot) => Command::Kill(slot),
                    None => Command::Unknown(target),
                }
            }
            b's' => Command::ToggleSplit,
            b'h' => Command::Help,
            b'q' => Command::Quit,
            ESC => Command::LeaveHelp,
            other => Command::Unknown(other),
        };
        Ok(command)
    }
}
