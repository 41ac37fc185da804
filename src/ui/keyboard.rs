//! Keyboard input as a byte stream

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crossterm::event::{self, Event};

use super::keymapper::KeyMapper;

pub trait Keyboard {
    /// Wait for the next input byte
    fn next_byte(&mut self) -> io::Result<u8>;

    /// Next input byte if one arrives within `timeout`
    fn try_next_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>>;

    /// Whether the byte just returned is followed by more bytes of the same
    /// key, as with the ESC that starts an arrow key
    fn key_continues(&self) -> bool {
        false
    }
}

/// Reads crossterm events from the controlling terminal. Keys that map to
/// several bytes are handed out one byte per call.
#[derive(Default)]
pub struct TerminalKeyboard {
    pending: VecDeque<u8>,
}

impl TerminalKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn absorb(&mut self, event: Event) {
        match event {
            Event::Key(key) => {
                if let Some(bytes) = KeyMapper::map(&key) {
                    self.pending.extend(bytes);
                }
            }
            Event::Paste(text) => self.pending.extend(text.bytes()),
            // Mouse, focus and resize are not forwarded
            _ => {}
        }
    }
}

impl Keyboard for TerminalKeyboard {
    fn next_byte(&mut self) -> io::Result<u8> {
        loop {
            if let Some(byte) = self.pending.pop_front() {
                return Ok(byte);
            }
            let event = event::read()?;
            self.absorb(event);
        }
    }

    fn try_next_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        if self.pending.is_empty() && event::poll(timeout)? {
            let event = event::read()?;
            self.absorb(event);
        }
        Ok(self.pending.pop_front())
    }

    fn key_continues(&self) -> bool {
        !self.pending.is_empty()
    }
}
