//! Stand-ins for the terminal, used by the event loop tests

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crate::core::screen::{ChangedLine, Cursor, Snapshot};
use crate::ui::{Display, DisplayMode, Keyboard};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Full(Snapshot),
    Lines(Vec<ChangedLine>, Cursor),
    Mode(DisplayMode),
    Alert,
    Status(String),
    Clock(String),
    Shutdown,
}

/// Display that remembers every call made to it
pub struct RecordingDisplay {
    rows: u16,
    cols: u16,
    pub calls: Vec<Call>,
    /// Make every render fail
    pub broken: bool,
}

impl RecordingDisplay {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            rows,
            cols,
            calls: Vec::new(),
            broken: false,
        }
    }

    pub fn alerts(&self) -> usize {
        self.calls.iter().filter(|c| **c == Call::Alert).count()
    }

    pub fn last_status(&self) -> Option<&str> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::Status(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// Every row content sent to the display, full or incremental
    pub fn drawn_text(&self) -> Vec<String> {
        self.calls
            .iter()
            .flat_map(|c| match c {
                Call::Full(snapshot) => snapshot.lines.clone(),
                Call::Lines(lines, _) => lines.iter().map(|l| l.content.clone()).collect(),
                _ => Vec::new(),
            })
            .collect()
    }

    fn render(&mut self, call: Call) -> io::Result<()> {
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "display gone"));
        }
        self.calls.push(call);
        Ok(())
    }
}

impl Display for RecordingDisplay {
    fn size(&self) -> (u16, u16) {
        (self.rows, self.cols)
    }

    fn render_full(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        self.render(Call::Full(snapshot.clone()))
    }

    fn render_lines(&mut self, lines: &[ChangedLine], cursor: Cursor) -> io::Result<()> {
        self.render(Call::Lines(lines.to_vec(), cursor))
    }

    fn set_mode(&mut self, mode: DisplayMode) -> io::Result<()> {
        self.calls.push(Call::Mode(mode));
        Ok(())
    }

    fn alert(&mut self) -> io::Result<()> {
        self.calls.push(Call::Alert);
        Ok(())
    }

    fn set_status_line(&mut self, text: &str) -> io::Result<()> {
        self.calls.push(Call::Status(text.to_string()));
        Ok(())
    }

    fn set_clock(&mut self, text: &str) -> io::Result<()> {
        self.calls.push(Call::Clock(text.to_string()));
        Ok(())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.calls.push(Call::Shutdown);
        Ok(())
    }
}

/// Keyboard fed from a queue of keys. Running dry is an error for blocking
/// reads.
#[derive(Default)]
pub struct ScriptedKeyboard {
    keys: VecDeque<Vec<u8>>,
    /// Rest of the key currently being read
    current: VecDeque<u8>,
    /// Every timeout passed to `try_next_byte`
    pub timeouts: Vec<Duration>,
}

impl ScriptedKeyboard {
    /// Queue bytes as separate single-byte keys
    pub fn push(&mut self, bytes: &[u8]) {
        self.keys.extend(bytes.iter().map(|&b| vec![b]));
    }

    /// Queue one key that produces several bytes
    pub fn push_key(&mut self, bytes: &[u8]) {
        self.keys.push_back(bytes.to_vec());
    }

    fn pop(&mut self) -> Option<u8> {
        if self.current.is_empty() {
            self.current = self.keys.pop_front()?.into();
        }
        self.current.pop_front()
    }
}

impl Keyboard for ScriptedKeyboard {
    fn next_byte(&mut self) -> io::Result<u8> {
        self.pop()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))
    }

    fn try_next_byte(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        self.timeouts.push(timeout);
        Ok(self.pop())
    }

    fn key_continues(&self) -> bool {
        !self.current.is_empty()
    }
}
