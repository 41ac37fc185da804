//! Display adapter interface
//!
//! The event loop talks to the physical terminal only through [`Display`], so
//! it can be driven by a recording double in tests.

use std::io;

use crate::core::screen::{ChangedLine, Cursor, Snapshot};

/// What the display is currently showing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisplayMode {
    /// Foreground session, full width
    #[default]
    Normal,
    /// Foreground session drawn twice, side by side
    Split,
    /// Help overlay instead of any session
    Help,
}

pub trait Display {
    /// Rows and columns available to a session screen (status line excluded)
    fn size(&self) -> (u16, u16);

    /// Redraw every row plus the cursor
    fn render_full(&mut self, snapshot: &Snapshot) -> io::Result<()>;

    /// Redraw only the given rows, then place the cursor
    fn render_lines(&mut self, lines: &[ChangedLine], cursor: Cursor) -> io::Result<()>;

    fn set_mode(&mut self, mode: DisplayMode) -> io::Result<()>;

    /// Audible bell
    fn alert(&mut self) -> io::Result<()>;

    /// Left side of the status line
    fn set_status_line(&mut self, text: &str) -> io::Result<()>;

    /// Right side of the status line
    fn set_clock(&mut self, text: &str) -> io::Result<()>;

    /// Give the terminal back. Calling it again does nothing.
    fn shutdown(&mut self) -> io::Result<()>;
}
