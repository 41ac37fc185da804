//! Terminal renderer using crossterm
//!
//! Draws virtual screens onto the real terminal. The bottom row is kept for
//! the status line: messages on the left, the clock on the right.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    style::{Attribute, ResetColor, SetAttribute},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use tracing::debug;

use super::display::{Display, DisplayMode};
use crate::core::screen::{ChangedLine, Cursor, Snapshot};

/// Begin a render frame (synchronized update, hide cursor)
fn begin_frame<W: Write>(out: &mut W) -> io::Result<()> {
    write!(out, "\x1b[?2026h")?;
    execute!(out, Hide)?;
    Ok(())
}

/// End a render frame (show cursor, end synchronized update, flush)
fn end_frame<W: Write>(out: &mut W) -> io::Result<()> {
    execute!(out, Show)?;
    write!(out, "\x1b[?2026l")?;
    out.flush()?;
    Ok(())
}

/// Fit `text` into exactly `width` columns
fn fit(text: &str, width: usize) -> String {
    let mut line: String = text.chars().take(width).collect();
    let len = line.chars().count();
    line.extend(std::iter::repeat(' ').take(width - len));
    line
}

/// Crossterm-backed [`Display`]
pub struct TerminalDisplay<W: Write = io::Stdout> {
    out: W,
    /// Terminal width
    cols: u16,
    /// Terminal height, status line included
    term_rows: u16,
    mode: DisplayMode,
    status: String,
    clock: String,
    initialized: bool,
}

impl TerminalDisplay<io::Stdout> {
    /// Display on stdout, sized to the current terminal
    pub fn new() -> io::Result<Self> {
        let (cols, rows) = terminal::size()?;
        Ok(Self::with_writer(io::stdout(), rows, cols))
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn with_writer(out: W, term_rows: u16, cols: u16) -> Self {
        Self {
            out,
            cols: cols.max(1),
            term_rows: term_rows.max(2),
            mode: DisplayMode::Normal,
            status: String::new(),
            clock: String::new(),
            initialized: false,
        }
    }

    /// Switch the terminal to raw mode on the alternate screen
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(
            self.out,
            EnterAlternateScreen,
            DisableLineWrap,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        self.out.flush()?;
        self.initialized = true;
        debug!("display initialized: {}x{}", self.cols, self.term_rows);
        Ok(())
    }

    fn status_row(&self) -> u16 {
        self.term_rows - 1
    }

    /// Width of one pane: half the terminal in split mode
    fn pane_width(&self) -> u16 {
        match self.mode {
            DisplayMode::Split => (self.cols / 2).max(1),
            _ => self.cols,
        }
    }

    fn draw_row(&mut self, row: u16, content: &str) -> io::Result<()> {
        if row >= self.status_row() {
            return Ok(());
        }
        let width = self.pane_width();
        let line = fit(content, width as usize);
        execute!(self.out, MoveTo(0, row))?;
        write!(self.out, "{}", line)?;
        if self.mode == DisplayMode::Split {
            execute!(self.out, MoveTo(width, row))?;
            write!(self.out, "{}", line)?;
        }
        Ok(())
    }

    fn draw_status(&mut self) -> io::Result<()> {
        let width = self.cols as usize;
        let clock_len = self.clock.chars().count();
        let left = fit(&self.status, width.saturating_sub(clock_len));
        let row = self.status_row();

        execute!(self.out, MoveTo(0, row), SetAttribute(Attribute::Reverse))?;
        write!(self.out, "{}", left)?;
        if clock_len <= width {
            write!(self.out, "{}", self.clock)?;
        }
        execute!(self.out, ResetColor, SetAttribute(Attribute::Reset))?;
        Ok(())
    }

    fn place_cursor(&mut self, cursor: Cursor) -> io::Result<()> {
        let width = self.pane_width();
        let col = cursor.col.min(width.saturating_sub(1));
        let row = cursor.row.min(self.status_row().saturating_sub(1));
        execute!(self.out, MoveTo(col, row))
    }

    /// Run a render operation between frame guards
    fn with_frame<F>(&mut self, f: F) -> io::Result<()>
    where
        F: FnOnce(&mut Self) -> io::Result<()>,
    {
        begin_frame(&mut self.out)?;
        let result = f(self);
        // Always end frame, even on error
        let _ = end_frame(&mut self.out);
        result
    }

    /// Status line only, keeping the cursor where it was
    fn refresh_status(&mut self) -> io::Result<()> {
        write!(self.out, "\x1b7")?;
        self.draw_status()?;
        write!(self.out, "\x1b8")?;
        self.out.flush()
    }

    #[cfg(test)]
    fn output(&self) -> &W {
        &self.out
    }
}

impl<W: Write> Display for TerminalDisplay<W> {
    fn size(&self) -> (u16, u16) {
        (self.status_row(), self.cols)
    }

    fn render_full(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        let rows = self.status_row();
        self.with_frame(|display| {
            for row in 0..rows {
                let content = snapshot
                    .lines
                    .get(row as usize)
                    .map(String::as_str)
                    .unwrap_or("");
                display.draw_row(row, content)?;
            }
            display.draw_status()?;
            display.place_cursor(snapshot.cursor)
        })
    }

    fn render_lines(&mut self, lines: &[ChangedLine], cursor: Cursor) -> io::Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        self.with_frame(|display| {
            for line in lines {
                display.draw_row(line.row, &line.content)?;
            }
            display.place_cursor(cursor)
        })
    }

    fn set_mode(&mut self, mode: DisplayMode) -> io::Result<()> {
        if self.mode == mode {
            return Ok(());
        }
        debug!("display mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        execute!(self.out, Clear(ClearType::All))?;
        self.draw_status()?;
        self.out.flush()
    }

    fn alert(&mut self) -> io::Result<()> {
        write!(self.out, "\x07")?;
        self.out.flush()
    }

    fn set_status_line(&mut self, text: &str) -> io::Result<()> {
        self.status = text.to_string();
        self.refresh_status()
    }

    fn set_clock(&mut self, text: &str) -> io::Result<()> {
        self.clock = text.to_string();
        self.refresh_status()
    }

    fn shutdown(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let _ = execute!(self.out, ResetColor, SetAttribute(Attribute::Reset));
        let _ = execute!(self.out, Show, EnableLineWrap, LeaveAlternateScreen);
        let _ = self.out.flush();

        terminal::disable_raw_mode()?;
        debug!("display restored");
        Ok(())
    }
}

impl<W: Write> Drop for TerminalDisplay<W> {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
