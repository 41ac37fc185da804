//! Virtual screen
//!
//! An in-memory "dumb terminal": a fixed grid of ASCII cells, a cursor and
//! per-row dirty flags. Bytes are interpreted one at a time; there are no
//! escape sequences, attributes, scrollback or resizing.

/// Cell value used for cleared positions
pub const BLANK: u8 = b' ';

const BEL: u8 = 0x07;
const BS: u8 = 0x08;
const HT: u8 = 0x09;
const LF: u8 = 0x0A;
const FF: u8 = 0x0C;
const CR: u8 = 0x0D;

/// Tab stops every 8 columns
const TAB_WIDTH: u16 = 8;

/// Cursor position (0-indexed)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    pub row: u16,
    pub col: u16,
}

/// Full copy of a screen, used for complete redraws
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub rows: u16,
    pub cols: u16,
    pub lines: Vec<String>,
    pub cursor: Cursor,
}

/// One row reported by [`VirtualScreen::changed_lines`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangedLine {
    pub row: u16,
    pub content: String,
}

/// A fixed-size character grid driven by a byte-oriented state machine
pub struct VirtualScreen {
    rows: u16,
    cols: u16,
    lines: Vec<Vec<u8>>,
    dirty: Vec<bool>,
    cursor: Cursor,
    /// Set by BEL, cleared by `take_alert`
    alert: bool,
}

impl VirtualScreen {
    /// Create a blank screen. Both dimensions are clamped to at least 1.
    pub fn new(rows: u16, cols: u16) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            rows,
            cols,
            lines: vec![vec![BLANK; cols as usize]; rows as usize],
            dirty: vec![false; rows as usize],
            cursor: Cursor::default(),
            alert: false,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Interpret one byte of pty output
    pub fn consume(&mut self, byte: u8) {
        match byte {
            0x20..=0x7E => self.put_char(byte),
            LF => self.linefeed(),
            CR => self.cursor.col = 0,
            BS => self.backspace(),
            HT => self.horizontal_tab(),
            FF => self.form_feed(),
            BEL => self.alert = true,
            _ => {}
        }
    }

    /// Interpret a run of bytes in order
    pub fn feed(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.consume(b);
        }
    }

    fn put_char(&mut self, byte: u8) {
        let row = self.cursor.row as usize;
        self.lines[row][self.cursor.col as usize] = byte;
        // No auto-wrap: the cursor sticks at the last column.
        if self.cursor.col + 1 < self.cols {
            self.cursor.col += 1;
        }
        self.dirty[row] = true;
    }

    fn linefeed(&mut self) {
        if self.cursor.row + 1 >= self.rows {
            self.scroll_up();
        } else {
            self.cursor.row += 1;
            self.cursor.col = 0;
            let row = self.cursor.row as usize;
            self.lines[row].fill(BLANK);
            self.dirty[row] = true;
        }
    }

    /// Shift every row up by one and blank the last row. The cursor column is
    /// left where it was.
    fn scroll_up(&mut self) {
        self.lines.rotate_left(1);
        if let Some(last) = self.lines.last_mut() {
            last.fill(BLANK);
        }
        self.mark_all_dirty();
    }

    // Cursor moves are redrawn through the row they land on
    fn backspace(&mut self) {
        self.cursor.col = self.cursor.col.saturating_sub(1);
        self.dirty[self.cursor.row as usize] = true;
    }

    fn horizontal_tab(&mut self) {
        let next = (self.cursor.col / TAB_WIDTH + 1) * TAB_WIDTH;
        self.cursor.col = next.min(self.cols - 1);
        self.dirty[self.cursor.row as usize] = true;
    }

    fn form_feed(&mut self) {
        for line in &mut self.lines {
            line.fill(BLANK);
        }
        self.cursor = Cursor::default();
        self.mark_all_dirty();
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty.fill(true);
    }

    /// Forget pending dirty rows, e.g. after a full redraw from a snapshot
    pub fn mark_clean(&mut self) {
        self.dirty.fill(false);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.iter().any(|&d| d)
    }

    /// Current visible state. Does not touch dirty flags.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            rows: self.rows,
            cols: self.cols,
            lines: (0..self.rows as usize).map(|r| self.line_string(r)).collect(),
            cursor: self.cursor,
        }
    }

    /// Rows changed since the previous call, in ascending order. Clears all
    /// dirty flags.
    pub fn changed_lines(&mut self) -> Vec<ChangedLine> {
        let mut changed = Vec::new();
        for row in 0..self.rows as usize {
            if std::mem::take(&mut self.dirty[row]) {
                changed.push(ChangedLine {
                    row: row as u16,
                    content: self.line_string(row),
                });
            }
        }
        changed
    }

    /// Text of one row, blanks included
    #[cfg(test)]
    pub fn row_text(&self, row: u16) -> Option<String> {
        (row < self.rows).then(|| self.line_string(row as usize))
    }

    /// Whether a BEL arrived since the last call
    pub fn take_alert(&mut self) -> bool {
        std::mem::take(&mut self.alert)
    }

    fn line_string(&self, row: usize) -> String {
        self.lines[row].iter().map(|&b| b as char).collect()
    }
}
