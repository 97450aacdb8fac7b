/// Cursor position within a buffer.
#[derive(Debug, Clone, Default)]
pub struct CursorState {
    /// Current line (0-indexed).
    pub row: usize,
    /// Byte offset within the line.
    pub col: usize,
    /// Column to return to on vertical movement ("sticky" column).
    pub desired_col: usize,
}

/// Cursor motions the viewer supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Up,
    Down,
    Left,
    Right,
    LineStart,
    LineEnd,
    PageUp,
    PageDown,
}

impl CursorState {
    pub fn move_to(&mut self, row: usize, col: usize) {
        self.row = row;
        self.col = col;
        self.desired_col = col;
    }

    /// Applies `motion` against `line`, the text of the current row without
    /// its terminator. Vertical motions only change the row; the caller
    /// clamps the column against the new line.
    pub fn apply(&mut self, motion: Motion, line: &str, line_count: usize, page: usize) {
        let last_row = line_count.saturating_sub(1);
        match motion {
            Motion::Up => {
                self.row = self.row.saturating_sub(1);
                self.col = self.desired_col;
            }
            Motion::Down => {
                self.row = (self.row + 1).min(last_row);
                self.col = self.desired_col;
            }
            Motion::PageUp => {
                self.row = self.row.saturating_sub(page.max(1));
                self.col = self.desired_col;
            }
            Motion::PageDown => {
                self.row = (self.row + page.max(1)).min(last_row);
                self.col = self.desired_col;
            }
            Motion::Left => {
                let col = self.col.min(line.len());
                if let Some(ch) = line.get(..col).and_then(|s| s.chars().next_back()) {
                    self.col = col - ch.len_utf8();
                }
                self.desired_col = self.col;
            }
            Motion::Right => {
                if let Some(ch) = line.get(self.col..).and_then(|s| s.chars().next()) {
                    self.col += ch.len_utf8();
                }
                self.desired_col = self.col;
            }
            Motion::LineStart => self.move_to(self.row, 0),
            Motion::LineEnd => self.move_to(self.row, line.len()),
        }
    }
}
