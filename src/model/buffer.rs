use std::ops::Range;
use std::path::{Path, PathBuf};

use ropey::Rope;

use super::channel::{MAX_CHANNEL, StyleChannel};
use super::cursor::{CursorState, Motion};
use crate::host::TextBuffer;

/// Viewport state for scroll tracking.
#[derive(Debug, Clone)]
pub struct Viewport {
    pub top_line: usize,
    pub height: u16,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            top_line: 0,
            height: 24,
        }
    }
}

/// Painted byte ranges for every style channel. Ranges within a channel are
/// kept sorted and merged.
#[derive(Debug, Clone)]
pub struct StyleLayers {
    layers: Vec<Vec<Range<usize>>>,
}

impl Default for StyleLayers {
    fn default() -> Self {
        Self {
            layers: vec![Vec::new(); MAX_CHANNEL as usize + 1],
        }
    }
}

impl StyleLayers {
    pub fn ranges(&self, channel: StyleChannel) -> &[Range<usize>] {
        &self.layers[channel.id() as usize]
    }

    pub fn is_painted(&self, channel: StyleChannel, pos: usize) -> bool {
        let ranges = self.ranges(channel);
        let idx = ranges.partition_point(|r| r.end <= pos);
        ranges.get(idx).is_some_and(|r| r.start <= pos)
    }

    pub fn paint(&mut self, channel: StyleChannel, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let layer = &mut self.layers[channel.id() as usize];
        layer.push(range);
        layer.sort_by_key(|r| r.start);

        let mut merged: Vec<Range<usize>> = Vec::with_capacity(layer.len());
        for r in layer.drain(..) {
            match merged.last_mut() {
                Some(last) if r.start <= last.end => last.end = last.end.max(r.end),
                _ => merged.push(r),
            }
        }
        *layer = merged;
    }

    pub fn clear(&mut self, channel: StyleChannel, cut: Range<usize>) {
        if cut.is_empty() {
            return;
        }
        let layer = &mut self.layers[channel.id() as usize];
        let mut kept = Vec::with_capacity(layer.len() + 1);
        for r in layer.drain(..) {
            if r.end <= cut.start || r.start >= cut.end {
                kept.push(r);
                continue;
            }
            if r.start < cut.start {
                kept.push(r.start..cut.start);
            }
            if r.end > cut.end {
                kept.push(cut.end..r.end);
            }
        }
        *layer = kept;
    }

    pub fn clear_all(&mut self) {
        self.layers.iter_mut().for_each(Vec::clear);
    }
}

/// A text buffer backed by a Rope, with paint layers and a viewport.
/// The reference [`TextBuffer`] used by the viewer and the tests.
#[derive(Debug, Default)]
pub struct RopeBuffer {
    pub rope: Rope,
    pub path: Option<PathBuf>,
    pub cursor: CursorState,
    pub viewport: Viewport,
    pub styles: StyleLayers,
}

impl RopeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
            ..Self::default()
        }
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            ..Self::from_text(&text)
        })
    }

    /// Replaces the whole text. Paint does not survive a replacement.
    pub fn set_text(&mut self, text: &str) {
        self.rope = Rope::from_str(text);
        self.styles.clear_all();
        self.clamp_cursor();
        self.clamp_viewport();
    }

    /// Inserts `text` at a byte offset (clamped to the end of the buffer).
    pub fn insert_str(&mut self, byte_idx: usize, text: &str) {
        let byte_idx = byte_idx.min(self.rope.len_bytes());
        let char_idx = self.rope.byte_to_char(byte_idx);
        self.rope.insert(char_idx, text);
    }

    /// Removes a byte range (clamped to the buffer).
    pub fn remove(&mut self, range: Range<usize>) {
        let end = range.end.min(self.rope.len_bytes());
        let start = range.start.min(end);
        let start_char = self.rope.byte_to_char(start);
        let end_char = self.rope.byte_to_char(end);
        self.rope.remove(start_char..end_char);
        self.clamp_cursor();
    }

    /// Get the text of a specific line (without trailing newline).
    pub fn line_text(&self, idx: usize) -> Option<String> {
        if idx >= self.rope.len_lines() {
            return None;
        }
        let mut s: String = self.rope.line(idx).chunks().collect();
        if s.ends_with('\n') {
            s.pop();
        }
        if s.ends_with('\r') {
            s.pop();
        }
        Some(s)
    }

    /// Byte offset of the cursor.
    pub fn cursor_offset(&self) -> usize {
        self.rope.line_to_byte(self.cursor.row) + self.cursor.col
    }

    /// Scrolls so `top_line` is the first visible line.
    pub fn scroll_to(&mut self, top_line: usize) {
        self.viewport.top_line = top_line;
        self.clamp_viewport();
    }

    /// Ensure the cursor stays within valid bounds.
    pub fn clamp_cursor(&mut self) {
        let max_row = self.rope.len_lines().saturating_sub(1);
        self.cursor.row = self.cursor.row.min(max_row);

        let line = self.line_text(self.cursor.row).unwrap_or_default();
        self.cursor.col = self.cursor.col.min(line.len());
        while !line.is_char_boundary(self.cursor.col) {
            self.cursor.col -= 1;
        }
    }

    pub fn move_cursor(&mut self, motion: Motion) {
        let line = self.line_text(self.cursor.row).unwrap_or_default();
        let page = usize::from(self.viewport.height);
        self.cursor.apply(motion, &line, self.rope.len_lines(), page);
        self.clamp_cursor();
        self.scroll_to_cursor();
    }

    /// Ensure the viewport keeps the cursor visible.
    pub fn scroll_to_cursor(&mut self) {
        let height = usize::from(self.viewport.height.max(1));
        if self.cursor.row < self.viewport.top_line {
            self.viewport.top_line = self.cursor.row;
        }
        if self.cursor.row >= self.viewport.top_line + height {
            self.viewport.top_line = self.cursor.row + 1 - height;
        }
    }

    fn clamp_viewport(&mut self) {
        let max_top = self.rope.len_lines().saturating_sub(1);
        self.viewport.top_line = self.viewport.top_line.min(max_top);
    }
}

impl TextBuffer for RopeBuffer {
    fn text(&self) -> String {
        self.rope.to_string()
    }

    fn text_len(&self) -> usize {
        self.rope.len_bytes()
    }

    fn text_range(&self, start: usize, len: usize) -> String {
        let end = start.saturating_add(len).min(self.rope.len_bytes());
        let start = start.min(end);
        self.rope.byte_slice(start..end).to_string()
    }

    fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    fn visible_line_range(&self) -> (usize, usize) {
        let first = self.viewport.top_line.min(self.rope.len_lines().saturating_sub(1));
        let remaining = self.rope.len_lines() - first;
        (first, usize::from(self.viewport.height).min(remaining))
    }

    fn line_start_offset(&self, line: usize) -> usize {
        self.rope.line_to_byte(line.min(self.rope.len_lines()))
    }

    fn line_len(&self, line: usize) -> usize {
        if line >= self.rope.len_lines() {
            return 0;
        }
        self.rope.line(line).len_bytes()
    }

    fn clear_style_range(&mut self, channel: StyleChannel, start: usize, len: usize) {
        self.styles.clear(channel, start..start.saturating_add(len));
    }

    fn paint_style_range(&mut self, channel: StyleChannel, start: usize, len: usize) {
        self.styles.paint(channel, start..start.saturating_add(len));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(id: u32) -> StyleChannel {
        StyleChannel::new(id).unwrap()
    }

    #[test]
    fn paint_merges_overlapping_ranges() {
        let mut layers = StyleLayers::default();
        layers.paint(ch(1), 10..20);
        layers.paint(ch(1), 0..5);
        layers.paint(ch(1), 15..25);
        layers.paint(ch(1), 5..7);
        assert_eq!(layers.ranges(ch(1)), &[0..7, 10..25]);
        assert!(layers.ranges(ch(2)).is_empty());
    }

    #[test]
    fn clear_splits_ranges() {
        let mut layers = StyleLayers::default();
        layers.paint(ch(3), 0..30);
        layers.clear(ch(3), 10..12);
        assert_eq!(layers.ranges(ch(3)), &[0..10, 12..30]);
        assert!(layers.is_painted(ch(3), 9));
        assert!(!layers.is_painted(ch(3), 10));
        assert!(!layers.is_painted(ch(3), 11));
        assert!(layers.is_painted(ch(3), 12));
        assert!(!layers.is_painted(ch(3), 30));
    }

    #[test]
    fn visible_range_tracks_viewport() {
        let text: String = (0..100).map(|i| format!("line {i}\n")).collect();
        let mut buffer = RopeBuffer::from_text(&text);
        buffer.viewport.height = 10;
        buffer.scroll_to(95);

        // 100 lines of text plus the empty line after the final newline.
        assert_eq!(buffer.line_count(), 101);
        assert_eq!(buffer.visible_line_range(), (95, 6));
        assert_eq!(buffer.line_start_offset(1), "line 0\n".len());
        assert_eq!(buffer.line_len(0), "line 0\n".len());
        assert_eq!(buffer.line_len(500), 0);
    }

    #[test]
    fn edits_use_byte_offsets() {
        let mut buffer = RopeBuffer::from_text("héllo world");
        buffer.insert_str(6, ",");
        assert_eq!(buffer.text(), "héllo, world");
        buffer.remove(0..3);
        assert_eq!(buffer.text(), "llo, world");
        assert_eq!(buffer.text_range(5, 5), "world");
    }

    #[test]
    fn set_text_drops_paint() {
        let mut buffer = RopeBuffer::from_text("a b c");
        buffer.paint_style_range(ch(29), 0, 3);
        buffer.set_text("x");
        assert!(buffer.styles.ranges(ch(29)).is_empty());
    }

    #[test]
    fn cursor_motion_scrolls_viewport() {
        let text: String = (0..50).map(|i| format!("row {i}\n")).collect();
        let mut buffer = RopeBuffer::from_text(&text);
        buffer.viewport.height = 10;
        buffer.move_cursor(Motion::PageDown);
        buffer.move_cursor(Motion::PageDown);
        assert_eq!(buffer.cursor.row, 20);
        assert_eq!(buffer.viewport.top_line, 11);
        buffer.move_cursor(Motion::LineEnd);
        // Ten 6-byte rows, ten 7-byte rows, then "row 20".
        assert_eq!(buffer.cursor_offset(), 10 * 6 + 10 * 7 + 6);
    }
}
