//! One rectangular output region and its wrap/scroll bookkeeping.
//!
//! Text is drawn one glyph at a time as it arrives. A line is committed on
//! `\n` or when the cursor reaches the panel width. While the panel still has
//! free rows a commit just moves the cursor down; once it is full, each commit
//! is a scroll event that repaints the last `height - 1` committed lines and
//! leaves the bottom row for new text.
//!
//! The raw buffer keeps every byte ever written. Replaying it into a reset
//! panel reproduces the same committed lines, cursor and visible window, which
//! is how the split view is restored after a zoom.

use super::draw::DrawOp;
use super::layout::Rect;
use crate::models::PanelSpec;

#[derive(Debug, Clone)]
pub struct Panel {
    pub index: usize,
    pub spec: PanelSpec,
    pub rect: Rect,
    cursor_row: u16,
    cursor_col: u16,
    lines: Vec<String>,
    current: String,
    raw: String,
}

impl Panel {
    pub fn new(index: usize, spec: PanelSpec, rect: Rect) -> Self {
        Self {
            index,
            spec,
            rect,
            cursor_row: 0,
            cursor_col: 0,
            lines: Vec::new(),
            current: String::new(),
            raw: String::new(),
        }
    }

    /// Append a fragment, pushing the positioned writes it needs onto `ops`.
    pub fn write(&mut self, text: &str, ops: &mut Vec<DrawOp>) {
        self.raw.push_str(text);
        for ch in text.chars() {
            match ch {
                '\r' => {}
                '\n' => self.commit(ops),
                ch => {
                    self.current.push(ch);
                    ops.push(DrawOp::Glyph {
                        row: self.rect.row + self.cursor_row,
                        col: self.rect.col + self.cursor_col,
                        ch,
                    });
                    self.cursor_col += 1;
                    if self.cursor_col >= self.rect.width {
                        self.commit(ops);
                    }
                }
            }
        }
    }

    fn commit(&mut self, ops: &mut Vec<DrawOp>) {
        self.lines.push(std::mem::take(&mut self.current));
        self.cursor_col = 0;

        if self.lines.len() < self.rect.height as usize {
            self.cursor_row += 1;
            return;
        }

        // Scroll: repaint the newest height-1 lines and free the last row.
        for offset in 0..self.rect.height {
            ops.push(DrawOp::Blank {
                row: self.rect.row + offset,
                col: self.rect.col,
                width: self.rect.width,
            });
        }
        let keep = self.rect.height as usize - 1;
        let start = self.lines.len() - keep;
        for (offset, line) in self.lines[start..].iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            ops.push(DrawOp::Text {
                row: self.rect.row + offset as u16,
                col: self.rect.col,
                text: truncate(line, self.rect.width),
            });
        }
        self.cursor_row = self.rect.height - 1;
    }

    /// Forget all content and hand back the raw buffer.
    pub fn reset(&mut self) -> String {
        self.cursor_row = 0;
        self.cursor_col = 0;
        self.lines.clear();
        self.current.clear();
        std::mem::take(&mut self.raw)
    }

    /// Rebuild the panel from its own raw buffer. The area is assumed to have
    /// been cleared by the caller.
    pub fn replay(&mut self, ops: &mut Vec<DrawOp>) {
        let content = self.reset();
        self.write(&content, ops);
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn committed(&self) -> &[String] {
        &self.lines
    }

    pub fn current_line(&self) -> &str {
        &self.current
    }

    /// Cursor position as (row, column) offsets inside the content area
    pub fn cursor(&self) -> (u16, u16) {
        (self.cursor_row, self.cursor_col)
    }

    /// Rows that should currently be visible, top-aligned, derived from the
    /// committed lines and the in-progress line alone.
    pub fn visible_window(&self) -> Vec<String> {
        let height = self.rect.height as usize;
        let start = if self.lines.len() >= height {
            self.lines.len() - (height - 1)
        } else {
            0
        };
        let mut rows: Vec<String> = self.lines[start..]
            .iter()
            .map(|line| truncate(line, self.rect.width))
            .collect();
        rows.push(self.current.clone());
        rows.resize(height, String::new());
        rows
    }
}

fn truncate(line: &str, width: u16) -> String {
    line.chars().take(width as usize).collect()
}
