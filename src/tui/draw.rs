//! Typed terminal writes and their encoding to crossterm commands.
//!
//! Panel mutation never touches the terminal directly. It appends `DrawOp`s to
//! a buffer, and the screen encodes the whole buffer into one byte string that
//! is written with a single `write_all`. Rows and columns are 1-indexed, the
//! same coordinate space the layout engine works in.

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOp {
    /// A single character at an absolute position
    Glyph { row: u16, col: u16, ch: char },
    /// A run of text starting at an absolute position
    Text { row: u16, col: u16, text: String },
    /// Coloured text, used for panel titles and banners
    Styled {
        row: u16,
        col: u16,
        text: String,
        color: Color,
    },
    /// `width` spaces starting at an absolute position
    Blank { row: u16, col: u16, width: u16 },
    /// Erase a whole terminal row
    ClearLine { row: u16 },
    ClearScreen,
    /// Move the cursor to the first column of `row`
    Park { row: u16 },
    /// Text printed wherever the cursor currently is
    Flow(String),
    HideCursor,
    ShowCursor,
}

fn move_to(row: u16, col: u16) -> MoveTo {
    MoveTo(col.saturating_sub(1), row.saturating_sub(1))
}

/// Queue `ops` onto `out` without flushing
pub fn encode_into<W: Write>(out: &mut W, ops: &[DrawOp]) -> io::Result<()> {
    for op in ops {
        match op {
            DrawOp::Glyph { row, col, ch } => queue!(out, move_to(*row, *col), Print(*ch))?,
            DrawOp::Text { row, col, text } => queue!(out, move_to(*row, *col), Print(text))?,
            DrawOp::Styled {
                row,
                col,
                text,
                color,
            } => queue!(
                out,
                move_to(*row, *col),
                SetForegroundColor(*color),
                Print(text),
                ResetColor
            )?,
            DrawOp::Blank { row, col, width } => queue!(
                out,
                move_to(*row, *col),
                Print(" ".repeat(*width as usize))
            )?,
            DrawOp::ClearLine { row } => {
                queue!(out, move_to(*row, 1), Clear(ClearType::CurrentLine))?
            }
            DrawOp::ClearScreen => queue!(out, Clear(ClearType::All), MoveTo(0, 0))?,
            DrawOp::Park { row } => queue!(out, move_to(*row, 1))?,
            DrawOp::Flow(text) => queue!(out, Print(text))?,
            DrawOp::HideCursor => queue!(out, Hide)?,
            DrawOp::ShowCursor => queue!(out, Show)?,
        }
    }
    Ok(())
}

/// Encode `ops` into a standalone byte buffer
pub fn encode(ops: &[DrawOp]) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(ops.len() * 8);
    encode_into(&mut buf, ops)?;
    Ok(buf)
}

/// In-memory character grid that positioned ops can be replayed onto.
#[cfg(test)]
pub(crate) struct Canvas {
    width: u16,
    height: u16,
    cells: Vec<Vec<char>>,
    /// Positioned writes that landed outside the grid
    pub misses: Vec<(u16, u16)>,
}

#[cfg(test)]
impl Canvas {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            cells: vec![vec![' '; width as usize]; height as usize],
            misses: Vec::new(),
        }
    }

    fn put(&mut self, row: u16, col: u16, ch: char) {
        if row == 0 || col == 0 || row > self.height || col > self.width {
            self.misses.push((row, col));
            return;
        }
        self.cells[(row - 1) as usize][(col - 1) as usize] = ch;
    }

    pub fn apply(&mut self, ops: &[DrawOp]) {
        for op in ops {
            match op {
                DrawOp::Glyph { row, col, ch } => self.put(*row, *col, *ch),
                DrawOp::Text { row, col, text } | DrawOp::Styled { row, col, text, .. } => {
                    for (offset, ch) in text.chars().enumerate() {
                        self.put(*row, *col + offset as u16, ch);
                    }
                }
                DrawOp::Blank { row, col, width } => {
                    for offset in 0..*width {
                        self.put(*row, *col + offset, ' ');
                    }
                }
                DrawOp::ClearLine { row } => {
                    for col in 1..=self.width {
                        self.put(*row, col, ' ');
                    }
                }
                DrawOp::ClearScreen => {
                    for row in self.cells.iter_mut() {
                        row.fill(' ');
                    }
                }
                DrawOp::Park { .. } | DrawOp::Flow(_) | DrawOp::HideCursor | DrawOp::ShowCursor => {}
            }
        }
    }

    /// Rows of a rectangular region with trailing spaces trimmed
    pub fn region(&self, row: u16, col: u16, width: u16, height: u16) -> Vec<String> {
        (row..row + height)
            .map(|r| {
                let line = &self.cells[(r - 1) as usize];
                let start = (col - 1) as usize;
                let end = (start + width as usize).min(line.len());
                line[start..end].iter().collect::<String>().trim_end().to_string()
            })
            .collect()
    }

    pub fn row_text(&self, row: u16) -> String {
        self.region(row, 1, self.width, 1).remove(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uses_zero_based_cursor_moves() {
        let bytes = encode(&[DrawOp::Glyph {
            row: 2,
            col: 5,
            ch: 'x',
        }])
        .unwrap();
        // CSI row;col H with 1-based terminal coordinates
        assert_eq!(String::from_utf8(bytes).unwrap(), "\x1b[2;5Hx");
    }

    #[test]
    fn test_encode_blank_and_flow() {
        let bytes = encode(&[
            DrawOp::Blank {
                row: 1,
                col: 1,
                width: 3,
            },
            DrawOp::Flow("tail".to_string()),
        ])
        .unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "\x1b[1;1H   tail");
    }

    #[test]
    fn test_canvas_records_out_of_bounds_writes() {
        let mut canvas = Canvas::new(4, 2);
        canvas.apply(&[
            DrawOp::Text {
                row: 1,
                col: 3,
                text: "abc".to_string(),
            },
            DrawOp::Glyph {
                row: 3,
                col: 1,
                ch: 'z',
            },
        ]);
        assert_eq!(canvas.row_text(1), "  ab");
        assert_eq!(canvas.misses, vec![(1, 5), (3, 1)]);
    }
}
