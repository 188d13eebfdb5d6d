//! Fixed split-screen layouts.
//!
//! A layout is computed once from the terminal size and a panel count and is
//! never recomputed: resizing the terminal mid-session is not handled.
//!
//! Two and three panels sit in a single band of columns:
//!
//! ```text
//! 1          top border
//! 2..ph+1    panel content
//! ph+2       bottom border
//! ph+3,ph+4  question banner
//! ph+5       separator
//! ph+6       status
//! ```
//!
//! Four panels form a 2x2 grid with a middle border between the bands, so the
//! fixed rows shift to `2ph+3` (bottom border) through `2ph+7` (status).

use super::draw::DrawOp;
use super::geometry::TerminalSize;
use crate::models::PanelSpec;
use thiserror::Error;

pub const QUESTION_PREFIX: &str = "Question: ";

/// Content rows a panel keeps even on the smallest terminal
const MIN_PANEL_HEIGHT: u16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    TwoColumn,
    ThreeColumn,
    Grid,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("split screen supports 2 to 4 panels, got {0}")]
    UnsupportedPanelCount(usize),
}

impl LayoutKind {
    pub fn for_panel_count(count: usize) -> Result<Self, LayoutError> {
        match count {
            2 => Ok(LayoutKind::TwoColumn),
            3 => Ok(LayoutKind::ThreeColumn),
            4 => Ok(LayoutKind::Grid),
            other => Err(LayoutError::UnsupportedPanelCount(other)),
        }
    }

    fn columns(&self) -> u16 {
        match self {
            LayoutKind::TwoColumn | LayoutKind::Grid => 2,
            LayoutKind::ThreeColumn => 3,
        }
    }
}

/// Content area of one panel. `row`/`col` are the 1-indexed top-left cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub row: u16,
    pub col: u16,
    pub width: u16,
    pub height: u16,
}

#[cfg(test)]
impl Rect {
    /// Last column inside the content area
    pub fn right(&self) -> u16 {
        self.col + self.width - 1
    }

    pub fn bottom(&self) -> u16 {
        self.row + self.height - 1
    }
}

/// Screen rows that do not belong to any panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRows {
    pub top_border: u16,
    pub mid_border: Option<u16>,
    pub bottom_border: u16,
    /// First of the two banner rows
    pub question: u16,
    pub separator: u16,
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub kind: LayoutKind,
    pub size: TerminalSize,
    pub panel_height: u16,
    /// Width of one column slot (terminal width divided by column count)
    pub column_width: u16,
    pub rows: FixedRows,
    pub rects: Vec<Rect>,
}

/// Compute panel geometry and fixed rows for a terminal of the given size.
pub fn compute_layout(width: u16, height: u16, kind: LayoutKind) -> Layout {
    let size = TerminalSize::clamped(width, height);
    let columns = kind.columns();
    let column_width = size.width / columns;

    let (panel_height, rows, bands) = match kind {
        LayoutKind::Grid => {
            let ph = ((size.height - 7) / 2).max(MIN_PANEL_HEIGHT);
            let mid = ph + 2;
            let rows = FixedRows {
                top_border: 1,
                mid_border: Some(mid),
                bottom_border: 2 * ph + 3,
                question: 2 * ph + 4,
                separator: 2 * ph + 6,
                status: 2 * ph + 7,
            };
            (ph, rows, vec![2, mid + 1])
        }
        LayoutKind::TwoColumn | LayoutKind::ThreeColumn => {
            let ph = (size.height - 6).max(MIN_PANEL_HEIGHT);
            let rows = FixedRows {
                top_border: 1,
                mid_border: None,
                bottom_border: ph + 2,
                question: ph + 3,
                separator: ph + 5,
                status: ph + 6,
            };
            (ph, rows, vec![2])
        }
    };

    let rects = bands
        .iter()
        .flat_map(|&row| {
            (0..columns).map(move |idx| {
                let (col, width) = column_span(idx, columns, column_width, size.width);
                Rect {
                    row,
                    col,
                    width,
                    height: panel_height,
                }
            })
        })
        .collect();

    Layout {
        kind,
        size,
        panel_height,
        column_width,
        rows,
        rects,
    }
}

/// Starting column and width of content column `idx`; the last column
/// absorbs the division remainder.
fn column_span(idx: u16, columns: u16, unit: u16, total_width: u16) -> (u16, u16) {
    let col = idx * unit + 2;
    let width = if idx == columns - 1 {
        total_width - idx * unit - 2
    } else {
        unit - 1
    };
    (col, width)
}

impl Layout {
    pub fn width(&self) -> u16 {
        self.size.width
    }

    pub fn height(&self) -> u16 {
        self.size.height
    }

    fn column_widths(&self) -> Vec<u16> {
        let columns = self.kind.columns();
        (0..columns)
            .map(|idx| column_span(idx, columns, self.column_width, self.size.width).1)
            .collect()
    }

    fn horizontal(&self, row: u16, left: char, junction: char, right: char) -> DrawOp {
        let inner: Vec<String> = self
            .column_widths()
            .iter()
            .map(|w| "─".repeat(*w as usize))
            .collect();
        DrawOp::Text {
            row,
            col: 1,
            text: format!("{}{}{}", left, inner.join(&junction.to_string()), right),
        }
    }

    /// Box-drawing frame around every panel plus coloured titles.
    pub fn border_ops(&self, specs: &[PanelSpec]) -> Vec<DrawOp> {
        let mut ops = Vec::new();
        let dividers: Vec<u16> = (1..self.kind.columns())
            .map(|idx| idx * self.column_width + 1)
            .collect();

        ops.push(self.horizontal(self.rows.top_border, '┌', '┬', '┐'));
        if let Some(mid) = self.rows.mid_border {
            ops.push(self.horizontal(mid, '├', '┼', '┤'));
        }
        ops.push(self.horizontal(self.rows.bottom_border, '└', '┴', '┘'));

        let mut band_rows: Vec<u16> = self.rects.iter().map(|r| r.row).collect();
        band_rows.dedup();
        for top in band_rows {
            for row in top..top + self.panel_height {
                for col in std::iter::once(1)
                    .chain(dividers.iter().copied())
                    .chain(std::iter::once(self.size.width))
                {
                    ops.push(DrawOp::Text {
                        row,
                        col,
                        text: "│".to_string(),
                    });
                }
            }
        }

        for (rect, spec) in self.rects.iter().zip(specs) {
            let room = rect.width.saturating_sub(3) as usize;
            let title: String = spec.title.chars().take(room).collect();
            ops.push(DrawOp::Styled {
                row: rect.row - 1,
                col: rect.col + 1,
                text: format!(" {} ", title),
                color: spec.color,
            });
        }

        ops
    }

    /// The two-row question banner. Text that does not fit on the second
    /// row is cut with an ellipsis.
    pub fn question_ops(&self, question: &str) -> Vec<DrawOp> {
        let width = self.size.width as usize;
        let prefix_width = QUESTION_PREFIX.chars().count();
        let cap = width.saturating_sub(prefix_width);
        let flat: Vec<char> = question
            .chars()
            .map(|c| if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c })
            .collect();

        let row = self.rows.question;
        let mut ops = vec![
            DrawOp::Blank {
                row,
                col: 1,
                width: self.size.width,
            },
            DrawOp::Blank {
                row: row + 1,
                col: 1,
                width: self.size.width,
            },
        ];

        if flat.len() <= cap {
            ops.push(DrawOp::Text {
                row,
                col: 1,
                text: format!("{}{}", QUESTION_PREFIX, flat.iter().collect::<String>()),
            });
            return ops;
        }

        let first: String = flat[..cap].iter().collect();
        let mut rest: String = flat[cap..].iter().collect();
        if flat.len() - cap > cap {
            rest = flat[cap..cap + cap.saturating_sub(3)].iter().collect();
            rest.push_str("...");
        }
        ops.push(DrawOp::Text {
            row,
            col: 1,
            text: format!("{}{}", QUESTION_PREFIX, first),
        });
        ops.push(DrawOp::Text {
            row: row + 1,
            col: 1,
            text: format!("{}{}", " ".repeat(prefix_width), rest),
        });
        ops
    }

    pub fn separator_op(&self) -> DrawOp {
        DrawOp::Text {
            row: self.rows.separator,
            col: 1,
            text: "─".repeat(self.size.width as usize),
        }
    }

    /// Replace the status line. The cursor is left after the text so it can
    /// double as an input prompt.
    pub fn status_ops(&self, text: &str) -> Vec<DrawOp> {
        let text: String = text.chars().take(self.size.width as usize).collect();
        vec![
            DrawOp::ClearLine {
                row: self.rows.status,
            },
            DrawOp::Text {
                row: self.rows.status,
                col: 1,
                text,
            },
        ]
    }

    /// Everything except panel content: a cleared screen, frame, banner and
    /// separator.
    pub fn chrome_ops(&self, specs: &[PanelSpec], question: &str) -> Vec<DrawOp> {
        let mut ops = vec![DrawOp::ClearScreen, DrawOp::HideCursor];
        ops.extend(self.border_ops(specs));
        ops.extend(self.question_ops(question));
        ops.push(self.separator_op());
        ops
    }
}
