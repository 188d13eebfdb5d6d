//! The split screen shared by every producer task.
//!
//! All panel state and every terminal write caused by panel mutation sit
//! behind one mutex. Callers only get atomic operations (`write`,
//! `set_status`, `mark_done`, `zoom`, `replay`); panel internals never cross
//! a task boundary.

use super::draw::{encode, DrawOp};
use super::geometry::TerminalSize;
use super::layout::{compute_layout, Layout, LayoutError, LayoutKind, QUESTION_PREFIX};
use super::markdown::render_markdown;
use super::panel::Panel;
use crate::models::PanelSpec;
use crossterm::style::Stylize;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

pub const ZOOM_FOOTER: &str = "Press Enter to return to the results.";

struct ScreenState {
    layout: Layout,
    panels: Vec<Panel>,
    question: String,
    done: usize,
    out: Box<dyn Write + Send>,
}

impl ScreenState {
    fn specs(&self) -> Vec<PanelSpec> {
        self.panels.iter().map(|p| p.spec.clone()).collect()
    }

    /// Encode and emit `ops` as one write
    fn flush(&mut self, ops: &[DrawOp]) -> io::Result<()> {
        let bytes = encode(ops)?;
        self.out.write_all(&bytes)?;
        self.out.flush()
    }

    fn status(&mut self, text: &str) -> io::Result<()> {
        let ops = self.layout.status_ops(text);
        self.flush(&ops)
    }
}

#[derive(Clone)]
pub struct Screen {
    inner: Arc<Mutex<ScreenState>>,
}

impl Screen {
    /// Build panels for `specs` on a terminal of `size`. Nothing is drawn yet.
    pub fn new(
        size: TerminalSize,
        specs: Vec<PanelSpec>,
        question: impl Into<String>,
        out: Box<dyn Write + Send>,
    ) -> Result<Self, LayoutError> {
        let kind = LayoutKind::for_panel_count(specs.len())?;
        let layout = compute_layout(size.width, size.height, kind);
        let panels = specs
            .into_iter()
            .zip(layout.rects.iter().copied())
            .enumerate()
            .map(|(index, (spec, rect))| Panel::new(index, spec, rect))
            .collect();

        Ok(Self {
            inner: Arc::new(Mutex::new(ScreenState {
                layout,
                panels,
                question: question.into(),
                done: 0,
                out,
            })),
        })
    }

    fn state(&self) -> MutexGuard<'_, ScreenState> {
        // A producer that panicked mid-write leaves nothing half-updated that
        // a later write cannot recover from.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn panel_count(&self) -> usize {
        self.state().panels.len()
    }

    #[cfg(test)]
    pub(crate) fn layout(&self) -> Layout {
        self.state().layout.clone()
    }

    /// Clear the terminal and draw frame, banner, separator and `status`.
    pub fn draw(&self, status: &str) -> io::Result<()> {
        let mut state = self.state();
        let mut ops = state.layout.chrome_ops(&state.specs(), &state.question);
        ops.extend(state.layout.status_ops(status));
        state.flush(&ops)
    }

    /// Append a text fragment to one panel.
    pub fn write(&self, index: usize, text: &str) {
        let mut state = self.state();
        let status_row = state.layout.rows.status;
        let Some(panel) = state.panels.get_mut(index) else {
            debug!(index, "write to unknown panel ignored");
            return;
        };

        let mut ops = Vec::new();
        panel.write(text, &mut ops);
        ops.push(DrawOp::Park { row: status_row });
        if let Err(e) = state.flush(&ops) {
            warn!(error = %e, index, "terminal write failed");
        }
    }

    pub fn set_status(&self, text: &str) {
        if let Err(e) = self.state().status(text) {
            warn!(error = %e, "status update failed");
        }
    }

    /// Count one more finished producer and refresh the progress line.
    /// Returns (done, total).
    pub fn mark_done(&self) -> (usize, usize) {
        let mut state = self.state();
        state.done += 1;
        let done = state.done;
        let total = state.panels.len();
        if done < total {
            let text = format!("Streaming... ({}/{} done, Ctrl+C to cancel)", done, total);
            if let Err(e) = state.status(&text) {
                warn!(error = %e, "status update failed");
            }
        }
        (done, total)
    }

    #[cfg(test)]
    pub(crate) fn done_count(&self) -> usize {
        self.state().done
    }

    /// Full-screen styled view of one panel's raw content. Returns false when
    /// `index` names no panel.
    pub fn zoom(&self, index: usize) -> io::Result<bool> {
        let mut state = self.state();
        let width = state.layout.width() as usize;
        let Some(panel) = state.panels.get(index) else {
            return Ok(false);
        };

        let rule = "─".repeat(width);
        let body = format!(
            "\n{rule}\n\n{}\n\n{rule}\n{}",
            render_markdown(panel.raw()),
            ZOOM_FOOTER.dim()
        );
        let ops = vec![
            DrawOp::ClearScreen,
            DrawOp::Styled {
                row: 1,
                col: 1,
                text: format!(" {} ", panel.spec.title),
                color: panel.spec.color,
            },
            DrawOp::Flow(body),
        ];
        state.flush(&ops)?;
        Ok(true)
    }

    /// Redraw the split view from scratch, rebuilding every panel from its raw
    /// buffer.
    pub fn replay(&self) -> io::Result<()> {
        let mut state = self.state();
        let mut ops = state.layout.chrome_ops(&state.specs(), &state.question);
        for panel in state.panels.iter_mut() {
            panel.replay(&mut ops);
        }
        ops.push(DrawOp::Park {
            row: state.layout.rows.status,
        });
        state.flush(&ops)
    }

    pub fn show_cursor(&self) -> io::Result<()> {
        self.state().flush(&[DrawOp::ShowCursor])
    }

    /// Leave the terminal usable: cursor visible and parked below the layout.
    pub fn teardown(&self) -> io::Result<()> {
        let mut state = self.state();
        let bottom = state.layout.height();
        state.flush(&[
            DrawOp::ShowCursor,
            DrawOp::Park { row: bottom },
            DrawOp::Flow("\n".to_string()),
        ])
    }

    /// Replace the split view with the question and a block of plain text.
    pub fn show_summary(&self, table: &str) -> io::Result<()> {
        let mut state = self.state();
        let text = format!("{}{}\n{}", QUESTION_PREFIX, state.question, table);
        state.flush(&[DrawOp::ClearScreen, DrawOp::Flow(text)])
    }

    pub fn raw_content(&self, index: usize) -> Option<String> {
        self.state().panels.get(index).map(|p| p.raw().to_string())
    }

    #[cfg(test)]
    pub(crate) fn panel(&self, index: usize) -> Option<Panel> {
        self.state().panels.get(index).cloned()
    }
}

/// Clonable in-memory sink standing in for the terminal.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(panels: usize) -> (Screen, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let specs = PanelSpec::from_titles((1..=panels).map(|i| format!("P{}", i)));
        let screen = Screen::new(
            TerminalSize::clamped(120, 40),
            specs,
            "what is 2+2?",
            Box::new(buffer.clone()),
        )
        .unwrap();
        (screen, buffer)
    }

    #[test]
    fn test_rejects_unsupported_panel_counts() {
        let specs = PanelSpec::from_titles(["only"]);
        let result = Screen::new(
            TerminalSize::clamped(80, 24),
            specs,
            "q",
            Box::new(SharedBuffer::default()),
        );
        assert!(matches!(result, Err(LayoutError::UnsupportedPanelCount(1))));
    }

    #[test]
    fn test_draw_paints_chrome_and_status() {
        let (screen, buffer) = screen(4);
        screen.draw("Streaming...").unwrap();

        let out = buffer.contents();
        assert!(out.contains("Question: what is 2+2?"));
        assert!(out.contains(" P4 "));
        assert!(out.contains("Streaming..."));
        assert!(out.contains("\x1b[?25l"));
    }

    #[test]
    fn test_write_updates_panel_and_parks_on_status_row() {
        let (screen, buffer) = screen(2);
        screen.write(1, "hi\nthere");

        let panel = screen.panel(1).unwrap();
        assert_eq!(panel.committed(), &["hi".to_string()]);
        assert_eq!(panel.current_line(), "there");
        let status_row = screen.layout().rows.status;
        assert!(buffer.contents().ends_with(&format!("\x1b[{};1H", status_row)));
        assert_eq!(screen.raw_content(0).unwrap(), "");
    }

    #[test]
    fn test_write_to_unknown_panel_is_ignored() {
        let (screen, buffer) = screen(2);
        screen.write(7, "lost");
        assert!(buffer.contents().is_empty());
    }

    #[test]
    fn test_mark_done_reports_progress_until_last() {
        let (screen, buffer) = screen(3);

        assert_eq!(screen.mark_done(), (1, 3));
        assert!(buffer.contents().contains("(1/3 done"));
        assert_eq!(screen.mark_done(), (2, 3));
        assert!(buffer.contents().contains("(2/3 done"));

        buffer.clear();
        assert_eq!(screen.mark_done(), (3, 3));
        assert!(buffer.contents().is_empty());
        assert_eq!(screen.done_count(), 3);
    }

    #[test]
    fn test_concurrent_writers_keep_panels_separate() {
        let (screen, _buffer) = screen(4);
        let handles: Vec<_> = (0..4)
            .map(|idx| {
                let screen = screen.clone();
                std::thread::spawn(move || {
                    for n in 0..200 {
                        screen.write(idx, &format!("p{}-{} ", idx, n));
                        if n % 7 == 0 {
                            screen.write(idx, "\n");
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for idx in 0..4 {
            let raw = screen.raw_content(idx).unwrap();
            let expected: String = (0..200)
                .map(|n| {
                    let mut s = format!("p{}-{} ", idx, n);
                    if n % 7 == 0 {
                        s.push('\n');
                    }
                    s
                })
                .collect();
            assert_eq!(raw, expected);
            let panel = screen.panel(idx).unwrap();
            assert!(panel.cursor().0 < panel.rect.height);
            assert!(!raw.contains(&format!("p{}-", (idx + 1) % 4)));
        }
    }

    #[test]
    fn test_zoom_prints_styled_raw_content() {
        let (screen, buffer) = screen(2);
        screen.write(0, "**bold** answer\n");
        buffer.clear();

        assert!(screen.zoom(0).unwrap());
        let out = buffer.contents();
        assert!(out.starts_with("\x1b[2J"));
        assert!(out.contains(" P1 "));
        assert!(out.contains("answer"));
        assert!(!out.contains("**bold**"));
        assert!(out.contains(ZOOM_FOOTER));

        assert!(!screen.zoom(5).unwrap());
    }

    #[test]
    fn test_replay_restores_every_panel() {
        let (screen, _buffer) = screen(3);
        let text: String = (1..=60).map(|i| format!("row {}\n", i)).collect();
        screen.write(0, &text);
        screen.write(1, "short");
        screen.write(2, "a much longer line that will wrap around the narrow column at least once");

        let before: Vec<Panel> = (0..3).map(|i| screen.panel(i).unwrap()).collect();
        screen.zoom(0).unwrap();
        screen.replay().unwrap();

        for (idx, old) in before.iter().enumerate() {
            let new = screen.panel(idx).unwrap();
            assert_eq!(new.raw(), old.raw());
            assert_eq!(new.committed(), old.committed());
            assert_eq!(new.current_line(), old.current_line());
            assert_eq!(new.cursor(), old.cursor());
            assert_eq!(new.visible_window(), old.visible_window());
        }
    }

    #[test]
    fn test_summary_replaces_split_view() {
        let (screen, buffer) = screen(2);
        screen.show_summary("TABLE\n").unwrap();
        let out = buffer.contents();
        assert!(out.starts_with("\x1b[2J"));
        assert!(out.ends_with("Question: what is 2+2?\nTABLE\n"));
    }

    #[test]
    fn test_teardown_shows_cursor() {
        let (screen, buffer) = screen(2);
        screen.teardown().unwrap();
        let out = buffer.contents();
        assert!(out.starts_with("\x1b[?25h"));
        assert!(out.ends_with('\n'));
    }
}
