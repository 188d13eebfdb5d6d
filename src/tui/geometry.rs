use tracing::debug;

/// Smallest terminal the split layouts are drawn for.
pub const MIN_WIDTH: u16 = 80;
pub const MIN_HEIGHT: u16 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub width: u16,
    pub height: u16,
}

impl TerminalSize {
    /// Apply the floor bounds. Zero or garbage readings from a non-terminal
    /// end up at the minimum size.
    pub fn clamped(width: u16, height: u16) -> Self {
        Self {
            width: width.max(MIN_WIDTH),
            height: height.max(MIN_HEIGHT),
        }
    }
}

/// Query the controlling terminal, never failing.
pub fn probe() -> TerminalSize {
    match crossterm::terminal::size() {
        Ok((width, height)) => TerminalSize::clamped(width, height),
        Err(e) => {
            debug!(error = %e, "terminal size unavailable, using minimum");
            TerminalSize::clamped(0, 0)
        }
    }
}
