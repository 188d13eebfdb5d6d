pub mod draw;
pub mod geometry;
pub mod layout;
pub mod markdown;
pub mod panel;
pub mod screen;
pub mod summary;

pub use screen::Screen;

use anyhow::Result;
use crossterm::{cursor::Show, execute};
use std::io::stdout;

/// Best-effort terminal restore for paths that never reach screen teardown.
pub fn restore() -> Result<()> {
    execute!(stdout(), Show)?;
    Ok(())
}
