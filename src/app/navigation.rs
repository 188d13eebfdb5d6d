use crate::tui::Screen;
use anyhow::Result;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Exit,
    /// 0-based panel index
    Zoom(usize),
    Retry,
}

/// Interpret one input line. `None` is end of input.
pub fn parse_choice(line: Option<&str>, panels: usize) -> Choice {
    let Some(line) = line else {
        return Choice::Exit;
    };
    let input = line.trim();
    if input.is_empty() {
        return Choice::Exit;
    }
    match input.parse::<usize>() {
        Ok(n) if (1..=panels).contains(&n) && input.len() == 1 => Choice::Zoom(n - 1),
        _ => Choice::Retry,
    }
}

/// Prompt shown while waiting for a panel number.
pub fn navigation_status(panels: usize, cancelled: bool, summary_follows: bool) -> String {
    let lead = if cancelled { "Cancelled." } else { "Done!" };
    let exit = if summary_follows {
        "Enter to see comparison table."
    } else {
        "Enter to exit."
    };
    format!("{} Enter 1-{} to view a panel, {}", lead, panels, exit)
}

async fn read_line<R: AsyncBufRead + Unpin>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    let n = input.read_line(&mut line).await?;
    Ok((n > 0).then_some(line))
}

/// Let the user zoom into panels until they ask to leave. An interrupt ends
/// the loop as well.
pub async fn navigate<R, I>(screen: &Screen, input: &mut R, status: &str, interrupt: I) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    I: Future<Output = ()>,
{
    tokio::pin!(interrupt);
    let panels = screen.panel_count();

    loop {
        screen.set_status(status);
        screen.show_cursor()?;

        let line = tokio::select! {
            _ = &mut interrupt => return Ok(()),
            line = read_line(input) => line?,
        };

        match parse_choice(line.as_deref(), panels) {
            Choice::Exit => return Ok(()),
            Choice::Retry => continue,
            Choice::Zoom(index) => {
                debug!(index, "zooming into panel");
                screen.zoom(index)?;
                tokio::select! {
                    _ = &mut interrupt => return Ok(()),
                    line = read_line(input) => { line?; }
                }
                screen.replay()?;
            }
        }
    }
}
