use crossterm::style::Color;

/// Colours handed out to panels in order.
pub const PANEL_PALETTE: [Color; 4] = [Color::Blue, Color::Green, Color::Yellow, Color::Magenta];

/// Identity of one panel: what the border says and how it is tinted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelSpec {
    pub title: String,
    pub color: Color,
}

impl PanelSpec {
    pub fn new(title: impl Into<String>, color: Color) -> Self {
        Self {
            title: title.into(),
            color,
        }
    }

    /// Build specs for a list of titles, cycling through the palette
    pub fn from_titles<I, S>(titles: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        titles
            .into_iter()
            .enumerate()
            .map(|(idx, title)| Self::new(title, PANEL_PALETTE[idx % PANEL_PALETTE.len()]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_titles_cycles_palette() {
        let specs = PanelSpec::from_titles(["a", "b", "c", "d"]);
        assert_eq!(specs.len(), 4);
        assert_eq!(specs[0].color, Color::Blue);
        assert_eq!(specs[3].color, Color::Magenta);
        assert_eq!(specs[2].title, "c");
    }
}
