use clap::ValueEnum;

/// Which side-by-side comparison to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ComparisonMode {
    /// Four prompting strategies against one model
    #[default]
    Strategies,
    /// One prompt at several sampling temperatures
    Temperature,
    /// One prompt against several models, with a cost table afterwards
    Models,
}

impl ComparisonMode {
    /// Whether a metrics table is printed after the split screen closes
    pub fn shows_summary(&self) -> bool {
        matches!(self, ComparisonMode::Models)
    }

    pub fn streaming_status(&self, panels: usize) -> String {
        match self {
            ComparisonMode::Models => {
                format!("Streaming from {} models... (Ctrl+C to cancel)", panels)
            }
            _ => "Streaming... (Ctrl+C to cancel)".to_string(),
        }
    }
}
