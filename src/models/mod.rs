mod metrics;
mod mode;
mod panel_spec;
mod provider;

pub use metrics::{LaneMetrics, Pricing, TokenUsage};
pub use mode::ComparisonMode;
pub use panel_spec::PanelSpec;
pub use provider::ProviderKind;
