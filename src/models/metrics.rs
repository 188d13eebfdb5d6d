//! Per-lane bookkeeping collected while a producer streams.

use std::time::Duration;

/// Token counts reported (or estimated) for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Sum of two usages, used when a lane issues more than one request
    pub fn merged(self, other: TokenUsage) -> Self {
        Self {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
        }
    }
}

/// USD per million tokens, per direction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pricing {
    pub cost_in: f64,
    pub cost_out: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaneMetrics {
    pub name: String,
    pub provider: String,
    pub duration: Duration,
    pub usage: TokenUsage,
    pub pricing: Pricing,
    /// Whether the stream stopped early because of cancellation
    pub cancelled: bool,
}

impl LaneMetrics {
    pub fn total_cost(&self) -> f64 {
        self.usage.input_tokens as f64 * self.pricing.cost_in / 1e6
            + self.usage.output_tokens as f64 * self.pricing.cost_out / 1e6
    }
}
