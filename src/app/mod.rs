mod navigation;
mod orchestrator;
mod plan;
mod runtime;


pub use plan::build_lanes;
pub use runtime::{compare, Session};
