pub mod settings;

pub use settings::{load, ApiKeys, ModelEntry, Overrides, Settings};
