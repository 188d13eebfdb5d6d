use crate::api::anthropic::DEFAULT_API_VERSION;
use crate::api::RequestOptions;
use crate::models::{Pricing, ProviderKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default settings embedded at compile time
const DEFAULT_SETTINGS: &str = include_str!("defaults.toml");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_tokens: u32,
    pub cancel_grace_ms: u64,
    pub system: Option<String>,
    pub format: Option<String>,
    pub stop: Option<String>,
    pub temperatures: Vec<f64>,
    pub anthropic: AnthropicSettings,
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicSettings {
    pub model: String,
    pub base_url: String,
    pub version: String,
}

/// One backend in the model comparison roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Panel title and summary row name
    pub name: String,
    pub provider: ProviderKind,
    /// Provider column in the summary table; defaults to the provider name
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    pub model: String,
    #[serde(default)]
    pub cost_in: f64,
    #[serde(default)]
    pub cost_out: f64,
    /// Environment variable holding the key. No variable means no key.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            cancel_grace_ms: 3000,
            system: None,
            format: None,
            stop: None,
            temperatures: vec![0.0, 0.7, 1.0],
            anthropic: AnthropicSettings::default(),
            models: vec![
                ModelEntry {
                    name: "Qwen2.5-1.5B (local)".to_string(),
                    provider: ProviderKind::OpenAi,
                    label: Some("Local".to_string()),
                    base_url: Some("http://localhost:1234".to_string()),
                    model: "qwen2.5-coder-1.5b-instruct".to_string(),
                    cost_in: 0.0,
                    cost_out: 0.0,
                    api_key_env: None,
                },
                ModelEntry {
                    name: "GPT-4o-mini".to_string(),
                    provider: ProviderKind::OpenAi,
                    label: Some("OpenAI".to_string()),
                    base_url: Some("https://api.openai.com".to_string()),
                    model: "gpt-4o-mini".to_string(),
                    cost_in: 0.15,
                    cost_out: 0.60,
                    api_key_env: Some("OPENAI_API_KEY".to_string()),
                },
                ModelEntry {
                    name: "Claude Sonnet".to_string(),
                    provider: ProviderKind::Anthropic,
                    label: Some("Anthropic".to_string()),
                    base_url: Some("https://api.anthropic.com".to_string()),
                    model: "claude-sonnet-4-5-20250929".to_string(),
                    cost_in: 3.0,
                    cost_out: 15.0,
                    api_key_env: Some("ANTHROPIC_API_KEY".to_string()),
                },
            ],
        }
    }
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".to_string(),
            base_url: ProviderKind::Anthropic.default_base_url().to_string(),
            version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl ModelEntry {
    pub fn label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.provider.display_name().to_string())
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    pub fn pricing(&self) -> Pricing {
        Pricing {
            cost_in: self.cost_in,
            cost_out: self.cost_out,
        }
    }

    /// Key for this entry. The provider's conventional variable is served from
    /// the command line (which already falls back to the environment); any
    /// other variable is read directly.
    pub fn api_key(&self, keys: &ApiKeys) -> Option<String> {
        let var = self.api_key_env.as_deref()?;
        if var == self.provider.default_key_env() {
            return keys.for_provider(self.provider);
        }
        std::env::var(var).ok().filter(|k| !k.is_empty())
    }
}

/// Keys supplied on the command line or through their conventional variables.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
}

impl ApiKeys {
    pub fn for_provider(&self, provider: ProviderKind) -> Option<String> {
        let key = match provider {
            ProviderKind::Anthropic => &self.anthropic,
            ProviderKind::OpenAi => &self.openai,
        };
        key.clone().filter(|k| !k.is_empty())
    }
}

/// Command-line values that take precedence over the settings file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub max_tokens: Option<u32>,
    pub system: Option<String>,
    pub format: Option<String>,
    pub stop: Option<String>,
}

impl Settings {
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(max_tokens) = overrides.max_tokens {
            self.max_tokens = max_tokens;
        }
        if overrides.system.is_some() {
            self.system = overrides.system;
        }
        if overrides.format.is_some() {
            self.format = overrides.format;
        }
        if overrides.stop.is_some() {
            self.stop = overrides.stop;
        }
    }

    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            max_tokens: self.max_tokens,
            system: self.system.clone(),
            format: self.format.clone(),
            stop: self.stop.clone(),
        }
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

/// Load settings from `explicit` if given, otherwise from the user config
/// file, seeding it with defaults on first run.
pub fn load(explicit: Option<&Path>) -> Result<Settings> {
    match explicit {
        Some(path) => load_from(path),
        None => load_or_seed(&user_config_path()),
    }
}

pub fn load_from(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings from {}", path.display()))?;
    let settings = toml::from_str(&content)
        .with_context(|| format!("invalid settings file {}", path.display()))?;
    info!(path = %path.display(), "settings loaded");
    Ok(settings)
}

pub fn load_or_seed(path: &Path) -> Result<Settings> {
    if path.exists() {
        return load_from(path);
    }

    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::write(path, DEFAULT_SETTINGS) {
        Ok(()) => info!(path = %path.display(), "wrote default settings"),
        Err(e) => debug!(error = %e, "could not seed settings file"),
    }
    Ok(Settings::default())
}

/// Get the path to the user's settings file
pub fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("promptgrid")
        .join("config.toml")
}
