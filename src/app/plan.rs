//! What each panel runs: a producer plus a short script of prompts.

use crate::api::{
    AnthropicProducer, ChatRequest, FragmentSink, OpenAiProducer, Producer, StreamEnd,
    StreamOutcome,
};
use crate::config::{ApiKeys, ModelEntry, Settings};
use crate::models::{ComparisonMode, PanelSpec, Pricing, ProviderKind, TokenUsage};
use crate::tui::layout::LayoutKind;
use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const STEP_BY_STEP: &str = "Solve the task step by step:\n\n";
const META_PROMPT: &str =
    "Write an optimal prompt for solving this task precisely. Return only the prompt, with no explanations:\n\n";
const EXPERT_PANEL: &str = "You are a panel of three experts solving a task together:\n\
    - Analyst: relies on probability theory and formal reasoning\n\
    - Mathematician: performs exact calculations\n\
    - Critic: checks assumptions and verifies the answer\n\n\
    Each expert briefly states their view, then the panel agrees on a single answer.\n\n\
    Task: ";

pub const STEP_ONE_MARKER: &str = "[Step 1] Writing an optimal prompt...";
pub const STEP_TWO_MARKER: &str = "[Step 2] Using the generated prompt...";

#[derive(Debug, Clone, PartialEq)]
pub enum LaneScript {
    /// Send one prompt, optionally echoing it into the panel first
    Single {
        prompt: String,
        temperature: Option<f64>,
        echo: bool,
    },
    /// Ask for an optimised prompt, then send whatever came back
    MetaPrompt { meta_prompt: String },
}

/// One panel's worth of work.
pub struct Lane {
    pub spec: PanelSpec,
    /// Provider column of the summary table
    pub provider_label: String,
    pub pricing: Pricing,
    pub producer: Arc<dyn Producer>,
    pub script: LaneScript,
}

/// What a lane produced. Lanes that failed have no report.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneReport {
    pub text: String,
    pub usage: TokenUsage,
    pub duration: Duration,
    pub cancelled: bool,
}

impl LaneReport {
    /// Fold a follow-up request into this one; the later text wins.
    fn then(self, next: LaneReport) -> LaneReport {
        LaneReport {
            text: next.text,
            usage: self.usage.merged(next.usage),
            duration: self.duration + next.duration,
            cancelled: next.cancelled,
        }
    }
}

impl Lane {
    pub fn new(
        spec: PanelSpec,
        provider_label: impl Into<String>,
        pricing: Pricing,
        producer: Arc<dyn Producer>,
        script: LaneScript,
    ) -> Self {
        Self {
            spec,
            provider_label: provider_label.into(),
            pricing,
            producer,
            script,
        }
    }

    /// Run the script, streaming into `sink`. Failures are reported into the
    /// sink and yield `None`.
    pub async fn run(
        &self,
        sink: &dyn FragmentSink,
        cancel: &CancellationToken,
    ) -> Option<LaneReport> {
        match &self.script {
            LaneScript::Single {
                prompt,
                temperature,
                echo,
            } => {
                if *echo {
                    sink.push(&format!("[Prompt]\n{}\n\n", prompt));
                }
                let request = match temperature {
                    Some(t) => ChatRequest::user(prompt.as_str()).with_temperature(*t),
                    None => ChatRequest::user(prompt.as_str()),
                };
                let outcome = self.producer.stream(&request, sink, cancel).await;
                settle(outcome, sink)
            }
            LaneScript::MetaPrompt { meta_prompt } => {
                sink.push(&format!("[Prompt]\n{}\n\n{}\n\n", meta_prompt, STEP_ONE_MARKER));
                let first = self
                    .producer
                    .stream(&ChatRequest::user(meta_prompt.as_str()), sink, cancel)
                    .await;
                let first = settle(first, sink)?;
                if first.cancelled || first.text.is_empty() || cancel.is_cancelled() {
                    return Some(first);
                }

                sink.push(&format!("\n\n{}\n\n", STEP_TWO_MARKER));
                let second = self
                    .producer
                    .stream(&ChatRequest::user(first.text.as_str()), sink, cancel)
                    .await;
                let second = settle(second, sink)?;
                Some(first.then(second))
            }
        }
    }
}

fn settle(outcome: StreamOutcome, sink: &dyn FragmentSink) -> Option<LaneReport> {
    let cancelled = match outcome.end {
        StreamEnd::Completed => false,
        StreamEnd::Cancelled => true,
        StreamEnd::Failed(e) => {
            warn!(error = %e, "producer failed");
            sink.push(&e.panel_notice());
            return None;
        }
    };
    Some(LaneReport {
        text: outcome.text,
        usage: outcome.usage,
        duration: outcome.duration,
        cancelled,
    })
}

/// Four prompting strategies against one producer.
pub fn strategy_lanes(question: &str, producer: Arc<dyn Producer>) -> Vec<Lane> {
    let provider = producer.provider().display_name();
    let single = |prompt: String| LaneScript::Single {
        prompt,
        temperature: None,
        echo: true,
    };
    let scripts = [
        ("1. Direct", single(question.to_string())),
        ("2. Step-by-step", single(format!("{}{}", STEP_BY_STEP, question))),
        (
            "3. Meta-prompting",
            LaneScript::MetaPrompt {
                meta_prompt: format!("{}{}", META_PROMPT, question),
            },
        ),
        ("4. Expert panel", single(format!("{}{}", EXPERT_PANEL, question))),
    ];

    let specs = PanelSpec::from_titles(scripts.iter().map(|(title, _)| *title));
    specs
        .into_iter()
        .zip(scripts)
        .map(|(spec, (_, script))| {
            Lane::new(spec, provider, Pricing::default(), producer.clone(), script)
        })
        .collect()
}

/// The same question at each temperature.
pub fn temperature_lanes(question: &str, temperatures: &[f64], producer: Arc<dyn Producer>) -> Vec<Lane> {
    let provider = producer.provider().display_name();
    let specs = PanelSpec::from_titles(temperatures.iter().map(|t| format!("temp={}", t)));
    specs
        .into_iter()
        .zip(temperatures)
        .map(|(spec, t)| {
            let script = LaneScript::Single {
                prompt: question.to_string(),
                temperature: Some(*t),
                echo: false,
            };
            Lane::new(spec, provider, Pricing::default(), producer.clone(), script)
        })
        .collect()
}

/// The same question to each roster entry, paired with its producer.
pub fn model_lanes(
    question: &str,
    roster: &[(ModelEntry, Arc<dyn Producer>)],
) -> Vec<Lane> {
    let specs = PanelSpec::from_titles(roster.iter().map(|(entry, _)| entry.name.clone()));
    specs
        .into_iter()
        .zip(roster)
        .map(|(spec, (entry, producer))| {
            let script = LaneScript::Single {
                prompt: question.to_string(),
                temperature: None,
                echo: false,
            };
            Lane::new(spec, entry.label(), entry.pricing(), producer.clone(), script)
        })
        .collect()
}

/// Build the lanes for `mode` with real network producers.
pub fn build_lanes(
    mode: ComparisonMode,
    question: &str,
    settings: &Settings,
    keys: &ApiKeys,
) -> Result<Vec<Lane>> {
    let client = reqwest::Client::new();
    let options = settings.request_options();

    let anthropic = || -> Result<Arc<dyn Producer>> {
        let Some(key) = keys.for_provider(ProviderKind::Anthropic) else {
            bail!(
                "{} is not set (or pass --anthropic-key)",
                ProviderKind::Anthropic.default_key_env()
            );
        };
        let producer = AnthropicProducer::new(
            client.clone(),
            settings.anthropic.base_url.clone(),
            Some(key),
            settings.anthropic.model.clone(),
            options.clone(),
        )
        .with_version(settings.anthropic.version.clone());
        Ok(Arc::new(producer))
    };

    let lanes = match mode {
        ComparisonMode::Strategies => strategy_lanes(question, anthropic()?),
        ComparisonMode::Temperature => {
            check_panel_count("temperatures", settings.temperatures.len())?;
            temperature_lanes(question, &settings.temperatures, anthropic()?)
        }
        ComparisonMode::Models => {
            check_panel_count("models", settings.models.len())?;
            let roster: Vec<(ModelEntry, Arc<dyn Producer>)> = settings
                .models
                .iter()
                .map(|entry| {
                    let key = entry.api_key(keys);
                    let producer: Arc<dyn Producer> = match entry.provider {
                        ProviderKind::Anthropic => Arc::new(AnthropicProducer::new(
                            client.clone(),
                            entry.base_url(),
                            key,
                            entry.model.clone(),
                            options.clone(),
                        )),
                        ProviderKind::OpenAi => Arc::new(OpenAiProducer::new(
                            client.clone(),
                            entry.base_url(),
                            key,
                            entry.model.clone(),
                            options.clone(),
                        )),
                    };
                    (entry.clone(), producer)
                })
                .collect();
            model_lanes(question, &roster)
        }
    };
    Ok(lanes)
}

fn check_panel_count(what: &str, count: usize) -> Result<()> {
    if let Err(e) = LayoutKind::for_panel_count(count) {
        bail!("{} in settings: {}", what, e);
    }
    Ok(())
}
