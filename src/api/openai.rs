use super::{
    run_stream, ChatRequest, EventDecoder, FragmentSink, Message, Producer, RequestOptions,
    StreamOutcome,
};
use crate::models::{ProviderKind, TokenUsage};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Streams from any server speaking the OpenAI chat completions protocol,
/// including local model servers that take no key.
#[derive(Debug, Clone)]
pub struct OpenAiProducer {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    options: RequestOptions,
}

impl OpenAiProducer {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        options: RequestOptions,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            options,
        }
    }

    pub fn body(&self, request: &ChatRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = self.options.system_prompt() {
            messages.push(Message::system(system));
        }
        messages.extend(request.messages.iter().cloned());

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "max_tokens": self.options.max_tokens,
            "stream_options": { "include_usage": true },
        });
        if let Some(stop) = self.options.stop_sequence() {
            body["stop"] = json!([stop]);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    pub fn build_request(&self, request: &ChatRequest) -> RequestBuilder {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let mut builder = self
            .client
            .post(url)
            .header("content-type", "application/json");
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.bearer_auth(key);
        }
        builder.json(&self.body(request))
    }
}

#[async_trait]
impl Producer for OpenAiProducer {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        sink: &dyn FragmentSink,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        debug!(model = %self.model, base_url = %self.base_url, "chat completions stream starting");
        run_stream(self.build_request(request), CompletionsDecoder::default(), sink, cancel).await
    }
}

/// Decodes `choices[0].delta.content` chunks and the trailing usage chunk.
#[derive(Debug, Default)]
pub(crate) struct CompletionsDecoder {
    usage: Option<TokenUsage>,
}

impl EventDecoder for CompletionsDecoder {
    fn decode(&mut self, payload: &str) -> Option<String> {
        let event: Value = serde_json::from_str(payload).ok()?;

        if let Some(usage) = event.get("usage").filter(|u| u.is_object()) {
            let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or(0);
            self.usage = Some(TokenUsage {
                input_tokens: field("prompt_tokens"),
                output_tokens: field("completion_tokens"),
            });
        }

        event
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Servers that never report usage get an estimate of one output token
    /// per four bytes.
    fn usage(&self, text: &str) -> TokenUsage {
        let mut usage = self.usage.unwrap_or_default();
        if usage.output_tokens == 0 && !text.is_empty() {
            usage.output_tokens = (text.len() / 4) as u64;
        }
        usage
    }
}
