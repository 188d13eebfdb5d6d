use super::{
    run_stream, ChatRequest, EventDecoder, FragmentSink, Producer, ProducerError, RequestOptions,
    StreamOutcome,
};
use crate::models::{ProviderKind, TokenUsage};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Streams from the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicProducer {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    version: String,
    options: RequestOptions,
}

impl AnthropicProducer {
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
            version: DEFAULT_API_VERSION.to_string(),
            options,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.options.max_tokens,
            "messages": request.messages,
            "stream": true,
        });
        if let Some(system) = self.options.system_prompt() {
            body["system"] = json!(system);
        }
        if let Some(stop) = self.options.stop_sequence() {
            body["stop_sequences"] = json!([stop]);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    pub fn build_request(&self, api_key: &str, request: &ChatRequest) -> RequestBuilder {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        self.client
            .post(url)
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.version)
            .header("content-type", "application/json")
            .json(&self.body(request))
    }
}

#[async_trait]
impl Producer for AnthropicProducer {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        sink: &dyn FragmentSink,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return StreamOutcome::failed(ProducerError::Config(format!(
                "no API key, set {}",
                ProviderKind::Anthropic.default_key_env()
            )));
        };
        debug!(model = %self.model, "anthropic stream starting");
        let builder = self.build_request(api_key, request);
        run_stream(builder, MessagesDecoder::default(), sink, cancel).await
    }
}

/// Decodes `message_start`, `content_block_delta` and `message_delta` events.
#[derive(Debug, Default)]
pub(crate) struct MessagesDecoder {
    usage: TokenUsage,
}

impl EventDecoder for MessagesDecoder {
    fn decode(&mut self, payload: &str) -> Option<String> {
        let event: Value = serde_json::from_str(payload).ok()?;
        match event.get("type")?.as_str()? {
            "message_start" => {
                if let Some(n) = event
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64)
                {
                    self.usage.input_tokens = n;
                }
                None
            }
            "content_block_delta" => {
                let delta = event.get("delta")?;
                if delta.get("type")?.as_str()? != "text_delta" {
                    return None;
                }
                delta.get("text")?.as_str().map(str::to_string)
            }
            "message_delta" => {
                if let Some(n) = event.pointer("/usage/output_tokens").and_then(Value::as_u64) {
                    self.usage.output_tokens = n;
                }
                None
            }
            _ => None,
        }
    }

    fn usage(&self, _text: &str) -> TokenUsage {
        self.usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::RecordingSink;
    use crate::api::{pump, StreamEnd};
    use futures::stream;

    fn producer(options: RequestOptions) -> AnthropicProducer {
        AnthropicProducer::new(
            Client::new(),
            "https://api.anthropic.com/",
            Some("sk-test".to_string()),
            "claude-sonnet-4-5-20250929",
            options,
        )
    }

    #[test]
    fn test_request_shape() {
        let options = RequestOptions {
            max_tokens: 1024,
            system: Some("Be terse.".to_string()),
            format: None,
            stop: Some("###".to_string()),
        };
        let request = producer(options)
            .build_request("sk-test", &ChatRequest::user("2+2?").with_temperature(0.7))
            .build()
            .unwrap();

        assert_eq!(request.url().as_str(), "https://api.anthropic.com/v1/messages");
        assert_eq!(request.headers()["x-api-key"], "sk-test");
        assert_eq!(request.headers()["anthropic-version"], "2023-06-01");

        let body: Value =
            serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body["model"], "claude-sonnet-4-5-20250929");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "2+2?");
        assert_eq!(body["stop_sequences"][0], "###");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(
            body["system"],
            "Be terse.\nAlways end your response with: ###"
        );
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let body = producer(RequestOptions {
            max_tokens: 10,
            ..Default::default()
        })
        .body(&ChatRequest::user("hi"));
        assert!(body.get("system").is_none());
        assert!(body.get("stop_sequences").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_decoder_reads_text_and_usage() {
        let mut decoder = MessagesDecoder::default();
        assert_eq!(
            decoder.decode(r#"{"type":"message_start","message":{"usage":{"input_tokens":14}}}"#),
            None
        );
        assert_eq!(
            decoder.decode(
                r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"Four"}}"#
            ),
            Some("Four".to_string())
        );
        assert_eq!(
            decoder.decode(
                r#"{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"{"}}"#
            ),
            None
        );
        decoder.decode(r#"{"type":"message_delta","usage":{"output_tokens":3}}"#);
        assert_eq!(decoder.decode("not json"), None);

        assert_eq!(
            decoder.usage("Four"),
            TokenUsage {
                input_tokens: 14,
                output_tokens: 3
            }
        );
    }

    #[tokio::test]
    async fn test_full_event_stream() {
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":5}}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "data: {broken\n\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
            "data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":2}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let (a, b) = body.split_at(90);
        let chunks = stream::iter(vec![
            Ok::<_, std::io::Error>(a.as_bytes().to_vec()),
            Ok(b.as_bytes().to_vec()),
        ]);

        let sink = RecordingSink::default();
        let mut decoder = MessagesDecoder::default();
        let mut text = String::new();
        pump(chunks, &mut decoder, &mut text, &sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(text, "Hello");
        assert_eq!(sink.joined(), "Hello");
        assert_eq!(decoder.usage(&text).input_tokens, 5);
        assert_eq!(decoder.usage(&text).output_tokens, 2);
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let producer = AnthropicProducer::new(
            Client::new(),
            "http://127.0.0.1:9",
            None,
            "m",
            RequestOptions::default(),
        );
        let sink = RecordingSink::default();
        let outcome = producer
            .stream(&ChatRequest::user("q"), &sink, &CancellationToken::new())
            .await;
        match outcome.end {
            StreamEnd::Failed(ProducerError::Config(msg)) => {
                assert!(msg.contains("ANTHROPIC_API_KEY"))
            }
            other => panic!("unexpected end {:?}", other),
        }
    }
}
