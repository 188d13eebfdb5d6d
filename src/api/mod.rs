//! Streaming text producers.
//!
//! A producer turns one chat request into an ordered sequence of text
//! fragments pushed into a [`FragmentSink`], and finishes with the
//! accumulated text plus how the stream ended. Cancellation is observed
//! between network reads; dropping the in-flight future closes the
//! connection.

pub mod anthropic;
pub mod openai;
pub mod sse;

pub use anthropic::AnthropicProducer;
pub use openai::OpenAiProducer;

use crate::models::{ProviderKind, TokenUsage};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::RequestBuilder;
use serde::Serialize;
use sse::{SseData, SseLineDecoder};
use std::fmt::Display;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Longest slice of an error response body kept in [`ProducerError::Status`]
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("stream read failed: {0}")]
    Stream(String),
    #[error("{0}")]
    Config(String),
}

impl ProducerError {
    /// Short notice written into the failing lane's panel
    pub fn panel_notice(&self) -> String {
        match self {
            ProducerError::Status { status, .. } => format!("API error ({})", status),
            other => format!("Error: {}", other),
        }
    }
}

/// Where fragments go as they arrive.
pub trait FragmentSink: Send + Sync {
    fn push(&self, fragment: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Settings shared by every request a producer sends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub max_tokens: u32,
    pub system: Option<String>,
    pub format: Option<String>,
    pub stop: Option<String>,
}

impl RequestOptions {
    /// System text plus the format and stop instructions, one per line.
    pub fn system_prompt(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(system) = non_empty(&self.system) {
            parts.push(system.to_string());
        }
        if let Some(format) = non_empty(&self.format) {
            parts.push(format!("Always respond in this format: {}", format));
        }
        if let Some(stop) = non_empty(&self.stop) {
            parts.push(format!("Always end your response with: {}", stop));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    pub fn stop_sequence(&self) -> Option<&str> {
        non_empty(&self.stop)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub temperature: Option<f64>,
}

impl ChatRequest {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(content)],
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug)]
pub enum StreamEnd {
    Completed,
    Cancelled,
    Failed(ProducerError),
}

#[derive(Debug)]
pub struct StreamOutcome {
    pub text: String,
    pub usage: TokenUsage,
    pub duration: Duration,
    pub end: StreamEnd,
}

impl StreamOutcome {
    /// Outcome for a request that never left the process
    pub fn failed(error: ProducerError) -> Self {
        Self {
            text: String::new(),
            usage: TokenUsage::default(),
            duration: Duration::ZERO,
            end: StreamEnd::Failed(error),
        }
    }
}

#[async_trait]
pub trait Producer: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Stream one request into `sink` until it ends or `cancel` fires.
    async fn stream(
        &self,
        request: &ChatRequest,
        sink: &dyn FragmentSink,
        cancel: &CancellationToken,
    ) -> StreamOutcome;
}

/// Provider-specific interpretation of SSE `data:` payloads.
pub(crate) trait EventDecoder: Send {
    /// Text carried by one payload, if any. Payloads that do not parse are
    /// ignored.
    fn decode(&mut self, payload: &str) -> Option<String>;

    /// Token usage for the stream so far, given the accumulated text
    fn usage(&self, text: &str) -> TokenUsage;
}

/// Send `request` and pump its SSE body through `decoder`.
pub(crate) async fn run_stream<D: EventDecoder>(
    request: RequestBuilder,
    mut decoder: D,
    sink: &dyn FragmentSink,
    cancel: &CancellationToken,
) -> StreamOutcome {
    let start = Instant::now();
    let mut text = String::new();
    let result = send_and_pump(request, &mut decoder, &mut text, sink, cancel).await;
    finish(result, decoder, text, start.elapsed(), cancel)
}

fn finish<D: EventDecoder>(
    result: Result<(), ProducerError>,
    decoder: D,
    text: String,
    duration: Duration,
    cancel: &CancellationToken,
) -> StreamOutcome {
    let end = match result {
        _ if cancel.is_cancelled() => StreamEnd::Cancelled,
        Ok(()) => StreamEnd::Completed,
        Err(e) => StreamEnd::Failed(e),
    };
    StreamOutcome {
        usage: decoder.usage(&text),
        text,
        duration,
        end,
    }
}

async fn send_and_pump<D: EventDecoder>(
    request: RequestBuilder,
    decoder: &mut D,
    text: &mut String,
    sink: &dyn FragmentSink,
    cancel: &CancellationToken,
) -> Result<(), ProducerError> {
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(()),
        response = request.send() => response?,
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProducerError::Status {
            status: status.as_u16(),
            body: body.chars().take(ERROR_BODY_LIMIT).collect(),
        });
    }

    pump(response.bytes_stream(), decoder, text, sink, cancel).await
}

/// Feed a raw byte stream through the line decoder until `[DONE]`, end of
/// body or cancellation.
pub(crate) async fn pump<S, B, E, D>(
    mut bytes: S,
    decoder: &mut D,
    text: &mut String,
    sink: &dyn FragmentSink,
    cancel: &CancellationToken,
) -> Result<(), ProducerError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
    D: EventDecoder,
{
    let mut lines = SseLineDecoder::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("stream cancelled between reads");
                return Ok(());
            }
            next = bytes.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(|e| ProducerError::Stream(e.to_string()))?;

        for data in lines.feed(chunk.as_ref()) {
            match data {
                SseData::Done => return Ok(()),
                SseData::Payload(payload) => emit(decoder, &payload, text, sink),
            }
        }
    }

    if let Some(SseData::Payload(payload)) = lines.finish() {
        emit(decoder, &payload, text, sink);
    }
    Ok(())
}

fn emit<D: EventDecoder>(decoder: &mut D, payload: &str, text: &mut String, sink: &dyn FragmentSink) {
    if let Some(fragment) = decoder.decode(payload) {
        if fragment.is_empty() {
            return;
        }
        sink.push(&fragment);
        text.push_str(&fragment);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use futures::stream;

    /// Treats every payload as literal text and counts characters.
    #[derive(Default)]
    struct EchoDecoder;

    impl EventDecoder for EchoDecoder {
        fn decode(&mut self, payload: &str) -> Option<String> {
            if payload.starts_with('{') {
                return None;
            }
            Some(payload.to_string())
        }

        fn usage(&self, text: &str) -> TokenUsage {
            TokenUsage {
                input_tokens: 0,
                output_tokens: text.len() as u64,
            }
        }
    }

    fn chunks(parts: &[&str]) -> Vec<Result<Vec<u8>, std::io::Error>> {
        parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect()
    }

    // ==================== Options Tests ====================

    #[test]
    fn test_system_prompt_joins_parts() {
        let options = RequestOptions {
            max_tokens: 10,
            system: Some("Be brief.".to_string()),
            format: Some("JSON".to_string()),
            stop: Some("END".to_string()),
        };
        assert_eq!(
            options.system_prompt().unwrap(),
            "Be brief.\nAlways respond in this format: JSON\nAlways end your response with: END"
        );
        assert_eq!(options.stop_sequence(), Some("END"));
    }

    #[test]
    fn test_empty_options_have_no_system_prompt() {
        let options = RequestOptions {
            system: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(options.system_prompt(), None);
        assert_eq!(options.stop_sequence(), None);
    }

    #[test]
    fn test_panel_notice_wording() {
        let status = ProducerError::Status {
            status: 401,
            body: "bad key".to_string(),
        };
        assert_eq!(status.panel_notice(), "API error (401)");
        let stream = ProducerError::Stream("reset".to_string());
        assert_eq!(stream.panel_notice(), "Error: stream read failed: reset");
    }

    // ==================== Pump Tests ====================

    #[tokio::test]
    async fn test_pump_pushes_fragments_in_order() {
        let sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        let mut text = String::new();
        let body = stream::iter(chunks(&["data: he", "llo\ndata: {bad}\n", "data:  world\n\n"]));

        pump(body, &mut EchoDecoder, &mut text, &sink, &cancel)
            .await
            .unwrap();

        assert_eq!(text, "hello world");
        assert_eq!(*sink.fragments.lock().unwrap(), vec!["hello", " world"]);
    }

    #[tokio::test]
    async fn test_pump_stops_at_done() {
        let sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        let mut text = String::new();
        let body = stream::iter(chunks(&["data: a\ndata: [DONE]\ndata: b\n"]));

        pump(body, &mut EchoDecoder, &mut text, &sink, &cancel)
            .await
            .unwrap();
        assert_eq!(text, "a");
    }

    #[tokio::test]
    async fn test_pump_flushes_unterminated_last_line() {
        let sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        let mut text = String::new();
        let body = stream::iter(chunks(&["data: x\ndata: tail"]));

        pump(body, &mut EchoDecoder, &mut text, &sink, &cancel)
            .await
            .unwrap();
        assert_eq!(sink.joined(), "xtail");
    }

    #[tokio::test]
    async fn test_pump_reports_read_errors() {
        let sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        let mut text = String::new();
        let body = stream::iter(vec![
            Ok(b"data: partial\n".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);

        let err = pump(body, &mut EchoDecoder, &mut text, &sink, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ProducerError::Stream(_)));
        assert_eq!(text, "partial");
    }

    #[tokio::test]
    async fn test_pump_returns_when_cancelled_on_a_silent_stream() {
        let sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        let mut text = String::new();
        let body = stream::iter(chunks(&["data: before\n"]))
            .chain(stream::pending::<Result<Vec<u8>, std::io::Error>>());

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        tokio::time::timeout(
            Duration::from_secs(2),
            pump(body, &mut EchoDecoder, &mut text, &sink, &cancel),
        )
        .await
        .expect("pump must observe cancellation")
        .unwrap();
        assert_eq!(text, "before");
    }

    #[test]
    fn test_finish_prefers_cancelled_over_errors() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = finish(
            Err(ProducerError::Stream("closed".to_string())),
            EchoDecoder,
            "abc".to_string(),
            Duration::from_millis(5),
            &cancel,
        );
        assert!(matches!(outcome.end, StreamEnd::Cancelled));
        assert_eq!(outcome.usage.output_tokens, 3);
    }
}
