use super::navigation::{navigate, navigation_status};
use super::orchestrator;
use super::plan::Lane;
use crate::models::{ComparisonMode, LaneMetrics, Pricing};
use crate::tui::geometry::TerminalSize;
use crate::tui::summary::render_summary;
use crate::tui::Screen;
use anyhow::Result;
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Everything one comparison needs before the screen opens.
pub struct Session {
    pub mode: ComparisonMode,
    pub question: String,
    pub lanes: Vec<Lane>,
    /// How long cancelled lanes may keep running before they are aborted
    pub grace: Duration,
}

#[derive(Debug)]
pub struct SessionReport {
    pub cancelled: bool,
    /// Per-panel metrics; `None` for lanes that failed
    pub metrics: Vec<Option<LaneMetrics>>,
}

/// Run one comparison from first draw to teardown.
///
/// `interrupts` is called once per phase that listens for Ctrl+C: streaming
/// and navigation.
pub async fn compare<R, F, Fut>(
    session: Session,
    size: TerminalSize,
    out: Box<dyn Write + Send>,
    input: &mut R,
    interrupts: F,
) -> Result<SessionReport>
where
    R: AsyncBufRead + Unpin,
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let run_id = Uuid::new_v4();
    let span = info_span!("session", %run_id, mode = ?session.mode);
    run_session(session, size, out, input, interrupts)
        .instrument(span)
        .await
}

async fn run_session<R, F, Fut>(
    session: Session,
    size: TerminalSize,
    out: Box<dyn Write + Send>,
    input: &mut R,
    interrupts: F,
) -> Result<SessionReport>
where
    R: AsyncBufRead + Unpin,
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let Session {
        mode,
        question,
        lanes,
        grace,
    } = session;
    let panels = lanes.len();
    let labels: Vec<(String, String, Pricing)> = lanes
        .iter()
        .map(|l| (l.spec.title.clone(), l.provider_label.clone(), l.pricing))
        .collect();

    let screen = Screen::new(size, lanes.iter().map(|l| l.spec.clone()).collect(), question, out)?;
    screen.draw(&mode.streaming_status(panels))?;
    info!(panels, "streaming");

    let outcome = orchestrator::run(lanes, &screen, CancellationToken::new(), interrupts(), grace).await;

    info!(cancelled = outcome.cancelled, "navigating");
    let status = navigation_status(panels, outcome.cancelled, mode.shows_summary());
    let navigation = navigate(&screen, input, &status, interrupts()).await;

    if let Err(e) = screen.teardown() {
        warn!(error = %e, "teardown failed");
    }
    navigation?;

    let metrics: Vec<Option<LaneMetrics>> = outcome
        .results
        .into_iter()
        .zip(labels)
        .map(|(report, (name, provider, pricing))| {
            report.map(|r| LaneMetrics {
                name,
                provider,
                duration: r.duration,
                usage: r.usage,
                pricing,
                cancelled: r.cancelled,
            })
        })
        .collect();

    if mode.shows_summary() {
        screen.show_summary(&render_summary(metrics.iter().map(Option::as_ref)))?;
    }
    info!("session finished");

    Ok(SessionReport {
        cancelled: outcome.cancelled,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ChatRequest, FragmentSink, Producer, StreamEnd, StreamOutcome};
    use crate::app::plan::{model_lanes, strategy_lanes};
    use crate::config::Settings;
    use crate::models::{ProviderKind, TokenUsage};
    use crate::tui::screen::SharedBuffer;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Answers instantly with a fixed reply.
    struct Canned(&'static str);

    #[async_trait]
    impl Producer for Canned {
        fn provider(&self) -> ProviderKind {
            ProviderKind::Anthropic
        }

        async fn stream(
            &self,
            _request: &ChatRequest,
            sink: &dyn FragmentSink,
            _cancel: &CancellationToken,
        ) -> StreamOutcome {
            sink.push(self.0);
            StreamOutcome {
                text: self.0.to_string(),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 20,
                },
                duration: Duration::from_millis(1500),
                end: StreamEnd::Completed,
            }
        }
    }

    fn never() -> impl Future<Output = ()> + Send + 'static {
        std::future::pending()
    }

    #[tokio::test]
    async fn test_strategies_session_round_trip() {
        let buffer = SharedBuffer::default();
        let session = Session {
            mode: ComparisonMode::Strategies,
            question: "what is 2+2?".to_string(),
            lanes: strategy_lanes("what is 2+2?", Arc::new(Canned("4"))),
            grace: Duration::from_millis(100),
        };
        let mut input: &[u8] = b"3\n\n\n";

        let report = compare(
            session,
            TerminalSize::clamped(120, 40),
            Box::new(buffer.clone()),
            &mut input,
            never,
        )
        .await
        .unwrap();

        assert!(!report.cancelled);
        assert_eq!(report.metrics.len(), 4);
        assert!(report.metrics.iter().all(Option::is_some));

        let out = buffer.contents();
        assert!(out.contains("Streaming... (Ctrl+C to cancel)"));
        assert!(out.contains("Done! Enter 1-4 to view a panel, Enter to exit."));
        assert!(out.contains("[Step 2]"));
        assert!(!out.contains("Tokens I/O"));
        assert!(out.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_models_session_prints_summary() {
        let settings = Settings::default();
        let roster: Vec<_> = settings
            .models
            .iter()
            .map(|e| (e.clone(), Arc::new(Canned("hi")) as Arc<dyn Producer>))
            .collect();
        let buffer = SharedBuffer::default();
        let session = Session {
            mode: ComparisonMode::Models,
            question: "hello?".to_string(),
            lanes: model_lanes("hello?", &roster),
            grace: Duration::from_millis(100),
        };
        let mut input: &[u8] = b"";

        let report = compare(
            session,
            TerminalSize::clamped(100, 30),
            Box::new(buffer.clone()),
            &mut input,
            never,
        )
        .await
        .unwrap();

        let gpt = report.metrics[1].as_ref().unwrap();
        assert_eq!(gpt.name, "GPT-4o-mini");
        assert_eq!(gpt.provider, "OpenAI");
        assert_eq!(gpt.usage.output_tokens, 20);

        let out = buffer.contents();
        assert!(out.contains("Streaming from 3 models... (Ctrl+C to cancel)"));
        assert!(out.contains("Enter to see comparison table."));
        assert!(out.contains("Question: hello?\n"));
        assert!(out.contains("Tokens I/O"));
        assert!(out.contains("│ Claude Sonnet         │ 1.5s     │ 10/20      │ $0.000330   │ Anthropic │"));
    }
}
