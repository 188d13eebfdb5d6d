//! Fan-out/fan-in over one comparison's lanes.
//!
//! Every lane gets its own task and its own panel. A watcher task turns the
//! first interrupt into the shared cancellation signal. Once the signal is
//! up, lanes get `grace` to wind down; stragglers are aborted, which drops
//! their HTTP futures and closes the connections.

use super::plan::{Lane, LaneReport};
use crate::api::FragmentSink;
use crate::tui::Screen;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

pub const CANCELLING_STATUS: &str = "Cancelling... waiting for streams to finish.";

/// Fragment sink bound to one panel of the screen.
pub struct PanelHandle {
    screen: Screen,
    index: usize,
}

impl PanelHandle {
    pub fn new(screen: Screen, index: usize) -> Self {
        Self { screen, index }
    }
}

impl FragmentSink for PanelHandle {
    fn push(&self, fragment: &str) {
        self.screen.write(self.index, fragment);
    }
}

#[derive(Debug, Default)]
struct Slot {
    report: Option<LaneReport>,
    /// Whether this lane has been counted by `Screen::mark_done`
    counted: bool,
}

type Slots = Arc<Mutex<Vec<Slot>>>;

fn lock(slots: &Slots) -> MutexGuard<'_, Vec<Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Count `index` as done unless it already was.
fn count_once(slots: &Slots, screen: &Screen, index: usize) {
    let first = {
        let mut slots = lock(slots);
        match slots.get_mut(index) {
            Some(slot) if !slot.counted => {
                slot.counted = true;
                true
            }
            _ => false,
        }
    };
    if first {
        screen.mark_done();
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    /// One entry per lane, in panel order. Failed or aborted lanes are `None`.
    pub results: Vec<Option<LaneReport>>,
    pub cancelled: bool,
}

/// Run every lane to completion (or cancellation) and collect the reports.
pub async fn run<I>(
    lanes: Vec<Lane>,
    screen: &Screen,
    cancel: CancellationToken,
    interrupt: I,
    grace: Duration,
) -> RunOutcome
where
    I: Future<Output = ()> + Send + 'static,
{
    let slots: Slots = Arc::new(Mutex::new(
        (0..lanes.len()).map(|_| Slot::default()).collect(),
    ));

    let watcher = spawn_interrupt_watcher(screen.clone(), cancel.clone(), interrupt);

    let handles: Vec<JoinHandle<()>> = lanes
        .into_iter()
        .enumerate()
        .map(|(index, lane)| {
            let span = info_span!("lane", index, title = %lane.spec.title);
            let screen = screen.clone();
            let cancel = cancel.clone();
            let slots = slots.clone();
            tokio::spawn(
                async move {
                    let sink = PanelHandle::new(screen.clone(), index);
                    let report = lane.run(&sink, &cancel).await;
                    debug!(ok = report.is_some(), "lane finished");
                    {
                        let mut slots = lock(&slots);
                        slots[index].report = report;
                    }
                    count_once(&slots, &screen, index);
                }
                .instrument(span),
            )
        })
        .collect();

    join_lanes(handles, &slots, screen, &cancel, grace).await;
    watcher.abort();

    let cancelled = cancel.is_cancelled();
    info!(cancelled, "all lanes returned");
    let results = lock(&slots).iter_mut().map(|s| s.report.take()).collect();
    RunOutcome { results, cancelled }
}

fn spawn_interrupt_watcher<I>(screen: Screen, cancel: CancellationToken, interrupt: I) -> JoinHandle<()>
where
    I: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt => {
                info!("interrupt received, cancelling streams");
                screen.set_status(CANCELLING_STATUS);
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    })
}

/// Wait for every lane. After cancellation the remaining lanes share one
/// deadline; any lane still running then is aborted and counted as done.
async fn join_lanes(
    handles: Vec<JoinHandle<()>>,
    slots: &Slots,
    screen: &Screen,
    cancel: &CancellationToken,
    grace: Duration,
) {
    let mut deadline: Option<Instant> = None;

    for (index, mut handle) in handles.into_iter().enumerate() {
        let joined = match deadline {
            Some(at) => tokio::time::timeout_at(at, &mut handle).await.ok(),
            None => tokio::select! {
                biased;
                joined = &mut handle => Some(joined),
                _ = cancel.cancelled() => {
                    let at = Instant::now() + grace;
                    deadline = Some(at);
                    tokio::time::timeout_at(at, &mut handle).await.ok()
                }
            },
        };

        match joined {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                warn!(index, error = %e, "lane task died");
                count_once(slots, screen, index);
            }
            None => {
                warn!(index, ?grace, "lane ignored cancellation, aborting");
                handle.abort();
                screen.write(index, "\n[aborted]");
                count_once(slots, screen, index);
            }
        }
    }
}
