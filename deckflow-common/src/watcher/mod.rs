//! Submission status watcher
//!
//! Guarantees that a client watching a submission eventually observes its
//! terminal status even when the push channel silently drops messages.
//!
//! **Transports:**
//! - Push: status events from the event bus or the SSE stream
//! - Poll: fixed-interval status query, bounded by `max_attempts`
//!
//! Both feed one [`StatusDispatcher`], which only invokes the callback when the
//! status differs from the last one seen and never after a terminal status.

pub mod transport;

pub use transport::{
    bus_event_stream, sse_event_stream, EventStream, HttpStatusSource, StatusSource,
};

use crate::api::{AnalysisStatus, StatusSnapshot};
use crate::config::WatcherConfig;
use crate::events::DeckEvent;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Which transport observed a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Push,
    Poll,
}

/// Status change delivered to the watcher callback
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub submission_id: Uuid,
    pub status: AnalysisStatus,
    pub company_id: Option<Uuid>,
    pub company_name: Option<String>,
    pub error: Option<String>,
    pub channel: Channel,
}

impl StatusUpdate {
    fn from_snapshot(snapshot: StatusSnapshot) -> Self {
        Self {
            submission_id: snapshot.submission_id,
            status: snapshot.status,
            company_id: snapshot.company_id,
            company_name: snapshot.result_summary.map(|s| s.company_name),
            error: snapshot.error,
            channel: Channel::Poll,
        }
    }

    fn from_event(event: DeckEvent) -> Option<Self> {
        match event {
            DeckEvent::SubmissionStatusChanged {
                submission_id,
                status,
                company_id,
                company_name,
                error,
                ..
            } => Some(Self {
                submission_id,
                status,
                company_id,
                company_name,
                error,
                channel: Channel::Push,
            }),
            _ => None,
        }
    }
}

/// Result of offering an update to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Callback invoked
    Delivered,
    /// Same status as last seen
    Unchanged,
    /// Behind the last status seen, e.g. a poll answered before a push
    Stale,
    /// A terminal status was already delivered
    AlreadyFinished,
}

#[derive(Debug, Default)]
struct DispatchState {
    last_seen: Option<AnalysisStatus>,
    finished: bool,
}

/// Deduplicating callback dispatcher shared by both transports
pub struct StatusDispatcher {
    states: Mutex<HashMap<Uuid, DispatchState>>,
    callback: Box<dyn Fn(StatusUpdate) + Send + Sync>,
}

impl StatusDispatcher {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(StatusUpdate) + Send + Sync + 'static,
    {
        Self {
            states: Mutex::new(HashMap::new()),
            callback: Box::new(callback),
        }
    }

    /// Record a status already known to the caller, without a callback
    pub fn seed(&self, submission_id: Uuid, status: AnalysisStatus) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let state = states.entry(submission_id).or_default();
        state.last_seen = Some(status);
        state.finished = status.is_terminal();
    }

    /// Offer an update from either transport
    ///
    /// The state is updated under the lock; the callback runs after it is
    /// released, so a callback may safely call back into the dispatcher.
    pub fn offer(&self, update: StatusUpdate) -> Delivery {
        {
            let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
            let state = states.entry(update.submission_id).or_default();

            if state.finished {
                return Delivery::AlreadyFinished;
            }
            if state.last_seen == Some(update.status) {
                return Delivery::Unchanged;
            }
            if state
                .last_seen
                .is_some_and(|seen| progress(update.status) < progress(seen))
            {
                return Delivery::Stale;
            }

            state.last_seen = Some(update.status);
            state.finished = update.status.is_terminal();
        }

        (self.callback)(update);
        Delivery::Delivered
    }

    pub fn is_finished(&self, submission_id: Uuid) -> bool {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.get(&submission_id).map(|s| s.finished).unwrap_or(false)
    }
}

/// Watcher pacing
#[derive(Debug, Clone, Copy)]
pub struct WatchConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_attempts: 300,
        }
    }
}

impl From<&WatcherConfig> for WatchConfig {
    fn from(config: &WatcherConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_attempts: config.max_poll_attempts,
        }
    }
}

/// How a watch ended
#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    /// Terminal status observed (and delivered to the callback)
    Terminal(StatusUpdate),
    /// Poll ceiling reached without a terminal status
    Exhausted { attempts: u32 },
    /// Stopped by the owner before a terminal status
    Stopped,
}

/// Handle to a running watch
///
/// Dropping the handle stops the watch and releases its timer and
/// subscription.
pub struct StatusWatcher {
    cancel: CancellationToken,
    handle: Option<JoinHandle<WatchOutcome>>,
}

impl StatusWatcher {
    /// Start watching `submission_id`
    ///
    /// * `initial` - status the caller already knows (no callback for it)
    /// * `push` - optional push stream; `None` runs on polling alone
    pub fn spawn<F>(
        submission_id: Uuid,
        initial: Option<AnalysisStatus>,
        config: WatchConfig,
        source: Arc<dyn StatusSource>,
        push: Option<EventStream>,
        callback: F,
    ) -> Self
    where
        F: Fn(StatusUpdate) + Send + Sync + 'static,
    {
        let dispatcher = Arc::new(StatusDispatcher::new(callback));
        if let Some(status) = initial {
            dispatcher.seed(submission_id, status);
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_watch(
            submission_id,
            config,
            source,
            push,
            dispatcher,
            cancel.clone(),
        ));

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop both transports
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for the watch to end
    pub async fn wait(mut self) -> WatchOutcome {
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or(WatchOutcome::Stopped),
            None => WatchOutcome::Stopped,
        }
    }
}

impl Drop for StatusWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_watch(
    submission_id: Uuid,
    config: WatchConfig,
    source: Arc<dyn StatusSource>,
    mut push: Option<EventStream>,
    dispatcher: Arc<StatusDispatcher>,
    cancel: CancellationToken,
) -> WatchOutcome {
    info!(submission_id = %submission_id, "Status watch started");

    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut attempts: u32 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(submission_id = %submission_id, "Status watch stopped");
                return WatchOutcome::Stopped;
            }

            next = next_push(&mut push) => {
                match next {
                    Some(event) => {
                        if event.submission_id() != Some(submission_id) {
                            continue;
                        }
                        if let Some(update) = StatusUpdate::from_event(event) {
                            if let Some(outcome) = deliver(&dispatcher, update) {
                                return outcome;
                            }
                        }
                    }
                    None => {
                        warn!(submission_id = %submission_id, "Push channel closed, continuing with polling only");
                        push = None;
                    }
                }
            }

            _ = ticker.tick() => {
                attempts += 1;
                match source.fetch_status(submission_id).await {
                    Ok(Some(snapshot)) => {
                        if let Some(outcome) = deliver(&dispatcher, StatusUpdate::from_snapshot(snapshot)) {
                            return outcome;
                        }
                    }
                    Ok(None) => {
                        warn!(submission_id = %submission_id, attempt = attempts, "Watched submission not found");
                    }
                    Err(e) => {
                        warn!(submission_id = %submission_id, attempt = attempts, error = %e, "Status poll failed");
                    }
                }

                if attempts >= config.max_attempts {
                    info!(submission_id = %submission_id, attempts, "Status watch reached poll ceiling");
                    return WatchOutcome::Exhausted { attempts };
                }
            }
        }
    }
}

/// Pending forever when there is no push stream, so `select!` ignores it
async fn next_push(push: &mut Option<EventStream>) -> Option<DeckEvent> {
    match push {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Position in `pending -> processing -> terminal`
fn progress(status: AnalysisStatus) -> u8 {
    match status {
        AnalysisStatus::Pending => 0,
        AnalysisStatus::Processing => 1,
        AnalysisStatus::Completed | AnalysisStatus::Failed => 2,
    }
}

fn deliver(dispatcher: &StatusDispatcher, update: StatusUpdate) -> Option<WatchOutcome> {
    let terminal = update.status.is_terminal();
    let channel = update.channel;
    let snapshot = update.clone();

    match dispatcher.offer(update) {
        Delivery::Delivered if terminal => {
            info!(
                submission_id = %snapshot.submission_id,
                status = %snapshot.status,
                ?channel,
                "Terminal status observed"
            );
            Some(WatchOutcome::Terminal(snapshot))
        }
        Delivery::AlreadyFinished => Some(WatchOutcome::Stopped),
        _ => None,
    }
}
