//! Caller-driven poll loop with generation-based cancellation.
//!
//! The orchestrator never polls on its own; a caller that wants to follow a
//! run calls `GET /runs` repeatedly. [`RunTracker`] hands out a fresh
//! [`GenerationToken`] whenever the caller starts a new run, and a
//! [`PollLoop`] bound to an older token stops at the next comparison.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use research_core::{GenerationToken, PollStatus, ProcessorTier, RunId};

use crate::error::ClientError;
use crate::http::{HttpClient, PollResponse};

/// Interval used when a response carries no `retryAfterSeconds` hint.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2500);

/// Longest stretch a waiting loop goes without re-checking its token.
const SUPERSEDE_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Anything that can perform one reconciliation pass for a run.
#[async_trait]
pub trait RunPoller: Send + Sync {
    async fn poll_run(
        &self,
        run_id: &RunId,
        wait_secs: Option<u64>,
        processor: Option<ProcessorTier>,
    ) -> Result<PollResponse, ClientError>;
}

#[async_trait]
impl RunPoller for HttpClient {
    async fn poll_run(
        &self,
        run_id: &RunId,
        wait_secs: Option<u64>,
        processor: Option<ProcessorTier>,
    ) -> Result<PollResponse, ClientError> {
        HttpClient::poll_run(self, run_id, wait_secs, processor).await
    }
}

/// Caller-owned generation counter.
#[derive(Debug, Default)]
pub struct RunTracker {
    current: AtomicU64,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new run. Every previously issued token becomes stale.
    pub fn begin_run(&self) -> GenerationToken {
        let previous = self.current.fetch_add(1, Ordering::SeqCst);
        GenerationToken::new(previous).next()
    }

    pub fn current(&self) -> GenerationToken {
        GenerationToken::new(self.current.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, token: GenerationToken) -> bool {
        self.current() == token
    }
}

/// How a poll loop ended.
#[derive(Debug)]
pub enum LoopOutcome {
    /// The run finished with a result.
    Completed(PollResponse),
    /// Upstream reported a definitive failure.
    Failed(PollResponse),
    /// The run was reported stuck and the loop was configured to stop there.
    Stuck(PollResponse),
    /// A newer run was started; this loop's result no longer matters.
    Superseded,
    /// The attempt bound was reached before the run settled.
    GaveUp {
        attempts: u32,
        last: Option<PollResponse>,
    },
    /// The orchestrator rejected the poll request itself.
    Rejected(ClientError),
}

/// Repeats poll calls until the run settles or the caller moves on.
#[derive(Debug, Clone)]
pub struct PollLoop {
    wait_secs: Option<u64>,
    processor: Option<ProcessorTier>,
    default_interval: Duration,
    max_attempts: Option<u32>,
    stop_on_stuck: bool,
}

impl Default for PollLoop {
    fn default() -> Self {
        Self {
            wait_secs: None,
            processor: None,
            default_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            stop_on_stuck: false,
        }
    }
}

impl PollLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result-fetch wait passed to the orchestrator on each call.
    pub fn with_wait_secs(mut self, wait_secs: u64) -> Self {
        self.wait_secs = Some(wait_secs);
        self
    }

    /// Tier hint used by the orchestrator's stuck detection.
    pub fn with_processor(mut self, processor: ProcessorTier) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Stop at the first `stuck` report instead of continuing to poll.
    pub fn stop_on_stuck(mut self, stop: bool) -> Self {
        self.stop_on_stuck = stop;
        self
    }

    /// Poll `run_id` under `token` until it settles.
    ///
    /// `on_update` sees every response that is still current, including
    /// `stuck` reports the loop keeps polling through.
    pub async fn run<P, F>(
        &self,
        poller: &P,
        tracker: &RunTracker,
        token: GenerationToken,
        run_id: &RunId,
        mut on_update: F,
    ) -> LoopOutcome
    where
        P: RunPoller + ?Sized,
        F: FnMut(&PollResponse),
    {
        let mut attempts = 0u32;
        let mut last = None;

        loop {
            if !tracker.is_current(token) {
                debug!(run_id = %run_id, generation = %token, "Poll loop superseded");
                return LoopOutcome::Superseded;
            }
            if let Some(max) = self.max_attempts {
                if attempts >= max {
                    warn!(run_id = %run_id, attempts, "Giving up on run");
                    return LoopOutcome::GaveUp { attempts, last };
                }
            }
            attempts += 1;

            let delay = match poller
                .poll_run(run_id, self.wait_secs, self.processor)
                .await
            {
                Ok(response) => {
                    // A newer run may have started while this call was in flight.
                    if !tracker.is_current(token) {
                        debug!(run_id = %run_id, generation = %token, "Dropping stale poll response");
                        return LoopOutcome::Superseded;
                    }
                    on_update(&response);

                    match response.status {
                        PollStatus::Completed => return LoopOutcome::Completed(response),
                        PollStatus::Error => return LoopOutcome::Failed(response),
                        PollStatus::Stuck => {
                            info!(
                                run_id = %run_id,
                                diagnostics = ?response.diagnostics,
                                "Run reported stuck"
                            );
                            if self.stop_on_stuck {
                                return LoopOutcome::Stuck(response);
                            }
                        }
                        PollStatus::Queued | PollStatus::Running => {}
                    }

                    let delay = response
                        .retry_after_seconds
                        .map(Duration::from_secs)
                        .unwrap_or(self.default_interval);
                    last = Some(response);
                    delay
                }
                Err(e) if e.is_retryable() => {
                    warn!(run_id = %run_id, error = %e, attempt = attempts, "Poll failed; retrying");
                    match e {
                        ClientError::Api {
                            retry_after_secs: Some(secs),
                            ..
                        } => Duration::from_secs(secs),
                        _ => self.default_interval,
                    }
                }
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "Poll rejected");
                    return LoopOutcome::Rejected(e);
                }
            };

            wait_while_current(tracker, token, delay).await;
        }
    }
}

/// Sleep for `delay`, returning early once `token` is no longer current.
async fn wait_while_current(tracker: &RunTracker, token: GenerationToken, delay: Duration) {
    let deadline = Instant::now() + delay;
    while tracker.is_current(token) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep((deadline - now).min(SUPERSEDE_CHECK_INTERVAL)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use std::sync::{Arc, Mutex};

    use research_core::PollDiagnostics;

    use crate::http::{RunOutput, RunResult};

    fn response(status: PollStatus, retry_after: Option<u64>) -> PollResponse {
        PollResponse {
            run_id: RunId::from("trun_1"),
            status,
            result: None,
            retry_after_seconds: retry_after,
            diagnostics: None,
            error: None,
        }
    }

    fn completed() -> PollResponse {
        PollResponse {
            result: Some(RunResult {
                output: RunOutput {
                    text: "done".to_string(),
                    basis: None,
                },
                citations: Vec::new(),
            }),
            ..response(PollStatus::Completed, None)
        }
    }

    fn stuck() -> PollResponse {
        PollResponse {
            diagnostics: Some(PollDiagnostics {
                elapsed_seconds: 400,
                estimate_seconds: 180,
            }),
            ..response(PollStatus::Stuck, Some(12))
        }
    }

    fn api_error(status: u16) -> ClientError {
        ClientError::Api {
            status,
            code: None,
            message: "boom".to_string(),
            retry_after_secs: None,
        }
    }

    struct ScriptedPoller {
        replies: Mutex<VecDeque<Result<PollResponse, ClientError>>>,
        calls: AtomicU32,
        /// Start a new run on the tracker during the given (1-based) call.
        supersede_on_call: Option<(u32, Arc<RunTracker>)>,
    }

    impl ScriptedPoller {
        fn new(replies: Vec<Result<PollResponse, ClientError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
                supersede_on_call: None,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RunPoller for ScriptedPoller {
        async fn poll_run(
            &self,
            _run_id: &RunId,
            _wait_secs: Option<u64>,
            _processor: Option<ProcessorTier>,
        ) -> Result<PollResponse, ClientError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((at, tracker)) = &self.supersede_on_call {
                if *at == call {
                    tracker.begin_run();
                }
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("poll script exhausted")
        }
    }

    #[test]
    fn test_begin_run_invalidates_earlier_tokens() {
        let tracker = RunTracker::new();
        let first = tracker.begin_run();
        assert!(tracker.is_current(first));

        let second = tracker.begin_run();
        assert!(second > first);
        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follows_retry_hints_until_completed() {
        let tracker = RunTracker::new();
        let token = tracker.begin_run();
        let poller = ScriptedPoller::new(vec![
            Ok(response(PollStatus::Queued, Some(10))),
            Ok(response(PollStatus::Running, None)),
            Ok(completed()),
        ]);

        let started = Instant::now();
        let mut seen = Vec::new();
        let outcome = PollLoop::new()
            .run(&poller, &tracker, token, &RunId::from("trun_1"), |r| {
                seen.push(r.status)
            })
            .await;

        assert!(matches!(outcome, LoopOutcome::Completed(ref r) if r.result.is_some()));
        assert_eq!(
            seen,
            vec![PollStatus::Queued, PollStatus::Running, PollStatus::Completed]
        );
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(12_500));
        assert!(elapsed < Duration::from_secs(13));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_is_terminal() {
        let tracker = RunTracker::new();
        let token = tracker.begin_run();
        let mut failed = response(PollStatus::Error, Some(5));
        failed.error = Some("upstream failure".to_string());
        let poller = ScriptedPoller::new(vec![Ok(failed)]);

        let outcome = PollLoop::new()
            .run(&poller, &tracker, token, &RunId::from("trun_1"), |_| {})
            .await;

        match outcome {
            LoopOutcome::Failed(r) => assert_eq!(r.error.as_deref(), Some("upstream failure")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(poller.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_token_never_polls() {
        let tracker = RunTracker::new();
        let stale = tracker.begin_run();
        tracker.begin_run();
        let poller = ScriptedPoller::new(Vec::new());

        let outcome = PollLoop::new()
            .run(&poller, &tracker, stale, &RunId::from("trun_1"), |_| {})
            .await;

        assert!(matches!(outcome, LoopOutcome::Superseded));
        assert_eq!(poller.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_run_mid_flight_drops_response() {
        let tracker = Arc::new(RunTracker::new());
        let token = tracker.begin_run();
        let mut poller = ScriptedPoller::new(vec![
            Ok(response(PollStatus::Queued, Some(5))),
            Ok(completed()),
        ]);
        poller.supersede_on_call = Some((2, tracker.clone()));

        let mut updates = 0;
        let outcome = PollLoop::new()
            .run(&poller, &tracker, token, &RunId::from("trun_1"), |_| {
                updates += 1
            })
            .await;

        assert!(matches!(outcome, LoopOutcome::Superseded));
        assert_eq!(updates, 1);
        assert_eq!(poller.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_is_surfaced_and_polling_continues() {
        let tracker = RunTracker::new();
        let token = tracker.begin_run();
        let poller = ScriptedPoller::new(vec![Ok(stuck()), Ok(completed())]);

        let mut stuck_reports = 0;
        let outcome = PollLoop::new()
            .run(&poller, &tracker, token, &RunId::from("trun_1"), |r| {
                if r.status == PollStatus::Stuck {
                    stuck_reports += 1;
                }
            })
            .await;

        assert!(matches!(outcome, LoopOutcome::Completed(_)));
        assert_eq!(stuck_reports, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_on_stuck() {
        let tracker = RunTracker::new();
        let token = tracker.begin_run();
        let poller = ScriptedPoller::new(vec![Ok(stuck())]);

        let outcome = PollLoop::new()
            .stop_on_stuck(true)
            .run(&poller, &tracker, token, &RunId::from("trun_1"), |_| {})
            .await;

        match outcome {
            LoopOutcome::Stuck(r) => {
                assert_eq!(r.diagnostics.map(|d| d.estimate_seconds), Some(180))
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_errors_are_retried() {
        let tracker = RunTracker::new();
        let token = tracker.begin_run();
        let poller = ScriptedPoller::new(vec![Err(api_error(503)), Ok(completed())]);

        let started = Instant::now();
        let outcome = PollLoop::new()
            .run(&poller, &tracker, token, &RunId::from("trun_1"), |_| {})
            .await;

        assert!(matches!(outcome, LoopOutcome::Completed(_)));
        let elapsed = started.elapsed();
        assert!(elapsed >= DEFAULT_POLL_INTERVAL);
        assert!(elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_are_not_retried() {
        let tracker = RunTracker::new();
        let token = tracker.begin_run();
        let poller = ScriptedPoller::new(vec![Err(api_error(400))]);

        let outcome = PollLoop::new()
            .run(&poller, &tracker, token, &RunId::from("trun_1"), |_| {})
            .await;

        assert!(matches!(
            outcome,
            LoopOutcome::Rejected(ClientError::Api { status: 400, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts_bound() {
        let tracker = RunTracker::new();
        let token = tracker.begin_run();
        let poller = ScriptedPoller::new(vec![
            Ok(response(PollStatus::Queued, Some(5))),
            Ok(response(PollStatus::Running, Some(5))),
        ]);

        let outcome = PollLoop::new()
            .with_max_attempts(2)
            .run(&poller, &tracker, token, &RunId::from("trun_1"), |_| {})
            .await;

        match outcome {
            LoopOutcome::GaveUp { attempts, last } => {
                assert_eq!(attempts, 2);
                assert_eq!(last.map(|r| r.status), Some(PollStatus::Running));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_run_during_long_wait_ends_loop_promptly() {
        let tracker = Arc::new(RunTracker::new());
        let token = tracker.begin_run();
        let poller = ScriptedPoller::new(vec![Err(ClientError::Api {
            status: 429,
            code: Some("rate_limited".to_string()),
            message: "slow down".to_string(),
            retry_after_secs: Some(600),
        })]);

        let switcher = tracker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            switcher.begin_run();
        });

        let started = Instant::now();
        let outcome = PollLoop::new()
            .run(&poller, &tracker, token, &RunId::from("trun_1"), |_| {})
            .await;

        assert!(matches!(outcome, LoopOutcome::Superseded));
        assert_eq!(poller.calls(), 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
