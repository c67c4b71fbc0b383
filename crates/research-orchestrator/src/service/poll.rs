//! Poll coordinator: one bounded reconciliation pass per call.
//!
//! Each pass fetches the final result with a bounded wait; if that does not
//! produce a result it probes the run's status with a short fixed deadline,
//! and a queued run that has waited well past its estimate is reported as
//! `stuck`. The coordinator keeps no state between calls. Upstream is the
//! source of truth, so duplicate or concurrent polls are harmless.
//!
//! Probe failures never surface as errors: a run that might still complete is
//! reported `queued` so the caller's loop stays alive.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use research_core::{
    normalize_envelope, PollDiagnostics, PollOutcome, PollStatus, ProcessorTier, RunId,
};

use crate::config::PollConfig;
use crate::deadline::within;
use crate::upstream::{error_message, TaskApi, UpstreamReply};

/// Extra time granted to the HTTP round-trip on top of the upstream hold time.
const FETCH_TRANSPORT_ALLOWANCE_SECS: u64 = 2;

/// Bounds of the caller's next-poll hint.
const MIN_RETRY_AFTER_SECS: u64 = 5;
const MAX_RETRY_AFTER_SECS: u64 = 30;

/// Upstream fields that may carry a long-end queue estimate, in priority order.
const ESTIMATE_POINTERS: [&str; 5] = [
    "/estimate/long_end_seconds",
    "/eta/long_end_seconds",
    "/long_end_estimate_seconds",
    "/estimated_duration_seconds/max",
    "/estimated_seconds",
];

/// Upstream fields that may carry the time a run was created or queued.
const CREATED_POINTERS: [&str; 3] = ["/created_at", "/queued_at", "/run/created_at"];

/// Source of "now" for elapsed-time computation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One poll call's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PollRequest {
    pub run_id: RunId,
    /// Requested result-fetch wait; clamped to the configured maximum.
    pub wait_secs: Option<u64>,
    /// Tier hint for stuck detection when upstream does not report one.
    pub processor: Option<ProcessorTier>,
}

impl PollRequest {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            wait_secs: None,
            processor: None,
        }
    }
}

/// Stateless reconciler between callers and the upstream task API.
pub struct PollCoordinator {
    api: Arc<dyn TaskApi>,
    clock: Arc<dyn Clock>,
    config: PollConfig,
}

impl PollCoordinator {
    pub fn new(api: Arc<dyn TaskApi>, config: PollConfig) -> Self {
        Self::with_clock(api, config, Arc::new(SystemClock))
    }

    pub fn with_clock(api: Arc<dyn TaskApi>, config: PollConfig, clock: Arc<dyn Clock>) -> Self {
        Self { api, clock, config }
    }

    /// Clamp a caller-requested wait into `0..=max_wait_secs`.
    pub fn effective_wait(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.config.default_wait_secs)
            .min(self.config.max_wait_secs)
    }

    /// Perform one reconciliation pass. Never fails.
    pub async fn poll(&self, request: &PollRequest) -> PollOutcome {
        let wait_secs = self.effective_wait(request.wait_secs);
        let retry_after = retry_after_secs(wait_secs);
        let run_id = &request.run_id;

        debug!(run_id = %run_id, wait_secs, "Reconciling run");

        let fetch_deadline = Duration::from_secs(wait_secs.max(1) + FETCH_TRANSPORT_ALLOWANCE_SECS);
        match within(fetch_deadline, self.api.fetch_result(run_id, wait_secs)).await {
            Ok(Ok(reply)) if is_usable_result(&reply) => {
                let result = normalize_envelope(&reply.body);
                info!(
                    run_id = %run_id,
                    citations = result.citations.len(),
                    "Run completed"
                );
                return PollOutcome::completed(result);
            }
            Ok(Ok(reply)) => {
                debug!(run_id = %run_id, status = reply.status, "Result not ready");
            }
            Ok(Err(e)) => {
                debug!(run_id = %run_id, error = %e, "Result fetch failed");
            }
            Err(timed_out) => {
                debug!(run_id = %run_id, error = %timed_out, "Result fetch wait elapsed");
            }
        }

        let probe_deadline = Duration::from_secs(self.config.status_probe_timeout_secs);
        match within(probe_deadline, self.api.fetch_status(run_id)).await {
            Ok(Ok(reply)) if reply.is_success() => self.classify(request, &reply.body, retry_after),
            Ok(Ok(reply)) => {
                warn!(run_id = %run_id, status = reply.status, "Status probe rejected; reporting queued");
                PollOutcome::in_progress(PollStatus::Queued, retry_after)
            }
            Ok(Err(e)) => {
                warn!(run_id = %run_id, error = %e, "Status probe failed; reporting queued");
                PollOutcome::in_progress(PollStatus::Queued, retry_after)
            }
            Err(timed_out) => {
                warn!(run_id = %run_id, error = %timed_out, "Status probe timed out; reporting queued");
                PollOutcome::in_progress(PollStatus::Queued, retry_after)
            }
        }
    }

    /// Turn an upstream status document into an outcome.
    fn classify(&self, request: &PollRequest, body: &Value, retry_after: u64) -> PollOutcome {
        let upstream_status = ["/status", "/run/status"]
            .iter()
            .find_map(|p| body.pointer(p).and_then(Value::as_str))
            .map(str::to_ascii_lowercase);

        match upstream_status.as_deref() {
            Some("running") => PollOutcome::in_progress(PollStatus::Running, retry_after),
            Some("failed") | Some("cancelled") | Some("canceled") => {
                let message = error_message(body)
                    .unwrap_or_else(|| "research run failed upstream".to_string());
                warn!(run_id = %request.run_id, error = %message, "Run failed upstream");
                PollOutcome::failed(message, retry_after)
            }
            Some("queued") | None => self.check_stuck(request, body, retry_after),
            Some(other) => {
                debug!(run_id = %request.run_id, upstream_status = other, "Treating as running");
                PollOutcome::in_progress(PollStatus::Running, retry_after)
            }
        }
    }

    fn check_stuck(&self, request: &PollRequest, body: &Value, retry_after: u64) -> PollOutcome {
        let Some(elapsed_seconds) = elapsed_secs(body, self.clock.now()) else {
            return PollOutcome::in_progress(PollStatus::Queued, retry_after);
        };

        let tier = request
            .processor
            .or_else(|| {
                body.get("processor")
                    .and_then(Value::as_str)
                    .and_then(|p| p.parse().ok())
            })
            .unwrap_or_default();
        let estimate_seconds =
            upstream_estimate_secs(body).unwrap_or_else(|| self.config.stuck.estimate_for(tier));

        if self.config.stuck.is_stuck(elapsed_seconds, estimate_seconds) {
            warn!(
                run_id = %request.run_id,
                elapsed_seconds,
                estimate_seconds,
                processor = %tier,
                "Run appears stuck in queue"
            );
            return PollOutcome::stuck(
                PollDiagnostics {
                    elapsed_seconds,
                    estimate_seconds,
                },
                retry_after,
            );
        }

        PollOutcome::in_progress(PollStatus::Queued, retry_after)
    }
}

/// Next-poll hint: half the wait, kept within 5..=30 seconds.
pub fn retry_after_secs(wait_secs: u64) -> u64 {
    (wait_secs / 2).clamp(MIN_RETRY_AFTER_SECS, MAX_RETRY_AFTER_SECS)
}

fn is_usable_result(reply: &UpstreamReply) -> bool {
    reply.is_success()
        && reply
            .body
            .get("output")
            .map(|output| !output.is_null())
            .unwrap_or(false)
}

fn upstream_estimate_secs(body: &Value) -> Option<u64> {
    ESTIMATE_POINTERS
        .iter()
        .filter_map(|p| body.pointer(p))
        .find_map(as_positive_secs)
}

fn as_positive_secs(value: &Value) -> Option<u64> {
    let secs = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (secs.is_finite() && secs > 0.0).then(|| secs.ceil() as u64)
}

fn elapsed_secs(body: &Value, now: DateTime<Utc>) -> Option<u64> {
    let created = CREATED_POINTERS
        .iter()
        .filter_map(|p| body.pointer(p))
        .find_map(parse_timestamp)?;
    Some((now - created).num_seconds().max(0) as u64)
}

/// RFC 3339 strings, or epoch seconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{CreateRunRequest, UpstreamError};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::sync::Mutex;

    enum Step {
        Reply(u16, Value),
        Fail,
        Hang,
    }

    /// Task API whose result and status endpoints answer from fixed steps.
    struct FakeApi {
        result: Step,
        status: Step,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeApi {
        fn new(result: Step, status: Step) -> Arc<Self> {
            Arc::new(Self {
                result,
                status,
                calls: Mutex::new(Vec::new()),
            })
        }

        async fn answer(step: &Step) -> Result<UpstreamReply, UpstreamError> {
            match step {
                Step::Reply(status, body) => Ok(UpstreamReply {
                    status: *status,
                    retry_after_secs: None,
                    body: body.clone(),
                }),
                Step::Fail => Err(UpstreamError::Transport("connection reset".to_string())),
                Step::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("deadline should fire first")
                }
            }
        }
    }

    #[async_trait]
    impl TaskApi for FakeApi {
        async fn create_run(
            &self,
            _request: &CreateRunRequest,
        ) -> Result<UpstreamReply, UpstreamError> {
            unreachable!("coordinator never creates runs")
        }

        async fn fetch_result(
            &self,
            _run_id: &RunId,
            _timeout_secs: u64,
        ) -> Result<UpstreamReply, UpstreamError> {
            self.calls.lock().unwrap().push("result");
            Self::answer(&self.result).await
        }

        async fn fetch_status(&self, _run_id: &RunId) -> Result<UpstreamReply, UpstreamError> {
            self.calls.lock().unwrap().push("status");
            Self::answer(&self.status).await
        }
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn coordinator(api: Arc<FakeApi>, elapsed_secs: i64) -> PollCoordinator {
        PollCoordinator::with_clock(
            api,
            PollConfig::default(),
            Arc::new(FixedClock(t0() + ChronoDuration::seconds(elapsed_secs))),
        )
    }

    fn queued_status(processor: &str) -> Value {
        json!({
            "run_id": "trun_1",
            "status": "queued",
            "processor": processor,
            "created_at": t0().to_rfc3339(),
        })
    }

    fn request(wait_secs: u64) -> PollRequest {
        PollRequest {
            wait_secs: Some(wait_secs),
            ..PollRequest::new(RunId::from("trun_1"))
        }
    }

    #[test]
    fn test_retry_after_clamp() {
        assert_eq!(retry_after_secs(0), 5);
        assert_eq!(retry_after_secs(20), 10);
        assert_eq!(retry_after_secs(25), 12);
        assert_eq!(retry_after_secs(55), 27);
        assert_eq!(retry_after_secs(100), 30);
    }

    #[test]
    fn test_wait_is_clamped_before_use() {
        let api = FakeApi::new(Step::Fail, Step::Fail);
        let coordinator = coordinator(api, 0);
        assert_eq!(coordinator.effective_wait(Some(60)), 55);
        assert_eq!(coordinator.effective_wait(None), 25);
        assert_eq!(retry_after_secs(coordinator.effective_wait(Some(60))), 27);
    }

    #[tokio::test]
    async fn test_completed_result_is_normalized() {
        let body = json!({
            "run": { "run_id": "trun_1", "status": "completed" },
            "output": {
                "type": "text",
                "content": "Acme AB is a logistics company.",
                "basis": [{ "citations": [{ "url": "https://acme.example", "title": "Acme" }] }]
            }
        });
        let api = FakeApi::new(Step::Reply(200, body), Step::Fail);
        let outcome = coordinator(api.clone(), 0).poll(&request(25)).await;

        assert_eq!(outcome.status, PollStatus::Completed);
        let result = outcome.result.unwrap();
        assert_eq!(result.text, "Acme AB is a logistics company.");
        assert_eq!(result.citations.len(), 1);
        assert!(outcome.retry_after_seconds.is_none());
        assert_eq!(*api.calls.lock().unwrap(), vec!["result"]);
    }

    #[tokio::test]
    async fn test_pro_tier_stuck_threshold() {
        let api = FakeApi::new(Step::Reply(408, Value::Null), Step::Reply(200, queued_status("pro")));
        let outcome = coordinator(api, 195).poll(&request(25)).await;
        assert_eq!(outcome.status, PollStatus::Stuck);
        assert_eq!(
            outcome.diagnostics,
            Some(PollDiagnostics {
                elapsed_seconds: 195,
                estimate_seconds: 180
            })
        );

        let api = FakeApi::new(Step::Reply(408, Value::Null), Step::Reply(200, queued_status("pro")));
        let outcome = coordinator(api, 185).poll(&request(25)).await;
        assert_eq!(outcome.status, PollStatus::Queued);
        assert!(outcome.diagnostics.is_none());
    }

    #[tokio::test]
    async fn test_request_processor_overrides_upstream() {
        let api = FakeApi::new(Step::Reply(408, Value::Null), Step::Reply(200, queued_status("ultra")));
        let mut req = request(25);
        req.processor = Some(ProcessorTier::Lite);
        let outcome = coordinator(api, 120).poll(&req).await;
        assert_eq!(outcome.status, PollStatus::Stuck);
        assert_eq!(outcome.diagnostics.unwrap().estimate_seconds, 90);
    }

    #[tokio::test]
    async fn test_upstream_estimate_takes_priority() {
        let mut status = queued_status("lite");
        status["eta"] = json!({ "long_end_seconds": 600 });
        status["estimated_seconds"] = json!(30);
        let api = FakeApi::new(Step::Fail, Step::Reply(200, status));
        let outcome = coordinator(api, 300).poll(&request(10)).await;
        assert_eq!(outcome.status, PollStatus::Queued);
    }

    #[tokio::test]
    async fn test_running_passes_through_with_retry_hint() {
        let api = FakeApi::new(
            Step::Reply(404, json!({ "error": "not ready" })),
            Step::Reply(200, json!({ "status": "running" })),
        );
        let outcome = coordinator(api.clone(), 0).poll(&request(20)).await;
        assert_eq!(outcome.status, PollStatus::Running);
        assert_eq!(outcome.retry_after_seconds, Some(10));
        assert_eq!(*api.calls.lock().unwrap(), vec!["result", "status"]);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_terminal_error() {
        let api = FakeApi::new(
            Step::Reply(200, json!({ "output": null })),
            Step::Reply(200, json!({ "status": "failed", "error": { "message": "source blocked" } })),
        );
        let outcome = coordinator(api, 0).poll(&request(25)).await;
        assert_eq!(outcome.status, PollStatus::Error);
        assert_eq!(outcome.error.as_deref(), Some("source blocked"));
    }

    #[tokio::test]
    async fn test_probe_failure_downgrades_to_queued() {
        let api = FakeApi::new(Step::Fail, Step::Fail);
        let outcome = coordinator(api, 10_000).poll(&request(0)).await;
        assert_eq!(outcome.status, PollStatus::Queued);
        assert_eq!(outcome.retry_after_seconds, Some(5));

        let api = FakeApi::new(Step::Fail, Step::Reply(502, Value::Null));
        let outcome = coordinator(api, 0).poll(&request(0)).await;
        assert_eq!(outcome.status, PollStatus::Queued);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_upstream_hits_deadlines_and_reports_queued() {
        let api = FakeApi::new(Step::Hang, Step::Hang);
        let outcome = coordinator(api.clone(), 0).poll(&request(3)).await;
        assert_eq!(outcome.status, PollStatus::Queued);
        assert_eq!(*api.calls.lock().unwrap(), vec!["result", "status"]);
    }

    #[tokio::test]
    async fn test_repeated_polls_return_same_terminal_answer() {
        let body = json!({ "output": { "content": "final" } });
        let api = FakeApi::new(Step::Reply(200, body), Step::Fail);
        let coordinator = coordinator(api, 0);
        let first = coordinator.poll(&request(25)).await;
        let second = coordinator.poll(&request(25)).await;
        assert_eq!(first, second);
        assert_eq!(first.status, PollStatus::Completed);
    }

    #[test]
    fn test_timestamp_parsing() {
        assert_eq!(parse_timestamp(&json!("2026-03-01T12:00:00Z")), Some(t0()));
        assert_eq!(parse_timestamp(&json!(t0().timestamp())), Some(t0()));
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
    }

    #[test]
    fn test_estimate_parsing() {
        assert_eq!(as_positive_secs(&json!(12.2)), Some(13));
        assert_eq!(as_positive_secs(&json!("45")), Some(45));
        assert_eq!(as_positive_secs(&json!(0)), None);
        assert_eq!(as_positive_secs(&json!(null)), None);
    }
}
