//! Converge poller: wait for an eventually-consistent remote object to reach
//! a target status label.
//!
//! [`await_state`] samples a [`StateRefresher`] on a bounded backoff schedule
//! until the label matches the target, turns fatal, or the deadline elapses.
//! It blocks the calling task only; nothing is spawned and no state is shared
//! between calls, so waits for different identities can run concurrently.

#![forbid(unsafe_code)]

use std::time::Duration;

use converge_core::{Classification, ClassifyContext, ConvergeError, ConvergeResult, RemoteError};
use metrics::{counter, histogram};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod script;
pub mod settings;

pub use settings::PollSettings;

/// What to wait for and how patiently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceSpec {
    pub target: String,
    pub pending: Vec<String>,
    /// Zero means "sample once, do not wait".
    pub timeout: Duration,
    /// Backoff ceiling.
    pub poll_interval: Duration,
    /// Backoff seed.
    pub min_poll_interval: Duration,
    /// Wait before the first sample (ignored when `timeout` is zero).
    pub initial_delay: Duration,
}

impl ConvergenceSpec {
    pub fn new(target: &str, pending: &[&str], timeout: Duration) -> Self {
        let d = PollSettings::default();
        Self {
            target: target.to_string(),
            pending: pending.iter().map(|s| s.to_string()).collect(),
            timeout,
            poll_interval: d.poll_interval,
            min_poll_interval: d.min_poll_interval,
            initial_delay: d.initial_delay,
        }
    }

    pub fn with_intervals(mut self, min_poll_interval: Duration, poll_interval: Duration) -> Self {
        self.min_poll_interval = min_poll_interval;
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_single_shot(&self) -> bool {
        self.timeout.is_zero()
    }

    pub fn is_pending(&self, label: &str) -> bool {
        self.pending.iter().any(|p| p == label)
    }

    pub fn validate(&self) -> ConvergeResult<()> {
        if self.target.is_empty() {
            return Err(ConvergeError::Validation("convergence target must not be empty".into()));
        }
        if self.is_pending(&self.target) {
            return Err(ConvergeError::Validation(format!("target state '{}' is also listed as pending", self.target)));
        }
        if self.min_poll_interval > self.poll_interval {
            return Err(ConvergeError::Validation(format!(
                "minimum poll interval {:?} exceeds poll interval {:?}",
                self.min_poll_interval, self.poll_interval
            )));
        }
        if !self.is_single_shot() && self.poll_interval.is_zero() {
            return Err(ConvergeError::Validation("poll interval must be positive when waiting".into()));
        }
        Ok(())
    }
}

/// One sample taken by a refresher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation<T> {
    pub object: Option<T>,
    pub label: String,
    /// Human readable context for non-target labels.
    pub detail: Option<String>,
}

impl<T> Observation<T> {
    pub fn new(object: T, label: impl Into<String>) -> Self {
        Self { object: Some(object), label: label.into(), detail: None }
    }

    pub fn empty(label: impl Into<String>) -> Self {
        Self { object: None, label: label.into(), detail: None }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Family-specific "sample current status" adapter bound to one identity.
#[async_trait::async_trait]
pub trait StateRefresher: Send + Sync {
    type Object: Send;

    /// Short family name for logs and metrics ("cluster", "job", ...).
    fn family(&self) -> &'static str;

    fn identity(&self) -> &str;

    /// Perform exactly one fetch and derive a status label.
    async fn refresh(&self, target: &str) -> ConvergeResult<Observation<Self::Object>>;

    /// Decide what a raw remote failure means for this family.
    fn classify(&self, err: &RemoteError, _ctx: &ClassifyContext<'_>) -> Classification {
        Classification::Fatal(err.message.clone())
    }
}

/// Successful end of a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converged<T> {
    /// Last sampled object; `None` when success was inferred from absence.
    pub object: Option<T>,
    pub label: String,
    pub attempts: u32,
}

enum Step<T> {
    Done(Option<T>, String),
    Pending { label: String, detail: Option<String>, absent: Option<String> },
    Failed(ConvergeError),
}

fn step<R>(refresher: &R, spec: &ConvergenceSpec, res: ConvergeResult<Observation<R::Object>>) -> Step<R::Object>
where
    R: StateRefresher + ?Sized,
{
    match res {
        Ok(obs) if obs.label == spec.target => Step::Done(obs.object, obs.label),
        Ok(obs) if spec.is_pending(&obs.label) => Step::Pending { label: obs.label, detail: obs.detail, absent: None },
        Ok(obs) => Step::Failed(ConvergeError::UnexpectedState { label: obs.label, detail: obs.detail }),
        Err(ConvergeError::Remote(err)) => {
            let ctx = ClassifyContext { identity: refresher.identity(), target: &spec.target, waiting: !spec.is_single_shot() };
            match refresher.classify(&err, &ctx) {
                Classification::NotFoundAsSuccess => Step::Done(None, spec.target.clone()),
                Classification::Retryable { label } => Step::Pending { label, detail: None, absent: Some(err.message) },
                Classification::Fatal(message) => Step::Failed(ConvergeError::Remote(RemoteError::new(err.status, message))),
            }
        }
        Err(other) => Step::Failed(other),
    }
}

async fn nap(d: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(d) => true,
    }
}

/// Block until the refresher reports `spec.target`, a fatal outcome, the
/// deadline, or cancellation.
pub async fn await_state<R>(refresher: &R, spec: &ConvergenceSpec, cancel: &CancellationToken) -> ConvergeResult<Converged<R::Object>>
where
    R: StateRefresher + ?Sized,
{
    spec.validate()?;
    let family = refresher.family();
    let identity = refresher.identity().to_string();
    let cancelled = || ConvergeError::Cancelled { target: spec.target.clone() };
    let t0 = Instant::now();
    let deadline = t0 + spec.timeout;
    let mut interval = if spec.min_poll_interval.is_zero() { spec.poll_interval } else { spec.min_poll_interval };
    let mut attempts: u32 = 0;
    let mut last = String::new();
    debug!(family, identity = %identity, target = %spec.target, timeout = ?spec.timeout, "waiting for state");

    if !spec.is_single_shot() && !spec.initial_delay.is_zero() && !nap(spec.initial_delay.min(spec.timeout), cancel).await {
        counter!("converge_poll_outcome_total", 1, "family" => family, "outcome" => "cancelled");
        return Err(cancelled());
    }

    let timed_out = |last: &str| ConvergeError::Timeout { target: spec.target.clone(), last: last.to_string(), timeout: spec.timeout };
    let outcome = loop {
        if cancel.is_cancelled() {
            break Err(cancelled());
        }
        // at least one sample is always taken
        if attempts > 0 && Instant::now() >= deadline {
            break Err(timed_out(&last));
        }

        attempts += 1;
        counter!("converge_poll_attempts_total", 1, "family" => family);
        // a fetch still in flight at the deadline is abandoned
        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Err(cancelled()),
            res = refresher.refresh(&spec.target) => res,
            _ = tokio::time::sleep_until(deadline), if !spec.is_single_shot() => {
                warn!(family, identity = %identity, attempt = attempts, "refresh still running at deadline");
                break Err(timed_out(&last));
            }
        };

        match step(refresher, spec, res) {
            Step::Done(object, label) => {
                info!(family, identity = %identity, label = %label, attempts, took_ms = %t0.elapsed().as_millis(), "state reached");
                break Ok(Converged { object, label, attempts });
            }
            Step::Failed(err) => {
                warn!(family, identity = %identity, error = %err, attempts, "stopped waiting on fatal state");
                break Err(err);
            }
            Step::Pending { label, detail, absent } => {
                if spec.is_single_shot() {
                    break Err(match absent {
                        Some(message) => ConvergeError::TransientAbsence(message),
                        None => ConvergeError::UnexpectedState { label, detail },
                    });
                }
                debug!(family, identity = %identity, label = %label, attempt = attempts, next_ms = %interval.as_millis(), "still pending");
                last = label;
            }
        }

        let now = Instant::now();
        if now >= deadline {
            continue;
        }
        if !nap(interval.min(deadline - now), cancel).await {
            break Err(cancelled());
        }
        interval = interval.saturating_mul(2).min(spec.poll_interval);
    };

    histogram!("converge_poll_wait_ms", t0.elapsed().as_secs_f64() * 1000.0, "family" => family);
    let label = match &outcome {
        Ok(_) => "converged",
        Err(ConvergeError::Timeout { .. }) => "timeout",
        Err(ConvergeError::Cancelled { .. }) => "cancelled",
        Err(_) => "failed",
    };
    counter!("converge_poll_outcome_total", 1, "family" => family, "outcome" => label);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Sample, ScriptedRefresher};

    fn spec(timeout_ms: u64) -> ConvergenceSpec {
        ConvergenceSpec::new("Running", &["Pending", "Creating"], Duration::from_millis(timeout_ms))
            .with_intervals(Duration::from_millis(10), Duration::from_millis(80))
            .with_initial_delay(Duration::ZERO)
    }

    #[test]
    fn spec_validation() {
        assert!(spec(100).validate().is_ok());
        let mut bad = spec(100);
        bad.pending.push("Running".into());
        assert!(bad.validate().is_err());
        let bad = spec(100).with_intervals(Duration::from_secs(2), Duration::from_secs(1));
        assert!(bad.validate().is_err());
        let single = spec(0).with_intervals(Duration::ZERO, Duration::ZERO);
        assert!(single.validate().is_ok());
        assert!(spec(10).with_intervals(Duration::ZERO, Duration::ZERO).validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn single_shot_samples_once() {
        let r = ScriptedRefresher::labels("demo", &["Pending", "Running"]);
        let err = await_state(&r, &spec(0), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ConvergeError::UnexpectedState { ref label, .. } if label == "Pending"));
        assert_eq!(r.calls(), 1);

        let r = ScriptedRefresher::labels("demo", &["Running"]);
        let ok = await_state(&r, &spec(0), &CancellationToken::new()).await.unwrap();
        assert_eq!(ok.label, "Running");
        assert_eq!(r.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn converges_after_pending_samples() {
        let r = ScriptedRefresher::labels("demo", &["Pending", "Creating", "Pending", "Running", "Pending"]);
        let ok = await_state(&r, &spec(10_000), &CancellationToken::new()).await.unwrap();
        assert_eq!(ok.object, Some(4));
        assert_eq!(ok.attempts, 4);
        assert_eq!(r.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_label_is_fatal_immediately() {
        let r = ScriptedRefresher::labels("demo", &["Pending", "Broken", "Running"]);
        let err = await_state(&r, &spec(10_000), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ConvergeError::UnexpectedState { ref label, .. } if label == "Broken"));
        assert_eq!(r.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_label_is_fatal() {
        let r = ScriptedRefresher::labels("demo", &[""]);
        let err = await_state(&r, &spec(10_000), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), converge_core::ErrorKind::UnexpectedState);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_names_last_label() {
        let r = ScriptedRefresher::labels("demo", &["Pending", "Creating"]);
        let t0 = Instant::now();
        let err = await_state(&r, &spec(500), &CancellationToken::new()).await.unwrap_err();
        match err {
            ConvergeError::Timeout { last, target, .. } => {
                assert_eq!(last, "Creating");
                assert_eq!(target, "Running");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(t0.elapsed() >= Duration::from_millis(500));
        assert!(t0.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_up_to_ceiling() {
        let r = ScriptedRefresher::labels("demo", &["Pending"; 6]);
        let _ = await_state(&r, &spec(10_000).with_timeout(Duration::from_millis(10 + 20 + 40 + 80 + 80 + 1)), &CancellationToken::new()).await;
        // samples at t=0,10,30,70,150,230
        assert_eq!(r.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_error_is_fatal_by_default() {
        let r = ScriptedRefresher::new("demo", vec![Sample::Label("Pending".into()), Sample::Error("boom".into())]);
        let err = await_state(&r, &spec(10_000), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(r.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_as_success_when_classified() {
        let r = ScriptedRefresher::new("demo", vec![Sample::Label("Terminating".into()), Sample::NotFound("Not found".into())])
            .not_found_means(Classification::NotFoundAsSuccess);
        let spec = ConvergenceSpec::new("Terminated", &["Terminating"], Duration::from_secs(5))
            .with_intervals(Duration::from_millis(10), Duration::from_millis(10));
        let ok = await_state(&r, &spec, &CancellationToken::new()).await.unwrap();
        assert_eq!(ok.object, None);
        assert_eq!(ok.label, "Terminated");
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_absence_keeps_polling_then_times_out() {
        let r = ScriptedRefresher::new("demo", vec![Sample::NotFound("agent not found".into())])
            .not_found_means(Classification::Retryable { label: "absent".into() });
        let spec = ConvergenceSpec::new("active", &["absent"], Duration::from_millis(100))
            .with_intervals(Duration::from_millis(10), Duration::from_millis(10))
            .with_initial_delay(Duration::ZERO);
        let err = await_state(&r, &spec, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ConvergeError::Timeout { ref last, .. } if last == "absent"));
        assert!(r.calls() > 5);

        let r = ScriptedRefresher::new("demo", vec![Sample::NotFound("agent not found".into())])
            .not_found_means(Classification::Retryable { label: "absent".into() });
        let err = await_state(&r, &spec.with_timeout(Duration::ZERO), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), converge_core::ErrorKind::TransientAbsence);
        assert_eq!(r.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let r = std::sync::Arc::new(ScriptedRefresher::labels("demo", &["Pending"]));
        let spec = spec(3_600_000).with_intervals(Duration::from_secs(60), Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let task = {
            let (r, cancel) = (r.clone(), cancel.clone());
            tokio::spawn(async move { await_state(&*r, &spec, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let t0 = Instant::now();
        cancel.cancel();
        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), converge_core::ErrorKind::Cancellation);
        assert!(t0.elapsed() < Duration::from_secs(1));
        assert_eq!(r.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_makes_no_calls() {
        let r = ScriptedRefresher::labels("demo", &["Running"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = await_state(&r, &spec(1_000), &cancel).await.unwrap_err();
        assert_eq!(err.kind(), converge_core::ErrorKind::Cancellation);
        assert_eq!(r.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_delay_precedes_first_sample() {
        let r = ScriptedRefresher::labels("demo", &["Running"]);
        let t0 = Instant::now();
        let spec = spec(10_000).with_initial_delay(Duration::from_secs(1));
        await_state(&r, &spec, &CancellationToken::new()).await.unwrap();
        assert!(t0.elapsed() >= Duration::from_secs(1));
    }

    struct Hung;

    #[async_trait::async_trait]
    impl StateRefresher for Hung {
        type Object = ();

        fn family(&self) -> &'static str {
            "test"
        }

        fn identity(&self) -> &str {
            "hung"
        }

        async fn refresh(&self, _target: &str) -> ConvergeResult<Observation<()>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Observation::new((), "Running"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_refresh_times_out_at_deadline() {
        let t0 = Instant::now();
        let err = await_state(&Hung, &spec(5_000), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ConvergeError::Timeout { timeout, .. } if timeout == Duration::from_secs(5)));
        assert!(t0.elapsed() < Duration::from_secs(6), "{:?}", t0.elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn single_shot_waits_for_its_one_sample() {
        let t0 = Instant::now();
        let ok = await_state(&Hung, &spec(0), &CancellationToken::new()).await.unwrap();
        assert_eq!(ok.attempts, 1);
        assert!(t0.elapsed() >= Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_longer_than_timeout_still_samples_once() {
        let r = ScriptedRefresher::labels("demo", &["Pending"]);
        let spec = spec(100).with_initial_delay(Duration::from_secs(1));
        let err = await_state(&r, &spec, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ConvergeError::Timeout { ref last, .. } if last == "Pending"));
        assert_eq!(r.calls(), 1);
    }
}
