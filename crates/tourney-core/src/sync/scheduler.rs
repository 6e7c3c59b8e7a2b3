//! Background timer that drives the pull synchronizer.
//!
//! One owned service object per process. `start`/`stop` are idempotent; a
//! stop lets an in-flight run finish but schedules nothing further.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Notify};

use super::error::{SyncError, SyncResult, TransportError};
use super::pull::PullSynchronizer;
use super::summary::{RunOutcome, SyncOperation, SyncSummary};
use crate::config::{MAX_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES};
use crate::util::sanitize;

/// Snapshot reported by `status()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_minutes: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub last_summary: Option<SyncSummary>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

/// How a run ended, as far as scheduling is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    Succeeded,
    Failed,
    RateLimited(Option<Duration>),
}

/// Delay until the next scheduled run.
///
/// Rate limiting backs off to `max(retry_after, 2 * current)`, capped at
/// `max_backoff` (never below the interval); anything else resets to the interval.
pub fn next_delay(
    current: Duration,
    interval: Duration,
    max_backoff: Duration,
    result: RunResult,
) -> Duration {
    match result {
        RunResult::Succeeded | RunResult::Failed => interval,
        RunResult::RateLimited(retry_after) => {
            let doubled = current.max(interval).saturating_mul(2);
            retry_after
                .unwrap_or_default()
                .max(doubled)
                .min(max_backoff.max(interval))
        }
    }
}

struct SchedulerState {
    shutdown: Option<watch::Sender<bool>>,
    interval_minutes: u64,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    last_summary: Option<SyncSummary>,
    last_error: Option<String>,
    consecutive_failures: u32,
}

struct SchedulerInner {
    pull: PullSynchronizer,
    state: Mutex<SchedulerState>,
    reschedule: Notify,
    initial_delay: Duration,
    max_backoff: Duration,
}

impl SchedulerInner {
    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn interval(&self) -> Duration {
        minutes(self.state().interval_minutes)
    }

    /// One bounded run; an overrun is abandoned rather than overlapping the next tick
    async fn execute(&self) -> RunResult {
        let budget = self.interval().saturating_mul(2);
        let mut abandoned = SyncSummary::start();
        match tokio::time::timeout(budget, self.pull.run()).await {
            Ok(result) => self.record(&result),
            Err(_) => {
                let error = SyncError::BudgetExceeded {
                    budget_secs: budget.as_secs(),
                };
                tracing::error!(
                    budget_secs = budget.as_secs(),
                    "Scheduled pull exceeded its time budget and was abandoned"
                );
                abandoned.record_failure(SyncOperation::Run, None, None, &error);
                let abandoned = abandoned.finish(RunOutcome::Aborted);
                self.pull.persist(&abandoned).await;

                let mut state = self.state();
                state.last_run = Some(Utc::now());
                state.last_summary = Some(abandoned);
                state.last_error = Some(sanitize(&error));
                state.consecutive_failures += 1;
                RunResult::Failed
            }
        }
    }

    fn record(&self, result: &SyncResult<SyncSummary>) -> RunResult {
        let mut state = self.state();
        match result {
            Ok(summary) => {
                state.last_run = Some(Utc::now());
                state.last_summary = Some(summary.clone());
                state.last_error = None;
                state.consecutive_failures = 0;
                RunResult::Succeeded
            }
            Err(SyncError::AlreadyRunning) => {
                tracing::info!("Skipped pull; another run is in progress");
                RunResult::Succeeded
            }
            Err(error) => {
                state.last_run = Some(Utc::now());
                state.last_error = Some(sanitize(error));
                state.consecutive_failures += 1;
                match error {
                    SyncError::Transport(TransportError::RateLimited { retry_after }) => {
                        RunResult::RateLimited(*retry_after)
                    }
                    _ => RunResult::Failed,
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
}

impl SyncScheduler {
    pub fn new(
        pull: PullSynchronizer,
        interval_minutes: u64,
        initial_delay: Duration,
        max_backoff: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                pull,
                state: Mutex::new(SchedulerState {
                    shutdown: None,
                    interval_minutes,
                    last_run: None,
                    next_run: None,
                    last_summary: None,
                    last_error: None,
                    consecutive_failures: 0,
                }),
                reschedule: Notify::new(),
                initial_delay,
                max_backoff,
            }),
        }
    }

    /// Spawn the timer loop. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let mut state = self.inner.state();
        if state.shutdown.is_some() {
            tracing::info!("Sync scheduler start requested but it is already running");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        state.shutdown = Some(shutdown_tx);
        state.next_run = after(self.inner.initial_delay);
        tracing::info!(
            interval_minutes = state.interval_minutes,
            initial_delay_secs = self.inner.initial_delay.as_secs(),
            "Sync scheduler started"
        );
        drop(state);

        tokio::spawn(run_loop(Arc::clone(&self.inner), shutdown_rx));
        true
    }

    /// Stop scheduling further runs. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let mut state = self.inner.state();
        let Some(shutdown) = state.shutdown.take() else {
            tracing::info!("Sync scheduler stop requested but it is not running");
            return false;
        };
        let _ = shutdown.send(true);
        state.next_run = None;
        tracing::info!("Sync scheduler stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.inner.state().shutdown.is_some()
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.inner.state();
        SchedulerStatus {
            running: state.shutdown.is_some(),
            interval_minutes: state.interval_minutes,
            last_run: state.last_run,
            next_run: state.shutdown.as_ref().and(state.next_run),
            last_summary: state.last_summary.clone(),
            last_error: state.last_error.clone(),
            consecutive_failures: state.consecutive_failures,
        }
    }

    /// Change the poll interval; the countdown restarts from now
    pub fn set_interval(&self, interval_minutes: u64) -> SyncResult<()> {
        if !(MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&interval_minutes) {
            return Err(SyncError::InvalidInterval {
                requested: interval_minutes,
                min: MIN_INTERVAL_MINUTES,
                max: MAX_INTERVAL_MINUTES,
            });
        }

        let previous = {
            let mut state = self.inner.state();
            std::mem::replace(&mut state.interval_minutes, interval_minutes)
        };
        tracing::info!(
            previous_minutes = previous,
            interval_minutes,
            "Sync interval changed"
        );
        self.inner.reschedule.notify_waiters();
        Ok(())
    }

    /// Run one pull immediately, outside the timer
    pub async fn run_now(&self) -> SyncResult<SyncSummary> {
        let result = self.inner.pull.run().await;
        self.inner.record(&result);
        result
    }
}

async fn run_loop(inner: Arc<SchedulerInner>, mut shutdown: watch::Receiver<bool>) {
    let mut delay = inner.initial_delay;
    loop {
        inner.state().next_run = after(delay);

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            () = inner.reschedule.notified() => {
                delay = inner.interval();
                continue;
            }
            () = tokio::time::sleep(delay) => {}
        }

        tracing::debug!("Scheduled pull starting");
        let result = inner.execute().await;
        if let RunResult::RateLimited(retry_after) = result {
            tracing::warn!(
                retry_after_secs = retry_after.map(|value| value.as_secs()),
                "Submission portal rate limited the pull; backing off"
            );
        }
        delay = next_delay(delay, inner.interval(), inner.max_backoff, result);
    }
    tracing::debug!("Sync scheduler loop exited");
}

fn after(delay: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| Utc::now().checked_add_signed(delay))
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}
