//! Periodic evaluation scheduler.
//!
//! - Schedule: one cycle every `interval` (missed ticks are skipped, not
//!   replayed), plus one at startup when enabled
//! - Manual refresh: callers queue up while a cycle is in flight and are all
//!   served by a single follow-up cycle
//! - Failures: logged, counted, handed to waiting callers; the next tick
//!   runs as usual
//!
//! Cycles never overlap: the loop awaits each one before selecting again.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use medstock_core::MedicineId;

use crate::config::EngineConfig;
use crate::error::EngineError;

/// Summary of one evaluation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Requests newly opened this cycle.
    pub created: usize,
    /// Shortages that already had an active request.
    pub skipped: usize,
    /// Pending requests withdrawn because stock recovered.
    pub cancelled: usize,
    /// Rejected snapshots and per-medicine workflow failures.
    pub errors: Vec<CycleError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    pub medicine_id: MedicineId,
    pub error: EngineError,
}

/// Something that can run one evaluation cycle.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> Result<CycleReport, EngineError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles_run: u64,
    pub cycles_succeeded: u64,
    pub cycles_failed: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_report: Option<CycleReport>,
    pub last_error: Option<EngineError>,
}

type Waiter = oneshot::Sender<Result<CycleReport, EngineError>>;

#[derive(Default)]
struct Queue {
    waiters: Vec<Waiter>,
    /// A fire-and-forget trigger is waiting for the next cycle.
    triggered: bool,
    stopped: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    stats: Mutex<SchedulerStats>,
    wake: Notify,
    shutdown: Notify,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn stats(&self) -> MutexGuard<'_, SchedulerStats> {
        self.stats.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct EvaluationScheduler {
    pub interval: Duration,
    pub run_on_startup: bool,
}

impl Default for EvaluationScheduler {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            run_on_startup: true,
        }
    }
}

impl EvaluationScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_run_on_startup(mut self, run_on_startup: bool) -> Self {
        self.run_on_startup = run_on_startup;
        self
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.evaluation_interval).with_run_on_startup(config.run_on_startup)
    }

    /// Spawn the scheduler loop on the current tokio runtime.
    pub fn spawn<R>(&self, name: &'static str, runner: Arc<R>) -> SchedulerHandle
    where
        R: CycleRunner + ?Sized + 'static,
    {
        let shared = Arc::new(Shared::default());
        let join = tokio::spawn(scheduler_loop(
            name,
            self.clone(),
            Arc::clone(&shared),
            runner,
        ));

        SchedulerHandle {
            shared,
            join: Mutex::new(Some(join)),
        }
    }
}

/// Handle for a running scheduler: triggers, stats and shutdown.
///
/// Dropping the handle stops the loop after the in-flight cycle, if any.
pub struct SchedulerHandle {
    shared: Arc<Shared>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerHandle {
    /// Request a cycle without waiting for it. Coalesces with pending requests.
    pub fn trigger(&self) {
        {
            let mut queue = self.shared.queue();
            if queue.stopped {
                return;
            }
            queue.triggered = true;
        }
        self.shared.wake.notify_one();
    }

    /// Request a cycle and wait for its report.
    ///
    /// If a cycle is already running, the caller is served by the next one;
    /// every caller queued meanwhile receives that same result.
    pub async fn refresh(&self) -> Result<CycleReport, EngineError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut queue = self.shared.queue();
            if queue.stopped {
                return Err(EngineError::SchedulerStopped);
            }
            queue.waiters.push(tx);
        }
        self.shared.wake.notify_one();

        rx.await.unwrap_or(Err(EngineError::SchedulerStopped))
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.stats().clone()
    }

    /// Stop the loop and wait for it to exit. An in-flight cycle completes first.
    pub async fn shutdown(&self) {
        self.shared.shutdown.notify_one();
        let join = self
            .join
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(join) = join {
            if let Err(e) = join.await {
                warn!(error = %e, "scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shared.shutdown.notify_one();
    }
}

async fn scheduler_loop<R>(
    name: &'static str,
    cfg: EvaluationScheduler,
    shared: Arc<Shared>,
    runner: Arc<R>,
) where
    R: CycleRunner + ?Sized + 'static,
{
    info!(
        scheduler = name,
        interval_secs = cfg.interval.as_secs_f64(),
        run_on_startup = cfg.run_on_startup,
        "evaluation scheduler started"
    );

    let period = cfg.interval.max(Duration::from_millis(1));
    let start = if cfg.run_on_startup {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let reason = tokio::select! {
            biased;
            _ = shared.shutdown.notified() => break,
            _ = shared.wake.notified() => "manual",
            _ = ticker.tick() => "scheduled",
        };

        // Everyone queued up to this point is served by this cycle.
        let (waiters, triggered) = {
            let mut queue = shared.queue();
            (
                std::mem::take(&mut queue.waiters),
                std::mem::take(&mut queue.triggered),
            )
        };
        if reason == "manual" && waiters.is_empty() && !triggered {
            // Leftover wake-up whose callers were served by a scheduled cycle.
            debug!(scheduler = name, "nothing queued, skipping manual cycle");
            continue;
        }

        let started = Utc::now();
        let result = runner.run_cycle().await;

        {
            let mut stats = shared.stats();
            stats.cycles_run += 1;
            stats.last_run_at = Some(started);
            match &result {
                Ok(report) => {
                    stats.cycles_succeeded += 1;
                    stats.last_report = Some(report.clone());
                    stats.last_error = None;
                }
                Err(e) => {
                    stats.cycles_failed += 1;
                    stats.last_error = Some(e.clone());
                }
            }
        }

        match &result {
            Ok(report) => info!(
                scheduler = name,
                trigger = reason,
                created = report.created,
                skipped = report.skipped,
                cancelled = report.cancelled,
                errors = report.errors.len(),
                waiters = waiters.len(),
                "evaluation cycle finished"
            ),
            Err(e) => warn!(
                scheduler = name,
                trigger = reason,
                error = %e,
                waiters = waiters.len(),
                "evaluation cycle failed"
            ),
        }

        for waiter in waiters {
            // The caller may have given up; nothing to do then.
            let _ = waiter.send(result.clone());
        }
    }

    // Late callers get an immediate error instead of waiting forever.
    let abandoned = {
        let mut queue = shared.queue();
        queue.stopped = true;
        std::mem::take(&mut queue.waiters)
    };
    for waiter in abandoned {
        let _ = waiter.send(Err(EngineError::SchedulerStopped));
    }

    info!(scheduler = name, "evaluation scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports its own run number as `created`.
    struct CountingRunner {
        runs: AtomicUsize,
        delay: Duration,
        fail_first: usize,
    }

    impl CountingRunner {
        fn new(delay: Duration) -> Self {
            Self {
                runs: AtomicUsize::new(0),
                delay,
                fail_first: 0,
            }
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CycleRunner for CountingRunner {
        async fn run_cycle(&self) -> Result<CycleReport, EngineError> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if n <= self.fail_first {
                return Err(EngineError::Transport(crate::error::TransportError::Unavailable(
                    "inventory feed down".into(),
                )));
            }
            Ok(CycleReport {
                created: n,
                ..CycleReport::default()
            })
        }
    }

    fn manual_only() -> EvaluationScheduler {
        EvaluationScheduler::new(Duration::from_secs(3600)).with_run_on_startup(false)
    }

    #[tokio::test]
    async fn refresh_runs_a_cycle_and_returns_its_report() {
        let runner = Arc::new(CountingRunner::new(Duration::from_millis(1)));
        let handle = manual_only().spawn("test", runner.clone());

        let report = handle.refresh().await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(runner.runs(), 1);
        assert_eq!(handle.stats().cycles_succeeded, 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn triggers_during_a_cycle_coalesce_into_one_follow_up() {
        let runner = Arc::new(CountingRunner::new(Duration::from_millis(150)));
        let handle = Arc::new(manual_only().spawn("test", runner.clone()));

        let first = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(runner.runs(), 1);

        let queued: Vec<_> = (0..3)
            .map(|_| {
                let handle = Arc::clone(&handle);
                tokio::spawn(async move { handle.refresh().await })
            })
            .collect();

        assert_eq!(first.await.unwrap().unwrap().created, 1);
        for q in queued {
            assert_eq!(q.await.unwrap().unwrap().created, 2);
        }
        assert_eq!(runner.runs(), 2);
        assert_eq!(handle.stats().cycles_run, 2);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn repeated_triggers_during_a_cycle_run_one_follow_up() {
        let runner = Arc::new(CountingRunner::new(Duration::from_millis(100)));
        let handle = manual_only().spawn("test", runner.clone());

        handle.trigger();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runner.runs(), 1);

        for _ in 0..4 {
            handle.trigger();
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(runner.runs(), 2);
        assert_eq!(handle.stats().last_report.map(|r| r.created), Some(2));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn stale_wake_up_does_not_run_a_cycle() {
        let runner = Arc::new(CountingRunner::new(Duration::from_millis(1)));
        let handle = manual_only().spawn("test", runner.clone());

        // What a refresh leaves behind after a scheduled cycle served it.
        handle.shared.wake.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runner.runs(), 0);
        assert_eq!(handle.stats().cycles_run, 0);

        assert_eq!(handle.refresh().await.unwrap().created, 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn trigger_after_shutdown_is_ignored() {
        let runner = Arc::new(CountingRunner::new(Duration::from_millis(1)));
        let handle = manual_only().spawn("test", runner.clone());
        handle.shutdown().await;

        handle.trigger();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runner.runs(), 0);
    }

    #[tokio::test]
    async fn failed_cycles_do_not_stop_the_schedule() {
        let runner = Arc::new(CountingRunner {
            fail_first: 2,
            ..CountingRunner::new(Duration::from_millis(1))
        });
        let handle = EvaluationScheduler::new(Duration::from_millis(20)).spawn("test", runner.clone());

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown().await;

        let stats = handle.stats();
        assert_eq!(stats.cycles_failed, 2);
        assert!(stats.cycles_succeeded >= 1);
        assert_eq!(stats.cycles_run, stats.cycles_failed + stats.cycles_succeeded);
        assert!(stats.last_error.is_none());
    }

    #[tokio::test]
    async fn failure_is_reported_to_waiters() {
        let runner = Arc::new(CountingRunner {
            fail_first: 1,
            ..CountingRunner::new(Duration::from_millis(1))
        });
        let handle = manual_only().spawn("test", runner);

        let err = handle.refresh().await.unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));
        assert_eq!(handle.refresh().await.unwrap().created, 2);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn refresh_after_shutdown_fails_fast() {
        let runner = Arc::new(CountingRunner::new(Duration::from_millis(1)));
        let handle = manual_only().spawn("test", runner.clone());
        handle.shutdown().await;

        assert_eq!(handle.refresh().await, Err(EngineError::SchedulerStopped));
        assert_eq!(runner.runs(), 0);
    }

    #[tokio::test]
    async fn startup_cycle_runs_immediately() {
        let runner = Arc::new(CountingRunner::new(Duration::from_millis(1)));
        let handle = EvaluationScheduler::new(Duration::from_secs(3600)).spawn("test", runner.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runner.runs(), 1);
        handle.shutdown().await;
    }
}
