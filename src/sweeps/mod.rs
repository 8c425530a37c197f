//! Periodic background maintenance.
//!
//! Each [`Sweep`] runs on its own task, driven by [`spawn_sweep`]. The first run happens
//! one full period after start; a run that overruns its period delays the next tick
//! instead of triggering a burst. Failures are logged and the schedule continues.

pub mod overdue;
pub mod unverified;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::state::AppState;

pub use overdue::{NotifyOverdue, ReminderReport};
pub use unverified::PurgeUnverified;

#[async_trait]
pub trait Sweep: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One pass over the data as of `now`.
    async fn run(&self, now: DateTime<Utc>) -> anyhow::Result<()>;
}

/// A running sweep. Dropping the handle leaves the task running; call [`SweepHandle::stop`].
pub struct SweepHandle {
    name: &'static str,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cancels the schedule and waits for an in-flight run to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(sweep = self.name, "sweep task ended abnormally: {}", e);
        }
    }
}

pub fn spawn_sweep(sweep: Arc<dyn Sweep>, clock: Arc<dyn Clock>, period: Duration) -> SweepHandle {
    let name = sweep.name();
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let started = std::time::Instant::now();
                    match sweep.run(clock.now()).await {
                        Ok(()) => tracing::debug!(sweep = name, elapsed_ms = started.elapsed().as_millis() as u64, "sweep finished"),
                        Err(e) => tracing::error!(sweep = name, "sweep failed: {:#}", e),
                    }
                }
            }
        }
        tracing::debug!(sweep = name, "sweep stopped");
    });

    SweepHandle { name, cancel, task }
}

/// The sweeps the server runs.
pub struct Sweeps {
    handles: Vec<SweepHandle>,
}

impl Sweeps {
    /// Starts the overdue reminder and unverified purge sweeps unless disabled in config.
    pub fn start(state: &AppState) -> Self {
        let cfg = &state.config.sweeps;
        if !cfg.enabled {
            tracing::info!("background sweeps disabled");
            return Self { handles: Vec::new() };
        }
        let period = Duration::from_secs(cfg.interval_secs);
        let handles = vec![
            spawn_sweep(Arc::new(NotifyOverdue::from_state(state)), state.clock.clone(), period),
            spawn_sweep(Arc::new(PurgeUnverified::from_state(state)), state.clock.clone(), period),
        ];
        tracing::info!(interval_secs = cfg.interval_secs, count = handles.len(), "background sweeps started");
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub async fn stop_all(self) {
        for handle in self.handles {
            handle.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Sweep for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self, _now: DateTime<Utc>) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_once_per_period_until_stopped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let sweep = Arc::new(Counting { runs: runs.clone(), fail: false });
        let handle = spawn_sweep(sweep, Arc::new(SystemClock), Duration::from_secs(60));

        // nothing before the first full period
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        handle.stop().await;
        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_schedule() {
        let runs = Arc::new(AtomicUsize::new(0));
        let sweep = Arc::new(Counting { runs: runs.clone(), fail: true });
        let handle = spawn_sweep(sweep, Arc::new(SystemClock), Duration::from_secs(10));

        time::sleep(Duration::from_secs(35)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(handle.name(), "counting");
        handle.stop().await;
    }
}
