use std::sync::Arc;
use std::time::Duration;

use tokio::{select, sync::Mutex, time::sleep};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use super::{Worker, WorkerKind};

/// Fixed-delay timer shared by every worker
///
/// Holds the running flag as the cancellation token of the current run. A single task drives
/// each run, so two ticks of the same worker never overlap.
#[derive(Debug)]
pub struct Scheduler {
    kind: WorkerKind,
    running: Mutex<Option<CancellationToken>>,
    tracker: TaskTracker,
}

impl Scheduler {
    pub fn new(kind: WorkerKind) -> Self {
        Self {
            kind,
            running: Mutex::new(None),
            tracker: TaskTracker::new(),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub(super) async fn start(&self, worker: Arc<dyn Worker>, interval: Duration) {
        let token = {
            let mut running = self.running.lock().await;
            if running.is_some() {
                warn!(worker = %self.kind, "already running");
                return;
            }

            let token = CancellationToken::new();
            *running = Some(token.clone());
            token
        };

        // a tick of the previous run may still be in flight
        self.wait().await;

        info!(worker = %self.kind, interval_ms = interval.as_millis() as u64, "starting");
        tick(worker.as_ref()).await;

        let kind = self.kind;
        self.tracker.spawn(async move {
            loop {
                select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = sleep(interval) => tick(worker.as_ref()).await,
                }
            }

            debug!(worker = %kind, "timer cancelled");
        });
    }

    /// Returns whether the worker was running
    pub(super) async fn stop(&self) -> bool {
        match self.running.lock().await.take() {
            Some(token) => {
                token.cancel();
                info!(worker = %self.kind, "stopped");
                true
            }
            None => {
                warn!(worker = %self.kind, "not running");
                false
            }
        }
    }

    /// Waits for in-flight ticks of stopped runs to finish
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

async fn tick(worker: &dyn Worker) {
    if let Err(e) = worker.tick().await {
        error!(worker = %worker.kind(), "error during execution: {}", e);
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use ethers_core::types::Address;
    use tokio::time::{advance, sleep};

    use super::*;
    use crate::error::{Error, Result};

    const INTERVAL: Duration = Duration::from_secs(30);

    /// Counts ticks, failing every one when `fail` is set
    struct Counter {
        scheduler: Scheduler,
        ticks: AtomicUsize,
        fail: bool,
    }

    impl Counter {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                scheduler: Scheduler::new(WorkerKind::TipMonitor),
                ticks: AtomicUsize::new(0),
                fail,
            })
        }

        fn ticks(&self) -> usize {
            self.ticks.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Worker for Counter {
        fn kind(&self) -> WorkerKind {
            WorkerKind::TipMonitor
        }

        fn scheduler(&self) -> &Scheduler {
            &self.scheduler
        }

        fn address(&self) -> Address {
            Address::zero()
        }

        async fn initialize(&self) -> Result<()> {
            Ok(())
        }

        async fn tick(&self) -> Result<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Connection("node unreachable".to_owned()));
            }
            Ok(())
        }
    }

    /// Tracks how many of its ticks run at the same time
    struct Slow {
        scheduler: Scheduler,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        ticks: AtomicUsize,
    }

    #[async_trait]
    impl Worker for Slow {
        fn kind(&self) -> WorkerKind {
            WorkerKind::TipMonitor
        }

        fn scheduler(&self) -> &Scheduler {
            &self.scheduler
        }

        fn address(&self) -> Address {
            Address::zero()
        }

        async fn initialize(&self) -> Result<()> {
            Ok(())
        }

        async fn tick(&self) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            // the first tick runs inside start(), keep it short
            if self.ticks.fetch_add(1, Ordering::SeqCst) > 0 {
                sleep(Duration::from_secs(10)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_waits_for_in_flight_tick() {
        let slow = Arc::new(Slow {
            scheduler: Scheduler::new(WorkerKind::TipMonitor),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            ticks: AtomicUsize::new(0),
        });
        let worker: Arc<dyn Worker> = slow.clone();
        let interval = Duration::from_secs(1);

        worker.clone().start(interval).await;
        // second tick is now sleeping inside the timer loop
        sleep(Duration::from_secs(2)).await;
        assert_eq!(slow.in_flight.load(Ordering::SeqCst), 1);

        worker.stop().await;
        worker.clone().start(interval).await;

        assert_eq!(slow.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(slow.ticks.load(Ordering::SeqCst), 3);
        worker.stop().await;
        worker.scheduler().wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_is_immediate() {
        let counter = Counter::new(false);
        let worker: Arc<dyn Worker> = counter.clone();

        worker.clone().start(INTERVAL).await;

        assert_eq!(counter.ticks(), 1);
        assert!(worker.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_interval() {
        let counter = Counter::new(false);
        let worker: Arc<dyn Worker> = counter.clone();

        worker.clone().start(INTERVAL).await;
        sleep(INTERVAL * 5 + Duration::from_millis(1)).await;

        assert!(counter.ticks() >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_timer() {
        let counter = Counter::new(true);
        let worker: Arc<dyn Worker> = counter.clone();

        worker.clone().start(INTERVAL).await;
        sleep(INTERVAL * 3 + Duration::from_millis(1)).await;

        assert!(counter.ticks() >= 3);
        assert!(worker.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_after_stop() {
        let counter = Counter::new(false);
        let worker: Arc<dyn Worker> = counter.clone();

        worker.clone().start(INTERVAL).await;
        worker.stop().await;
        advance(INTERVAL * 3).await;
        tokio::task::yield_now().await;

        assert_eq!(counter.ticks(), 1);
        assert!(!worker.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_is_ignored() {
        let counter = Counter::new(false);
        let worker: Arc<dyn Worker> = counter.clone();

        worker.clone().start(INTERVAL).await;
        worker.clone().start(INTERVAL).await;

        assert_eq!(counter.ticks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let counter = Counter::new(false);
        let worker: Arc<dyn Worker> = counter.clone();

        worker.clone().start(INTERVAL).await;
        worker.stop().await;
        worker.stop().await;
        worker.scheduler().wait().await;
        worker.clone().start(INTERVAL).await;

        assert_eq!(counter.ticks(), 2);
        assert!(worker.is_running().await);
    }
}
