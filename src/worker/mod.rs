mod base;
mod name_cache;
mod name_service;
mod reward;
mod scheduler;
mod tip_monitor;

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use ethers_core::types::Address;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use base::Base;
pub use name_cache::NameCache;
pub use name_service::{CacheStats, NameService};
pub use reward::{
    compute_shares, CreatorEntry, CreatorSnapshot, DistributionExecutor, RewardDistribution,
    RewardShare,
};
pub use scheduler::Scheduler;
pub use tip_monitor::{CreatorPerformance, Notification, NotificationKind, TipMonitor, TipRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerKind {
    TipMonitor,
    RewardDistribution,
    NameService,
}

impl WorkerKind {
    /// Initialization and start order
    pub const ALL: [WorkerKind; 3] = [
        WorkerKind::TipMonitor,
        WorkerKind::RewardDistribution,
        WorkerKind::NameService,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TipMonitor => "tipMonitor",
            Self::RewardDistribution => "rewardDistribution",
            Self::NameService => "nameService",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recurring on-chain monitoring task
///
/// Implementors provide the work done on each tick. Scheduling, the running flag and
/// cancellation live in the composed [`Scheduler`], driven through [`start`](dyn Worker::start)
/// and [`stop`](dyn Worker::stop).
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    fn kind(&self) -> WorkerKind;

    fn scheduler(&self) -> &Scheduler;

    /// Address of the signing credential this worker acts with
    fn address(&self) -> Address;

    async fn initialize(&self) -> Result<()>;

    /// One unit of periodic work. Errors are logged by the scheduler and never stop it
    async fn tick(&self) -> Result<()>;

    /// Called once when a running worker is stopped
    async fn on_stop(&self) {}
}

impl dyn Worker {
    /// Runs one tick right away, then keeps ticking with `interval` between the end of a tick
    /// and the start of the next. Starting a running worker only logs a warning
    pub async fn start(self: Arc<Self>, interval: Duration) {
        let worker = self.clone();
        self.scheduler().start(worker, interval).await;
    }

    /// Cancels future ticks. A tick already in flight runs to completion
    pub async fn stop(&self) {
        if self.scheduler().stop().await {
            self.on_stop().await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.scheduler().is_running().await
    }
}
