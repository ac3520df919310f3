use std::sync::Arc;
use std::time::Duration;

use ethers_core::types::Address;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::chain::ChainClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::CursorStore;
use crate::worker::{
    NameService, Notification, RewardDistribution, TipMonitor, Worker, WorkerKind,
};

/// Owns the three workers and drives their lifecycle
#[derive(Debug)]
pub struct WorkerManager {
    config: Config,
    client: Arc<dyn ChainClient>,
    store: Option<CursorStore>,
    registry: Option<Registry>,
}

/// The initialized workers, addressable by [`WorkerKind`]
#[derive(Debug, Clone)]
pub struct Registry {
    pub tip_monitor: Arc<TipMonitor>,
    pub reward_distribution: Arc<RewardDistribution>,
    pub name_service: Arc<NameService>,
}

/// Per-worker tick intervals. `None` falls back to the worker's default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Intervals {
    pub tip_monitor: Option<Duration>,
    pub reward_distribution: Option<Duration>,
    pub name_service: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub initialized: bool,
    pub agents: Vec<AgentStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub name: WorkerKind,
    pub is_running: bool,
    pub address: Address,
}

impl Registry {
    pub fn get(&self, kind: WorkerKind) -> Arc<dyn Worker> {
        match kind {
            WorkerKind::TipMonitor => self.tip_monitor.clone(),
            WorkerKind::RewardDistribution => self.reward_distribution.clone(),
            WorkerKind::NameService => self.name_service.clone(),
        }
    }
}

impl Intervals {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tip_monitor: config.tip_monitor.interval_ms.map(Duration::from_millis),
            reward_distribution: config
                .reward_distribution
                .interval_ms
                .map(Duration::from_millis),
            name_service: config.name_service.interval_ms.map(Duration::from_millis),
        }
    }

    pub fn get(&self, kind: WorkerKind) -> Duration {
        match kind {
            WorkerKind::TipMonitor => self.tip_monitor.unwrap_or(Duration::from_secs(30)),
            WorkerKind::RewardDistribution => self
                .reward_distribution
                .unwrap_or(Duration::from_secs(300)),
            WorkerKind::NameService => self.name_service.unwrap_or(Duration::from_secs(60)),
        }
    }
}

impl WorkerManager {
    pub fn new(config: Config, client: Arc<dyn ChainClient>, store: Option<CursorStore>) -> Self {
        Self {
            config,
            client,
            store,
            registry: None,
        }
    }

    /// Builds and initializes every worker in order. The first failure aborts and leaves the
    /// manager uninitialized
    #[instrument(skip(self))]
    pub async fn initialize(&mut self) -> Result<()> {
        if self.registry.is_some() {
            warn!("already initialized");
            return Ok(());
        }

        info!("initializing agents");
        let config = &self.config;

        let tip_monitor = Arc::new(TipMonitor::new(
            self.client.clone(),
            &config.contracts,
            &config.tip_monitor,
            self.store.clone(),
        ));
        tip_monitor.initialize().await?;

        let reward_distribution = Arc::new(RewardDistribution::new(
            self.client.clone(),
            &config.contracts,
            &config.reward_distribution,
        ));
        reward_distribution.initialize().await?;
        for creator in config.reward_distribution.roster.creators() {
            reward_distribution.add_creator(*creator).await;
        }

        let name_service = Arc::new(NameService::new(
            self.client.clone(),
            &config.contracts,
            &config.name_service,
            self.store.clone(),
        ));
        name_service.initialize().await?;

        self.registry = Some(Registry {
            tip_monitor,
            reward_distribution,
            name_service,
        });
        info!("all agents initialized");

        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.registry.is_some()
    }

    pub fn registry(&self) -> Result<&Registry> {
        self.registry.as_ref().ok_or(Error::NotInitialized)
    }

    pub async fn start_all(&self, intervals: &Intervals) -> Result<()> {
        let registry = self.registry()?;

        info!("starting all agents");
        for kind in WorkerKind::ALL {
            registry.get(kind).start(intervals.get(kind)).await;
        }

        Ok(())
    }

    pub async fn stop_all(&self) {
        let Some(registry) = &self.registry else {
            return;
        };

        info!("stopping all agents");
        for kind in WorkerKind::ALL {
            let worker = registry.get(kind);
            if worker.is_running().await {
                worker.stop().await;
            }
        }
    }

    /// Stops every worker and waits for in-flight ticks to finish
    pub async fn shutdown(&self) {
        self.stop_all().await;

        if let Some(registry) = &self.registry {
            for kind in WorkerKind::ALL {
                registry.get(kind).scheduler().wait().await;
            }
        }
    }

    pub async fn status(&self) -> Status {
        let mut agents = vec![];

        if let Some(registry) = &self.registry {
            for kind in WorkerKind::ALL {
                let worker = registry.get(kind);
                agents.push(AgentStatus {
                    name: kind,
                    is_running: worker.is_running().await,
                    address: worker.address(),
                });
            }
        }

        Status {
            initialized: self.registry.is_some(),
            agents,
        }
    }

    pub fn agent(&self, kind: WorkerKind) -> Option<Arc<dyn Worker>> {
        self.registry.as_ref().map(|r| r.get(kind))
    }

    pub fn tip_monitor(&self) -> Result<&Arc<TipMonitor>> {
        Ok(&self.registry()?.tip_monitor)
    }

    pub fn reward_distribution(&self) -> Result<&Arc<RewardDistribution>> {
        Ok(&self.registry()?.reward_distribution)
    }

    pub fn name_service(&self) -> Result<&Arc<NameService>> {
        Ok(&self.registry()?.name_service)
    }

    pub async fn add_creator(&self, creator: Address) -> Result<bool> {
        Ok(self.reward_distribution()?.add_creator(creator).await)
    }

    pub async fn remove_creator(&self, creator: Address) -> Result<bool> {
        Ok(self.reward_distribution()?.remove_creator(creator).await)
    }

    pub async fn resolve_name(&self, name: &str) -> Result<Option<Address>> {
        Ok(self.name_service()?.resolve_name(name).await)
    }

    pub async fn resolve_address(&self, address: Address) -> Result<Option<String>> {
        Ok(self.name_service()?.resolve_address(address).await)
    }

    pub async fn tip_notifications(&self) -> Result<Vec<Notification>> {
        Ok(self.tip_monitor()?.notifications().await)
    }

    /// Drains the notification queue
    pub async fn take_tip_notifications(&self) -> Result<Vec<Notification>> {
        Ok(self.tip_monitor()?.take_notifications().await)
    }

    pub async fn clear_tip_notifications(&self) -> Result<()> {
        self.tip_monitor()?.clear_notifications().await;
        Ok(())
    }
}
