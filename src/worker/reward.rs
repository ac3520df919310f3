use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ethers_core::{
    types::{Address, U256, U512},
    utils::format_ether,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::{Base, Scheduler, Worker, WorkerKind};
use crate::chain::ChainClient;
use crate::config::{ContractsConfig, RewardDistributionConfig};
use crate::contracts::MateIntegration;
use crate::error::Result;

/// Tracks a roster of creators and plans how a fixed reward pool splits between those whose
/// stake clears the threshold
#[derive(Debug)]
pub struct RewardDistribution {
    base: Base,
    contract: MateIntegration,
    reward_pool: U256,
    threshold: U256,
    roster: RwLock<BTreeMap<Address, CreatorEntry>>,
    last_plan: RwLock<Vec<RewardShare>>,
    executor: Option<Box<dyn DistributionExecutor>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreatorEntry {
    pub stake: U256,
    pub eligible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorSnapshot {
    pub address: Address,
    pub stake: String,
    pub eligible: bool,
}

/// One creator's slice of the reward pool, in wei
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardShare {
    pub creator: Address,
    pub stake: U256,
    pub share: U256,
}

/// Carries out a computed distribution plan
///
/// Without one, the worker only computes and logs each share.
#[async_trait]
pub trait DistributionExecutor: std::fmt::Debug + Send + Sync {
    async fn execute(&self, base: &Base, plan: &[RewardShare]) -> Result<()>;
}

/// Splits `pool` proportionally to each stake, rounding down
pub fn compute_shares(pool: U256, stakes: &[(Address, U256)]) -> Vec<RewardShare> {
    let total = stakes
        .iter()
        .fold(U256::zero(), |acc, (_, stake)| acc.saturating_add(*stake));

    if total.is_zero() {
        return vec![];
    }

    stakes
        .iter()
        .map(|(creator, stake)| {
            let share = stake.full_mul(pool) / U512::from(total);
            RewardShare {
                creator: *creator,
                stake: *stake,
                // stake <= total, so share <= pool
                share: U256::try_from(share).unwrap_or(pool),
            }
        })
        .collect()
}

impl RewardDistribution {
    pub fn new(
        client: Arc<dyn ChainClient>,
        contracts: &ContractsConfig,
        config: &RewardDistributionConfig,
    ) -> Self {
        Self {
            contract: MateIntegration::new(contracts.mate_integration, client.clone()),
            base: Base::new(WorkerKind::RewardDistribution, client),
            reward_pool: config.reward_pool,
            threshold: config.threshold,
            roster: Default::default(),
            last_plan: Default::default(),
            executor: None,
        }
    }

    pub fn with_executor(mut self, executor: impl DistributionExecutor + 'static) -> Self {
        self.executor = Some(Box::new(executor));
        self
    }

    /// Starts tracking a creator. It becomes eligible only after a tick sees enough stake
    pub async fn add_creator(&self, creator: Address) -> bool {
        let mut roster = self.roster.write().await;
        if roster.contains_key(&creator) {
            return false;
        }

        roster.insert(creator, CreatorEntry::default());
        info!(?creator, "added creator to monitoring");
        true
    }

    pub async fn remove_creator(&self, creator: Address) -> bool {
        let removed = self.roster.write().await.remove(&creator).is_some();
        if removed {
            info!(?creator, "removed creator from monitoring");
        }
        removed
    }

    pub async fn eligible_creators(&self) -> Vec<CreatorSnapshot> {
        self.roster
            .read()
            .await
            .iter()
            .map(|(address, entry)| CreatorSnapshot {
                address: *address,
                stake: format_ether(entry.stake),
                eligible: entry.eligible,
            })
            .collect()
    }

    /// Shares computed by the most recent distribution
    pub async fn last_plan(&self) -> Vec<RewardShare> {
        self.last_plan.read().await.clone()
    }

    /// Refreshes every tracked creator's stake, dropping those below the threshold.
    /// A creator whose stake can't be read keeps its previous entry
    async fn identify_eligible_creators(&self) {
        let creators: Vec<Address> = self.roster.read().await.keys().copied().collect();

        for creator in creators {
            match self.contract.user_stake(creator).await {
                Ok(stake) if stake >= self.threshold => {
                    // the creator may have been removed while the query was in flight
                    if let Some(entry) = self.roster.write().await.get_mut(&creator) {
                        *entry = CreatorEntry {
                            stake,
                            eligible: true,
                        };
                        debug!(?creator, stake = %format_ether(stake), "creator is eligible");
                    }
                }
                Ok(stake) => {
                    self.roster.write().await.remove(&creator);
                    info!(?creator, stake = %format_ether(stake), "stake below threshold, dropped");
                }
                Err(e) => warn!(?creator, "error checking creator: {}", e),
            }
        }
    }

    async fn distribute_rewards(&self, eligible: &[(Address, U256)]) -> Result<()> {
        let plan = compute_shares(self.reward_pool, eligible);
        if plan.is_empty() {
            warn!("eligible creators hold no stake, nothing to distribute");
            return Ok(());
        }

        info!(
            creators = plan.len(),
            pool = %format_ether(self.reward_pool),
            "distributing rewards"
        );
        for share in plan.iter() {
            info!(
                creator = ?share.creator,
                stake = %format_ether(share.stake),
                share = %format_ether(share.share),
                "reward calculated"
            );
        }

        *self.last_plan.write().await = plan.clone();

        match &self.executor {
            Some(executor) => executor.execute(&self.base, &plan).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Worker for RewardDistribution {
    fn kind(&self) -> WorkerKind {
        WorkerKind::RewardDistribution
    }

    fn scheduler(&self) -> &Scheduler {
        self.base.scheduler()
    }

    fn address(&self) -> Address {
        self.base.address()
    }

    async fn initialize(&self) -> Result<()> {
        self.base.initialize().await?;

        info!(
            contract = ?self.contract.address(),
            pool = %format_ether(self.reward_pool),
            threshold = %format_ether(self.threshold),
            "reward distribution ready"
        );
        Ok(())
    }

    #[instrument(name = "reward_distribution", skip(self))]
    async fn tick(&self) -> Result<()> {
        debug!("checking reward distribution eligibility");
        self.identify_eligible_creators().await;

        let eligible: Vec<(Address, U256)> = self
            .roster
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.eligible)
            .map(|(address, entry)| (*address, entry.stake))
            .collect();

        if eligible.is_empty() {
            info!("no eligible creators for reward distribution");
            return Ok(());
        }

        self.distribute_rewards(&eligible).await
    }
}
