use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers_core::{
    types::{Address, H256, U256},
    utils::format_ether,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, trace, warn};

use super::{Base, Scheduler, Worker, WorkerKind};
use crate::chain::ChainClient;
use crate::config::{ContractsConfig, TipMonitorConfig};
use crate::contracts::{CreatorStats, StreamTipping, TipEvent};
use crate::error::{Error, Result};
use crate::store::CursorStore;

/// Watches `TipSent` events block range by block range
///
/// Starts at the chain head (or the persisted cursor) and only advances the cursor once a whole
/// range has been processed, so a failed tick re-scans the same range on the next one.
#[derive(Debug)]
pub struct TipMonitor {
    base: Base,
    contract: StreamTipping,
    threshold: U256,
    history_size: usize,
    max_block_range: u64,
    store: Option<CursorStore>,
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    last_processed_block: u64,
    notifications: Vec<Notification>,
    history: VecDeque<TipRecord>,
    performance: HashMap<Address, CreatorPerformance>,
}

/// Serializable view of a tip, with amounts in ether
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TipRecord {
    pub tipper: Address,
    pub creator: Address,
    pub amount: String,
    pub platform_fee: String,
    pub message: String,
    pub nonce: String,
    pub block_number: u64,
    pub transaction_hash: H256,
    pub log_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    LargeTip,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub data: TipRecord,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate stats for a creator, as last reported by the contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorPerformance {
    pub creator: Address,
    pub total_tips: String,
    pub tip_count: u64,
    pub is_active: bool,
    pub average_tip: String,
}

impl From<&TipEvent> for TipRecord {
    fn from(event: &TipEvent) -> Self {
        Self {
            tipper: event.tipper,
            creator: event.creator,
            amount: format_ether(event.amount),
            platform_fee: format_ether(event.platform_fee),
            message: event.message.clone(),
            nonce: event.nonce.to_string(),
            block_number: event.block_number,
            transaction_hash: event.transaction_hash,
            log_index: event.log_index,
        }
    }
}

impl CreatorPerformance {
    fn new(creator: Address, stats: &CreatorStats) -> Self {
        let average = if stats.tip_count.is_zero() {
            U256::zero()
        } else {
            stats.total_tips / stats.tip_count
        };

        Self {
            creator,
            total_tips: format_ether(stats.total_tips),
            tip_count: stats.tip_count.min(U256::from(u64::MAX)).as_u64(),
            is_active: stats.is_active,
            average_tip: format_ether(average),
        }
    }
}

impl State {
    /// Keeps the newest `capacity` records, skipping logs already seen
    fn remember(&mut self, record: TipRecord, capacity: usize) {
        let seen = self.history.iter().any(|r| {
            r.transaction_hash == record.transaction_hash && r.log_index == record.log_index
        });
        if seen {
            return;
        }

        self.history.push_back(record);
        while self.history.len() > capacity {
            self.history.pop_front();
        }
    }
}

impl TipMonitor {
    pub fn new(
        client: Arc<dyn ChainClient>,
        contracts: &ContractsConfig,
        config: &TipMonitorConfig,
        store: Option<CursorStore>,
    ) -> Self {
        Self {
            contract: StreamTipping::new(contracts.stream_tipping, client.clone()),
            base: Base::new(WorkerKind::TipMonitor, client),
            threshold: config.threshold,
            history_size: config.history_size,
            max_block_range: config.max_block_range.max(1),
            store,
            state: Default::default(),
        }
    }

    pub async fn last_processed_block(&self) -> u64 {
        self.state.read().await.last_processed_block
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.read().await.notifications.clone()
    }

    /// Drains the queue. Notifications appended after this call are kept for the next one
    pub async fn take_notifications(&self) -> Vec<Notification> {
        std::mem::take(&mut self.state.write().await.notifications)
    }

    pub async fn clear_notifications(&self) {
        let dropped = self.take_notifications().await;
        debug!(count = dropped.len(), "notifications cleared");
    }

    /// Most recent tips, oldest first
    pub async fn recent_tips(&self) -> Vec<TipRecord> {
        self.state.read().await.history.iter().cloned().collect()
    }

    pub async fn creator_performance(&self, creator: Address) -> Option<CreatorPerformance> {
        self.state.read().await.performance.get(&creator).cloned()
    }

    async fn process_tip(&self, event: &TipEvent) {
        let record = TipRecord::from(event);
        info!(
            tipper = ?record.tipper,
            creator = ?record.creator,
            amount = %record.amount,
            block = record.block_number,
            "new tip detected"
        );

        {
            let mut state = self.state.write().await;

            if event.amount >= self.threshold {
                info!(
                    amount = %record.amount,
                    threshold = %format_ether(self.threshold),
                    "large tip detected"
                );
                state.notifications.push(Notification {
                    kind: NotificationKind::LargeTip,
                    data: record.clone(),
                    timestamp: Utc::now(),
                });
            }

            state.remember(record, self.history_size);
        }

        self.analyze_creator_performance(event.creator).await;
    }

    /// Moves the cursor past a fully processed range and persists it
    async fn advance_cursor(&self, block: u64) {
        {
            let mut state = self.state.write().await;
            state.last_processed_block = state.last_processed_block.max(block);
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.save(WorkerKind::TipMonitor, block).await {
                warn!("failed to persist cursor: {}", e);
            }
        }
    }

    async fn analyze_creator_performance(&self, creator: Address) {
        match self.contract.creator_stats(creator).await {
            Ok(stats) => {
                let performance = CreatorPerformance::new(creator, &stats);
                debug!(
                    ?creator,
                    total_tips = %performance.total_tips,
                    tip_count = performance.tip_count,
                    is_active = performance.is_active,
                    average_tip = %performance.average_tip,
                    "creator performance"
                );
                self.state
                    .write()
                    .await
                    .performance
                    .insert(creator, performance);
            }
            Err(e) => warn!(?creator, "error analyzing creator performance: {}", e),
        }
    }
}

#[async_trait]
impl Worker for TipMonitor {
    fn kind(&self) -> WorkerKind {
        WorkerKind::TipMonitor
    }

    fn scheduler(&self) -> &Scheduler {
        self.base.scheduler()
    }

    fn address(&self) -> Address {
        self.base.address()
    }

    async fn initialize(&self) -> Result<()> {
        self.base.initialize().await?;

        let head = self
            .base
            .client()
            .block_number()
            .await
            .map_err(|e| Error::connection("block number query", e))?;

        let stored = match &self.store {
            Some(store) => store.load(WorkerKind::TipMonitor).await?,
            None => None,
        };
        let start = stored.filter(|block| *block <= head).unwrap_or(head);

        self.state.write().await.last_processed_block = start;
        info!(contract = ?self.contract.address(), start_block = start, "tip monitor ready");

        Ok(())
    }

    #[instrument(name = "tip_monitor", skip(self))]
    async fn tick(&self) -> Result<()> {
        let head = self.base.client().block_number().await?;
        let mut cursor = self.last_processed_block().await;

        if head <= cursor {
            trace!(event = "wait", head);
            return Ok(());
        }

        let mut processed = 0;

        while cursor < head {
            let to = cursor.saturating_add(self.max_block_range).min(head);
            debug!(from = cursor + 1, to, "scanning blocks");

            let events = self.contract.tip_events(cursor + 1, to).await?;
            for event in events.iter() {
                self.process_tip(event).await;
            }
            processed += events.len();

            self.advance_cursor(to).await;
            cursor = to;
        }

        if processed > 0 {
            info!(count = processed, "processed tip events");
        }

        Ok(())
    }
}
