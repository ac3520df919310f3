use std::sync::Arc;

use async_trait::async_trait;
use ethers_core::types::{Address, Log};
use serde::Serialize;
use tokio::{
    select,
    sync::{mpsc::UnboundedReceiver, Mutex, RwLock},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{Base, NameCache, Scheduler, Worker, WorkerKind};
use crate::chain::ChainClient;
use crate::config::{ContractsConfig, NameServiceConfig};
use crate::contracts::{MateIntegration, NameRegistration};
use crate::error::Result;
use crate::store::CursorStore;

/// Keeps a name <-> address cache of the name registry
///
/// Registrations arrive through a live log subscription and are also replayed from the most
/// recent `lookback` blocks on every tick. Lookups hit the cache first and fall back to the
/// contract, caching positive answers only.
#[derive(Debug)]
pub struct NameService {
    base: Base,
    contract: MateIntegration,
    lookback: u64,
    store: Option<CursorStore>,
    cache: Arc<RwLock<NameCache>>,
    subscription: Mutex<Option<CancellationToken>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_names: usize,
    pub total_addresses: usize,
    pub entries: Vec<(String, Address)>,
}

impl NameService {
    pub fn new(
        client: Arc<dyn ChainClient>,
        contracts: &ContractsConfig,
        config: &NameServiceConfig,
        store: Option<CursorStore>,
    ) -> Self {
        Self {
            contract: MateIntegration::new(contracts.mate_integration, client.clone()),
            base: Base::new(WorkerKind::NameService, client),
            lookback: config.lookback_blocks,
            store,
            cache: Default::default(),
            subscription: Mutex::new(None),
        }
    }

    /// Cache first, then the contract. `None` for unregistered names and failed lookups
    pub async fn resolve_name(&self, name: &str) -> Option<Address> {
        let cached = self.cache.read().await.address_of(name);
        if cached.is_some() {
            return cached;
        }

        match self.contract.resolve_name(name).await {
            Ok(address) if address.is_zero() => None,
            Ok(address) => {
                self.cache_as_registered(name, address).await;
                Some(address)
            }
            Err(e) => {
                warn!(name, "error resolving name: {}", e);
                None
            }
        }
    }

    /// Caches `address` under the name as the registry spells it. Skipped when the registry
    /// can't confirm the pairing
    async fn cache_as_registered(&self, queried: &str, address: Address) {
        match self.contract.name_of(address).await {
            Ok(registered) if registered.to_lowercase() == queried.to_lowercase() => {
                self.cache.write().await.insert(&registered, address);
            }
            Ok(registered) => {
                debug!(name = queried, %registered, "address is registered under another name");
            }
            Err(e) => warn!(name = queried, "error confirming name: {}", e),
        }
    }

    /// Cache first, then the contract. `None` for addresses without a name and failed lookups
    pub async fn resolve_address(&self, address: Address) -> Option<String> {
        let cached = self
            .cache
            .read()
            .await
            .name_of(&address)
            .map(str::to_owned);
        if cached.is_some() {
            return cached;
        }

        match self.contract.name_of(address).await {
            Ok(name) if name.is_empty() => None,
            Ok(name) => {
                self.cache.write().await.insert(&name, address);
                Some(name)
            }
            Err(e) => {
                warn!(?address, "error resolving address: {}", e);
                None
            }
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        let cache = self.cache.read().await;

        CacheStats {
            total_names: cache.len(),
            total_addresses: cache.len(),
            entries: cache
                .entries()
                .map(|(name, address)| (name.to_owned(), address))
                .collect(),
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
        info!("cache cleared");
    }

    /// Replays registrations in `from_block..=to_block`, in windows of at most `lookback + 1`
    /// blocks
    async fn replay(&self, from_block: u64, to_block: u64) -> Result<usize> {
        let window = self.lookback.max(1);
        let mut count = 0;
        let mut from = from_block;

        while from <= to_block {
            let to = from.saturating_add(window).min(to_block);
            let registrations = self.contract.registrations(from, to).await?;

            let mut cache = self.cache.write().await;
            for registration in registrations.iter() {
                cache.insert(&registration.name, registration.user);
            }
            count += registrations.len();

            if to == u64::MAX {
                break;
            }
            from = to + 1;
        }

        Ok(count)
    }

    /// Picks up registrations missed while the worker was down for longer than the lookback
    /// window. Returns the last replayed block, if any
    async fn catch_up(&self) -> Result<Option<u64>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let Some(cursor) = store.load(WorkerKind::NameService).await? else {
            return Ok(None);
        };

        let head = self.base.client().block_number().await?;
        if cursor.saturating_add(1) >= head.saturating_sub(self.lookback) {
            return Ok(None);
        }

        info!(from = cursor + 1, to = head, "catching up on name registrations");
        let count = self.replay(cursor + 1, head).await?;
        info!(count, "caught up");

        Ok(Some(head))
    }

    /// Replays blocks mined between the end of the catch-up and the subscription going live
    async fn fill_gap(&self, replayed_to: u64) -> Result<()> {
        let head = self.base.client().block_number().await?;
        if head > replayed_to {
            let count = self.replay(replayed_to + 1, head).await?;
            debug!(from = replayed_to + 1, to = head, count, "filled catch-up gap");
        }

        Ok(())
    }

    async fn subscribe(&self) -> Result<()> {
        let token = CancellationToken::new();
        let logs = self.contract.watch_registrations(token.clone()).await?;

        tokio::spawn(listen(logs, self.cache.clone(), token.clone()));

        if let Some(previous) = self.subscription.lock().await.replace(token) {
            previous.cancel();
        }

        Ok(())
    }
}

/// Applies pushed registrations to the cache until cancelled
async fn listen(
    mut logs: UnboundedReceiver<Log>,
    cache: Arc<RwLock<NameCache>>,
    token: CancellationToken,
) {
    loop {
        let log = select! {
            _ = token.cancelled() => break,
            log = logs.recv() => match log {
                Some(log) => log,
                None => break,
            },
        };

        match NameRegistration::from_log(&log) {
            Ok(registration) => {
                info!(
                    user = ?registration.user,
                    name = %registration.name,
                    block = registration.block_number,
                    tx = ?registration.transaction_hash,
                    "new name registered"
                );
                cache
                    .write()
                    .await
                    .insert(&registration.name, registration.user);
            }
            Err(e) => warn!("undecodable name registration: {}", e),
        }
    }

    debug!("name registration subscription closed");
}

#[async_trait]
impl Worker for NameService {
    fn kind(&self) -> WorkerKind {
        WorkerKind::NameService
    }

    fn scheduler(&self) -> &Scheduler {
        self.base.scheduler()
    }

    fn address(&self) -> Address {
        self.base.address()
    }

    async fn initialize(&self) -> Result<()> {
        self.base.initialize().await?;

        // history first: replayed pairings must not overwrite pushed ones
        let replayed_to = match self.catch_up().await {
            Ok(replayed_to) => replayed_to,
            Err(e) => {
                warn!("catch-up replay failed: {}", e);
                None
            }
        };

        // polling still covers the lookback window without the push channel
        if let Err(e) = self.subscribe().await {
            warn!("name registration subscription unavailable: {}", e);
        }

        if let Some(replayed_to) = replayed_to {
            if let Err(e) = self.fill_gap(replayed_to).await {
                warn!("catch-up replay failed: {}", e);
            }
        }

        info!(contract = ?self.contract.address(), lookback = self.lookback, "name service ready");
        Ok(())
    }

    #[instrument(name = "name_service", skip(self))]
    async fn tick(&self) -> Result<()> {
        let head = self.base.client().block_number().await?;
        let count = self
            .replay(head.saturating_sub(self.lookback), head)
            .await?;

        if count > 0 {
            info!(count, "synced name registrations");
        }
        let names = self.cache.read().await.len();
        debug!(names, "name cache status");

        if let Some(store) = &self.store {
            if let Err(e) = store.save(WorkerKind::NameService, head).await {
                warn!("failed to persist cursor: {}", e);
            }
        }

        Ok(())
    }

    async fn on_stop(&self) {
        if let Some(token) = self.subscription.lock().await.take() {
            token.cancel();
        }
    }
}
