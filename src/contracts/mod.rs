//! Typed access to the two contracts the workers read from
//!
//! Calls are ABI-encoded with the derived bindings in [`bindings`] and go through the shared
//! [`ChainClient`], so the same wrappers run against a node or against a mock.

mod bindings;

use std::sync::Arc;

use ethers_contract::EthEvent;
use ethers_contract_derive::{EthAbiCodec, EthAbiType};
use ethers_core::{
    abi::{AbiDecode, AbiEncode, RawLog},
    types::{Address, Log, H256, U256},
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::chain::{ChainClient, LogQuery};
use crate::error::Result;

pub use bindings::{
    GetCreatorStatsCall, GetNameCall, GetUserStakeCall, NameRegisteredFilter, ResolveNameCall,
    TipSentFilter,
};

/// A decoded `TipSent` log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipEvent {
    pub tipper: Address,
    pub creator: Address,
    pub amount: U256,
    pub platform_fee: U256,
    pub message: String,
    pub nonce: U256,
    pub block_number: u64,
    pub transaction_hash: H256,
    pub log_index: u64,
}

/// A decoded `NameRegistered` log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRegistration {
    pub user: Address,
    pub name: String,
    pub block_number: u64,
    pub transaction_hash: H256,
}

/// Output of `getCreatorStats(address)`
#[derive(Debug, Clone, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct CreatorStats {
    pub total_tips: U256,
    pub tip_count: U256,
    pub is_active: bool,
}

impl TipEvent {
    pub fn from_log(log: &Log) -> Result<Self> {
        let event = TipSentFilter::decode_log(&raw(log))?;
        let (block_number, transaction_hash, log_index) = position(log);

        Ok(Self {
            tipper: event.tipper,
            creator: event.creator,
            amount: event.amount,
            platform_fee: event.platform_fee,
            message: event.message,
            nonce: event.nonce,
            block_number,
            transaction_hash,
            log_index,
        })
    }
}

impl NameRegistration {
    pub fn from_log(log: &Log) -> Result<Self> {
        let event = NameRegisteredFilter::decode_log(&raw(log))?;
        let (block_number, transaction_hash, _) = position(log);

        Ok(Self {
            user: event.user,
            name: event.name,
            block_number,
            transaction_hash,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StreamTipping {
    address: Address,
    client: Arc<dyn ChainClient>,
}

impl StreamTipping {
    pub fn new(address: Address, client: Arc<dyn ChainClient>) -> Self {
        Self { address, client }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// All `TipSent` events within `from_block..=to_block`, in chain order.
    /// A single undecodable log fails the whole range
    pub async fn tip_events(&self, from_block: u64, to_block: u64) -> Result<Vec<TipEvent>> {
        let logs = self
            .client
            .logs(LogQuery {
                address: self.address,
                topic0: TipSentFilter::signature(),
                from_block,
                to_block,
            })
            .await?;

        let mut events = logs
            .iter()
            .map(TipEvent::from_log)
            .collect::<Result<Vec<_>>>()?;
        events.sort_by_key(|e| (e.block_number, e.log_index));

        Ok(events)
    }

    pub async fn creator_stats(&self, creator: Address) -> Result<CreatorStats> {
        let output = self
            .client
            .call(self.address, GetCreatorStatsCall { creator }.encode().into())
            .await?;

        Ok(CreatorStats::decode(output)?)
    }
}

#[derive(Debug, Clone)]
pub struct MateIntegration {
    address: Address,
    client: Arc<dyn ChainClient>,
}

impl MateIntegration {
    pub fn new(address: Address, client: Arc<dyn ChainClient>) -> Self {
        Self { address, client }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn user_stake(&self, user: Address) -> Result<U256> {
        let output = self
            .client
            .call(self.address, GetUserStakeCall { user }.encode().into())
            .await?;

        Ok(U256::decode(output)?)
    }

    /// Returns the zero address for unregistered names
    pub async fn resolve_name(&self, name: &str) -> Result<Address> {
        let call = ResolveNameCall {
            name: name.to_owned(),
        };
        let output = self.client.call(self.address, call.encode().into()).await?;

        Ok(Address::decode(output)?)
    }

    /// Returns an empty string for addresses without a name
    pub async fn name_of(&self, addr: Address) -> Result<String> {
        let output = self
            .client
            .call(self.address, GetNameCall { addr }.encode().into())
            .await?;

        Ok(String::decode(output)?)
    }

    pub async fn registrations(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<NameRegistration>> {
        let logs = self
            .client
            .logs(LogQuery {
                address: self.address,
                topic0: NameRegisteredFilter::signature(),
                from_block,
                to_block,
            })
            .await?;

        logs.iter().map(NameRegistration::from_log).collect()
    }

    /// Raw `NameRegistered` logs as they are mined. Decode with [`NameRegistration::from_log`]
    pub async fn watch_registrations(
        &self,
        token: CancellationToken,
    ) -> Result<UnboundedReceiver<Log>> {
        self.client
            .watch_logs(self.address, NameRegisteredFilter::signature(), token)
            .await
    }
}

fn raw(log: &Log) -> RawLog {
    RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    }
}

fn position(log: &Log) -> (u64, H256, u64) {
    (
        log.block_number.map(|n| n.as_u64()).unwrap_or_default(),
        log.transaction_hash.unwrap_or_default(),
        log.log_index.map(|i| i.as_u64()).unwrap_or_default(),
    )
}
