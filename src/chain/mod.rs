mod rpc;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use ethers_core::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, Log, TransactionReceipt, H256, U256,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub use rpc::RpcClient;

/// A contiguous, inclusive block range to scan for a single event on a single contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub topic0: H256,
    pub from_block: u64,
    pub to_block: u64,
}

/// Connection to a chain node, carrying the signing credential used by the workers
///
/// Every suspension point of a worker goes through this trait. Implementations must be safe for
/// concurrent use, since all workers share a single client.
#[async_trait]
pub trait ChainClient: std::fmt::Debug + Send + Sync {
    /// Address of the signing key
    fn address(&self) -> Address;

    async fn block_number(&self) -> Result<u64>;

    async fn balance(&self, address: Address) -> Result<U256>;

    /// Read-only contract call, returning the raw ABI-encoded output
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;

    async fn logs(&self, query: LogQuery) -> Result<Vec<Log>>;

    /// Pushes every new log matching `address` and `topic0` into the returned channel,
    /// until `token` is cancelled
    async fn watch_logs(
        &self,
        address: Address,
        topic0: H256,
        token: CancellationToken,
    ) -> Result<UnboundedReceiver<Log>>;

    /// Signs and sends a transaction, then waits for one confirmation
    async fn send_transaction(&self, tx: TypedTransaction) -> Result<TransactionReceipt>;
}
