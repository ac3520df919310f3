use std::sync::Arc;

use async_trait::async_trait;
use ethers_core::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, Filter, Log, TransactionReceipt,
    TransactionRequest, H256, U256,
};
use ethers_providers::{FilterKind, FilterWatcher, Http, Middleware, Provider};
use ethers_signers::{LocalWallet, Signer, WalletError};
use futures::StreamExt;
use tokio::{select, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use super::{ChainClient, LogQuery};
use crate::error::{Error, Result};

/// JSON-RPC client over HTTP, signing with a local private key
#[derive(Debug, Clone)]
pub struct RpcClient {
    provider: Arc<Provider<Http>>,
    wallet: LocalWallet,
}

impl RpcClient {
    /// Connects to `url` and checks it is reachable by asking for the chain id.
    /// The wallet is bound to that chain id for EIP-155 signing
    #[instrument(name = "rpc", skip(private_key))]
    pub async fn connect(url: &str, private_key: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(url).map_err(|e| Error::connection(url, e))?;

        let wallet: LocalWallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .map_err(|e: WalletError| {
                Error::connection(url, format!("invalid signing key: {}", e))
            })?;

        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| Error::connection(url, e))?
            .as_u64();
        let wallet = wallet.with_chain_id(chain_id);

        info!(chain_id, address = ?wallet.address(), "connected");

        Ok(Self {
            provider: Arc::new(provider),
            wallet,
        })
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        Ok(self.provider.get_balance(address, None).await?)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        Ok(self.provider.call(&tx, None).await?)
    }

    async fn logs(&self, query: LogQuery) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .address(query.address)
            .topic0(query.topic0)
            .from_block(query.from_block)
            .to_block(query.to_block);

        Ok(self.provider.get_logs(&filter).await?)
    }

    async fn watch_logs(
        &self,
        address: Address,
        topic0: H256,
        token: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<Log>> {
        let filter = Filter::new().address(address).topic0(topic0);

        // install the filter here so a failure reaches the caller instead of the polling task
        let id = self.provider.new_filter(FilterKind::Logs(&filter)).await?;
        let provider = self.provider.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut stream = FilterWatcher::<Http, Log>::new(id, &provider);

            loop {
                select! {
                    _ = token.cancelled() => break,
                    log = stream.next() => match log {
                        Some(log) => {
                            trace!(event = "log", ?address);
                            if tx.send(log).is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }

            if let Err(e) = provider.uninstall_filter(id).await {
                debug!("failed to uninstall log filter: {}", e);
            }
        });

        Ok(rx)
    }

    async fn send_transaction(&self, mut tx: TypedTransaction) -> Result<TransactionReceipt> {
        tx.set_from(self.wallet.address());
        tx.set_chain_id(self.wallet.chain_id());
        self.provider.fill_transaction(&mut tx, None).await?;

        let signature = self.wallet.sign_transaction(&tx).await?;
        let pending = self
            .provider
            .send_raw_transaction(tx.rlp_signed(&signature))
            .await?;

        let hash = *pending;
        info!(?hash, "transaction sent");

        let receipt = pending.confirmations(1).await?.ok_or(Error::Dropped(hash))?;
        info!(?hash, block = ?receipt.block_number, "transaction confirmed");

        Ok(receipt)
    }
}
