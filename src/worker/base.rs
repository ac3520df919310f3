use std::sync::Arc;

use ethers_core::{
    types::{transaction::eip2718::TypedTransaction, Address, TransactionReceipt},
    utils::format_ether,
};
use tracing::{error, info, instrument};

use super::{Scheduler, WorkerKind};
use crate::chain::ChainClient;
use crate::error::{Error, Result};

/// State every worker carries: its identity, the shared chain connection and its scheduler
#[derive(Debug)]
pub struct Base {
    kind: WorkerKind,
    client: Arc<dyn ChainClient>,
    scheduler: Scheduler,
}

impl Base {
    pub fn new(kind: WorkerKind, client: Arc<dyn ChainClient>) -> Self {
        Self {
            kind,
            client,
            scheduler: Scheduler::new(kind),
        }
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn client(&self) -> &Arc<dyn ChainClient> {
        &self.client
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn address(&self) -> Address {
        self.client.address()
    }

    /// Checks the connection and credential by reading the signer's balance
    #[instrument(name = "initialize", skip(self), fields(worker = %self.kind))]
    pub async fn initialize(&self) -> Result<()> {
        let address = self.client.address();
        let balance = self
            .client
            .balance(address)
            .await
            .map_err(|e| Error::connection(format!("{} balance query", self.kind), e))?;

        info!(?address, balance = %format_ether(balance), "initialized");

        Ok(())
    }

    /// Sends a transaction signed by this worker's credential and waits for one confirmation.
    /// Never retried
    #[instrument(skip(self, tx), fields(worker = %self.kind))]
    pub async fn submit_transaction(&self, tx: TypedTransaction) -> Result<TransactionReceipt> {
        self.client.send_transaction(tx).await.map_err(|e| {
            error!("transaction failed: {}", e);
            Error::transaction(e)
        })
    }
}
