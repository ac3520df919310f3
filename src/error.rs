use std::fmt::Display;

use ethers_providers::ProviderError;
use ethers_signers::WalletError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Abi(#[from] ethers_core::abi::Error),

    #[error(transparent)]
    Decode(#[from] ethers_core::abi::AbiError),

    #[error(transparent)]
    Signer(#[from] WalletError),

    #[error("transaction failed: {0}")]
    Transaction(#[source] Box<Error>),

    #[error("transaction {0:?} dropped from mempool")]
    Dropped(ethers_core::types::H256),

    #[error("cursor store: {0}")]
    Store(#[from] std::io::Error),

    #[error("worker manager not initialized, call initialize() first")]
    NotInitialized,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn connection(context: impl Display, cause: impl Display) -> Self {
        Self::Connection(format!("{}: {}", context, cause))
    }

    /// Wraps any failure that happened while submitting or confirming a transaction
    pub(crate) fn transaction(cause: Error) -> Self {
        match cause {
            e @ Self::Transaction(_) => e,
            e => Self::Transaction(Box::new(e)),
        }
    }
}
