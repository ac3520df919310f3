#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use ethers_contract::EthEvent;
use ethers_core::{
    abi::{encode, AbiEncode, Token},
    types::{
        transaction::eip2718::TypedTransaction, Address, Bytes, Log, TransactionReceipt, H256,
        U256, U64,
    },
};
use ethers_providers::ProviderError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use super::{ChainClient, LogQuery};
use crate::contracts::{NameRegisteredFilter, TipSentFilter};
use crate::error::{Error, Result};

/// In-memory chain for tests
///
/// Read calls are answered from responses registered with [`MockChain::on_call`], keyed by
/// contract and calldata. Unregistered calls fail like an RPC error would.
#[derive(Debug)]
pub struct MockChain {
    address: Address,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    head: u64,
    balance: U256,
    logs: Vec<Log>,
    calls: HashMap<(Address, Vec<u8>), Bytes>,
    watchers: Vec<(Address, H256, UnboundedSender<Log>)>,
    call_count: usize,
    log_queries: Vec<LogQuery>,
    sent: Vec<TypedTransaction>,
    fail_balance: bool,
    fail_logs: bool,
    fail_send: bool,
    max_log_range: Option<u64>,
    head_on_watch: Option<u64>,
    watched_after: Vec<usize>,
}

fn rpc_error(msg: &str) -> Error {
    Error::Provider(ProviderError::CustomError(msg.to_owned()))
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new(Address::repeat_byte(0xaa))
    }
}

impl MockChain {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            state: Mutex::new(State {
                balance: U256::exp10(18),
                ..Default::default()
            }),
        }
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().unwrap().head = head;
    }

    pub fn fail_balance(&self, fail: bool) {
        self.state.lock().unwrap().fail_balance = fail;
    }

    pub fn fail_logs(&self, fail: bool) {
        self.state.lock().unwrap().fail_logs = fail;
    }

    pub fn fail_send(&self, fail: bool) {
        self.state.lock().unwrap().fail_send = fail;
    }

    /// Rejects log queries spanning more than `blocks` blocks, like public RPC endpoints do
    pub fn limit_log_range(&self, blocks: u64) {
        self.state.lock().unwrap().max_log_range = Some(blocks);
    }

    /// Moves the head to `head` as soon as a log subscription is opened
    pub fn set_head_on_watch(&self, head: u64) {
        self.state.lock().unwrap().head_on_watch = Some(head);
    }

    /// For each opened subscription, how many log queries had been made before it
    pub fn watched_after(&self) -> Vec<usize> {
        self.state.lock().unwrap().watched_after.clone()
    }

    pub fn on_call(&self, to: Address, call: impl AbiEncode, output: impl AbiEncode) {
        self.state
            .lock()
            .unwrap()
            .calls
            .insert((to, call.encode()), output.encode().into());
    }

    pub fn clear_call(&self, to: Address, call: impl AbiEncode) {
        self.state.lock().unwrap().calls.remove(&(to, call.encode()));
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().call_count
    }

    pub fn log_queries(&self) -> Vec<LogQuery> {
        self.state.lock().unwrap().log_queries.clone()
    }

    pub fn sent(&self) -> Vec<TypedTransaction> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn push_log(&self, log: Log) {
        let mut state = self.state.lock().unwrap();
        state
            .watchers
            .retain(|(address, topic0, tx)| {
                if log.address == *address && log.topics.first() == Some(topic0) {
                    tx.send(log.clone()).is_ok()
                } else {
                    !tx.is_closed()
                }
            });
        state.logs.push(log);
    }

    pub fn push_tip(
        &self,
        contract: Address,
        block: u64,
        tipper: Address,
        creator: Address,
        amount: U256,
    ) -> Log {
        let data = encode(&[
            Token::Uint(amount),
            Token::Uint(amount / 100),
            Token::String("gm".to_owned()),
            Token::Uint(U256::from(block)),
        ]);
        let log = self.log(
            contract,
            block,
            vec![TipSentFilter::signature(), tipper.into(), creator.into()],
            data,
        );
        self.push_log(log.clone());
        log
    }

    pub fn push_registration(&self, contract: Address, block: u64, user: Address, name: &str) {
        let data = encode(&[Token::String(name.to_owned())]);
        let log = self.log(
            contract,
            block,
            vec![NameRegisteredFilter::signature(), user.into()],
            data,
        );
        self.push_log(log);
    }

    /// A log whose topic matches `TipSent` but whose data cannot be decoded
    pub fn push_garbage_tip(&self, contract: Address, block: u64) {
        let log = self.log(
            contract,
            block,
            vec![
                TipSentFilter::signature(),
                H256::repeat_byte(1),
                H256::repeat_byte(2),
            ],
            vec![0xde, 0xad],
        );
        self.push_log(log);
    }

    fn log(&self, address: Address, block: u64, topics: Vec<H256>, data: Vec<u8>) -> Log {
        let index = self.state.lock().unwrap().logs.len();
        Log {
            address,
            topics,
            data: data.into(),
            block_number: Some(U64::from(block)),
            transaction_hash: Some(H256::from_low_u64_be(index as u64 + 1)),
            log_index: Some(U256::from(index)),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn address(&self) -> Address {
        self.address
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().head)
    }

    async fn balance(&self, _address: Address) -> Result<U256> {
        let state = self.state.lock().unwrap();
        if state.fail_balance {
            return Err(rpc_error("connection refused"));
        }
        Ok(state.balance)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let mut state = self.state.lock().unwrap();
        state.call_count += 1;
        state
            .calls
            .get(&(to, data.to_vec()))
            .cloned()
            .ok_or_else(|| rpc_error("execution reverted"))
    }

    async fn logs(&self, query: LogQuery) -> Result<Vec<Log>> {
        let mut state = self.state.lock().unwrap();
        state.log_queries.push(query);
        if state.fail_logs {
            return Err(rpc_error("query timeout"));
        }
        if let Some(max) = state.max_log_range {
            if query.to_block.saturating_sub(query.from_block) >= max {
                return Err(rpc_error("block range too large"));
            }
        }

        Ok(state
            .logs
            .iter()
            .filter(|l| l.address == query.address)
            .filter(|l| l.topics.first() == Some(&query.topic0))
            .filter(|l| {
                let block = l.block_number.map(|b| b.as_u64()).unwrap_or_default();
                (query.from_block..=query.to_block).contains(&block)
            })
            .cloned()
            .collect())
    }

    async fn watch_logs(
        &self,
        address: Address,
        topic0: H256,
        _token: CancellationToken,
    ) -> Result<UnboundedReceiver<Log>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap();
        state.watchers.push((address, topic0, tx));

        let queries = state.log_queries.len();
        state.watched_after.push(queries);
        if let Some(head) = state.head_on_watch.take() {
            state.head = head;
        }
        Ok(rx)
    }

    async fn send_transaction(&self, tx: TypedTransaction) -> Result<TransactionReceipt> {
        let mut state = self.state.lock().unwrap();
        if state.fail_send {
            return Err(rpc_error("insufficient funds for gas"));
        }
        state.sent.push(tx);

        Ok(TransactionReceipt {
            block_number: Some(U64::from(state.head)),
            status: Some(U64::one()),
            ..Default::default()
        })
    }
}
