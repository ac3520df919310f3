mod roster;

use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use ethers_core::{types::Address, types::U256, utils::parse_ether};
use serde::{Deserialize, Deserializer};

pub use self::roster::RosterConfig;

#[derive(Debug, clap::Parser)]
pub struct Args {
    #[clap(
        long,
        default_value = "tipstream-agents.toml",
        env = "TIPSTREAM_AGENTS_CONFIG"
    )]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Run every agent until interrupted (default)
    Run,

    /// Resolve a registered name to its address
    ResolveName { name: String },

    /// Resolve an address to its registered name
    ResolveAddress { address: Address },
}

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    #[serde(default)]
    pub chain: ChainConfig,

    pub contracts: ContractsConfig,

    #[serde(default)]
    pub tip_monitor: TipMonitorConfig,

    #[serde(default)]
    pub reward_distribution: RewardDistributionConfig,

    #[serde(default)]
    pub name_service: NameServiceConfig,

    #[serde(default)]
    pub store: Option<StoreConfig>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ChainConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ContractsConfig {
    pub stream_tipping: Address,
    pub mate_integration: Address,
}

#[derive(Deserialize, Clone, Debug)]
pub struct TipMonitorConfig {
    /// Tips at or above this amount (in ether) raise a notification
    #[serde(default = "default_tip_threshold", deserialize_with = "ether")]
    pub threshold: U256,

    pub interval_ms: Option<u64>,

    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Widest block range requested in a single log query
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RewardDistributionConfig {
    #[serde(default = "default_reward_pool", deserialize_with = "ether")]
    pub reward_pool: U256,

    /// Minimum stake (in ether) for a creator to take part in a distribution
    #[serde(default = "default_distribution_threshold", deserialize_with = "ether")]
    pub threshold: U256,

    pub interval_ms: Option<u64>,

    #[serde(flatten)]
    pub roster: RosterConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NameServiceConfig {
    pub interval_ms: Option<u64>,

    #[serde(default = "default_lookback_blocks")]
    pub lookback_blocks: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Config {
    pub fn read_from(path: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(&std::fs::read_to_string(path)?)?;
        config.reward_distribution.roster.preload()?;

        Ok(config)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

impl ChainConfig {
    pub fn private_key(&self) -> Result<String> {
        std::env::var(&self.private_key_env)
            .map_err(|_| eyre!("signing key not set. export {}", self.private_key_env))
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            private_key_env: default_private_key_env(),
        }
    }
}

impl Default for TipMonitorConfig {
    fn default() -> Self {
        Self {
            threshold: default_tip_threshold(),
            interval_ms: None,
            history_size: default_history_size(),
            max_block_range: default_max_block_range(),
        }
    }
}

impl Default for RewardDistributionConfig {
    fn default() -> Self {
        Self {
            reward_pool: default_reward_pool(),
            threshold: default_distribution_threshold(),
            interval_ms: None,
            roster: Default::default(),
        }
    }
}

impl Default for NameServiceConfig {
    fn default() -> Self {
        Self {
            interval_ms: None,
            lookback_blocks: default_lookback_blocks(),
        }
    }
}

fn ether<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<U256, D::Error> {
    let amount = String::deserialize(deserializer)?;
    parse_ether(amount.trim()).map_err(serde::de::Error::custom)
}

fn default_status_interval_ms() -> u64 {
    60_000
}

fn default_rpc_url() -> String {
    "https://rpc.sepolia.org".to_owned()
}

fn default_private_key_env() -> String {
    "AGENT_PRIVATE_KEY".to_owned()
}

// 0.1 ether
fn default_tip_threshold() -> U256 {
    U256::exp10(17)
}

// 1 ether
fn default_reward_pool() -> U256 {
    U256::exp10(18)
}

// 0.5 ether
fn default_distribution_threshold() -> U256 {
    U256::exp10(17) * 5
}

fn default_history_size() -> usize {
    1000
}

fn default_max_block_range() -> u64 {
    2000
}

fn default_lookback_blocks() -> u64 {
    1000
}
