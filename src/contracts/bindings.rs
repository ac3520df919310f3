use ethers_contract_derive::{EthCall, EthEvent};
use ethers_core::types::{Address, U256};

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "TipSent",
    abi = "TipSent(address,address,uint256,uint256,string,uint256)"
)]
pub struct TipSentFilter {
    #[ethevent(indexed)]
    pub tipper: Address,
    #[ethevent(indexed)]
    pub creator: Address,
    pub amount: U256,
    pub platform_fee: U256,
    pub message: String,
    pub nonce: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(name = "NameRegistered", abi = "NameRegistered(address,string)")]
pub struct NameRegisteredFilter {
    #[ethevent(indexed)]
    pub user: Address,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, EthCall)]
#[ethcall(name = "getCreatorStats", abi = "getCreatorStats(address)")]
pub struct GetCreatorStatsCall {
    pub creator: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, EthCall)]
#[ethcall(name = "getUserStake", abi = "getUserStake(address)")]
pub struct GetUserStakeCall {
    pub user: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, EthCall)]
#[ethcall(name = "resolveName", abi = "resolveName(string)")]
pub struct ResolveNameCall {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, EthCall)]
#[ethcall(name = "getName", abi = "getName(address)")]
pub struct GetNameCall {
    pub addr: Address,
}
