//! Chain/contract resolution
//!
//! Maps a logical chain identifier to its RPC endpoints and contract
//! addresses. Injected into the payout service so tests can supply their own
//! chains.

use alloy::primitives::Address;
use std::collections::HashMap;

use crate::config::ChainSettings;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainContracts {
    /// Batch-send contract used for referral rewards
    pub referral_payout: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub id: String,
    pub name: String,
    pub chain_id: u64,
    pub rpc_urls: Vec<String>,
    pub explorer_api_url: Option<String>,
    pub contracts: ChainContracts,
}

impl ChainConfig {
    /// Primary RPC endpoint
    pub fn rpc_url(&self) -> Option<&str> {
        self.rpc_urls.first().map(String::as_str)
    }

    /// Payout contract address, treating the zero address as unset
    pub fn payout_contract(&self) -> Option<Address> {
        self.contracts
            .referral_payout
            .filter(|address| *address != Address::ZERO)
    }
}

impl From<&ChainSettings> for ChainConfig {
    fn from(settings: &ChainSettings) -> Self {
        Self {
            id: settings.id.clone(),
            name: settings.name.clone(),
            chain_id: settings.chain_id,
            rpc_urls: settings.rpc_urls.clone(),
            explorer_api_url: settings.explorer_api_url.clone(),
            contracts: ChainContracts {
                referral_payout: settings.payout_contract,
            },
        }
    }
}

pub trait ChainRegistry: Send + Sync {
    fn get_chain(&self, id: &str) -> Option<ChainConfig>;
}

/// Registry backed by a fixed set of chains known at start-up
#[derive(Debug, Clone, Default)]
pub struct StaticChainRegistry {
    chains: HashMap<String, ChainConfig>,
}

impl StaticChainRegistry {
    pub fn new(chains: impl IntoIterator<Item = ChainConfig>) -> Self {
        Self {
            chains: chains
                .into_iter()
                .map(|chain| (chain.id.clone(), chain))
                .collect(),
        }
    }

    pub fn from_settings(settings: Option<&ChainSettings>) -> Self {
        Self::new(settings.map(ChainConfig::from))
    }
}

impl ChainRegistry for StaticChainRegistry {
    fn get_chain(&self, id: &str) -> Option<ChainConfig> {
        self.chains.get(id).cloned()
    }
}
