//! EVM chain access for reward payouts
//!
//! `PayoutChain` is the seam between the payout logic and the network: one
//! signing provider serves both the reads (chain id, balance,
//! `hasPairBeenSent`) and the batched `send` call.

use alloy::{
    network::EthereumWallet,
    primitives::{Address, TxHash, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
    sol,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::chain_registry::ChainConfig;

sol! {
    #[sol(rpc)]
    contract ReferralPayout {
        function send(address[] calldata recipients, uint256[] calldata amounts) external payable;
        function hasPairBeenSent(address referrer, address referee) external view returns (bool);
    }
}

#[async_trait]
pub trait PayoutChain: Send + Sync {
    /// Address of the signing account, if the client has one
    fn operator_address(&self) -> Option<Address>;

    /// Chain id reported by the connected node
    async fn chain_id(&self) -> Result<u64>;

    async fn balance(&self, account: Address) -> Result<U256>;

    /// Submit `send(recipients, amounts)` with `value` attached. Returns as
    /// soon as the node accepts the transaction; does not wait for inclusion.
    async fn send_batch(
        &self,
        contract: Address,
        recipients: Vec<Address>,
        amounts: Vec<U256>,
        value: U256,
    ) -> Result<TxHash>;

    async fn has_pair_been_sent(
        &self,
        contract: Address,
        referrer: Address,
        referee: Address,
    ) -> Result<bool>;
}

/// Builds a signing chain client for a resolved chain
pub trait ChainConnector: Send + Sync {
    fn connect(&self, chain: &ChainConfig, private_key: &str) -> Result<Arc<dyn PayoutChain>>;
}

#[derive(Debug, Clone, Default)]
pub struct AlloyConnector;

impl ChainConnector for AlloyConnector {
    fn connect(&self, chain: &ChainConfig, private_key: &str) -> Result<Arc<dyn PayoutChain>> {
        let rpc_url = chain
            .rpc_url()
            .with_context(|| format!("chain {} has no RPC URL", chain.id))?;
        let url = reqwest::Url::parse(rpc_url).context("invalid RPC URL")?;

        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .context("invalid operator private key")?;
        let operator = signer.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::new(signer))
            .connect_http(url)
            .erased();

        Ok(Arc::new(AlloyPayoutChain { provider, operator }))
    }
}

pub struct AlloyPayoutChain {
    provider: DynProvider,
    operator: Address,
}

#[async_trait]
impl PayoutChain for AlloyPayoutChain {
    fn operator_address(&self) -> Option<Address> {
        Some(self.operator)
    }

    async fn chain_id(&self) -> Result<u64> {
        self.provider
            .get_chain_id()
            .await
            .context("eth_chainId failed")
    }

    async fn balance(&self, account: Address) -> Result<U256> {
        let balance = self
            .provider
            .get_balance(account)
            .await
            .context("eth_getBalance failed")?;
        Ok(balance)
    }

    async fn send_batch(
        &self,
        contract: Address,
        recipients: Vec<Address>,
        amounts: Vec<U256>,
        value: U256,
    ) -> Result<TxHash> {
        let payout = ReferralPayout::new(contract, self.provider.clone());

        let pending = payout
            .send(recipients, amounts)
            .value(value)
            .send()
            .await
            .context("referral payout submission failed")?;

        Ok(*pending.tx_hash())
    }

    async fn has_pair_been_sent(
        &self,
        contract: Address,
        referrer: Address,
        referee: Address,
    ) -> Result<bool> {
        let payout = ReferralPayout::new(contract, self.provider.clone());

        let sent = payout
            .hasPairBeenSent(referrer, referee)
            .call()
            .await
            .context("hasPairBeenSent call failed")?;

        Ok(sent)
    }
}
