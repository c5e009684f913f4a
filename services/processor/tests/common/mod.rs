//! Common test doubles and fixtures for integration tests
#![allow(dead_code)]

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

use referral_processor::{
    chain_client::{ChainConnector, PayoutChain},
    chain_registry::{ChainConfig, ChainContracts, StaticChainRegistry},
    config_cache::ConfigCache,
    domain::{PendingReferral, Referral, ReferralId, RewardAmount, UserId, UserWallet},
    errors::Result,
    repository::{PayoutStore, PayoutTransaction, ReferralRepository, SettingsRepository},
    reward_settings::RewardSettings,
    ReferralPayoutService,
};
use shared::{
    ReferralTxState, PROCESSING_TXID, REFEREE_REWARD_SETTING, REFERRER_REWARD_SETTING,
    REWARD_CHAIN_ID,
};

/// Anvil development key #0
pub const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn mock_tx_hash() -> TxHash {
    TxHash::repeat_byte(0xab)
}

pub fn payout_contract() -> Address {
    Address::repeat_byte(0xc0)
}

pub fn operator() -> Address {
    Address::repeat_byte(0xaa)
}

/// Deterministic wallet address for a user
pub fn wallet_address(user_id: UserId) -> Address {
    format!("0x{:040x}", user_id).parse().unwrap()
}

/// Token amount in base units
pub fn tokens(amount: &str) -> U256 {
    amount.parse::<RewardAmount>().unwrap().base_units()
}

pub fn affiliates_chain(contract: Option<Address>) -> ChainConfig {
    ChainConfig {
        id: REWARD_CHAIN_ID.to_string(),
        name: "Affiliates".to_string(),
        chain_id: 1001,
        rpc_urls: vec!["http://localhost:8545".to_string()],
        explorer_api_url: None,
        contracts: ChainContracts {
            referral_payout: contract,
        },
    }
}

// ---------------------------------------------------------------------------
// In-memory database
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DbState {
    referrals: BTreeMap<ReferralId, Referral>,
    wallets: HashMap<UserId, String>,
    next_id: ReferralId,
    /// Every committed txid write, in commit order
    history: Vec<(ReferralId, Option<String>)>,
}

#[derive(Default)]
struct DbInner {
    state: Mutex<DbState>,
    row_locks: Mutex<HashMap<ReferralId, Arc<tokio::sync::Mutex<()>>>>,
    fail_begin: AtomicBool,
    commits: AtomicUsize,
    /// Tx hash another writer commits right before the next txid re-read
    paid_before_recheck: Mutex<Option<String>>,
}

impl DbInner {
    fn row_lock(&self, referral_id: ReferralId) -> Arc<tokio::sync::Mutex<()>> {
        self.row_locks
            .lock()
            .unwrap()
            .entry(referral_id)
            .or_default()
            .clone()
    }
}

fn is_claimable(txid: Option<&str>) -> bool {
    matches!(txid, None | Some(PROCESSING_TXID))
}

/// Postgres stand-in: writes are buffered per transaction and applied on
/// commit; a locked referral row stays locked until its transaction commits
/// or is dropped, like `SELECT ... FOR UPDATE`.
#[derive(Clone, Default)]
pub struct InMemoryDb {
    inner: Arc<DbInner>,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_referral(&self, referrer_id: UserId, referred_id: UserId) -> ReferralId {
        self.add_referral_with_txid(referrer_id, referred_id, None)
    }

    pub fn add_referral_with_txid(
        &self,
        referrer_id: UserId,
        referred_id: UserId,
        txid: Option<&str>,
    ) -> ReferralId {
        let mut state = self.inner.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.referrals.insert(
            id,
            Referral {
                id,
                referrer_id,
                referred_id,
                txid: txid.map(str::to_string),
                created_at: Utc::now(),
            },
        );
        id
    }

    pub fn link_wallet(&self, user_id: UserId) {
        self.link_wallet_address(user_id, &wallet_address(user_id).to_string());
    }

    pub fn link_wallet_address(&self, user_id: UserId, address: &str) {
        self.inner
            .state
            .lock()
            .unwrap()
            .wallets
            .insert(user_id, address.to_string());
    }

    pub fn txid(&self, referral_id: ReferralId) -> Option<String> {
        self.inner.state.lock().unwrap().referrals[&referral_id]
            .txid
            .clone()
    }

    /// Committed non-sentinel txids ever written for a referral
    pub fn finalized_txids(&self, referral_id: ReferralId) -> Vec<String> {
        self.inner
            .state
            .lock()
            .unwrap()
            .history
            .iter()
            .filter(|(id, _)| *id == referral_id)
            .filter_map(|(_, txid)| txid.clone())
            .filter(|txid| txid != PROCESSING_TXID)
            .collect()
    }

    pub fn commit_count(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    pub fn fail_begin(&self, fail: bool) {
        self.inner.fail_begin.store(fail, Ordering::SeqCst);
    }

    /// Simulate a concurrent payout that finalizes the row after it was
    /// found claimable but before the in-transaction re-read
    pub fn finalize_before_recheck(&self, tx_hash: &str) {
        *self.inner.paid_before_recheck.lock().unwrap() = Some(tx_hash.to_string());
    }
}

#[async_trait]
impl PayoutStore for InMemoryDb {
    async fn begin(&self) -> Result<Box<dyn PayoutTransaction>> {
        if self.inner.fail_begin.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut.into());
        }

        Ok(Box::new(InMemoryTransaction {
            db: self.inner.clone(),
            locks: Vec::new(),
            writes: HashMap::new(),
        }))
    }
}

#[async_trait]
impl ReferralRepository for InMemoryDb {
    async fn find_pending_referrals(
        &self,
        after_id: ReferralId,
        limit: i64,
    ) -> Result<Vec<PendingReferral>> {
        let state = self.inner.state.lock().unwrap();
        Ok(state
            .referrals
            .range(after_id + 1..)
            .map(|(_, referral)| referral)
            .filter(|referral| is_claimable(referral.txid.as_deref()))
            .filter(|referral| {
                state.wallets.contains_key(&referral.referrer_id)
                    && state.wallets.contains_key(&referral.referred_id)
            })
            .map(|referral| PendingReferral {
                id: referral.id,
                referred_id: referral.referred_id,
            })
            .take(limit.max(0) as usize)
            .collect())
    }
}

struct InMemoryTransaction {
    db: Arc<DbInner>,
    locks: Vec<OwnedMutexGuard<()>>,
    writes: HashMap<ReferralId, Option<String>>,
}

impl InMemoryTransaction {
    fn next_candidate(&self, referred_id: UserId) -> Option<ReferralId> {
        let state = self.db.state.lock().unwrap();
        state
            .referrals
            .values()
            .find(|referral| {
                referral.referred_id == referred_id && is_claimable(referral.txid.as_deref())
            })
            .map(|referral| referral.id)
    }

    fn committed(&self, referral_id: ReferralId) -> Option<Referral> {
        self.db
            .state
            .lock()
            .unwrap()
            .referrals
            .get(&referral_id)
            .cloned()
    }
}

#[async_trait]
impl PayoutTransaction for InMemoryTransaction {
    async fn find_claimable_referral(&mut self, referred_id: UserId) -> Result<Option<Referral>> {
        loop {
            let Some(referral_id) = self.next_candidate(referred_id) else {
                return Ok(None);
            };

            let guard = self.db.row_lock(referral_id).lock_owned().await;

            // Re-evaluate the filter against the row as committed by whoever held the lock
            match self.committed(referral_id) {
                Some(referral) if is_claimable(referral.txid.as_deref()) => {
                    self.locks.push(guard);
                    return Ok(Some(referral));
                }
                _ => continue,
            }
        }
    }

    async fn find_wallets(&mut self, user_ids: &[UserId]) -> Result<Vec<UserWallet>> {
        let state = self.db.state.lock().unwrap();
        Ok(user_ids
            .iter()
            .filter_map(|user_id| {
                state.wallets.get(user_id).map(|address| UserWallet {
                    user_id: *user_id,
                    address: address.clone(),
                })
            })
            .collect())
    }

    async fn tx_state(&mut self, referral_id: ReferralId) -> Result<Option<ReferralTxState>> {
        if let Some(txid) = self.writes.get(&referral_id) {
            return Ok(Some(ReferralTxState::from_txid(txid.as_deref())));
        }
        let concurrent = self.db.paid_before_recheck.lock().unwrap().take();
        if let Some(tx_hash) = concurrent {
            let mut state = self.db.state.lock().unwrap();
            if let Some(referral) = state.referrals.get_mut(&referral_id) {
                referral.txid = Some(tx_hash.clone());
            }
            state.history.push((referral_id, Some(tx_hash)));
        }
        Ok(self
            .committed(referral_id)
            .map(|referral| ReferralTxState::from_txid(referral.txid.as_deref())))
    }

    async fn set_tx_state(&mut self, referral_id: ReferralId, state: &ReferralTxState) -> Result<()> {
        self.writes.insert(referral_id, state.to_txid());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        {
            let mut state = self.db.state.lock().unwrap();
            for (referral_id, txid) in &self.writes {
                if let Some(referral) = state.referrals.get_mut(referral_id) {
                    referral.txid = txid.clone();
                }
                state.history.push((*referral_id, txid.clone()));
            }
        }
        self.db.commits.fetch_add(1, Ordering::SeqCst);
        // Row locks are released when `self` drops
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemorySettings {
    values: Mutex<HashMap<String, String>>,
    point_lookups: AtomicUsize,
    batch_lookups: AtomicUsize,
}

impl InMemorySettings {
    pub fn with_rewards(referrer: &str, referee: &str) -> Self {
        let settings = Self::default();
        settings.set(REFERRER_REWARD_SETTING, referrer);
        settings.set(REFEREE_REWARD_SETTING, referee);
        settings
    }

    pub fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, key: &str) {
        self.values.lock().unwrap().remove(key);
    }

    pub fn point_lookups(&self) -> usize {
        self.point_lookups.load(Ordering::SeqCst)
    }

    pub fn batch_lookups(&self) -> usize {
        self.batch_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettings {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.point_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn get_settings(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        self.batch_lookups.fetch_add(1, Ordering::SeqCst);
        let values = self.values.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSend {
    pub contract: Address,
    pub recipients: Vec<Address>,
    pub amounts: Vec<U256>,
    pub value: U256,
}

#[derive(Debug, Clone, Default)]
struct MockChainState {
    chain_id: u64,
    balance: U256,
    fail_send: bool,
    fail_balance: bool,
    pair_sent: bool,
    fail_pair_check: bool,
    send_delay: Duration,
}

/// Scripted payout chain that records every submitted send
pub struct MockChain {
    operator: Option<Address>,
    state: Mutex<MockChainState>,
    sends: Mutex<Vec<RecordedSend>>,
}

impl MockChain {
    pub fn with_balance(balance: U256) -> Self {
        Self {
            operator: Some(operator()),
            state: Mutex::new(MockChainState {
                chain_id: 1001,
                balance,
                ..Default::default()
            }),
            sends: Mutex::new(Vec::new()),
        }
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.state.lock().unwrap().chain_id = chain_id;
    }

    pub fn set_balance(&self, balance: U256) {
        self.state.lock().unwrap().balance = balance;
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().unwrap().fail_send = fail;
    }

    pub fn fail_balance_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_balance = fail;
    }

    pub fn set_pair_sent(&self, sent: bool) {
        self.state.lock().unwrap().pair_sent = sent;
    }

    pub fn fail_pair_checks(&self, fail: bool) {
        self.state.lock().unwrap().fail_pair_check = fail;
    }

    pub fn set_send_delay(&self, delay: Duration) {
        self.state.lock().unwrap().send_delay = delay;
    }

    pub fn sends(&self) -> Vec<RecordedSend> {
        self.sends.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().unwrap().len()
    }

    fn snapshot(&self) -> MockChainState {
        self.state.lock().unwrap().clone()
    }
}

#[async_trait]
impl PayoutChain for MockChain {
    fn operator_address(&self) -> Option<Address> {
        self.operator
    }

    async fn chain_id(&self) -> anyhow::Result<u64> {
        Ok(self.snapshot().chain_id)
    }

    async fn balance(&self, _account: Address) -> anyhow::Result<U256> {
        let state = self.snapshot();
        if state.fail_balance {
            anyhow::bail!("connection refused");
        }
        Ok(state.balance)
    }

    async fn send_batch(
        &self,
        contract: Address,
        recipients: Vec<Address>,
        amounts: Vec<U256>,
        value: U256,
    ) -> anyhow::Result<TxHash> {
        let delay = self.snapshot().send_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.fail_send {
            anyhow::bail!("execution reverted");
        }
        state.balance = state.balance.saturating_sub(value);

        self.sends.lock().unwrap().push(RecordedSend {
            contract,
            recipients,
            amounts,
            value,
        });
        Ok(mock_tx_hash())
    }

    async fn has_pair_been_sent(
        &self,
        _contract: Address,
        _referrer: Address,
        _referee: Address,
    ) -> anyhow::Result<bool> {
        let state = self.snapshot();
        if state.fail_pair_check {
            anyhow::bail!("eth_call failed");
        }
        Ok(state.pair_sent)
    }
}

pub struct MockConnector {
    chain: Arc<MockChain>,
    fail: AtomicBool,
    keys: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(chain: Arc<MockChain>) -> Self {
        Self {
            chain,
            fail: AtomicBool::new(false),
            keys: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

impl ChainConnector for MockConnector {
    fn connect(&self, _chain: &ChainConfig, private_key: &str) -> anyhow::Result<Arc<dyn PayoutChain>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("invalid RPC URL");
        }
        self.keys.lock().unwrap().push(private_key.to_string());

        let chain: Arc<dyn PayoutChain> = self.chain.clone();
        Ok(chain)
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// Test fixture: referral store, settings, chain and connector wired together.
///
/// Defaults: rewards 5 / 2, operator balance 10, affiliates chain with a
/// payout contract, operator key configured.
pub struct TestContext {
    pub db: InMemoryDb,
    pub settings: Arc<InMemorySettings>,
    pub chain: Arc<MockChain>,
    pub connector: Arc<MockConnector>,
}

impl TestContext {
    pub fn new() -> Self {
        let chain = Arc::new(MockChain::with_balance(tokens("10")));
        Self {
            db: InMemoryDb::new(),
            settings: Arc::new(InMemorySettings::with_rewards("5", "2")),
            connector: Arc::new(MockConnector::new(chain.clone())),
            chain,
        }
    }

    /// Referral `referrer_id -> referred_id` with both wallets linked
    pub fn seed_linked_referral(&self, referrer_id: UserId, referred_id: UserId) -> ReferralId {
        let id = self.db.add_referral(referrer_id, referred_id);
        self.db.link_wallet(referrer_id);
        self.db.link_wallet(referred_id);
        id
    }

    pub fn reward_settings(&self) -> RewardSettings {
        RewardSettings::new(
            Arc::new(ConfigCache::new(Duration::from_secs(60))),
            self.settings.clone(),
        )
    }

    pub fn service(&self) -> ReferralPayoutService {
        self.service_with(
            StaticChainRegistry::new(vec![affiliates_chain(Some(payout_contract()))]),
            Some(DEV_KEY),
        )
    }

    pub fn service_with(
        &self,
        chains: StaticChainRegistry,
        operator_key: Option<&str>,
    ) -> ReferralPayoutService {
        ReferralPayoutService::new(
            Arc::new(self.db.clone()),
            Arc::new(chains),
            self.connector.clone(),
            self.reward_settings(),
            operator_key.map(str::to_string),
        )
    }
}
