use async_trait::async_trait;
use shared::{ReferralTxState, PROCESSING_TXID};
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{PendingReferral, Referral, ReferralId, UserId, UserWallet};
use crate::errors::Result;

/// Opens the database transaction a payout runs in.
#[async_trait]
pub trait PayoutStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn PayoutTransaction>>;
}

/// Operations available inside a payout transaction.
///
/// Dropping the transaction without calling `commit` rolls back every write,
/// including the PROCESSING claim.
#[async_trait]
pub trait PayoutTransaction: Send {
    /// Referral for this referred user whose txid is NULL or PROCESSING,
    /// locked for the rest of the transaction
    async fn find_claimable_referral(&mut self, referred_id: UserId) -> Result<Option<Referral>>;

    /// Wallets linked by any of the given users
    async fn find_wallets(&mut self, user_ids: &[UserId]) -> Result<Vec<UserWallet>>;

    /// Current txid state of the referral, `None` if the row no longer exists
    async fn tx_state(&mut self, referral_id: ReferralId) -> Result<Option<ReferralTxState>>;

    async fn set_tx_state(&mut self, referral_id: ReferralId, state: &ReferralTxState) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Non-transactional referral queries used by the retry sweeper
#[async_trait]
pub trait ReferralRepository: Send + Sync {
    /// Unpaid referrals with id above `after_id` where both the referrer and
    /// the referred user linked a wallet, oldest first
    async fn find_pending_referrals(
        &self,
        after_id: ReferralId,
        limit: i64,
    ) -> Result<Vec<PendingReferral>>;
}

pub struct PostgresPayoutStore {
    pool: PgPool,
}

impl PostgresPayoutStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PayoutStore for PostgresPayoutStore {
    async fn begin(&self) -> Result<Box<dyn PayoutTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresPayoutTransaction { tx }))
    }
}

pub struct PostgresPayoutTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PayoutTransaction for PostgresPayoutTransaction {
    async fn find_claimable_referral(&mut self, referred_id: UserId) -> Result<Option<Referral>> {
        // FOR UPDATE makes concurrent payouts for the same row queue behind
        // this transaction; when they resume the WHERE clause is re-checked
        // against the committed txid.
        let referral = sqlx::query_as::<_, Referral>(
            r#"
            SELECT id, referrer_id, referred_id, txid, created_at
            FROM referrals
            WHERE referred_id = $1
              AND (txid IS NULL OR txid = $2)
            ORDER BY id
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(referred_id)
        .bind(PROCESSING_TXID)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(referral)
    }

    async fn find_wallets(&mut self, user_ids: &[UserId]) -> Result<Vec<UserWallet>> {
        let wallets = sqlx::query_as::<_, UserWallet>(
            r#"
            SELECT user_id, address
            FROM user_wallets
            WHERE user_id = ANY($1)
            "#,
        )
        .bind(user_ids.to_vec())
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(wallets)
    }

    async fn tx_state(&mut self, referral_id: ReferralId) -> Result<Option<ReferralTxState>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as(r#"SELECT txid FROM referrals WHERE id = $1"#)
                .bind(referral_id)
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(row.map(|(txid,)| ReferralTxState::from_txid(txid.as_deref())))
    }

    async fn set_tx_state(&mut self, referral_id: ReferralId, state: &ReferralTxState) -> Result<()> {
        sqlx::query(r#"UPDATE referrals SET txid = $2 WHERE id = $1"#)
            .bind(referral_id)
            .bind(state.to_txid())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

pub struct PostgresReferralRepository {
    pool: PgPool,
}

impl PostgresReferralRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferralRepository for PostgresReferralRepository {
    async fn find_pending_referrals(
        &self,
        after_id: ReferralId,
        limit: i64,
    ) -> Result<Vec<PendingReferral>> {
        let referrals = sqlx::query_as::<_, PendingReferral>(
            r#"
            SELECT r.id, r.referred_id
            FROM referrals r
            JOIN user_wallets referee ON referee.user_id = r.referred_id
            JOIN user_wallets referrer ON referrer.user_id = r.referrer_id
            WHERE (r.txid IS NULL OR r.txid = $1)
              AND r.id > $2
            ORDER BY r.id
            LIMIT $3
            "#,
        )
        .bind(PROCESSING_TXID)
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(referrals)
    }
}
