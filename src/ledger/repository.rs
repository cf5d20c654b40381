use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::models::*;
use super::store::{PaymentStore, StoreError};

/// Postgres-backed payment store
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Column list shared by every payment query; the target column is aliased to `target_id`
fn payment_columns(ledger: Ledger) -> String {
    format!(
        "id, {} AS target_id, weekend_id, payment_intent_id, gross_amount, net_amount, \
         stripe_fee, charge_id, balance_transaction_id, payout_id, deposited_at, \
         payment_method, payment_owner, created_at",
        ledger.target_column()
    )
}

const PAYOUT_COLUMNS: &str =
    "id, payout_id, amount, currency, status, arrival_date, transaction_count, created_at";

#[async_trait]
impl PaymentStore for PgPaymentStore {
    // ========== PAYMENT LEDGERS ==========

    async fn find_payment(
        &self,
        ledger: Ledger,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentRow>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE payment_intent_id = $1",
            payment_columns(ledger),
            ledger.table()
        );

        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(payment_intent_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn insert_payment(
        &self,
        payment: &NewPayment,
        scope: AccessScope,
    ) -> Result<PaymentRow, StoreError> {
        let ledger = payment.ledger;
        let sql = format!(
            r#"
            INSERT INTO {} ({}, weekend_id, payment_intent_id, gross_amount, stripe_fee,
                net_amount, charge_id, balance_transaction_id, payment_method, payment_owner)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            ledger.table(),
            ledger.target_column(),
            payment_columns(ledger)
        );
        let fees = payment.fees.as_ref();

        let query = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(payment.target_id)
            .bind(payment.weekend_id)
            .bind(&payment.payment_intent_id)
            .bind(payment.gross_amount)
            .bind(fees.map(|f| f.stripe_fee))
            .bind(fees.map(|f| f.net_amount))
            .bind(fees.map(|f| f.charge_id.clone()))
            .bind(fees.map(|f| f.balance_transaction_id.clone()))
            .bind(payment.payment_method)
            .bind(payment.payment_owner.as_deref());

        let row = match scope {
            AccessScope::Service => query.fetch_one(&self.pool).await?,
            AccessScope::Session => {
                let mut tx = self.pool.begin().await?;
                sqlx::query("SET LOCAL ROLE authenticated")
                    .execute(&mut *tx)
                    .await?;
                let row = query.fetch_one(&mut *tx).await?;
                tx.commit().await?;
                row
            }
        };

        debug!(
            ledger = %ledger,
            payment_intent_id = %row.payment_intent_id,
            "Inserted payment row {}",
            row.id
        );

        Ok(row)
    }

    async fn update_payment(
        &self,
        ledger: Ledger,
        payment_intent_id: &str,
        update: &PaymentUpdate,
    ) -> Result<Option<PaymentRow>, StoreError> {
        let sql = format!(
            r#"
            UPDATE {}
            SET stripe_fee = COALESCE($2, stripe_fee),
                net_amount = COALESCE($3, net_amount),
                charge_id = COALESCE($4, charge_id),
                balance_transaction_id = COALESCE($5, balance_transaction_id),
                payout_id = COALESCE($6, payout_id),
                deposited_at = COALESCE($7, deposited_at),
                updated_at = NOW()
            WHERE payment_intent_id = $1
            RETURNING {}
            "#,
            ledger.table(),
            payment_columns(ledger)
        );

        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(payment_intent_id)
            .bind(update.stripe_fee)
            .bind(update.net_amount)
            .bind(update.charge_id.as_deref())
            .bind(update.balance_transaction_id.as_deref())
            .bind(update.payout_id.as_deref())
            .bind(update.deposited_at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    // ========== CANDIDATES & ROSTER ==========

    async fn find_candidate(&self, candidate_id: Uuid) -> Result<Option<Candidate>, StoreError> {
        let candidate = sqlx::query_as::<_, Candidate>(
            r#"
            SELECT id, status, weekend_id
            FROM candidates
            WHERE id = $1
            "#,
        )
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(candidate)
    }

    async fn update_candidate_status(
        &self,
        candidate_id: Uuid,
        status: CandidateStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE candidates
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(candidate_id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_roster_record(
        &self,
        user_id: Uuid,
        weekend_id: Uuid,
    ) -> Result<Option<RosterRecord>, StoreError> {
        let record = sqlx::query_as::<_, RosterRecord>(
            r#"
            SELECT id, user_id, weekend_id, status
            FROM weekend_roster
            WHERE user_id = $1 AND weekend_id = $2
            "#,
        )
        .bind(user_id)
        .bind(weekend_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update_roster_status(
        &self,
        roster_id: Uuid,
        status: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE weekend_roster
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(roster_id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ========== PAYOUTS ==========

    async fn insert_payout(&self, payout: &NewPayout) -> Result<PayoutRecord, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO online_payment_payouts
                (payout_id, amount, currency, status, arrival_date, transaction_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        );

        let record = sqlx::query_as::<_, PayoutRecord>(&sql)
            .bind(&payout.payout_id)
            .bind(payout.amount)
            .bind(&payout.currency)
            .bind(&payout.status)
            .bind(payout.arrival_date)
            .bind(payout.transaction_count)
            .fetch_one(&self.pool)
            .await?;

        Ok(record)
    }

    async fn find_payout(&self, payout_id: &str) -> Result<Option<PayoutRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM online_payment_payouts WHERE payout_id = $1",
            PAYOUT_COLUMNS
        );

        let record = sqlx::query_as::<_, PayoutRecord>(&sql)
            .bind(payout_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn insert_payout_transaction(
        &self,
        transaction: &NewPayoutTransaction,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO online_payment_payout_transactions
                (payout_record_id, payment_intent_id, charge_id, balance_transaction_id,
                 gross_amount, stripe_fee, net_amount, candidate_payment_id, team_payment_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(transaction.payout_record_id)
        .bind(transaction.payment_intent_id.as_deref())
        .bind(&transaction.charge_id)
        .bind(&transaction.balance_transaction_id)
        .bind(transaction.gross_amount)
        .bind(transaction.stripe_fee)
        .bind(transaction.net_amount)
        .bind(transaction.candidate_payment_id)
        .bind(transaction.team_payment_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
