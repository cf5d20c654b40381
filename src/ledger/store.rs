use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::models::*;

/// Postgres SQLSTATE for `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return StoreError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                };
            }
        }
        StoreError::Database(err)
    }
}

/// Persistence interface behind the payment ledger
///
/// Every ledger-generic method is parameterised by [`Ledger`], so both payment
/// tables share one code path.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    // ========== PAYMENT LEDGERS ==========

    async fn find_payment(
        &self,
        ledger: Ledger,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentRow>, StoreError>;

    /// Fails with [`StoreError::UniqueViolation`] when the payment intent is already recorded
    async fn insert_payment(
        &self,
        payment: &NewPayment,
        scope: AccessScope,
    ) -> Result<PaymentRow, StoreError>;

    /// Applies the non-`None` fields of `update`; `None` when no row matches
    async fn update_payment(
        &self,
        ledger: Ledger,
        payment_intent_id: &str,
        update: &PaymentUpdate,
    ) -> Result<Option<PaymentRow>, StoreError>;

    // ========== CANDIDATES & ROSTER ==========

    async fn find_candidate(&self, candidate_id: Uuid) -> Result<Option<Candidate>, StoreError>;

    /// Returns whether a row was updated
    async fn update_candidate_status(
        &self,
        candidate_id: Uuid,
        status: CandidateStatus,
    ) -> Result<bool, StoreError>;

    async fn find_roster_record(
        &self,
        user_id: Uuid,
        weekend_id: Uuid,
    ) -> Result<Option<RosterRecord>, StoreError>;

    async fn update_roster_status(&self, roster_id: Uuid, status: &str)
        -> Result<bool, StoreError>;

    // ========== PAYOUTS ==========

    /// Fails with [`StoreError::UniqueViolation`] when the payout is already recorded
    async fn insert_payout(&self, payout: &NewPayout) -> Result<PayoutRecord, StoreError>;

    async fn find_payout(&self, payout_id: &str) -> Result<Option<PayoutRecord>, StoreError>;

    /// Fails with [`StoreError::UniqueViolation`] when the balance transaction is already audited
    async fn insert_payout_transaction(
        &self,
        transaction: &NewPayoutTransaction,
    ) -> Result<(), StoreError>;
}
