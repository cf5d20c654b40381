use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::models::*;
use super::store::{PaymentStore, StoreError};
use crate::stripe::transactions::{TransactionClient, TransactionDataError};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transaction(#[from] TransactionDataError),

    #[error("{0} conflicted on insert but could not be read back")]
    MissingAfterConflict(String),
}

#[derive(Debug, Clone, Copy)]
pub struct RecordOptions {
    /// Webhooks carry no user session, so they write through the service connection
    pub bypass_row_security: bool,
}

impl RecordOptions {
    pub fn webhook() -> Self {
        Self {
            bypass_row_security: true,
        }
    }

    fn scope(&self) -> AccessScope {
        if self.bypass_row_security {
            AccessScope::Service
        } else {
            AccessScope::Session
        }
    }
}

#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Recorded(PaymentRow),
    /// The payment intent was already in the ledger; nothing was written
    AlreadyRecorded(PaymentRow),
}

impl RecordOutcome {
    pub fn row(&self) -> &PaymentRow {
        match self {
            RecordOutcome::Recorded(row) | RecordOutcome::AlreadyRecorded(row) => row,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, RecordOutcome::AlreadyRecorded(_))
    }
}

#[derive(Debug, Clone)]
pub enum BackfillOutcome {
    NotFound,
    AlreadyComplete,
    FeeDataUnavailable,
    Updated(PaymentRow),
}

/// Settlement facts applied to a ledger row when its payout lands
#[derive(Debug, Clone)]
pub struct DepositDetails {
    pub payout_id: String,
    pub deposited_at: DateTime<Utc>,
    /// Fills fee fields the row is still missing
    pub fees: Option<FeeData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionRecordOutcome {
    Inserted,
    AlreadyRecorded,
}

/// Single writer over both payment ledgers and the payout audit tables
pub struct PaymentLedger {
    store: Arc<dyn PaymentStore>,
    transactions: Arc<TransactionClient>,
}

impl PaymentLedger {
    pub fn new(store: Arc<dyn PaymentStore>, transactions: Arc<TransactionClient>) -> Self {
        Self {
            store,
            transactions,
        }
    }

    pub fn transactions(&self) -> &TransactionClient {
        &self.transactions
    }

    // ========== PAYMENTS ==========

    pub async fn find_payment(
        &self,
        ledger: Ledger,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentRow>, LedgerError> {
        Ok(self.store.find_payment(ledger, payment_intent_id).await?)
    }

    /// Records a payment exactly once per payment intent
    pub async fn record_payment(
        &self,
        payment: NewPayment,
        options: RecordOptions,
    ) -> Result<RecordOutcome, LedgerError> {
        let ledger = payment.ledger;

        if let Some(existing) = self
            .store
            .find_payment(ledger, &payment.payment_intent_id)
            .await?
        {
            info!(
                ledger = %ledger,
                payment_intent_id = %payment.payment_intent_id,
                "Payment already recorded, skipping insert"
            );
            return Ok(RecordOutcome::AlreadyRecorded(existing));
        }

        match self.store.insert_payment(&payment, options.scope()).await {
            Ok(row) => {
                info!(
                    ledger = %ledger,
                    payment_intent_id = %row.payment_intent_id,
                    gross_amount = %row.gross_amount,
                    fees_known = row.stripe_fee.is_some(),
                    "✅ Payment recorded: {}",
                    row.id
                );
                Ok(RecordOutcome::Recorded(row))
            }
            Err(e) if e.is_unique_violation() => {
                // Lost a race against a concurrent delivery of the same event
                let existing = self
                    .store
                    .find_payment(ledger, &payment.payment_intent_id)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::MissingAfterConflict(payment.payment_intent_id.clone())
                    })?;
                info!(
                    ledger = %ledger,
                    payment_intent_id = %payment.payment_intent_id,
                    "Concurrent insert detected, treating as already recorded"
                );
                Ok(RecordOutcome::AlreadyRecorded(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fills missing fee fields on an existing row
    ///
    /// With `fees: None` the data is fetched fresh from the processor.
    pub async fn backfill_fees(
        &self,
        ledger: Ledger,
        payment_intent_id: &str,
        fees: Option<FeeData>,
    ) -> Result<BackfillOutcome, LedgerError> {
        let Some(row) = self.store.find_payment(ledger, payment_intent_id).await? else {
            debug!(ledger = %ledger, payment_intent_id, "No payment row to backfill");
            return Ok(BackfillOutcome::NotFound);
        };

        if row.has_complete_fees() {
            info!(
                ledger = %ledger,
                payment_intent_id,
                "Fee data already complete, skipping backfill"
            );
            return Ok(BackfillOutcome::AlreadyComplete);
        }

        let fees = match fees {
            Some(fees) => fees,
            None => match self.transactions.get_transaction_data(payment_intent_id).await {
                Ok(data) => FeeData::from(data),
                Err(e) if e.is_not_yet_available() => {
                    return Ok(BackfillOutcome::FeeDataUnavailable)
                }
                Err(e) => return Err(e.into()),
            },
        };

        let update = PaymentUpdate::missing_fees(&row, &fees);
        match self
            .store
            .update_payment(ledger, payment_intent_id, &update)
            .await?
        {
            Some(updated) => {
                info!(
                    ledger = %ledger,
                    payment_intent_id,
                    stripe_fee = %fees.stripe_fee,
                    net_amount = %fees.net_amount,
                    "✅ Fee data backfilled"
                );
                Ok(BackfillOutcome::Updated(updated))
            }
            None => Ok(BackfillOutcome::NotFound),
        }
    }

    /// Marks a row as deposited by a payout; `None` when the ledger has no such payment
    pub async fn record_deposit(
        &self,
        ledger: Ledger,
        payment_intent_id: &str,
        deposit: DepositDetails,
    ) -> Result<Option<PaymentRow>, LedgerError> {
        let Some(row) = self.store.find_payment(ledger, payment_intent_id).await? else {
            return Ok(None);
        };

        let mut update = match &deposit.fees {
            Some(fees) => PaymentUpdate::missing_fees(&row, fees),
            None => PaymentUpdate::default(),
        };
        update.payout_id = Some(deposit.payout_id);
        update.deposited_at = Some(deposit.deposited_at);

        let updated = self
            .store
            .update_payment(ledger, payment_intent_id, &update)
            .await?;

        if updated.is_some() {
            debug!(ledger = %ledger, payment_intent_id, "Deposit recorded");
        }

        Ok(updated)
    }

    // ========== CANDIDATES & ROSTER ==========

    pub async fn find_candidate(&self, candidate_id: Uuid) -> Result<Option<Candidate>, LedgerError> {
        Ok(self.store.find_candidate(candidate_id).await?)
    }

    pub async fn confirm_candidate(&self, candidate_id: Uuid) -> Result<bool, LedgerError> {
        let updated = self
            .store
            .update_candidate_status(candidate_id, CandidateStatus::Confirmed)
            .await?;
        if !updated {
            warn!(%candidate_id, "Candidate vanished before confirmation");
        }
        Ok(updated)
    }

    pub async fn find_roster_record(
        &self,
        user_id: Uuid,
        weekend_id: Uuid,
    ) -> Result<Option<RosterRecord>, LedgerError> {
        Ok(self.store.find_roster_record(user_id, weekend_id).await?)
    }

    pub async fn mark_roster_paid(&self, roster_id: Uuid) -> Result<bool, LedgerError> {
        Ok(self
            .store
            .update_roster_status(roster_id, ROSTER_STATUS_PAID)
            .await?)
    }

    // ========== PAYOUTS ==========

    /// Insert-or-fetch: a redelivered payout reuses the existing record
    pub async fn record_payout(&self, payout: NewPayout) -> Result<PayoutRecord, LedgerError> {
        match self.store.insert_payout(&payout).await {
            Ok(record) => {
                info!(
                    payout_id = %record.payout_id,
                    amount = %record.amount,
                    transaction_count = record.transaction_count,
                    "✅ Payout recorded: {}",
                    record.id
                );
                Ok(record)
            }
            Err(e) if e.is_unique_violation() => {
                info!(payout_id = %payout.payout_id, "Payout already recorded, reusing record");
                self.store
                    .find_payout(&payout.payout_id)
                    .await?
                    .ok_or(LedgerError::MissingAfterConflict(payout.payout_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn record_payout_transaction(
        &self,
        transaction: NewPayoutTransaction,
    ) -> Result<TransactionRecordOutcome, LedgerError> {
        match self.store.insert_payout_transaction(&transaction).await {
            Ok(()) => Ok(TransactionRecordOutcome::Inserted),
            Err(e) if e.is_unique_violation() => {
                debug!(
                    balance_transaction_id = %transaction.balance_transaction_id,
                    "Payout transaction already recorded"
                );
                Ok(TransactionRecordOutcome::AlreadyRecorded)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::InMemoryPaymentStore;
    use crate::testing::MockProcessor;
    use rust_decimal_macros::dec;

    fn ledger_with(store: Arc<InMemoryPaymentStore>, processor: MockProcessor) -> PaymentLedger {
        PaymentLedger::new(
            store,
            Arc::new(TransactionClient::new(Arc::new(processor))),
        )
    }

    fn team_payment(pi: &str, fees: Option<FeeData>) -> NewPayment {
        NewPayment {
            ledger: Ledger::Team,
            target_id: Uuid::new_v4(),
            weekend_id: Some(Uuid::new_v4()),
            payment_intent_id: pi.to_string(),
            gross_amount: dec!(150.00),
            fees,
            payment_method: PaymentMethod::Card,
            payment_owner: Some("Jane Doe".to_string()),
        }
    }

    fn fees() -> FeeData {
        FeeData {
            stripe_fee: dec!(4.65),
            net_amount: dec!(145.35),
            charge_id: "ch_abc".to_string(),
            balance_transaction_id: "txn_abc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_record_payment_once_per_intent() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let ledger = ledger_with(store.clone(), MockProcessor::new());

        let first = ledger
            .record_payment(team_payment("pi_abc", None), RecordOptions::webhook())
            .await
            .unwrap();
        let second = ledger
            .record_payment(team_payment("pi_abc", None), RecordOptions::webhook())
            .await
            .unwrap();

        assert!(!first.is_duplicate());
        assert!(second.is_duplicate());
        assert_eq!(first.row().id, second.row().id);
        assert_eq!(store.payment_count(Ledger::Team).await, 1);
    }

    #[tokio::test]
    async fn test_unique_violation_is_treated_as_duplicate() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let existing = store.seed_payment(&team_payment("pi_race", None)).await;
        store.hide_next_lookup();
        let ledger = ledger_with(store.clone(), MockProcessor::new());

        let outcome = ledger
            .record_payment(team_payment("pi_race", None), RecordOptions::webhook())
            .await
            .unwrap();

        assert!(outcome.is_duplicate());
        assert_eq!(outcome.row().id, existing.id);
        assert_eq!(store.payment_count(Ledger::Team).await, 1);
    }

    #[tokio::test]
    async fn test_row_security_scope_follows_options() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let ledger = ledger_with(store.clone(), MockProcessor::new());

        ledger
            .record_payment(team_payment("pi_1", None), RecordOptions::webhook())
            .await
            .unwrap();
        ledger
            .record_payment(
                team_payment("pi_2", None),
                RecordOptions {
                    bypass_row_security: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            store.scopes().await,
            vec![AccessScope::Service, AccessScope::Session]
        );
    }

    #[tokio::test]
    async fn test_backfill_not_found() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let ledger = ledger_with(store.clone(), MockProcessor::new());

        let outcome = ledger
            .backfill_fees(Ledger::Candidate, "pi_nowhere", Some(fees()))
            .await
            .unwrap();

        assert!(matches!(outcome, BackfillOutcome::NotFound));
        assert_eq!(store.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_backfill_complete_row_issues_no_update() {
        let store = Arc::new(InMemoryPaymentStore::new());
        store.seed_payment(&team_payment("pi_done", Some(fees()))).await;
        let ledger = ledger_with(store.clone(), MockProcessor::new());

        let outcome = ledger
            .backfill_fees(Ledger::Team, "pi_done", None)
            .await
            .unwrap();

        assert!(matches!(outcome, BackfillOutcome::AlreadyComplete));
        assert_eq!(store.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_backfill_fetches_fresh_fee_data() {
        let store = Arc::new(InMemoryPaymentStore::new());
        store.seed_payment(&team_payment("pi_abc", None)).await;
        let processor = MockProcessor::new();
        processor.settle("pi_abc", "ch_abc", "txn_abc", 15000, 465);
        let ledger = ledger_with(store.clone(), processor);

        let outcome = ledger
            .backfill_fees(Ledger::Team, "pi_abc", None)
            .await
            .unwrap();

        let BackfillOutcome::Updated(row) = outcome else {
            panic!("expected Updated, got {:?}", outcome);
        };
        assert_eq!(row.stripe_fee, Some(dec!(4.65)));
        assert_eq!(row.net_amount, Some(dec!(145.35)));
        assert_eq!(row.charge_id.as_deref(), Some("ch_abc"));
        assert_eq!(row.balance_transaction_id.as_deref(), Some("txn_abc"));
        assert_eq!(row.gross_amount, dec!(150.00));
    }

    #[tokio::test]
    async fn test_backfill_defers_when_fee_data_pending() {
        let store = Arc::new(InMemoryPaymentStore::new());
        store.seed_payment(&team_payment("pi_new", None)).await;
        let processor = MockProcessor::new();
        processor.add_payment_intent("pi_new", None);
        let ledger = ledger_with(store.clone(), processor);

        let outcome = ledger
            .backfill_fees(Ledger::Team, "pi_new", None)
            .await
            .unwrap();

        assert!(matches!(outcome, BackfillOutcome::FeeDataUnavailable));
        assert_eq!(store.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_deposit_fills_missing_fees_and_payout() {
        let store = Arc::new(InMemoryPaymentStore::new());
        store.seed_payment(&team_payment("pi_abc", None)).await;
        let ledger = ledger_with(store.clone(), MockProcessor::new());
        let deposited_at = Utc::now();

        let row = ledger
            .record_deposit(
                Ledger::Team,
                "pi_abc",
                DepositDetails {
                    payout_id: "po_1".to_string(),
                    deposited_at,
                    fees: Some(fees()),
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(row.payout_id.as_deref(), Some("po_1"));
        assert_eq!(row.deposited_at, Some(deposited_at));
        assert_eq!(row.stripe_fee, Some(dec!(4.65)));

        let missing = ledger
            .record_deposit(
                Ledger::Candidate,
                "pi_abc",
                DepositDetails {
                    payout_id: "po_1".to_string(),
                    deposited_at,
                    fees: None,
                },
            )
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_payout_insert_or_fetch() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let ledger = ledger_with(store.clone(), MockProcessor::new());
        let payout = NewPayout {
            payout_id: "po_1".to_string(),
            amount: dec!(300.00),
            currency: "usd".to_string(),
            status: "paid".to_string(),
            arrival_date: None,
            transaction_count: 2,
        };

        let first = ledger.record_payout(payout.clone()).await.unwrap();
        let second = ledger.record_payout(payout).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.payout_count().await, 1);
    }

    #[tokio::test]
    async fn test_payout_transaction_conflict_is_success() {
        let store = Arc::new(InMemoryPaymentStore::new());
        let ledger = ledger_with(store.clone(), MockProcessor::new());
        let record = NewPayoutTransaction {
            payout_record_id: Uuid::new_v4(),
            payment_intent_id: Some("pi_1".to_string()),
            charge_id: "ch_1".to_string(),
            balance_transaction_id: "txn_1".to_string(),
            gross_amount: dec!(100.00),
            stripe_fee: dec!(3.20),
            net_amount: dec!(96.80),
            candidate_payment_id: None,
            team_payment_id: None,
        };

        assert_eq!(
            ledger.record_payout_transaction(record.clone()).await.unwrap(),
            TransactionRecordOutcome::Inserted
        );
        assert_eq!(
            ledger.record_payout_transaction(record).await.unwrap(),
            TransactionRecordOutcome::AlreadyRecorded
        );
    }
}
