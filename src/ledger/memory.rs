use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::*;
use super::store::{PaymentStore, StoreError};

/// In-memory payment store with the same uniqueness rules as the Postgres schema
#[derive(Default)]
pub struct InMemoryPaymentStore {
    payments: RwLock<HashMap<(Ledger, String), PaymentRow>>,
    candidates: RwLock<HashMap<Uuid, Candidate>>,
    roster: RwLock<HashMap<Uuid, RosterRecord>>,
    payouts: RwLock<HashMap<String, PayoutRecord>>,
    payout_transactions: RwLock<HashMap<String, NewPayoutTransaction>>,
    scopes: RwLock<Vec<AccessScope>>,
    update_calls: AtomicUsize,
    hide_next_lookup: AtomicBool,
    fail_payment_writes: AtomicBool,
    fail_status_updates: AtomicBool,
    status_rows_vanish: AtomicBool,
    fail_payouts: AtomicBool,
    failing_deposits: RwLock<HashSet<String>>,
    failing_audits: RwLock<HashSet<String>>,
}

fn injected_failure(what: &str) -> StoreError {
    StoreError::Database(sqlx::Error::Protocol(format!("injected failure: {}", what)))
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== SEEDING ==========

    pub async fn add_candidate(&self, status: CandidateStatus, weekend_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        self.candidates.write().await.insert(
            id,
            Candidate {
                id,
                status,
                weekend_id,
            },
        );
        id
    }

    pub async fn add_roster_record(&self, user_id: Uuid, weekend_id: Uuid) -> RosterRecord {
        let record = RosterRecord {
            id: Uuid::new_v4(),
            user_id,
            weekend_id,
            status: None,
        };
        self.roster.write().await.insert(record.id, record.clone());
        record
    }

    pub async fn seed_payment(&self, payment: &NewPayment) -> PaymentRow {
        let row = Self::build_row(payment);
        self.payments
            .write()
            .await
            .insert((payment.ledger, payment.payment_intent_id.clone()), row.clone());
        row
    }

    // ========== FAILURE INJECTION ==========

    /// Next `find_payment` misses, as if a concurrent delivery inserted in between
    pub fn hide_next_lookup(&self) {
        self.hide_next_lookup.store(true, Ordering::SeqCst);
    }

    pub fn fail_payment_writes(&self) {
        self.fail_payment_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_status_updates(&self) {
        self.fail_status_updates.store(true, Ordering::SeqCst);
    }

    pub fn restore_status_updates(&self) {
        self.fail_status_updates.store(false, Ordering::SeqCst);
    }

    /// Status updates match no row, as if it was deleted after the lookup
    pub fn vanish_rows_on_status_update(&self) {
        self.status_rows_vanish.store(true, Ordering::SeqCst);
    }

    pub fn fail_payouts(&self) {
        self.fail_payouts.store(true, Ordering::SeqCst);
    }

    pub async fn fail_deposit_for(&self, payment_intent_id: &str) {
        self.failing_deposits
            .write()
            .await
            .insert(payment_intent_id.to_string());
    }

    pub async fn fail_audit_for(&self, balance_transaction_id: &str) {
        self.failing_audits
            .write()
            .await
            .insert(balance_transaction_id.to_string());
    }

    // ========== INSPECTION ==========

    pub async fn payment(&self, ledger: Ledger, payment_intent_id: &str) -> Option<PaymentRow> {
        self.payments
            .read()
            .await
            .get(&(ledger, payment_intent_id.to_string()))
            .cloned()
    }

    pub async fn payment_count(&self, ledger: Ledger) -> usize {
        self.payments
            .read()
            .await
            .keys()
            .filter(|(l, _)| *l == ledger)
            .count()
    }

    pub async fn candidate_status(&self, candidate_id: Uuid) -> Option<CandidateStatus> {
        self.candidates
            .read()
            .await
            .get(&candidate_id)
            .map(|c| c.status)
    }

    pub async fn roster_status(&self, roster_id: Uuid) -> Option<String> {
        self.roster
            .read()
            .await
            .get(&roster_id)
            .and_then(|r| r.status.clone())
    }

    pub async fn payout_count(&self) -> usize {
        self.payouts.read().await.len()
    }

    pub async fn payout_transactions(&self) -> Vec<NewPayoutTransaction> {
        self.payout_transactions.read().await.values().cloned().collect()
    }

    pub async fn scopes(&self) -> Vec<AccessScope> {
        self.scopes.read().await.clone()
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn build_row(payment: &NewPayment) -> PaymentRow {
        let fees = payment.fees.as_ref();
        PaymentRow {
            id: Uuid::new_v4(),
            target_id: payment.target_id,
            weekend_id: payment.weekend_id,
            payment_intent_id: payment.payment_intent_id.clone(),
            gross_amount: payment.gross_amount,
            net_amount: fees.map(|f| f.net_amount),
            stripe_fee: fees.map(|f| f.stripe_fee),
            charge_id: fees.map(|f| f.charge_id.clone()),
            balance_transaction_id: fees.map(|f| f.balance_transaction_id.clone()),
            payout_id: None,
            deposited_at: None,
            payment_method: payment.payment_method,
            payment_owner: payment.payment_owner.clone(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn find_payment(
        &self,
        ledger: Ledger,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentRow>, StoreError> {
        if self.hide_next_lookup.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.payment(ledger, payment_intent_id).await)
    }

    async fn insert_payment(
        &self,
        payment: &NewPayment,
        scope: AccessScope,
    ) -> Result<PaymentRow, StoreError> {
        if self.fail_payment_writes.load(Ordering::SeqCst) {
            return Err(injected_failure("insert_payment"));
        }
        self.scopes.write().await.push(scope);

        let key = (payment.ledger, payment.payment_intent_id.clone());
        let mut payments = self.payments.write().await;
        if payments.contains_key(&key) {
            return Err(StoreError::UniqueViolation {
                constraint: format!("{}_payment_intent_id_key", payment.ledger.table()),
            });
        }

        let row = Self::build_row(payment);
        payments.insert(key, row.clone());
        Ok(row)
    }

    async fn update_payment(
        &self,
        ledger: Ledger,
        payment_intent_id: &str,
        update: &PaymentUpdate,
    ) -> Result<Option<PaymentRow>, StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_payment_writes.load(Ordering::SeqCst)
            || self.failing_deposits.read().await.contains(payment_intent_id)
        {
            return Err(injected_failure("update_payment"));
        }

        let mut payments = self.payments.write().await;
        let Some(row) = payments.get_mut(&(ledger, payment_intent_id.to_string())) else {
            return Ok(None);
        };

        if let Some(fee) = update.stripe_fee {
            row.stripe_fee = Some(fee);
        }
        if let Some(net) = update.net_amount {
            row.net_amount = Some(net);
        }
        if let Some(charge_id) = &update.charge_id {
            row.charge_id = Some(charge_id.clone());
        }
        if let Some(bt_id) = &update.balance_transaction_id {
            row.balance_transaction_id = Some(bt_id.clone());
        }
        if let Some(payout_id) = &update.payout_id {
            row.payout_id = Some(payout_id.clone());
        }
        if let Some(deposited_at) = update.deposited_at {
            row.deposited_at = Some(deposited_at);
        }

        Ok(Some(row.clone()))
    }

    async fn find_candidate(&self, candidate_id: Uuid) -> Result<Option<Candidate>, StoreError> {
        Ok(self.candidates.read().await.get(&candidate_id).cloned())
    }

    async fn update_candidate_status(
        &self,
        candidate_id: Uuid,
        status: CandidateStatus,
    ) -> Result<bool, StoreError> {
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(injected_failure("update_candidate_status"));
        }
        if self.status_rows_vanish.load(Ordering::SeqCst) {
            return Ok(false);
        }
        match self.candidates.write().await.get_mut(&candidate_id) {
            Some(candidate) => {
                candidate.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_roster_record(
        &self,
        user_id: Uuid,
        weekend_id: Uuid,
    ) -> Result<Option<RosterRecord>, StoreError> {
        Ok(self
            .roster
            .read()
            .await
            .values()
            .find(|r| r.user_id == user_id && r.weekend_id == weekend_id)
            .cloned())
    }

    async fn update_roster_status(
        &self,
        roster_id: Uuid,
        status: &str,
    ) -> Result<bool, StoreError> {
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(injected_failure("update_roster_status"));
        }
        if self.status_rows_vanish.load(Ordering::SeqCst) {
            return Ok(false);
        }
        match self.roster.write().await.get_mut(&roster_id) {
            Some(record) => {
                record.status = Some(status.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_payout(&self, payout: &NewPayout) -> Result<PayoutRecord, StoreError> {
        if self.fail_payouts.load(Ordering::SeqCst) {
            return Err(injected_failure("insert_payout"));
        }

        let mut payouts = self.payouts.write().await;
        if payouts.contains_key(&payout.payout_id) {
            return Err(StoreError::UniqueViolation {
                constraint: "online_payment_payouts_payout_id_key".to_string(),
            });
        }

        let record = PayoutRecord {
            id: Uuid::new_v4(),
            payout_id: payout.payout_id.clone(),
            amount: payout.amount,
            currency: payout.currency.clone(),
            status: payout.status.clone(),
            arrival_date: payout.arrival_date,
            transaction_count: payout.transaction_count,
            created_at: Utc::now(),
        };
        payouts.insert(payout.payout_id.clone(), record.clone());
        Ok(record)
    }

    async fn find_payout(&self, payout_id: &str) -> Result<Option<PayoutRecord>, StoreError> {
        Ok(self.payouts.read().await.get(payout_id).cloned())
    }

    async fn insert_payout_transaction(
        &self,
        transaction: &NewPayoutTransaction,
    ) -> Result<(), StoreError> {
        if self
            .failing_audits
            .read()
            .await
            .contains(&transaction.balance_transaction_id)
        {
            return Err(injected_failure("insert_payout_transaction"));
        }

        let mut audits = self.payout_transactions.write().await;
        if audits.contains_key(&transaction.balance_transaction_id) {
            return Err(StoreError::UniqueViolation {
                constraint: "online_payment_payout_transactions_balance_transaction_id_key"
                    .to_string(),
            });
        }
        audits.insert(
            transaction.balance_transaction_id.clone(),
            transaction.clone(),
        );
        Ok(())
    }
}
