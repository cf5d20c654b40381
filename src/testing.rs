//! Hand-written doubles shared by the unit tests

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::ledger::models::PaymentMethod;
use crate::notifications::{NotificationError, Notifier};
use crate::stripe::client::{PaymentProcessor, ProcessorError};
use crate::stripe::models::{BalanceTransaction, Charge, Expandable, ListPage, PaymentIntent};

// ========== PAYMENT PROCESSOR ==========

#[derive(Default)]
struct ProcessorState {
    payment_intents: HashMap<String, PaymentIntent>,
    charges: HashMap<String, Charge>,
    balance_transactions: HashMap<String, BalanceTransaction>,
    payouts: HashMap<String, Vec<String>>,
}

/// In-memory Stripe API
#[derive(Default)]
pub struct MockProcessor {
    state: Mutex<ProcessorState>,
    fail_listing: AtomicBool,
    list_calls: AtomicUsize,
}

fn not_found(kind: &str, id: &str) -> ProcessorError {
    ProcessorError::Api {
        status: 404,
        message: format!("No such {}: '{}'", kind, id),
    }
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_payment_intent(&self, payment_intent_id: &str, latest_charge: Option<&str>) {
        self.state.lock().unwrap().payment_intents.insert(
            payment_intent_id.to_string(),
            PaymentIntent {
                id: payment_intent_id.to_string(),
                latest_charge: latest_charge.map(Expandable::from),
            },
        );
    }

    pub fn add_charge(
        &self,
        charge_id: &str,
        payment_intent_id: Option<&str>,
        balance_transaction_id: Option<&str>,
    ) {
        self.state.lock().unwrap().charges.insert(
            charge_id.to_string(),
            Charge {
                id: charge_id.to_string(),
                amount: 0,
                balance_transaction: balance_transaction_id.map(Expandable::from),
                payment_intent: payment_intent_id.map(Expandable::from),
            },
        );
    }

    fn add_balance_transaction(&self, id: &str, charge_id: &str, amount: i64, fee: i64) {
        self.state.lock().unwrap().balance_transactions.insert(
            id.to_string(),
            BalanceTransaction {
                id: id.to_string(),
                amount,
                fee,
                net: amount - fee,
                source: Some(Expandable::from(charge_id)),
                transaction_type: Some("charge".to_string()),
            },
        );
    }

    /// A fully settled payment: intent, charge and balance transaction
    pub fn settle(
        &self,
        payment_intent_id: &str,
        charge_id: &str,
        balance_transaction_id: &str,
        amount: i64,
        fee: i64,
    ) {
        self.add_payment_intent(payment_intent_id, Some(charge_id));
        self.add_charge(charge_id, Some(payment_intent_id), Some(balance_transaction_id));
        self.add_balance_transaction(balance_transaction_id, charge_id, amount, fee);
    }

    /// Settles `payment_intent_id` as `ch_<pi>` / `txn_<pi>` and attaches it to a payout
    pub fn add_payout_charge(&self, payout_id: &str, payment_intent_id: &str, amount: i64, fee: i64) {
        let charge_id = format!("ch_{}", payment_intent_id);
        let balance_transaction_id = format!("txn_{}", payment_intent_id);
        self.settle(payment_intent_id, &charge_id, &balance_transaction_id, amount, fee);
        self.attach_to_payout(payout_id, &balance_transaction_id);
    }

    pub fn add_payout_charge_without_intent(
        &self,
        payout_id: &str,
        charge_id: &str,
        amount: i64,
        fee: i64,
    ) {
        let balance_transaction_id = format!("txn_{}", charge_id);
        self.add_charge(charge_id, None, Some(&balance_transaction_id));
        self.add_balance_transaction(&balance_transaction_id, charge_id, amount, fee);
        self.attach_to_payout(payout_id, &balance_transaction_id);
    }

    fn attach_to_payout(&self, payout_id: &str, balance_transaction_id: &str) {
        self.state
            .lock()
            .unwrap()
            .payouts
            .entry(payout_id.to_string())
            .or_default()
            .push(balance_transaction_id.to_string());
    }

    pub fn fail_payout_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProcessorError> {
        let state = self.state.lock().unwrap();
        state
            .payment_intents
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("payment_intent", id))
    }

    async fn retrieve_charge(&self, id: &str) -> Result<Charge, ProcessorError> {
        let state = self.state.lock().unwrap();
        state
            .charges
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("charge", id))
    }

    async fn retrieve_balance_transaction(
        &self,
        id: &str,
    ) -> Result<BalanceTransaction, ProcessorError> {
        let state = self.state.lock().unwrap();
        state
            .balance_transactions
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("balance_transaction", id))
    }

    async fn list_payout_balance_transactions(
        &self,
        payout_id: &str,
        limit: u8,
        starting_after: Option<&str>,
    ) -> Result<ListPage<BalanceTransaction>, ProcessorError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(ProcessorError::Api {
                status: 500,
                message: "listing unavailable".to_string(),
            });
        }

        let state = self.state.lock().unwrap();
        let ids = state.payouts.get(payout_id).cloned().unwrap_or_default();
        let start = match starting_after {
            Some(cursor) => ids.iter().position(|id| id == cursor).map_or(ids.len(), |i| i + 1),
            None => 0,
        };
        let end = (start + limit as usize).min(ids.len());

        let data = ids[start..end]
            .iter()
            .filter_map(|id| state.balance_transactions.get(id).cloned())
            .collect();

        Ok(ListPage {
            data,
            has_more: end < ids.len(),
        })
    }
}

// ========== NOTIFIER ==========

#[derive(Debug, Clone, PartialEq)]
pub enum SentNotification {
    Candidate {
        candidate_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
    },
    Team {
        user_id: Uuid,
        weekend_id: Uuid,
        amount: Decimal,
    },
}

/// Records every notification; can be told to fail
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, notification: SentNotification) -> Result<(), NotificationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::Provider("email provider down".to_string()));
        }
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_candidate_payment(
        &self,
        candidate_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<(), NotificationError> {
        self.record(SentNotification::Candidate {
            candidate_id,
            amount,
            method,
        })
    }

    async fn notify_team_payment(
        &self,
        user_id: Uuid,
        weekend_id: Uuid,
        amount: Decimal,
    ) -> Result<(), NotificationError> {
        self.record(SentNotification::Team {
            user_id,
            weekend_id,
            amount,
        })
    }
}
