use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use uuid::Uuid;

use crate::stripe::transactions::{from_minor_units, PayoutTransaction, TransactionData};

/// The two parallel payment ledgers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ledger {
    /// `candidate_payments`, keyed by candidate id
    Candidate,
    /// `weekend_roster_payments`, keyed by weekend roster row id
    Team,
}

impl fmt::Display for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Ledger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ledger::Candidate => "candidate",
            Ledger::Team => "team",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Ledger::Candidate => "candidate_payments",
            Ledger::Team => "weekend_roster_payments",
        }
    }

    /// Column holding the paying entity's id
    pub fn target_column(&self) -> &'static str {
        match self {
            Ledger::Candidate => "candidate_id",
            Ledger::Team => "weekend_roster_id",
        }
    }

    /// Lookup order used when an event does not say which ledger it belongs to
    pub fn all() -> [Ledger; 2] {
        [Ledger::Candidate, Ledger::Team]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "payment_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Cash,
    Check,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Check => "check",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "candidate_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Sponsored,
    AwaitingForms,
    PendingApproval,
    AwaitingPayment,
    Confirmed,
    Rejected,
}

/// Roster status written once a team member's fee is recorded
pub const ROSTER_STATUS_PAID: &str = "paid";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Candidate {
    pub id: Uuid,
    pub status: CandidateStatus,
    pub weekend_id: Option<Uuid>,
}

/// A team member's row on a weekend roster
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RosterRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub weekend_id: Uuid,
    pub status: Option<String>,
}

/// One recorded payment in either ledger
///
/// INVARIANT: unique on `payment_intent_id` within its ledger
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub target_id: Uuid,
    pub weekend_id: Option<Uuid>,
    pub payment_intent_id: String,
    pub gross_amount: Decimal,
    pub net_amount: Option<Decimal>,
    pub stripe_fee: Option<Decimal>,
    pub charge_id: Option<String>,
    pub balance_transaction_id: Option<String>,
    pub payout_id: Option<String>,
    pub deposited_at: Option<DateTime<Utc>>,
    pub payment_method: PaymentMethod,
    pub payment_owner: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentRow {
    /// All four settlement fields are known; further backfills are no-ops
    pub fn has_complete_fees(&self) -> bool {
        self.stripe_fee.is_some()
            && self.net_amount.is_some()
            && self.charge_id.is_some()
            && self.balance_transaction_id.is_some()
    }
}

/// Settlement data for one payment, in major currency units
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeData {
    pub stripe_fee: Decimal,
    pub net_amount: Decimal,
    pub charge_id: String,
    pub balance_transaction_id: String,
}

impl From<TransactionData> for FeeData {
    fn from(data: TransactionData) -> Self {
        Self {
            stripe_fee: data.stripe_fee,
            net_amount: data.net_amount,
            charge_id: data.charge_id,
            balance_transaction_id: data.balance_transaction_id,
        }
    }
}

impl From<&PayoutTransaction> for FeeData {
    fn from(tx: &PayoutTransaction) -> Self {
        Self {
            stripe_fee: from_minor_units(tx.stripe_fee),
            net_amount: from_minor_units(tx.net_amount),
            charge_id: tx.charge_id.clone(),
            balance_transaction_id: tx.balance_transaction_id.clone(),
        }
    }
}

/// Insert payload for a new ledger row
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub ledger: Ledger,
    pub target_id: Uuid,
    pub weekend_id: Option<Uuid>,
    pub payment_intent_id: String,
    pub gross_amount: Decimal,
    pub fees: Option<FeeData>,
    pub payment_method: PaymentMethod,
    pub payment_owner: Option<String>,
}

/// Partial update of a ledger row; `None` leaves the column untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentUpdate {
    pub stripe_fee: Option<Decimal>,
    pub net_amount: Option<Decimal>,
    pub charge_id: Option<String>,
    pub balance_transaction_id: Option<String>,
    pub payout_id: Option<String>,
    pub deposited_at: Option<DateTime<Utc>>,
}

impl PaymentUpdate {
    /// Fills only the settlement fields still missing on `row`
    pub fn missing_fees(row: &PaymentRow, fees: &FeeData) -> Self {
        Self {
            stripe_fee: row.stripe_fee.is_none().then_some(fees.stripe_fee),
            net_amount: row.net_amount.is_none().then_some(fees.net_amount),
            charge_id: row
                .charge_id
                .is_none()
                .then(|| fees.charge_id.clone()),
            balance_transaction_id: row
                .balance_transaction_id
                .is_none()
                .then(|| fees.balance_transaction_id.clone()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One Stripe payout, recorded once
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayoutRecord {
    pub id: Uuid,
    pub payout_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub arrival_date: Option<DateTime<Utc>>,
    pub transaction_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayout {
    pub payout_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub arrival_date: Option<DateTime<Utc>>,
    pub transaction_count: i32,
}

/// Audit link between a payout and the ledger row a settled charge funded
#[derive(Debug, Clone)]
pub struct NewPayoutTransaction {
    pub payout_record_id: Uuid,
    pub payment_intent_id: Option<String>,
    pub charge_id: String,
    pub balance_transaction_id: String,
    pub gross_amount: Decimal,
    pub stripe_fee: Decimal,
    pub net_amount: Decimal,
    pub candidate_payment_id: Option<Uuid>,
    pub team_payment_id: Option<Uuid>,
}

impl NewPayoutTransaction {
    pub fn new(payout_record_id: Uuid, tx: &PayoutTransaction, matched: Option<(Ledger, Uuid)>) -> Self {
        let (candidate_payment_id, team_payment_id) = match matched {
            Some((Ledger::Candidate, id)) => (Some(id), None),
            Some((Ledger::Team, id)) => (None, Some(id)),
            None => (None, None),
        };

        Self {
            payout_record_id,
            payment_intent_id: tx.payment_intent_id.clone(),
            charge_id: tx.charge_id.clone(),
            balance_transaction_id: tx.balance_transaction_id.clone(),
            gross_amount: from_minor_units(tx.gross_amount),
            stripe_fee: from_minor_units(tx.stripe_fee),
            net_amount: from_minor_units(tx.net_amount),
            candidate_payment_id,
            team_payment_id,
        }
    }
}

/// Row-level security handling for a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    /// Service connection; row-level security does not apply
    Service,
    /// Runs as the `authenticated` role so row-level policies apply
    Session,
}
