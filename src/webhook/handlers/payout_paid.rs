use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::ledger::models::{FeeData, Ledger, NewPayout, NewPayoutTransaction};
use crate::ledger::service::{DepositDetails, PaymentLedger, TransactionRecordOutcome};
use crate::stripe::models::{Payout, StripeEvent};
use crate::stripe::transactions::{from_minor_units, PayoutTransaction};
use crate::webhook::router::WebhookHandler;
use crate::webhook::types::*;

pub const PAYOUT_PAID: &str = "payout.paid";

/// Marks recorded payments as deposited and keeps the payout audit trail
pub struct PayoutPaidHandler {
    ledger: Arc<PaymentLedger>,
}

#[derive(Debug, Default)]
struct PayoutTally {
    candidate_payments_updated: usize,
    team_payments_updated: usize,
    transactions_recorded: usize,
}

impl PayoutPaidHandler {
    pub fn new(ledger: Arc<PaymentLedger>) -> Self {
        Self { ledger }
    }

    /// Candidate ledger first, falling back to team; returns the row that matched
    async fn apply_deposit(
        &self,
        payout_id: &str,
        deposited_at: DateTime<Utc>,
        tx: &PayoutTransaction,
    ) -> Option<(Ledger, Uuid)> {
        let payment_intent_id = tx.payment_intent_id.as_deref()?;

        for ledger in Ledger::all() {
            let deposit = DepositDetails {
                payout_id: payout_id.to_string(),
                deposited_at,
                fees: Some(FeeData::from(tx)),
            };
            match self
                .ledger
                .record_deposit(ledger, payment_intent_id, deposit)
                .await
            {
                Ok(Some(row)) => return Some((ledger, row.id)),
                Ok(None) => continue,
                Err(e) => {
                    error!(
                        payout_id,
                        payment_intent_id,
                        ledger = %ledger,
                        "Failed to record deposit, continuing with batch: {}",
                        e
                    );
                    return None;
                }
            }
        }

        warn!(payout_id, payment_intent_id, "No ledger row for payout transaction");
        None
    }
}

fn arrival_date(payout: &Payout) -> Option<DateTime<Utc>> {
    payout
        .arrival_date
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

#[async_trait]
impl WebhookHandler for PayoutPaidHandler {
    fn event_type(&self) -> &'static str {
        PAYOUT_PAID
    }

    async fn handle(&self, event: &StripeEvent, ctx: &mut WebhookPaymentContext) -> HandlerResult {
        let payout: Payout = event.object().map_err(|e| {
            ctx.error(
                ErrorCode::EventParseError,
                "Malformed payout",
                ProcessingStage::EventParsing,
                Severity::Error,
            )
            .with_cause(e)
        })?;

        let amount = from_minor_units(payout.amount);
        ctx.payout_id = Some(payout.id.clone());
        ctx.amount = Some(amount);

        info!(payout_id = %payout.id, %amount, "📊 Processing payout.paid event");

        let transactions = match self
            .ledger
            .transactions()
            .get_payout_transactions(&payout.id)
            .await
        {
            Ok(transactions) => transactions,
            Err(e) => {
                error!(payout_id = %payout.id, "Failed to get payout transactions: {}", e);
                return Ok(HandlerSuccess::not_processed_with(json!({
                    "warning": "Failed to get payout transactions",
                    "payout_id": payout.id,
                })));
            }
        };

        let arrival = arrival_date(&payout);
        let record = self
            .ledger
            .record_payout(NewPayout {
                payout_id: payout.id.clone(),
                amount,
                currency: payout.currency.clone(),
                status: payout.status.clone(),
                arrival_date: arrival,
                transaction_count: i32::try_from(transactions.len()).unwrap_or(i32::MAX),
            })
            .await
            .map_err(|e| {
                ctx.error(
                    ErrorCode::PayoutRecordFailed,
                    "Failed to record payout",
                    ProcessingStage::PayoutProcessing,
                    Severity::Error,
                )
                .with_cause(e)
            })?;

        // Taken from the stored record so a redelivered payout writes the same value
        let deposited_at = record.arrival_date.unwrap_or(record.created_at);
        let mut tally = PayoutTally::default();

        for tx in &transactions {
            if tx.payment_intent_id.is_none() {
                warn!(
                    payout_id = %payout.id,
                    charge_id = %tx.charge_id,
                    "Payout transaction has no payment intent, auditing only"
                );
            }

            let matched = self.apply_deposit(&payout.id, deposited_at, tx).await;
            match matched {
                Some((Ledger::Candidate, _)) => tally.candidate_payments_updated += 1,
                Some((Ledger::Team, _)) => tally.team_payments_updated += 1,
                None => {}
            }

            match self
                .ledger
                .record_payout_transaction(NewPayoutTransaction::new(record.id, tx, matched))
                .await
            {
                Ok(TransactionRecordOutcome::Inserted)
                | Ok(TransactionRecordOutcome::AlreadyRecorded) => tally.transactions_recorded += 1,
                Err(e) => error!(
                    payout_id = %payout.id,
                    balance_transaction_id = %tx.balance_transaction_id,
                    "Failed to record payout transaction: {}",
                    e
                ),
            }
        }

        info!(
            payout_id = %payout.id,
            payout_record_id = %record.id,
            candidate_payments_updated = tally.candidate_payments_updated,
            team_payments_updated = tally.team_payments_updated,
            transactions_recorded = tally.transactions_recorded,
            total_transactions = transactions.len(),
            "✅ Payout processing complete"
        );

        Ok(HandlerSuccess::processed(
            EntityType::Payout,
            record.id.to_string(),
            json!({
                "payout_id": payout.id,
                "candidate_payments_updated": tally.candidate_payments_updated,
                "team_payments_updated": tally.team_payments_updated,
                "transactions_recorded": tally.transactions_recorded,
                "total_transactions": transactions.len(),
            }),
        ))
    }
}
