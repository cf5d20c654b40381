use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ledger::models::Ledger;
use crate::ledger::service::{BackfillOutcome, LedgerError, PaymentLedger};
use crate::stripe::models::{Charge, StripeEvent};
use crate::stripe::transactions::from_minor_units;
use crate::webhook::router::WebhookHandler;
use crate::webhook::types::*;

pub const CHARGE_UPDATED: &str = "charge.updated";

/// Backfills fee data once a charge's balance transaction exists
///
/// Stripe attaches the balance transaction some time after checkout, so rows
/// recorded without fees are completed here, before the payout arrives.
pub struct ChargeUpdatedHandler {
    ledger: Arc<PaymentLedger>,
}

impl ChargeUpdatedHandler {
    pub fn new(ledger: Arc<PaymentLedger>) -> Self {
        Self { ledger }
    }

    /// Candidate ledger first, then team; `None` when neither holds the payment
    async fn backfill(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<(Ledger, BackfillOutcome)>, LedgerError> {
        for ledger in Ledger::all() {
            match self.ledger.backfill_fees(ledger, payment_intent_id, None).await? {
                BackfillOutcome::NotFound => continue,
                outcome => return Ok(Some((ledger, outcome))),
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl WebhookHandler for ChargeUpdatedHandler {
    fn event_type(&self) -> &'static str {
        CHARGE_UPDATED
    }

    async fn handle(&self, event: &StripeEvent, ctx: &mut WebhookPaymentContext) -> HandlerResult {
        let charge: Charge = event.object().map_err(|e| {
            ctx.error(
                ErrorCode::EventParseError,
                "Malformed charge",
                ProcessingStage::EventParsing,
                Severity::Error,
            )
            .with_cause(e)
        })?;

        if charge.balance_transaction.is_none() {
            debug!(charge_id = %charge.id, "No balance transaction yet, skipping");
            return Ok(HandlerSuccess::not_processed());
        }

        let Some(payment_intent_id) = charge.payment_intent.as_ref().map(|pi| pi.id().to_string())
        else {
            debug!(charge_id = %charge.id, "Charge has no payment intent, skipping");
            return Ok(HandlerSuccess::not_processed());
        };

        ctx.payment_intent_id = Some(payment_intent_id.clone());
        ctx.charge_id = Some(charge.id.clone());
        ctx.amount = Some(from_minor_units(charge.amount));

        info!(charge_id = %charge.id, %payment_intent_id, "Processing charge.updated for fee backfill");

        match self.backfill(&payment_intent_id).await {
            Ok(Some((ledger, BackfillOutcome::Updated(row)))) => Ok(HandlerSuccess::processed(
                EntityType::FeeBackfill,
                row.id.to_string(),
                json!({
                    "payment_type": ledger,
                    "payment_intent_id": payment_intent_id,
                }),
            )),
            Ok(Some((ledger, BackfillOutcome::AlreadyComplete))) => {
                Ok(HandlerSuccess::not_processed_with(json!({
                    "reason": "already_complete",
                    "payment_type": ledger,
                })))
            }
            Ok(Some((_, BackfillOutcome::FeeDataUnavailable))) => {
                info!(%payment_intent_id, "Fee data still unavailable, waiting for a later event");
                Ok(HandlerSuccess::not_processed())
            }
            Ok(Some((_, BackfillOutcome::NotFound))) | Ok(None) => {
                debug!(%payment_intent_id, "No ledger row for this payment intent");
                Ok(HandlerSuccess::not_processed())
            }
            Err(LedgerError::Transaction(e)) => {
                warn!(%payment_intent_id, "Failed to fetch fee data for backfill: {}", e);
                Ok(HandlerSuccess::not_processed())
            }
            Err(e) => Err(ctx
                .error(
                    ErrorCode::FeeBackfillFailed,
                    "Failed to backfill fee data",
                    ProcessingStage::FeeBackfill,
                    Severity::Error,
                )
                .with_cause(e)),
        }
    }
}
