use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::CheckoutPrices;
use crate::ledger::models::{
    CandidateStatus, FeeData, Ledger, NewPayment, PaymentMethod, ROSTER_STATUS_PAID,
};
use crate::ledger::service::{PaymentLedger, RecordOptions};
use crate::notifications::Notifier;
use crate::stripe::models::{CheckoutSession, StripeEvent};
use crate::stripe::transactions::from_minor_units;
use crate::webhook::router::WebhookHandler;
use crate::webhook::types::*;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

const UNKNOWN_PAYMENT_OWNER: &str = "unknown";

/// Records candidate and team fee payments when a checkout session completes
///
/// The session's `price_id` metadata selects the flow.
pub struct CheckoutSessionCompletedHandler {
    ledger: Arc<PaymentLedger>,
    notifier: Arc<dyn Notifier>,
    prices: CheckoutPrices,
}

impl CheckoutSessionCompletedHandler {
    pub fn new(
        ledger: Arc<PaymentLedger>,
        notifier: Arc<dyn Notifier>,
        prices: CheckoutPrices,
    ) -> Self {
        Self {
            ledger,
            notifier,
            prices,
        }
    }

    /// Settlement data if the processor already has it; checkout never waits for it
    async fn fee_data(&self, payment_intent_id: &str) -> Option<FeeData> {
        match self
            .ledger
            .transactions()
            .get_transaction_data(payment_intent_id)
            .await
        {
            Ok(data) => Some(data.into()),
            Err(e) => {
                info!(
                    payment_intent_id,
                    "Recording payment without fee data, backfill will follow: {}", e
                );
                None
            }
        }
    }

    // ========== CANDIDATE FLOW ==========

    async fn handle_candidate_payment(
        &self,
        session: &CheckoutSession,
        payment_intent_id: &str,
        amount: Decimal,
        ctx: &mut WebhookPaymentContext,
    ) -> HandlerResult {
        let raw_candidate_id = session.metadata_value("candidateId").ok_or_else(|| {
            ctx.error(
                ErrorCode::MissingCandidateId,
                "Missing candidateId in session metadata",
                ProcessingStage::Validation,
                Severity::Error,
            )
        })?;
        ctx.candidate_id = Some(raw_candidate_id.to_string());
        let candidate_id = parse_metadata_id(raw_candidate_id, "candidateId", ctx)?;

        info!(%candidate_id, "Processing candidate payment");

        let candidate = self
            .ledger
            .find_candidate(candidate_id)
            .await
            .map_err(|e| {
                ctx.error(
                    ErrorCode::ProcessingError,
                    format!("Failed to look up candidate {}", candidate_id),
                    ProcessingStage::DatabaseLookup,
                    Severity::Error,
                )
                .with_cause(e)
            })?
            .ok_or_else(|| {
                ctx.error(
                    ErrorCode::CandidateNotFound,
                    format!("Candidate not found with id: {}", candidate_id),
                    ProcessingStage::DatabaseLookup,
                    Severity::Error,
                )
            })?;

        if let Some(weekend_id) = candidate.weekend_id {
            ctx.weekend_id = Some(weekend_id.to_string());
        }

        if candidate.status != CandidateStatus::AwaitingPayment {
            return self
                .redelivered_candidate_payment(candidate_id, candidate.status, payment_intent_id, ctx)
                .await;
        }

        let fees = self.fee_data(payment_intent_id).await;
        let payment = NewPayment {
            ledger: Ledger::Candidate,
            target_id: candidate_id,
            weekend_id: candidate.weekend_id,
            payment_intent_id: payment_intent_id.to_string(),
            gross_amount: amount,
            fees,
            payment_method: PaymentMethod::Card,
            payment_owner: Some(
                session
                    .metadata_value("payment_owner")
                    .unwrap_or(UNKNOWN_PAYMENT_OWNER)
                    .to_string(),
            ),
        };

        let outcome = self
            .ledger
            .record_payment(payment, RecordOptions::webhook())
            .await
            .map_err(|e| {
                ctx.error(
                    ErrorCode::PaymentRecordFailed,
                    "Failed to record candidate payment",
                    ProcessingStage::PaymentRecording,
                    Severity::Error,
                )
                .with_cause(e)
            })?;
        let payment_id = outcome.row().id;

        let message = format!("Payment {} recorded but candidate was not confirmed", payment_id);
        let confirmed = self
            .ledger
            .confirm_candidate(candidate_id)
            .await
            .map_err(|e| status_not_advanced(ctx, &message).with_cause(e))?;
        if !confirmed {
            return Err(status_not_advanced(ctx, &message));
        }

        info!(%candidate_id, %payment_id, "✅ Candidate confirmed");

        // The candidate was awaiting payment until now, even when the row came from an
        // earlier delivery whose status update failed
        if let Err(e) = self
            .notifier
            .notify_candidate_payment(candidate_id, amount, PaymentMethod::Card)
            .await
        {
            error!(%candidate_id, "Failed to notify pre-weekend couple of candidate payment: {}", e);
        }

        Ok(HandlerSuccess::processed(
            EntityType::CandidatePayment,
            payment_id.to_string(),
            json!({
                "candidate_id": candidate_id,
                "payment_amount": amount,
                "duplicate": outcome.is_duplicate(),
            }),
        ))
    }

    /// A confirmed candidate whose payment is already in the ledger is a redelivery
    async fn redelivered_candidate_payment(
        &self,
        candidate_id: Uuid,
        status: CandidateStatus,
        payment_intent_id: &str,
        ctx: &WebhookPaymentContext,
    ) -> HandlerResult {
        let not_awaiting = |ctx: &WebhookPaymentContext| {
            ctx.error(
                ErrorCode::CandidateNotAwaitingPayment,
                format!("Candidate not in awaiting_payment status (current: {:?})", status),
                ProcessingStage::DatabaseLookup,
                Severity::Error,
            )
        };

        if status != CandidateStatus::Confirmed {
            return Err(not_awaiting(ctx));
        }

        let existing = self
            .ledger
            .find_payment(Ledger::Candidate, payment_intent_id)
            .await
            .map_err(|e| {
                ctx.error(
                    ErrorCode::ProcessingError,
                    "Failed to look up existing candidate payment",
                    ProcessingStage::DatabaseLookup,
                    Severity::Error,
                )
                .with_cause(e)
            })?;

        match existing {
            Some(row) if row.target_id == candidate_id => {
                info!(%candidate_id, payment_intent_id, "Duplicate checkout delivery, candidate already confirmed");
                Ok(HandlerSuccess::processed(
                    EntityType::CandidatePayment,
                    row.id.to_string(),
                    json!({
                        "candidate_id": candidate_id,
                        "payment_amount": row.gross_amount,
                        "duplicate": true,
                    }),
                ))
            }
            _ => Err(not_awaiting(ctx)),
        }
    }

    // ========== TEAM FLOW ==========

    async fn handle_team_payment(
        &self,
        session: &CheckoutSession,
        payment_intent_id: &str,
        amount: Decimal,
        ctx: &mut WebhookPaymentContext,
    ) -> HandlerResult {
        let raw_user_id = session.metadata_value("user_id").ok_or_else(|| {
            ctx.error(
                ErrorCode::MissingUserId,
                "Missing user_id in session metadata",
                ProcessingStage::Validation,
                Severity::Error,
            )
        })?;
        let raw_weekend_id = session.metadata_value("weekend_id").ok_or_else(|| {
            ctx.error(
                ErrorCode::MissingWeekendId,
                "Missing weekend_id in session metadata",
                ProcessingStage::Validation,
                Severity::Error,
            )
        })?;
        ctx.user_id = Some(raw_user_id.to_string());
        ctx.weekend_id = Some(raw_weekend_id.to_string());

        let user_id = parse_metadata_id(raw_user_id, "user_id", ctx)?;
        let weekend_id = parse_metadata_id(raw_weekend_id, "weekend_id", ctx)?;

        info!(%user_id, %weekend_id, "Processing team payment");

        let roster = self
            .ledger
            .find_roster_record(user_id, weekend_id)
            .await
            .map_err(|e| {
                ctx.error(
                    ErrorCode::ProcessingError,
                    "Failed to look up weekend roster record",
                    ProcessingStage::DatabaseLookup,
                    Severity::Error,
                )
                .with_cause(e)
            })?
            .ok_or_else(|| {
                ctx.error(
                    ErrorCode::WeekendRosterNotFound,
                    format!("No roster record for user {} on weekend {}", user_id, weekend_id),
                    ProcessingStage::DatabaseLookup,
                    Severity::Error,
                )
            })?;
        ctx.weekend_roster_id = Some(roster.id.to_string());
        let already_paid = roster.status.as_deref() == Some(ROSTER_STATUS_PAID);

        let fees = self.fee_data(payment_intent_id).await;
        let payment = NewPayment {
            ledger: Ledger::Team,
            target_id: roster.id,
            weekend_id: Some(weekend_id),
            payment_intent_id: payment_intent_id.to_string(),
            gross_amount: amount,
            fees,
            payment_method: PaymentMethod::Card,
            payment_owner: session.metadata_value("payment_owner").map(str::to_string),
        };

        let outcome = self
            .ledger
            .record_payment(payment, RecordOptions::webhook())
            .await
            .map_err(|e| {
                ctx.error(
                    ErrorCode::PaymentRecordFailed,
                    "Failed to record team payment",
                    ProcessingStage::PaymentRecording,
                    Severity::Error,
                )
                .with_cause(e)
            })?;
        let payment_id = outcome.row().id;

        let message = format!("Payment {} recorded but roster row was not marked paid", payment_id);
        let marked = self
            .ledger
            .mark_roster_paid(roster.id)
            .await
            .map_err(|e| status_not_advanced(ctx, &message).with_cause(e))?;
        if !marked {
            return Err(status_not_advanced(ctx, &message));
        }

        info!(weekend_roster_id = %roster.id, %payment_id, "✅ Team member marked as paid");

        if !already_paid {
            if let Err(e) = self
                .notifier
                .notify_team_payment(user_id, weekend_id, amount)
                .await
            {
                error!(%user_id, %weekend_id, "Failed to notify assistant head of team payment: {}", e);
            }
        }

        Ok(HandlerSuccess::processed(
            EntityType::TeamPayment,
            payment_id.to_string(),
            json!({
                "user_id": user_id,
                "weekend_id": weekend_id,
                "weekend_roster_id": roster.id,
                "payment_amount": amount,
                "duplicate": outcome.is_duplicate(),
            }),
        ))
    }
}

fn status_not_advanced(ctx: &WebhookPaymentContext, message: &str) -> WebhookError {
    ctx.error(
        ErrorCode::StatusUpdateFailed,
        message,
        ProcessingStage::StatusUpdate,
        Severity::Fatal,
    )
}

fn parse_metadata_id(
    value: &str,
    key: &str,
    ctx: &WebhookPaymentContext,
) -> Result<Uuid, WebhookError> {
    Uuid::parse_str(value).map_err(|e| {
        ctx.error(
            ErrorCode::InvalidMetadata,
            format!("Metadata {} is not a valid id: {}", key, value),
            ProcessingStage::Validation,
            Severity::Error,
        )
        .with_cause(e)
    })
}

#[async_trait]
impl WebhookHandler for CheckoutSessionCompletedHandler {
    fn event_type(&self) -> &'static str {
        CHECKOUT_SESSION_COMPLETED
    }

    async fn handle(&self, event: &StripeEvent, ctx: &mut WebhookPaymentContext) -> HandlerResult {
        let session: CheckoutSession = event.object().map_err(|e| {
            ctx.error(
                ErrorCode::EventParseError,
                "Malformed checkout session",
                ProcessingStage::EventParsing,
                Severity::Error,
            )
            .with_cause(e)
        })?;

        let payment_intent_id = session
            .payment_intent_id()
            .ok_or_else(|| {
                ctx.error(
                    ErrorCode::MissingPaymentIntent,
                    "Missing payment intent in session",
                    ProcessingStage::Validation,
                    Severity::Error,
                )
            })?
            .to_string();

        let amount = from_minor_units(session.amount_total.unwrap_or(0));
        ctx.payment_intent_id = Some(payment_intent_id.clone());
        ctx.amount = session.amount_total.map(from_minor_units);

        info!(
            session_id = %session.id,
            payment_intent_id = %payment_intent_id,
            "Processing completed checkout session"
        );

        let price_id = session.metadata_value("price_id");
        match price_id {
            Some(price) if self.prices.candidate_fee.as_deref() == Some(price) => {
                self.handle_candidate_payment(&session, &payment_intent_id, amount, ctx)
                    .await
            }
            Some(price) if self.prices.team_fee.as_deref() == Some(price) => {
                self.handle_team_payment(&session, &payment_intent_id, amount, ctx)
                    .await
            }
            _ => {
                warn!(?price_id, "Unknown price ID in checkout session, ignoring");
                Ok(HandlerSuccess::not_processed())
            }
        }
    }
}
