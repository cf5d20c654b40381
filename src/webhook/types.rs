use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error codes reported for webhook failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Signature & parsing
    MissingSignature,
    InvalidSignature,
    EventParseError,

    // Validation
    MissingPaymentIntent,
    MissingCandidateId,
    MissingUserId,
    MissingWeekendId,
    InvalidMetadata,

    // Status
    CandidateNotAwaitingPayment,
    CandidateNotFound,
    WeekendRosterNotFound,

    // Processing
    PaymentRecordFailed,
    StatusUpdateFailed,
    FeeBackfillFailed,
    PayoutRecordFailed,

    // General
    ProcessingError,
    WebhookNotConfigured,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingSignature => "MISSING_SIGNATURE",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::EventParseError => "EVENT_PARSE_ERROR",
            ErrorCode::MissingPaymentIntent => "MISSING_PAYMENT_INTENT",
            ErrorCode::MissingCandidateId => "MISSING_CANDIDATE_ID",
            ErrorCode::MissingUserId => "MISSING_USER_ID",
            ErrorCode::MissingWeekendId => "MISSING_WEEKEND_ID",
            ErrorCode::InvalidMetadata => "INVALID_METADATA",
            ErrorCode::CandidateNotAwaitingPayment => "CANDIDATE_NOT_AWAITING_PAYMENT",
            ErrorCode::CandidateNotFound => "CANDIDATE_NOT_FOUND",
            ErrorCode::WeekendRosterNotFound => "WEEKEND_ROSTER_NOT_FOUND",
            ErrorCode::PaymentRecordFailed => "PAYMENT_RECORD_FAILED",
            ErrorCode::StatusUpdateFailed => "STATUS_UPDATE_FAILED",
            ErrorCode::FeeBackfillFailed => "FEE_BACKFILL_FAILED",
            ErrorCode::PayoutRecordFailed => "PAYOUT_RECORD_FAILED",
            ErrorCode::ProcessingError => "PROCESSING_ERROR",
            ErrorCode::WebhookNotConfigured => "WEBHOOK_NOT_CONFIGURED",
        }
    }

    /// Whether a redelivery of the same event could succeed
    ///
    /// Only entity state mismatches are permanent; everything else goes back to Stripe.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ErrorCode::CandidateNotAwaitingPayment
                | ErrorCode::CandidateNotFound
                | ErrorCode::WeekendRosterNotFound
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    SignatureVerification,
    EventParsing,
    Validation,
    DatabaseLookup,
    PaymentRecording,
    StatusUpdate,
    Notification,
    FeeBackfill,
    PayoutProcessing,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::SignatureVerification => "signature_verification",
            ProcessingStage::EventParsing => "event_parsing",
            ProcessingStage::Validation => "validation",
            ProcessingStage::DatabaseLookup => "database_lookup",
            ProcessingStage::PaymentRecording => "payment_recording",
            ProcessingStage::StatusUpdate => "status_update",
            ProcessingStage::Notification => "notification",
            ProcessingStage::FeeBackfill => "fee_backfill",
            ProcessingStage::PayoutProcessing => "payout_processing",
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    /// Money was taken but the system state could not be completed
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    CandidatePayment,
    TeamPayment,
    Payout,
    FeeBackfill,
}

/// Payment facts gathered while one event is processed
///
/// Owned by a single event's processing; handlers enrich it as they learn more.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WebhookPaymentContext {
    pub event_id: String,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekend_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekend_roster_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

impl WebhookPaymentContext {
    pub fn new(event_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            ..Self::default()
        }
    }

    /// Builds an error carrying a snapshot of this context
    pub fn error(
        &self,
        code: ErrorCode,
        message: impl Into<String>,
        stage: ProcessingStage,
        severity: Severity,
    ) -> WebhookError {
        WebhookError {
            message: message.into(),
            code,
            stage,
            severity,
            context: self.clone(),
            cause: None,
        }
    }
}

/// Structured failure of a webhook handler
#[derive(Error, Debug, Clone)]
#[error("[{code}] {message}")]
pub struct WebhookError {
    pub message: String,
    pub code: ErrorCode,
    pub stage: ProcessingStage,
    pub severity: Severity,
    pub context: WebhookPaymentContext,
    pub cause: Option<String>,
}

impl WebhookError {
    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Answer 2xx so Stripe stops redelivering
    pub fn should_acknowledge(&self) -> bool {
        self.severity == Severity::Warning || !self.code.is_retryable()
    }
}

/// Outcome of a handler that did not fail
///
/// `processed: false` is a normal result: unknown price, data not yet available,
/// nothing in the ledger to update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HandlerSuccess {
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl HandlerSuccess {
    pub fn processed(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            processed: true,
            entity_type: Some(entity_type),
            entity_id: Some(entity_id.into()),
            details: Some(details),
        }
    }

    pub fn not_processed() -> Self {
        Self::default()
    }

    pub fn not_processed_with(details: serde_json::Value) -> Self {
        Self {
            details: Some(details),
            ..Self::default()
        }
    }
}

pub type HandlerResult = Result<HandlerSuccess, WebhookError>;
