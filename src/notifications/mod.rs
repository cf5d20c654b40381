// Payment notifications
//
// Email: Resend, recipients resolved from `contact_information`
// Fallback: log only, when no Resend key is configured

pub mod email;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::ledger::models::PaymentMethod;

pub use email::{EmailNotifier, ResendEmailClient};

/// `contact_information` key for candidate payment notices
pub const PREWEEKEND_COUPLE: &str = "preweekend-couple";
/// `contact_information` key for team fee notices
pub const ASSISTANT_HEAD: &str = "assistant-head";

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("No email address on file for {0}")]
    RecipientNotFound(String),

    #[error("{0} not found")]
    SubjectNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Email provider error: {0}")]
    Provider(String),
}

/// Staff notifications sent after a payment is recorded
///
/// Callers treat every failure as best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_candidate_payment(
        &self,
        candidate_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<(), NotificationError>;

    async fn notify_team_payment(
        &self,
        user_id: Uuid,
        weekend_id: Uuid,
        amount: Decimal,
    ) -> Result<(), NotificationError>;
}

/// Notifier for environments without an email provider
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_candidate_payment(
        &self,
        candidate_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<(), NotificationError> {
        info!(
            %candidate_id,
            %amount,
            method = method.as_str(),
            recipient = PREWEEKEND_COUPLE,
            "📧 Candidate payment notification (email disabled)"
        );
        Ok(())
    }

    async fn notify_team_payment(
        &self,
        user_id: Uuid,
        weekend_id: Uuid,
        amount: Decimal,
    ) -> Result<(), NotificationError> {
        info!(
            %user_id,
            %weekend_id,
            %amount,
            recipient = ASSISTANT_HEAD,
            "📧 Team payment notification (email disabled)"
        );
        Ok(())
    }
}
