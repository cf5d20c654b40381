use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{NotificationError, Notifier, ASSISTANT_HEAD, PREWEEKEND_COUPLE};
use crate::ledger::models::PaymentMethod;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

// ============ EMAIL (RESEND) ============

/// Resend email client
pub struct ResendEmailClient {
    api_key: String,
    from_email: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    to: [&'a str; 1],
    from: &'a str,
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    id: String,
}

impl ResendEmailClient {
    pub fn new(api_key: String, from_email: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_key,
            from_email,
            client,
        }
    }

    /// Send email via Resend, returning the provider message id
    pub async fn send_email(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<String, NotificationError> {
        let request = ResendEmailRequest {
            to: [to],
            from: &self.from_email,
            subject,
            html: html_body,
        };

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(NotificationError::Provider(format!(
                "Resend API error: {}",
                error_text
            )));
        }

        let result: ResendEmailResponse = response.json().await?;
        info!("📧 Email sent via Resend: {}", result.id);
        Ok(result.id)
    }
}

// ============ PAYMENT NOTICES ============

#[derive(Debug, sqlx::FromRow)]
struct PersonName {
    first_name: Option<String>,
    last_name: Option<String>,
}

impl PersonName {
    fn display(&self, fallback: &str) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            _ => fallback.to_string(),
        }
    }
}

fn candidate_payment_email(candidate_name: &str, amount: Decimal, method: PaymentMethod) -> (String, String) {
    let subject = format!("Candidate Payment Received - {}", candidate_name);
    let html = format!(
        "<p>A payment of <strong>${:.2}</strong> was received for candidate \
         <strong>{}</strong> by {}.</p><p>The candidate is now confirmed for the weekend.</p>",
        amount,
        candidate_name,
        method.as_str()
    );
    (subject, html)
}

fn team_payment_email(member_name: &str, amount: Decimal) -> (String, String) {
    let subject = format!("Team Fee Received - {}", member_name);
    let html = format!(
        "<p><strong>{}</strong> paid their team fee of <strong>${:.2}</strong>.</p>\
         <p>Their roster entry is now marked as paid.</p>",
        member_name, amount
    );
    (subject, html)
}

/// Emails staff through Resend after a payment is recorded
pub struct EmailNotifier {
    pool: PgPool,
    email: ResendEmailClient,
}

impl EmailNotifier {
    pub fn new(pool: PgPool, email: ResendEmailClient) -> Self {
        Self { pool, email }
    }

    async fn recipient_email(&self, recipient: &str) -> Result<String, NotificationError> {
        let email: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT email_address
            FROM contact_information
            WHERE id = $1
            "#,
        )
        .bind(recipient)
        .fetch_optional(&self.pool)
        .await?;

        email
            .flatten()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| NotificationError::RecipientNotFound(recipient.to_string()))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify_candidate_payment(
        &self,
        candidate_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<(), NotificationError> {
        let name = sqlx::query_as::<_, PersonName>(
            "SELECT first_name, last_name FROM candidates WHERE id = $1",
        )
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| NotificationError::SubjectNotFound(format!("Candidate {}", candidate_id)))?;

        let to = self.recipient_email(PREWEEKEND_COUPLE).await?;
        let (subject, html) = candidate_payment_email(&name.display("Candidate"), amount, method);

        self.email.send_email(&to, &subject, &html).await?;
        Ok(())
    }

    async fn notify_team_payment(
        &self,
        user_id: Uuid,
        weekend_id: Uuid,
        amount: Decimal,
    ) -> Result<(), NotificationError> {
        let name = sqlx::query_as::<_, PersonName>(
            "SELECT first_name, last_name FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| NotificationError::SubjectNotFound(format!("User {}", user_id)))?;

        let to = self.recipient_email(ASSISTANT_HEAD).await?;
        let (subject, html) = team_payment_email(&name.display("Team member"), amount);

        info!(%user_id, %weekend_id, "Sending team payment notice");
        self.email.send_email(&to, &subject, &html).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_person_name_fallback() {
        let full = PersonName {
            first_name: Some("Jane".into()),
            last_name: Some("Doe".into()),
        };
        let missing = PersonName {
            first_name: None,
            last_name: Some("Doe".into()),
        };

        assert_eq!(full.display("Candidate"), "Jane Doe");
        assert_eq!(missing.display("Candidate"), "Candidate");
    }

    #[test]
    fn test_candidate_payment_email_content() {
        let (subject, html) = candidate_payment_email("Jane Doe", dec!(250), PaymentMethod::Card);

        assert_eq!(subject, "Candidate Payment Received - Jane Doe");
        assert!(html.contains("$250.00"));
        assert!(html.contains("by card"));
    }

    #[test]
    fn test_resend_request_shape() {
        let request = ResendEmailRequest {
            to: ["head@example.org"],
            from: "noreply@example.org",
            subject: "Team Fee Received - Sam",
            html: "<p>paid</p>",
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["to"], serde_json::json!(["head@example.org"]));
        assert_eq!(json["from"], "noreply@example.org");
    }
}
