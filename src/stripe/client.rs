use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::models::{BalanceTransaction, Charge, ListPage, PaymentIntent};

/// Maximum page size accepted by Stripe list endpoints
pub const MAX_PAGE_SIZE: u8 = 100;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Stripe API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// The slice of the Stripe API the reconciliation pipeline consumes
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProcessorError>;

    async fn retrieve_charge(&self, id: &str) -> Result<Charge, ProcessorError>;

    async fn retrieve_balance_transaction(
        &self,
        id: &str,
    ) -> Result<BalanceTransaction, ProcessorError>;

    /// One page of `type=charge` balance transactions settled by `payout_id`
    async fn list_payout_balance_transactions(
        &self,
        payout_id: &str,
        limit: u8,
        starting_after: Option<&str>,
    ) -> Result<ListPage<BalanceTransaction>, ProcessorError>;
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Stripe REST client
pub struct StripeClient {
    api_base: String,
    secret_key: String,
    client: reqwest::Client,
}

impl StripeClient {
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            client,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProcessorError> {
        let url = format!("{}/v1/{}", self.api_base, path);
        debug!("Stripe GET {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&error_text)
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or(error_text);
            return Err(ProcessorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn retrieve_payment_intent(&self, id: &str) -> Result<PaymentIntent, ProcessorError> {
        self.get(&format!("payment_intents/{}", id), &[]).await
    }

    async fn retrieve_charge(&self, id: &str) -> Result<Charge, ProcessorError> {
        self.get(&format!("charges/{}", id), &[]).await
    }

    async fn retrieve_balance_transaction(
        &self,
        id: &str,
    ) -> Result<BalanceTransaction, ProcessorError> {
        self.get(&format!("balance_transactions/{}", id), &[]).await
    }

    async fn list_payout_balance_transactions(
        &self,
        payout_id: &str,
        limit: u8,
        starting_after: Option<&str>,
    ) -> Result<ListPage<BalanceTransaction>, ProcessorError> {
        let mut query = vec![
            ("payout", payout_id.to_string()),
            ("type", "charge".to_string()),
            ("limit", limit.min(MAX_PAGE_SIZE).to_string()),
        ];
        if let Some(cursor) = starting_after {
            query.push(("starting_after", cursor.to_string()));
        }

        self.get("balance_transactions", &query).await
    }
}
