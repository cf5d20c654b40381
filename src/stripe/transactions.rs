use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::client::{PaymentProcessor, ProcessorError, MAX_PAGE_SIZE};

/// Fee data for a single payment, in major currency units
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionData {
    pub gross_amount: Decimal,
    pub stripe_fee: Decimal,
    pub net_amount: Decimal,
    pub charge_id: String,
    pub balance_transaction_id: String,
}

/// A charge settled by a payout. Amounts stay in minor units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayoutTransaction {
    pub charge_id: String,
    pub payment_intent_id: Option<String>,
    pub balance_transaction_id: String,
    pub gross_amount: i64,
    pub stripe_fee: i64,
    pub net_amount: i64,
}

#[derive(Error, Debug)]
pub enum TransactionDataError {
    #[error("Payment has not been charged yet")]
    NotCharged,

    #[error("Charge {0} has no balance transaction yet")]
    NoBalanceTransaction(String),

    #[error("Failed to retrieve fee data: {0}")]
    Processor(#[from] ProcessorError),
}

impl TransactionDataError {
    /// Settlement data will show up on a later event; callers defer instead of failing
    pub fn is_not_yet_available(&self) -> bool {
        matches!(
            self,
            TransactionDataError::NotCharged | TransactionDataError::NoBalanceTransaction(_)
        )
    }
}

/// Converts Stripe minor units (cents) to a decimal amount
pub fn from_minor_units(amount: i64) -> Decimal {
    Decimal::new(amount, 2)
}

/// Resolves settlement data on demand
pub struct TransactionClient {
    processor: Arc<dyn PaymentProcessor>,
}

impl TransactionClient {
    pub fn new(processor: Arc<dyn PaymentProcessor>) -> Self {
        Self { processor }
    }

    /// PaymentIntent -> latest Charge -> BalanceTransaction
    pub async fn get_transaction_data(
        &self,
        payment_intent_id: &str,
    ) -> Result<TransactionData, TransactionDataError> {
        let result = self.resolve_transaction_data(payment_intent_id).await;

        match &result {
            Ok(data) => info!(
                payment_intent_id,
                charge_id = %data.charge_id,
                balance_transaction_id = %data.balance_transaction_id,
                gross_amount = %data.gross_amount,
                stripe_fee = %data.stripe_fee,
                net_amount = %data.net_amount,
                "Retrieved payment fee data"
            ),
            Err(e) if e.is_not_yet_available() => {
                warn!(payment_intent_id, "Fee data not available yet: {}", e)
            }
            Err(e) => error!(payment_intent_id, "Failed to retrieve payment fee data: {}", e),
        }

        result
    }

    async fn resolve_transaction_data(
        &self,
        payment_intent_id: &str,
    ) -> Result<TransactionData, TransactionDataError> {
        let payment_intent = self
            .processor
            .retrieve_payment_intent(payment_intent_id)
            .await?;

        let charge_id = payment_intent
            .latest_charge
            .as_ref()
            .map(|c| c.id().to_string())
            .ok_or(TransactionDataError::NotCharged)?;

        let charge = self.processor.retrieve_charge(&charge_id).await?;

        let balance_transaction_id = charge
            .balance_transaction
            .as_ref()
            .map(|bt| bt.id().to_string())
            .ok_or_else(|| TransactionDataError::NoBalanceTransaction(charge_id.clone()))?;

        let balance_transaction = self
            .processor
            .retrieve_balance_transaction(&balance_transaction_id)
            .await?;

        Ok(TransactionData {
            gross_amount: from_minor_units(balance_transaction.amount),
            stripe_fee: from_minor_units(balance_transaction.fee),
            net_amount: from_minor_units(balance_transaction.net),
            charge_id,
            balance_transaction_id,
        })
    }

    /// Every charge settled by a payout, draining all pages
    pub async fn get_payout_transactions(
        &self,
        payout_id: &str,
    ) -> Result<Vec<PayoutTransaction>, TransactionDataError> {
        let mut transactions = Vec::new();
        let mut starting_after: Option<String> = None;

        loop {
            let page = self
                .processor
                .list_payout_balance_transactions(
                    payout_id,
                    MAX_PAGE_SIZE,
                    starting_after.as_deref(),
                )
                .await
                .map_err(|e| {
                    error!(payout_id, "Failed to list payout transactions: {}", e);
                    e
                })?;

            for bt in &page.data {
                let Some(source) = bt.source.as_ref() else {
                    warn!(balance_transaction_id = %bt.id, "Balance transaction has no source charge");
                    continue;
                };
                let charge_id = source.id().to_string();
                let charge = self.processor.retrieve_charge(&charge_id).await?;

                transactions.push(PayoutTransaction {
                    payment_intent_id: charge.payment_intent.as_ref().map(|pi| pi.id().to_string()),
                    charge_id,
                    balance_transaction_id: bt.id.clone(),
                    gross_amount: bt.amount,
                    stripe_fee: bt.fee,
                    net_amount: bt.net,
                });
            }

            if !page.has_more {
                break;
            }
            match page.data.last() {
                Some(last) => starting_after = Some(last.id.clone()),
                None => break,
            }
        }

        info!(
            payout_id,
            transaction_count = transactions.len(),
            "Retrieved payout transactions"
        );

        Ok(transactions)
    }
}
