use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A reference Stripe may return either as a bare id or as an expanded object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object { id } => id,
        }
    }
}

impl From<&str> for Expandable {
    fn from(id: &str) -> Self {
        Expandable::Id(id.to_string())
    }
}

// ========== API OBJECTS ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub latest_charge: Option<Expandable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    /// Minor currency units
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub balance_transaction: Option<Expandable>,
    #[serde(default)]
    pub payment_intent: Option<Expandable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceTransaction {
    pub id: String,
    pub amount: i64,
    pub fee: i64,
    pub net: i64,
    #[serde(default)]
    pub source: Option<Expandable>,
    #[serde(rename = "type", default)]
    pub transaction_type: Option<String>,
}

/// One page of a Stripe list endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPage<T> {
    pub data: Vec<T>,
    pub has_more: bool,
}

// ========== WEBHOOK EVENTS ==========

/// Verified webhook event; `data.object` is decoded by the handler that owns the type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    pub data: EventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    pub fn object<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.object.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<Expandable>,
    /// Minor currency units
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    /// Only a bare id string counts; an expanded object means the session was not
    /// delivered in the shape this endpoint subscribes to
    pub fn payment_intent_id(&self) -> Option<&str> {
        match &self.payment_intent {
            Some(Expandable::Id(id)) if !id.is_empty() => Some(id),
            _ => None,
        }
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub status: String,
    /// Unix seconds
    #[serde(default)]
    pub arrival_date: Option<i64>,
}
