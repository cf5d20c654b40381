use serde::Serialize;

use crate::webhook::types::{EntityType, ErrorCode, HandlerSuccess, ProcessingStage, WebhookError};

// ========== RESPONSE MODELS ==========

/// Acknowledgement returned to Stripe for a delivered event
#[derive(Debug, Serialize)]
pub struct WebhookReceivedResponse {
    pub received: bool,
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl From<HandlerSuccess> for WebhookReceivedResponse {
    fn from(success: HandlerSuccess) -> Self {
        Self {
            received: true,
            processed: success.processed,
            entity_type: success.entity_type,
            entity_id: success.entity_id,
        }
    }
}

/// Body of every rejected or failed delivery
#[derive(Debug, Serialize)]
pub struct WebhookErrorResponse {
    pub error: String,
    pub code: ErrorCode,
    pub stage: ProcessingStage,
}

impl From<&WebhookError> for WebhookErrorResponse {
    fn from(webhook_error: &WebhookError) -> Self {
        Self {
            error: webhook_error.message.clone(),
            code: webhook_error.code,
            stage: webhook_error.stage,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub supported_events: Vec<String>,
}
