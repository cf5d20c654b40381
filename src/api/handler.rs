use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::models::*;
use crate::stripe::models::StripeEvent;
use crate::stripe::signature::verify_signature;
use crate::webhook::context::report_webhook_error;
use crate::webhook::router::WebhookRouter;
use crate::webhook::types::{ErrorCode, ProcessingStage};

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<WebhookRouter>,
    /// Endpoint signing secret; deliveries are refused until it is configured
    pub webhook_secret: Option<String>,
    pub signature_tolerance_secs: i64,
}

/// A delivery that did not complete, answered with `{error, code, stage}`
#[derive(Debug)]
pub struct WebhookRejection {
    status: StatusCode,
    body: WebhookErrorResponse,
}

impl WebhookRejection {
    fn new(
        status: StatusCode,
        code: ErrorCode,
        stage: ProcessingStage,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            body: WebhookErrorResponse {
                error: message.into(),
                code,
                stage,
            },
        }
    }
}

impl IntoResponse for WebhookRejection {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Receive a Stripe event
/// POST /api/v1/webhooks/stripe
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookReceivedResponse>, WebhookRejection> {
    let Some(secret) = state.webhook_secret.as_deref() else {
        warn!("Stripe webhook secret is not configured, refusing delivery");
        return Err(WebhookRejection::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::WebhookNotConfigured,
            ProcessingStage::SignatureVerification,
            "Webhook not configured",
        ));
    };

    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            warn!("Stripe webhook delivered without a signature");
            WebhookRejection::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::MissingSignature,
                ProcessingStage::SignatureVerification,
                "Missing Stripe-Signature header",
            )
        })?;

    // SECURITY: nothing in the body is trusted before this check
    verify_signature(
        &body,
        signature,
        secret,
        state.signature_tolerance_secs,
        Utc::now().timestamp(),
    )
    .map_err(|e| {
        warn!("Stripe webhook signature rejected: {}", e);
        WebhookRejection::new(
            StatusCode::BAD_REQUEST,
            ErrorCode::InvalidSignature,
            ProcessingStage::SignatureVerification,
            "Invalid signature",
        )
    })?;

    let event: StripeEvent = serde_json::from_slice(&body).map_err(|e| {
        warn!("Failed to parse Stripe event: {}", e);
        WebhookRejection::new(
            StatusCode::BAD_REQUEST,
            ErrorCode::EventParseError,
            ProcessingStage::EventParsing,
            "Failed to parse event",
        )
    })?;

    info!(event_id = %event.id, event_type = %event.event_type, "🔔 Received Stripe webhook");

    match state.router.route(&event).await {
        Ok(success) => Ok(Json(success.into())),
        Err(webhook_error) => {
            report_webhook_error(&webhook_error);

            // Stripe redelivers anything outside 2xx
            let status = if webhook_error.should_acknowledge() {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };

            Err(WebhookRejection {
                status,
                body: WebhookErrorResponse::from(&webhook_error),
            })
        }
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        supported_events: state
            .router
            .supported_event_types()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}
