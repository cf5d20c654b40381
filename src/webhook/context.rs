use futures::FutureExt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info, info_span, warn, Instrument};

use super::router::WebhookHandler;
use super::types::*;
use crate::stripe::models::StripeEvent;

/// Runs `handler` inside a diagnostic scope for one event
///
/// INVARIANTS:
/// - A structured error leaves with the fully enriched context attached
/// - A panic is reported with the context and then resumed, never swallowed
pub async fn with_webhook_scope(
    handler: &dyn WebhookHandler,
    event: &StripeEvent,
    ctx: &mut WebhookPaymentContext,
) -> HandlerResult {
    let span = info_span!(
        "webhook",
        event_id = %ctx.event_id,
        event_type = %ctx.event_type,
    );

    let outcome = AssertUnwindSafe(handler.handle(event, ctx))
        .catch_unwind()
        .instrument(span.clone())
        .await;

    match outcome {
        Ok(Ok(success)) => {
            span.in_scope(|| log_webhook_success(&success, ctx));
            Ok(success)
        }
        Ok(Err(mut webhook_error)) => {
            webhook_error.context = ctx.clone();
            Err(webhook_error)
        }
        Err(payload) => {
            span.in_scope(|| {
                error!(
                    context = %serde_json::to_string(ctx).unwrap_or_default(),
                    "💥 Unexpected panic while processing webhook event"
                )
            });
            panic::resume_unwind(payload)
        }
    }
}

/// Logs a handler failure at the level its severity calls for
pub fn report_webhook_error(webhook_error: &WebhookError) {
    let context = serde_json::to_string(&webhook_error.context).unwrap_or_default();
    let cause = webhook_error.cause.as_deref().unwrap_or("");

    match webhook_error.severity {
        Severity::Warning => warn!(
            code = webhook_error.code.as_str(),
            stage = webhook_error.stage.as_str(),
            severity = webhook_error.severity.as_str(),
            event_id = %webhook_error.context.event_id,
            event_type = %webhook_error.context.event_type,
            %context,
            cause,
            "Webhook warning: {}",
            webhook_error.message
        ),
        Severity::Error => error!(
            code = webhook_error.code.as_str(),
            stage = webhook_error.stage.as_str(),
            severity = webhook_error.severity.as_str(),
            event_id = %webhook_error.context.event_id,
            event_type = %webhook_error.context.event_type,
            %context,
            cause,
            "❌ Webhook error: {}",
            webhook_error.message
        ),
        Severity::Fatal => error!(
            code = webhook_error.code.as_str(),
            stage = webhook_error.stage.as_str(),
            severity = webhook_error.severity.as_str(),
            fatal = true,
            event_id = %webhook_error.context.event_id,
            event_type = %webhook_error.context.event_type,
            %context,
            cause,
            "🚨 Fatal webhook error: {}",
            webhook_error.message
        ),
    }
}

pub fn log_webhook_success(result: &HandlerSuccess, ctx: &WebhookPaymentContext) {
    let details = result
        .details
        .as_ref()
        .map(|d| d.to_string())
        .unwrap_or_default();

    if result.processed {
        info!(
            event_id = %ctx.event_id,
            event_type = %ctx.event_type,
            entity_type = ?result.entity_type,
            entity_id = result.entity_id.as_deref().unwrap_or(""),
            payment_intent_id = ctx.payment_intent_id.as_deref().unwrap_or(""),
            %details,
            "✅ Webhook event processed"
        );
    } else {
        info!(
            event_id = %ctx.event_id,
            event_type = %ctx.event_type,
            %details,
            "Webhook event acknowledged without changes"
        );
    }
}
