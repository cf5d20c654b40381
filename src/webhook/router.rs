use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

use super::context::with_webhook_scope;
use super::types::{HandlerResult, HandlerSuccess, WebhookPaymentContext};
use crate::stripe::models::StripeEvent;

/// Handler for one Stripe event type
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    /// The Stripe event type this handler processes (e.g. `checkout.session.completed`)
    fn event_type(&self) -> &'static str;

    /// Process the event, enriching `ctx` as facts are learned
    ///
    /// INVARIANTS:
    /// - Must be safe to run again for a redelivered event
    /// - Expected failures are returned, never panicked
    async fn handle(&self, event: &StripeEvent, ctx: &mut WebhookPaymentContext) -> HandlerResult;
}

/// WebhookRouter - dispatches verified events to their handler
///
/// Built once at startup and shared read-only; there is no registration after construction.
pub struct WebhookRouter {
    handlers: HashMap<&'static str, Arc<dyn WebhookHandler>>,
}

impl WebhookRouter {
    pub fn new(handlers: Vec<Arc<dyn WebhookHandler>>) -> Self {
        let handlers = handlers
            .into_iter()
            .map(|handler| {
                info!("Registering webhook handler for: {}", handler.event_type());
                (handler.event_type(), handler)
            })
            .collect();

        Self { handlers }
    }

    pub fn builder() -> WebhookRouterBuilder {
        WebhookRouterBuilder::default()
    }

    /// Route an event to its handler inside a diagnostic scope
    ///
    /// Unknown event types are acknowledged as not processed.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn route(&self, event: &StripeEvent) -> HandlerResult {
        let Some(handler) = self.handlers.get(event.event_type.as_str()) else {
            info!("No handler registered for event type {}", event.event_type);
            return Ok(HandlerSuccess::not_processed());
        };

        let mut ctx = WebhookPaymentContext::new(&event.id, &event.event_type);
        with_webhook_scope(handler.as_ref(), event, &mut ctx).await
    }

    /// Supported event types, sorted
    pub fn supported_event_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn is_event_type_supported(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }
}

#[derive(Default)]
pub struct WebhookRouterBuilder {
    handlers: Vec<Arc<dyn WebhookHandler>>,
}

impl WebhookRouterBuilder {
    pub fn register(mut self, handler: Arc<dyn WebhookHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build(self) -> WebhookRouter {
        WebhookRouter::new(self.handlers)
    }
}
