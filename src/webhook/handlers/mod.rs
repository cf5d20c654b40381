pub mod charge_updated;
pub mod checkout_session_completed;
pub mod payout_paid;

use std::sync::Arc;

use charge_updated::ChargeUpdatedHandler;
use checkout_session_completed::CheckoutSessionCompletedHandler;
use payout_paid::PayoutPaidHandler;

use super::router::WebhookRouter;
use crate::config::CheckoutPrices;
use crate::ledger::PaymentLedger;
use crate::notifications::Notifier;

/// Router with every payment handler registered
pub fn payment_router(
    ledger: Arc<PaymentLedger>,
    notifier: Arc<dyn Notifier>,
    prices: CheckoutPrices,
) -> WebhookRouter {
    WebhookRouter::builder()
        .register(Arc::new(CheckoutSessionCompletedHandler::new(
            ledger.clone(),
            notifier,
            prices,
        )))
        .register(Arc::new(ChargeUpdatedHandler::new(ledger.clone())))
        .register(Arc::new(PayoutPaidHandler::new(ledger)))
        .build()
}
