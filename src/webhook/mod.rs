// Stripe webhook processing
//
// router:   event type -> handler registry
// context:  per-event diagnostic scope
// handlers: checkout.session.completed, charge.updated, payout.paid

pub mod context;
pub mod handlers;
pub mod router;
pub mod types;

pub use handlers::payment_router;
