use std::{sync::Arc, time::Duration};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{info, warn};

use crate::{
    api::handler::AppState,
    config::Config,
    error::AppResult,
    ledger::{PaymentLedger, PgPaymentStore},
    notifications::{EmailNotifier, LogNotifier, Notifier, ResendEmailClient},
    stripe::{StripeClient, TransactionClient},
    webhook::payment_router,
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    // Database pool
    let pool = initialize_database(&config.database_url).await?;

    // Stripe
    if config.stripe_secret_key.is_empty() {
        warn!("⚠️  STRIPE_SECRET_KEY not set - fee lookups will fail until it is configured");
    }
    let stripe = Arc::new(StripeClient::new(
        config.stripe_api_base.clone(),
        config.stripe_secret_key.clone(),
    ));
    let transactions = Arc::new(TransactionClient::new(stripe));

    // Ledger
    let store = Arc::new(PgPaymentStore::new(pool.clone()));
    let ledger = Arc::new(PaymentLedger::new(store, transactions));

    // Notifications
    let notifier: Arc<dyn Notifier> = match &config.resend_api_key {
        Some(api_key) => {
            info!("📧 Payment notifications sent through Resend");
            Arc::new(EmailNotifier::new(
                pool.clone(),
                ResendEmailClient::new(api_key.clone(), config.notification_from_email.clone()),
            ))
        }
        None => {
            warn!("⚠️  RESEND_API_KEY not set - payment notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let prices = config.checkout_prices();
    if prices.candidate_fee.is_none() || prices.team_fee.is_none() {
        warn!("⚠️  Checkout price ids incomplete - unmatched sessions are acknowledged without changes");
    }

    let router = Arc::new(payment_router(ledger, notifier, prices));
    info!(
        "🔗 Webhook router initialized with events: {:?}",
        router.supported_event_types()
    );

    if config.stripe_webhook_secret.is_none() {
        warn!("⚠️  STRIPE_WEBHOOK_SECRET not set - webhook deliveries will be refused");
    }

    Ok(AppState {
        router,
        webhook_secret: config.stripe_webhook_secret.clone(),
        signature_tolerance_secs: config.stripe_signature_tolerance_secs,
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: 20 max connections");

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
