use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,

    /// Stripe secret API key used by the transaction query client
    pub stripe_secret_key: String,
    pub stripe_api_base: String,
    /// Signing secret of the webhook endpoint (`whsec_...`)
    pub stripe_webhook_secret: Option<String>,
    pub stripe_signature_tolerance_secs: i64,

    pub candidate_fee_price_id: Option<String>,
    pub team_fee_price_id: Option<String>,

    pub resend_api_key: Option<String>,
    pub notification_from_email: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("database_url", "postgresql://localhost/retreat_payments")?
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("stripe_secret_key", "")?
            .set_default("stripe_api_base", "https://api.stripe.com")?
            .set_default("stripe_signature_tolerance_secs", 300)?
            .set_default(
                "notification_from_email",
                "Dusty Trails Tres Dias <noreply@dustytrailstresdias.org>",
            )?
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Price ids that select the checkout flow
    pub fn checkout_prices(&self) -> CheckoutPrices {
        CheckoutPrices {
            candidate_fee: self.candidate_fee_price_id.clone(),
            team_fee: self.team_fee_price_id.clone(),
        }
    }
}

/// Routing table for `checkout.session.completed`
#[derive(Debug, Clone, Default)]
pub struct CheckoutPrices {
    pub candidate_fee: Option<String>,
    pub team_fee: Option<String>,
}
