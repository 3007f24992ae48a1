//! Billing Configuration
//!
//! Everything comes from the environment. Only the Stripe secret key is
//! required to build a provider; the price ID and webhook secret are checked
//! lazily so a half-configured deployment fails loudly on the request that
//! needs them instead of refusing to boot.

use crate::error::{BillingError, Result};

/// Redirect base used when `CLIENT_URL` is unset
pub const DEFAULT_CLIENT_URL: &str = "http://localhost:3000";

/// Billing configuration
#[derive(Clone, Debug)]
pub struct BillingConfig {
    /// Stripe Price ID for the subscription plan
    pub price_id: Option<String>,

    /// Webhook signing secret (`whsec_...`)
    pub webhook_secret: Option<String>,

    /// Base URL of the client application
    pub client_url: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            price_id: None,
            webhook_secret: None,
            client_url: DEFAULT_CLIENT_URL.into(),
        }
    }
}

impl BillingConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        let config = Self {
            price_id: non_empty_var("STRIPE_PRICE_ID"),
            webhook_secret: non_empty_var("STRIPE_WEBHOOK_SECRET"),
            client_url: non_empty_var("CLIENT_URL").unwrap_or_else(|| DEFAULT_CLIENT_URL.into()),
        };

        if config.webhook_secret.is_none() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET is not set. Webhook verification will fail.");
        }
        if config.price_id.is_none() {
            tracing::warn!("STRIPE_PRICE_ID is not set. Checkout sessions will fail.");
        }

        config
    }

    pub fn with_price_id(mut self, price_id: impl Into<String>) -> Self {
        self.price_id = Some(price_id.into());
        self
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    pub fn with_client_url(mut self, url: impl Into<String>) -> Self {
        self.client_url = url.into();
        self
    }

    /// Price ID, or a configuration fault
    pub fn require_price_id(&self) -> Result<&str> {
        self.price_id.as_deref().ok_or_else(|| {
            tracing::error!("STRIPE_PRICE_ID environment variable is not set.");
            BillingError::Config("Stripe Price ID missing".into())
        })
    }

    /// Webhook secret, or a configuration fault
    pub fn require_webhook_secret(&self) -> Result<&str> {
        self.webhook_secret.as_deref().ok_or_else(|| {
            tracing::error!("Stripe webhook secret is not configured.");
            BillingError::Config("Webhook secret not configured".into())
        })
    }

    /// Join a path onto the client URL without doubling slashes
    pub fn client_link(&self, path_and_query: &str) -> String {
        format!(
            "{}/{}",
            self.client_url.trim_end_matches('/'),
            path_and_query.trim_start_matches('/')
        )
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
