//! Application State

use std::sync::Arc;

use billing_bridge::{
    BillingActions, BillingConfig, BillingProvider, CustomerResolver, SessionFactory, UserStore,
    WebhookReconciler,
};

use crate::auth::Authenticator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// User rows (stripe customer link + subscription status)
    pub users: Arc<dyn UserStore>,

    /// Maps bearer tokens to users
    pub auth: Arc<dyn Authenticator>,

    pub config: Arc<BillingConfig>,

    /// Billing services (optional - None if Stripe is not configured)
    pub billing: Option<Billing>,
}

/// Everything that needs a live Stripe client
#[derive(Clone)]
pub struct Billing {
    pub actions: BillingActions,
    pub reconciler: WebhookReconciler,
}

impl Billing {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        users: Arc<dyn UserStore>,
        config: Arc<BillingConfig>,
    ) -> Self {
        let resolver = CustomerResolver::new(provider.clone(), users.clone());
        let sessions = SessionFactory::new(resolver, provider.clone(), config.clone());

        Self {
            actions: BillingActions::new(sessions, users.clone()),
            reconciler: WebhookReconciler::new(provider, users, config),
        }
    }
}
