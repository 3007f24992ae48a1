//! billing-server
//!
//! Axum server exposing the Stripe billing bridge: the two authenticated
//! session actions, a status read for polling, and the webhook endpoint.

mod auth;
mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{routing::{get, post}, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use billing_bridge::{
    BillingConfig, BillingProvider, MemoryUserStore, StripeProvider, User, UserStore,
};

use crate::auth::TokenAuthenticator;
use crate::config::ServerConfig;
use crate::handlers::{
    create_checkout_session, create_customer_portal_session, health_check, stripe_webhook,
    subscription_status,
};
use crate::state::{AppState, Billing};

/// Build the application router
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))

        // Billing actions
        .route("/api/checkout-session", post(create_checkout_session))
        .route("/api/customer-portal-session", post(create_customer_portal_session))
        .route("/api/subscription", get(subscription_status))

        // Stripe
        .route("/webhook/stripe", post(stripe_webhook))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server_config = ServerConfig::from_env();
    let billing_config = Arc::new(BillingConfig::from_env());

    // Seed development users
    let users = Arc::new(MemoryUserStore::new());
    let mut auth = TokenAuthenticator::new();
    for (token, email) in &server_config.dev_users {
        let user = User::new(Some(email.clone()));
        auth.register(token.clone(), user.id);
        users.insert(user).await?;
    }
    if auth.is_empty() {
        tracing::warn!("⚠ No DEV_USERS configured - every billing action will return 401");
    } else {
        tracing::info!("Seeded {} development users", auth.len());
    }

    // Initialize payments
    let billing = match StripeProvider::from_env() {
        Ok(stripe) => {
            tracing::info!("✓ Stripe configured");
            let provider: Arc<dyn BillingProvider> = Arc::new(stripe);
            let users: Arc<dyn UserStore> = users.clone();
            Some(Billing::new(provider, users, billing_config.clone()))
        }
        Err(e) => {
            tracing::warn!("⚠ Stripe not configured - payments disabled ({})", e);
            tracing::warn!(
                "  Set STRIPE_SECRET_KEY, STRIPE_PRICE_ID and STRIPE_WEBHOOK_SECRET in .env"
            );
            None
        }
    };

    // Build application state
    let state = AppState {
        users,
        auth: Arc::new(auth),
        config: billing_config,
        billing,
    };

    let app = router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&server_config.bind_addr).await?;

    tracing::info!("billing-server running on http://{}", server_config.bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                       - Health check");
    tracing::info!("  POST /api/checkout-session         - Create Stripe checkout");
    tracing::info!("  POST /api/customer-portal-session  - Create Stripe customer portal");
    tracing::info!("  GET  /api/subscription             - Current subscription status");
    tracing::info!("  POST /webhook/stripe               - Stripe webhook");

    axum::serve(listener, app).await?;

    Ok(())
}
