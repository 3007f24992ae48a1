//! # billing-bridge
//!
//! Keeps a local user's subscription status in step with Stripe.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌─────────────┐
//! │   Client    │────▶│  Stripe Hosted  │────▶│   Client    │
//! │  (action)   │     │ Checkout/Portal │     │ (/checkout) │
//! └─────────────┘     └────────┬────────┘     └──────▲──────┘
//!                              │ webhook             │ polls status
//!                              ▼                     │
//!                     ┌─────────────────┐     ┌──────┴──────┐
//!                     │    Webhook      │────▶│  User row   │
//!                     │   Reconciler    │     │  (status)   │
//!                     └─────────────────┘     └─────────────┘
//! ```
//!
//! Three pieces, leaves first:
//!
//! - [`CustomerResolver`] finds or creates the Stripe customer for a user and
//!   repairs a stale `stripe_customer_id` on the way.
//! - [`SessionFactory`] creates Checkout and Customer Portal sessions.
//! - [`WebhookReconciler`] verifies Stripe's signed events and writes the
//!   mapped [`SubscriptionStatus`] onto the matching user.
//!
//! The Stripe client and the user store are injected as trait objects, built
//! once per process.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use billing_bridge::{
//!     BillingActions, BillingConfig, CustomerResolver, MemoryUserStore, RequestContext,
//!     SessionFactory, StripeProvider,
//! };
//!
//! let provider = Arc::new(StripeProvider::from_env()?);
//! let users = Arc::new(MemoryUserStore::new());
//! let config = Arc::new(BillingConfig::from_env());
//!
//! let resolver = CustomerResolver::new(provider.clone(), users.clone());
//! let sessions = SessionFactory::new(resolver, provider.clone(), config.clone());
//! let actions = BillingActions::new(sessions, users.clone());
//!
//! let redirect = actions.create_checkout_session(&RequestContext::authenticated(user)).await?;
//! // Redirect user to: redirect.session_url
//! ```

mod actions;
mod config;
mod customer;
mod error;
mod live_client;
mod provider;
mod session;
mod signature;
mod status;
mod user;
mod webhook;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use actions::{BillingActions, RequestContext, SessionRedirect};
pub use config::{BillingConfig, DEFAULT_CLIENT_URL};
pub use customer::CustomerResolver;
pub use error::{BillingError, ErrorResponse, Result};
pub use live_client::StripeProvider;
pub use provider::{
    BillingProvider, CheckoutSessionRequest, HostedSession, NewCustomer, PortalSessionRequest,
    RemoteCustomer, RemoteSubscription,
};
pub use session::{CheckoutSession, PortalSession, SessionFactory};
pub use signature::{WebhookVerifier, DEFAULT_TOLERANCE_SECS};
pub use status::SubscriptionStatus;
pub use user::{MemoryUserStore, User, UserId, UserStore, UserUpdate};
pub use webhook::{WebhookEvent, WebhookOutcome, WebhookReconciler};
