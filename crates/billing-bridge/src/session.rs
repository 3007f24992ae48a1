//! Hosted Sessions
//!
//! Builds the two Stripe-hosted pages a user can be sent to: Checkout to
//! start a subscription and the Customer Portal to manage one.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::BillingConfig;
use crate::customer::CustomerResolver;
use crate::error::{BillingError, Result};
use crate::provider::{BillingProvider, CheckoutSessionRequest, PortalSessionRequest};
use crate::user::User;

/// Placeholder Stripe substitutes with the session ID on redirect
const CHECKOUT_SESSION_ID_TEMPLATE: &str = "{CHECKOUT_SESSION_ID}";

/// Result of creating a checkout session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Stripe session ID
    pub id: String,

    /// URL to redirect user to
    pub url: String,
}

/// Result of creating a customer portal session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalSession {
    pub url: String,
}

/// Creates checkout and portal sessions
#[derive(Clone)]
pub struct SessionFactory {
    resolver: CustomerResolver,
    provider: Arc<dyn BillingProvider>,
    config: Arc<BillingConfig>,
}

impl SessionFactory {
    pub fn new(
        resolver: CustomerResolver,
        provider: Arc<dyn BillingProvider>,
        config: Arc<BillingConfig>,
    ) -> Self {
        Self {
            resolver,
            provider,
            config,
        }
    }

    /// Create a subscription checkout session for `user`.
    ///
    /// Fails with a configuration fault before touching Stripe when no price
    /// is configured. May link a Stripe customer to the user as a side effect
    /// (see [`CustomerResolver::resolve_customer_id`]).
    pub async fn create_checkout_session(&self, user: &User) -> Result<CheckoutSession> {
        let price_id = self.config.require_price_id()?.to_string();
        let customer_id = self.resolver.resolve_customer_id(user).await?;

        let request = CheckoutSessionRequest {
            customer_id: customer_id.clone(),
            price_id,
            quantity: 1,
            success_url: self.config.client_link(&format!(
                "/checkout?success=true&sessionId={CHECKOUT_SESSION_ID_TEMPLATE}"
            )),
            cancel_url: self.config.client_link("/checkout?canceled=true"),
            automatic_tax: true,
            allow_promotion_codes: true,
        };

        let session = self.provider.create_checkout_session(request).await.map_err(|e| {
            tracing::error!(
                customer_id = %customer_id,
                error = %e,
                "Error creating Stripe checkout session"
            );
            e
        })?;

        let url = session.url.ok_or(BillingError::MissingSessionUrl("Checkout"))?;

        tracing::info!(
            session_id = %session.id,
            customer_id = %customer_id,
            user_id = %user.id,
            "Created checkout session"
        );

        Ok(CheckoutSession { id: session.id, url })
    }

    /// Create a customer portal session for `user`.
    ///
    /// The user must already be linked to a Stripe customer; this never
    /// provisions one, so a user who skipped checkout gets
    /// [`BillingError::NoBillingCustomer`] without any Stripe call.
    pub async fn create_portal_session(&self, user: &User) -> Result<PortalSession> {
        let customer_id = user
            .stripe_customer_id
            .clone()
            .ok_or(BillingError::NoBillingCustomer)?;

        let request = PortalSessionRequest {
            customer_id: customer_id.clone(),
            return_url: self.config.client_link("/"),
        };

        let session = self.provider.create_portal_session(request).await.map_err(|e| {
            tracing::error!(
                customer_id = %customer_id,
                error = %e,
                "Error creating Stripe customer portal session"
            );
            e
        })?;

        let url = session.url.ok_or(BillingError::MissingSessionUrl("Customer portal"))?;

        Ok(PortalSession { url })
    }
}
