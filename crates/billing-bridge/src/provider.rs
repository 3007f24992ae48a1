//! Billing Provider Abstraction
//!
//! The narrow slice of the Stripe API the bridge depends on. The live
//! implementation is [`crate::StripeProvider`]; tests use
//! `testing::FakeProvider`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// A Stripe customer as far as the bridge cares
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCustomer {
    pub id: String,
    pub email: Option<String>,

    /// Set when the customer was removed on the Stripe side
    #[serde(default)]
    pub deleted: bool,
}

/// A Stripe subscription as far as the bridge cares
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSubscription {
    pub id: String,
    pub customer: String,

    /// Stripe-native status (`active`, `trialing`, `past_due`, ...)
    pub status: String,
}

/// A provider-hosted page to redirect the user to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostedSession {
    pub id: String,
    pub url: Option<String>,
}

/// Request to create a customer
#[derive(Clone, Debug, Default)]
pub struct NewCustomer {
    pub email: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Request to create a subscription checkout session
#[derive(Clone, Debug)]
pub struct CheckoutSessionRequest {
    pub customer_id: String,
    pub price_id: String,
    pub quantity: u64,
    pub success_url: String,
    pub cancel_url: String,
    pub automatic_tax: bool,
    pub allow_promotion_codes: bool,
}

/// Request to create a billing portal session
#[derive(Clone, Debug)]
pub struct PortalSessionRequest {
    pub customer_id: String,
    pub return_url: String,
}

/// Payment provider client (Strategy pattern)
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Retrieve a customer by ID; deleted customers come back with `deleted` set
    async fn retrieve_customer(&self, customer_id: &str) -> Result<RemoteCustomer>;

    /// First customer with this email, in Stripe's list order
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<RemoteCustomer>>;

    async fn create_customer(&self, request: NewCustomer) -> Result<RemoteCustomer>;

    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<HostedSession>;

    async fn create_portal_session(&self, request: PortalSessionRequest) -> Result<HostedSession>;

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<RemoteSubscription>;
}
