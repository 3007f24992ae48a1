//! Live Stripe Provider
//!
//! [`BillingProvider`] backed by `async-stripe`. One instance per process,
//! shared behind an `Arc`.

use async_trait::async_trait;
use stripe::{
    BillingPortalSession, CheckoutSession, CheckoutSessionMode, Client, CreateBillingPortalSession,
    CreateCheckoutSession, CreateCheckoutSessionAutomaticTax, CreateCheckoutSessionCustomerUpdate,
    CreateCheckoutSessionCustomerUpdateAddress, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionPaymentMethodTypes, CreateCustomer, Customer, CustomerId, ListCustomers,
    Subscription, SubscriptionId,
};

use crate::error::{BillingError, Result};
use crate::provider::{
    BillingProvider, CheckoutSessionRequest, HostedSession, NewCustomer, PortalSessionRequest,
    RemoteCustomer, RemoteSubscription,
};

/// Stripe client wrapper
pub struct StripeProvider {
    client: Client,
}

impl StripeProvider {
    /// Create a new Stripe provider
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".into()))?;

        Ok(Self::new(&secret_key))
    }
}

fn parse_customer_id(id: &str) -> Result<CustomerId> {
    id.parse()
        .map_err(|e| BillingError::Stripe(format!("invalid customer id {id}: {e}")))
}

impl From<Customer> for RemoteCustomer {
    fn from(customer: Customer) -> Self {
        Self {
            id: customer.id.to_string(),
            email: customer.email,
            deleted: customer.deleted,
        }
    }
}

#[async_trait]
impl BillingProvider for StripeProvider {
    async fn retrieve_customer(&self, customer_id: &str) -> Result<RemoteCustomer> {
        let id = parse_customer_id(customer_id)?;
        let customer = Customer::retrieve(&self.client, &id, &[]).await?;
        Ok(customer.into())
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<RemoteCustomer>> {
        let mut params = ListCustomers::new();
        params.email = Some(email);
        params.limit = Some(1);

        let customers = Customer::list(&self.client, &params).await?;
        Ok(customers.data.into_iter().next().map(Into::into))
    }

    async fn create_customer(&self, request: NewCustomer) -> Result<RemoteCustomer> {
        let mut params = CreateCustomer::new();
        params.email = request.email.as_deref();
        params.metadata = Some(request.metadata);

        let customer = Customer::create(&self.client, params).await?;
        Ok(customer.into())
    }

    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<HostedSession> {
        let mut params = CreateCheckoutSession::new();
        params.customer = Some(parse_customer_id(&request.customer_id)?);
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.payment_method_types = Some(vec![CreateCheckoutSessionPaymentMethodTypes::Card]);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.allow_promotion_codes = Some(request.allow_promotion_codes);
        params.automatic_tax = Some(CreateCheckoutSessionAutomaticTax {
            enabled: request.automatic_tax,
            ..Default::default()
        });
        params.customer_update = Some(CreateCheckoutSessionCustomerUpdate {
            address: Some(CreateCheckoutSessionCustomerUpdateAddress::Auto),
            ..Default::default()
        });
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(request.price_id.clone()),
            quantity: Some(request.quantity),
            ..Default::default()
        }]);

        let session = CheckoutSession::create(&self.client, params).await?;

        Ok(HostedSession {
            id: session.id.to_string(),
            url: session.url,
        })
    }

    async fn create_portal_session(&self, request: PortalSessionRequest) -> Result<HostedSession> {
        let mut params = CreateBillingPortalSession::new(parse_customer_id(&request.customer_id)?);
        params.return_url = Some(&request.return_url);

        let session = BillingPortalSession::create(&self.client, params).await?;

        Ok(HostedSession {
            id: session.id.to_string(),
            url: Some(session.url).filter(|url| !url.is_empty()),
        })
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<RemoteSubscription> {
        let id: SubscriptionId = subscription_id.parse().map_err(|e| {
            BillingError::Stripe(format!("invalid subscription id {subscription_id}: {e}"))
        })?;

        let subscription = Subscription::retrieve(&self.client, &id, &[]).await?;

        Ok(RemoteSubscription {
            id: subscription.id.to_string(),
            customer: subscription.customer.id().to_string(),
            status: subscription.status.as_str().to_string(),
        })
    }
}
