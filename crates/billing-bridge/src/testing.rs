//! In-memory provider for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{BillingError, Result};
use crate::provider::{
    BillingProvider, CheckoutSessionRequest, HostedSession, NewCustomer, PortalSessionRequest,
    RemoteCustomer, RemoteSubscription,
};

/// Every call made against [`FakeProvider`], in order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderCall {
    RetrieveCustomer(String),
    FindCustomerByEmail(String),
    CreateCustomer { email: Option<String>, user_id: Option<String> },
    CreateCheckoutSession { customer_id: String, price_id: String },
    CreatePortalSession { customer_id: String },
    RetrieveSubscription(String),
}

#[derive(Default)]
struct FakeState {
    customers: Vec<RemoteCustomer>,
    subscriptions: HashMap<String, RemoteSubscription>,
    calls: Vec<ProviderCall>,
    checkout_requests: Vec<CheckoutSessionRequest>,
    portal_requests: Vec<PortalSessionRequest>,
}

/// Fake Stripe: customers and subscriptions live in memory.
///
/// Retrieving an unknown customer or subscription fails the way Stripe's
/// "No such ..." errors do.
pub struct FakeProvider {
    counter: AtomicU64,
    state: Mutex<FakeState>,
    session_urls: bool,
    offline: bool,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            state: Mutex::new(FakeState::default()),
            session_urls: true,
            offline: false,
        }
    }

    /// Sessions come back without a URL
    #[must_use]
    pub fn without_session_urls(mut self) -> Self {
        self.session_urls = false;
        self
    }

    /// Every call fails as a network error
    #[must_use]
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    #[must_use]
    pub fn with_customer(self, id: &str, email: Option<&str>, deleted: bool) -> Self {
        self.lock().customers.push(RemoteCustomer {
            id: id.into(),
            email: email.map(Into::into),
            deleted,
        });
        self
    }

    #[must_use]
    pub fn with_subscription(self, id: &str, customer: &str, status: &str) -> Self {
        self.lock().subscriptions.insert(
            id.into(),
            RemoteSubscription {
                id: id.into(),
                customer: customer.into(),
                status: status.into(),
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    pub fn created_customers(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, ProviderCall::CreateCustomer { .. }))
            .count()
    }

    pub fn checkout_requests(&self) -> Vec<CheckoutSessionRequest> {
        self.lock().checkout_requests.clone()
    }

    pub fn portal_requests(&self) -> Vec<PortalSessionRequest> {
        self.lock().portal_requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: ProviderCall) -> Result<MutexGuard<'_, FakeState>> {
        let mut state = self.lock();
        state.calls.push(call);
        if self.offline {
            return Err(BillingError::Stripe("error sending request: connection refused".into()));
        }
        Ok(state)
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_test_{}", self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl BillingProvider for FakeProvider {
    async fn retrieve_customer(&self, customer_id: &str) -> Result<RemoteCustomer> {
        let state = self.record(ProviderCall::RetrieveCustomer(customer_id.into()))?;
        state
            .customers
            .iter()
            .find(|c| c.id == customer_id)
            .cloned()
            .ok_or_else(|| BillingError::Stripe(format!("No such customer: '{customer_id}'")))
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<RemoteCustomer>> {
        let state = self.record(ProviderCall::FindCustomerByEmail(email.into()))?;
        Ok(state
            .customers
            .iter()
            .find(|c| !c.deleted && c.email.as_deref() == Some(email))
            .cloned())
    }

    async fn create_customer(&self, request: NewCustomer) -> Result<RemoteCustomer> {
        let mut state = self.record(ProviderCall::CreateCustomer {
            email: request.email.clone(),
            user_id: request.metadata.get("userId").cloned(),
        })?;

        let customer = RemoteCustomer {
            id: self.next_id("cus"),
            email: request.email,
            deleted: false,
        };
        state.customers.push(customer.clone());
        Ok(customer)
    }

    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<HostedSession> {
        let mut state = self.record(ProviderCall::CreateCheckoutSession {
            customer_id: request.customer_id.clone(),
            price_id: request.price_id.clone(),
        })?;
        state.checkout_requests.push(request);

        let id = self.next_id("cs");
        let url = self
            .session_urls
            .then(|| format!("https://checkout.stripe.test/c/pay/{id}"));
        Ok(HostedSession { id, url })
    }

    async fn create_portal_session(&self, request: PortalSessionRequest) -> Result<HostedSession> {
        let mut state = self.record(ProviderCall::CreatePortalSession {
            customer_id: request.customer_id.clone(),
        })?;
        state.portal_requests.push(request);

        let id = self.next_id("bps");
        let url = self
            .session_urls
            .then(|| format!("https://billing.stripe.test/p/session/{id}"));
        Ok(HostedSession { id, url })
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<RemoteSubscription> {
        let state = self.record(ProviderCall::RetrieveSubscription(subscription_id.into()))?;
        state
            .subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| {
                BillingError::Stripe(format!("No such subscription: '{subscription_id}'"))
            })
    }
}
