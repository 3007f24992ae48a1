//! Authenticated Billing Actions
//!
//! The two operations the client calls. Both take nothing but the caller's
//! identity, which arrives through a [`RequestContext`] built by whatever
//! auth layer sits in front.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{BillingError, Result};
use crate::session::SessionFactory;
use crate::user::{User, UserStore};

/// Per-request caller identity
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub user: Option<User>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn authenticated(user: User) -> Self {
        Self { user: Some(user) }
    }

    /// The caller, or [`BillingError::Unauthenticated`]
    pub fn require_user(&self) -> Result<&User> {
        self.user.as_ref().ok_or(BillingError::Unauthenticated)
    }
}

/// Redirect target returned to the client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRedirect {
    pub session_url: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<String>,
}

/// Client-facing billing operations
#[derive(Clone)]
pub struct BillingActions {
    sessions: SessionFactory,
    users: Arc<dyn UserStore>,
}

impl BillingActions {
    pub fn new(sessions: SessionFactory, users: Arc<dyn UserStore>) -> Self {
        Self { sessions, users }
    }

    pub async fn create_checkout_session(&self, ctx: &RequestContext) -> Result<SessionRedirect> {
        let user = self.current_user(ctx).await?;
        let session = self.sessions.create_checkout_session(&user).await?;

        Ok(SessionRedirect {
            session_url: session.url,
            session_id: Some(session.id),
        })
    }

    pub async fn create_customer_portal_session(
        &self,
        ctx: &RequestContext,
    ) -> Result<SessionRedirect> {
        let user = self.current_user(ctx).await?;
        let session = self.sessions.create_portal_session(&user).await?;

        Ok(SessionRedirect {
            session_url: session.url,
            session_id: None,
        })
    }

    /// Fresh copy of the caller's row.
    ///
    /// The context may hold a snapshot taken before an earlier request linked
    /// or unlinked a Stripe customer.
    pub async fn current_user(&self, ctx: &RequestContext) -> Result<User> {
        let caller = ctx.require_user()?;
        self.users
            .get(&caller.id)
            .await?
            .ok_or(BillingError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BillingConfig;
    use crate::customer::CustomerResolver;
    use crate::testing::FakeProvider;
    use crate::user::{MemoryUserStore, UserUpdate};

    async fn actions(provider: Arc<FakeProvider>, users: Arc<MemoryUserStore>) -> BillingActions {
        let config = Arc::new(BillingConfig::default().with_price_id("price_1"));
        let resolver = CustomerResolver::new(provider.clone(), users.clone());
        BillingActions::new(SessionFactory::new(resolver, provider, config), users)
    }

    #[tokio::test]
    async fn test_anonymous_caller_rejected() {
        let provider = Arc::new(FakeProvider::new());
        let actions = actions(provider.clone(), Arc::new(MemoryUserStore::new())).await;

        let err = actions
            .create_checkout_session(&RequestContext::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Unauthenticated));

        let err = actions
            .create_customer_portal_session(&RequestContext::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Unauthenticated));

        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_then_portal() {
        let provider = Arc::new(FakeProvider::new());
        let users = Arc::new(MemoryUserStore::new());
        let user = User::new(Some("a@b.com".into()));
        users.insert(user.clone()).await.unwrap();
        let actions = actions(provider, users).await;

        // Snapshot taken before checkout linked a customer
        let ctx = RequestContext::authenticated(user);

        let checkout = actions.create_checkout_session(&ctx).await.unwrap();
        assert!(checkout.session_id.is_some());

        let portal = actions.create_customer_portal_session(&ctx).await.unwrap();
        assert!(portal.session_id.is_none());
    }

    #[tokio::test]
    async fn test_portal_after_customer_unlinked() {
        let provider = Arc::new(FakeProvider::new());
        let users = Arc::new(MemoryUserStore::new());
        let user = User::new(None).with_stripe_customer_id("cus_1");
        users.insert(user.clone()).await.unwrap();
        users.update(&user.id, UserUpdate::clear_customer()).await.unwrap();
        let actions = actions(provider.clone(), users).await;

        let err = actions
            .create_customer_portal_session(&RequestContext::authenticated(user))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::NoBillingCustomer));
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn test_redirect_wire_format() {
        let redirect = SessionRedirect {
            session_url: "https://checkout.stripe.test/x".into(),
            session_id: None,
        };
        assert_eq!(
            serde_json::to_value(&redirect).unwrap(),
            serde_json::json!({ "sessionUrl": "https://checkout.stripe.test/x" })
        );
    }
}
