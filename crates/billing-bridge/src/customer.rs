//! Customer Resolution
//!
//! Maps a local user onto a Stripe customer. The user's
//! `stripe_customer_id` is the cache; it is repaired in place when Stripe no
//! longer knows the customer.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BillingError, Result};
use crate::provider::{BillingProvider, NewCustomer};
use crate::user::{User, UserStore, UserUpdate};

/// Finds or creates the Stripe customer for a user
#[derive(Clone)]
pub struct CustomerResolver {
    provider: Arc<dyn BillingProvider>,
    users: Arc<dyn UserStore>,
}

impl CustomerResolver {
    pub fn new(provider: Arc<dyn BillingProvider>, users: Arc<dyn UserStore>) -> Self {
        Self { provider, users }
    }

    /// Resolve the Stripe customer ID for `user`.
    ///
    /// In order, short-circuiting on the first hit:
    /// 1. The stored `stripe_customer_id`, if Stripe still has a live customer
    ///    for it. A deleted or unretrievable customer is unlinked from the user.
    /// 2. The first Stripe customer listed for the user's email.
    /// 3. A new Stripe customer tagged with `userId` metadata.
    ///
    /// This is not a pure lookup: steps 2 and 3 write the resolved ID onto the
    /// user row, and step 1 may clear it, all before returning. No retries.
    pub async fn resolve_customer_id(&self, user: &User) -> Result<String> {
        if let Some(stored) = user.stripe_customer_id.as_deref() {
            if let Some(customer_id) = self.validate_stored_customer(user, stored).await? {
                return Ok(customer_id);
            }
        }

        if let Some(email) = user.email.as_deref() {
            if let Some(customer_id) = self.link_customer_by_email(user, email).await? {
                return Ok(customer_id);
            }
        }

        self.create_customer(user).await
    }

    async fn validate_stored_customer(&self, user: &User, stored: &str) -> Result<Option<String>> {
        match self.provider.retrieve_customer(stored).await {
            Ok(customer) if !customer.deleted => return Ok(Some(customer.id)),
            Ok(_) => {
                tracing::warn!(
                    customer_id = %stored,
                    user_id = %user.id,
                    "Stripe customer was deleted, unlinking from user"
                );
            }
            Err(e) => {
                tracing::warn!(
                    customer_id = %stored,
                    user_id = %user.id,
                    error = %e,
                    "Failed to retrieve Stripe customer, possibly invalid; unlinking from user"
                );
            }
        }

        self.users.update(&user.id, UserUpdate::clear_customer()).await?;
        Ok(None)
    }

    async fn link_customer_by_email(&self, user: &User, email: &str) -> Result<Option<String>> {
        let found = self
            .provider
            .find_customer_by_email(email)
            .await
            .map_err(resolution_failed)?;

        let Some(customer) = found else {
            return Ok(None);
        };

        self.users
            .update(&user.id, UserUpdate::link_customer(customer.id.clone()))
            .await?;

        tracing::info!(
            customer_id = %customer.id,
            user_id = %user.id,
            "Linked existing Stripe customer by email"
        );
        Ok(Some(customer.id))
    }

    async fn create_customer(&self, user: &User) -> Result<String> {
        let mut metadata = HashMap::new();
        metadata.insert("userId".to_string(), user.id.to_string());

        let customer = self
            .provider
            .create_customer(NewCustomer {
                email: user.email.clone(),
                metadata,
            })
            .await
            .map_err(resolution_failed)?;

        self.users
            .update(&user.id, UserUpdate::link_customer(customer.id.clone()))
            .await?;

        tracing::info!(
            customer_id = %customer.id,
            user_id = %user.id,
            "Created new Stripe customer"
        );
        Ok(customer.id)
    }
}

fn resolution_failed(err: BillingError) -> BillingError {
    match err {
        BillingError::Stripe(msg) => BillingError::CustomerResolution(msg),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProvider, ProviderCall};
    use crate::user::MemoryUserStore;

    async fn setup(
        provider: FakeProvider,
        user: User,
    ) -> (Arc<FakeProvider>, Arc<MemoryUserStore>, CustomerResolver) {
        let provider = Arc::new(provider);
        let users = Arc::new(MemoryUserStore::new());
        users.insert(user).await.unwrap();
        let resolver = CustomerResolver::new(provider.clone(), users.clone());
        (provider, users, resolver)
    }

    #[tokio::test]
    async fn test_live_customer_returned_without_writes() {
        let user = User::new(Some("a@b.com".into())).with_stripe_customer_id("cus_live");
        let before = user.clone();
        let provider = FakeProvider::new().with_customer("cus_live", Some("a@b.com"), false);
        let (provider, users, resolver) = setup(provider, user).await;

        let id = resolver.resolve_customer_id(&before).await.unwrap();

        assert_eq!(id, "cus_live");
        assert_eq!(provider.calls(), vec![ProviderCall::RetrieveCustomer("cus_live".into())]);
        assert_eq!(users.get(&before.id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_deleted_customer_is_cleared_and_replaced() {
        let user = User::new(None).with_stripe_customer_id("cus_gone");
        let (provider, users, resolver) =
            setup(FakeProvider::new().with_customer("cus_gone", None, true), user.clone()).await;

        let id = resolver.resolve_customer_id(&user).await.unwrap();

        assert_ne!(id, "cus_gone");
        assert_eq!(provider.created_customers(), 1);
        let stored = users.get(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.stripe_customer_id.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_invalid_customer_falls_through_to_email() {
        let user = User::new(Some("a@b.com".into())).with_stripe_customer_id("cus_bogus");
        let provider = FakeProvider::new().with_customer("cus_email", Some("a@b.com"), false);
        let (provider, users, resolver) = setup(provider, user.clone()).await;

        let id = resolver.resolve_customer_id(&user).await.unwrap();

        assert_eq!(id, "cus_email");
        assert_eq!(provider.created_customers(), 0);
        assert_eq!(
            users.get(&user.id).await.unwrap().unwrap().stripe_customer_id.as_deref(),
            Some("cus_email")
        );
    }

    #[tokio::test]
    async fn test_stale_id_cleared_even_when_fallback_fails() {
        let user = User::new(None).with_stripe_customer_id("cus_bogus");
        let (_, users, resolver) = setup(FakeProvider::new().offline(), user.clone()).await;

        let err = resolver.resolve_customer_id(&user).await.unwrap_err();

        assert!(matches!(err, BillingError::CustomerResolution(_)));
        assert!(users.get(&user.id).await.unwrap().unwrap().stripe_customer_id.is_none());
    }

    #[tokio::test]
    async fn test_email_match_links_first_customer() {
        let user = User::new(Some("a@b.com".into()));
        let provider = FakeProvider::new()
            .with_customer("cus_first", Some("a@b.com"), false)
            .with_customer("cus_second", Some("a@b.com"), false);
        let (provider, users, resolver) = setup(provider, user.clone()).await;

        let id = resolver.resolve_customer_id(&user).await.unwrap();

        assert_eq!(id, "cus_first");
        assert_eq!(provider.created_customers(), 0);
        assert_eq!(
            users.get(&user.id).await.unwrap().unwrap().stripe_customer_id.as_deref(),
            Some("cus_first")
        );
    }

    #[tokio::test]
    async fn test_creates_customer_with_user_metadata() {
        let user = User::new(Some("a@b.com".into()));
        let (provider, users, resolver) = setup(FakeProvider::new(), user.clone()).await;

        let id = resolver.resolve_customer_id(&user).await.unwrap();

        assert_eq!(provider.created_customers(), 1);
        assert!(provider.calls().contains(&ProviderCall::CreateCustomer {
            email: Some("a@b.com".into()),
            user_id: Some(user.id.to_string()),
        }));
        assert_eq!(
            users.get(&user.id).await.unwrap().unwrap().stripe_customer_id,
            Some(id)
        );
    }

    #[tokio::test]
    async fn test_no_email_skips_lookup() {
        let user = User::new(None);
        let (provider, _, resolver) = setup(FakeProvider::new(), user.clone()).await;

        resolver.resolve_customer_id(&user).await.unwrap();

        assert!(!provider
            .calls()
            .iter()
            .any(|c| matches!(c, ProviderCall::FindCustomerByEmail(_))));
    }
}
