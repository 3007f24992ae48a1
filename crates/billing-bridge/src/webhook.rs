//! Stripe Webhook Handling
//!
//! Keeps each user's `subscription_status` in step with Stripe's
//! subscription lifecycle. Stripe delivers at least once and in no particular
//! order; every write here is a plain overwrite with a value derived only from
//! the event itself, so replays and reorderings settle on the same row.

use serde::Deserialize;
use std::sync::Arc;

use crate::config::BillingConfig;
use crate::error::{BillingError, Result};
use crate::provider::BillingProvider;
use crate::signature::WebhookVerifier;
use crate::status::SubscriptionStatus;
use crate::user::{UserId, UserStore, UserUpdate};

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Subscription checkout finished; status must be fetched
    CheckoutCompleted {
        session_id: String,
        customer_id: String,
        subscription_id: String,
    },

    /// Checkout finished in `setup`/`payment` mode, or without references
    CheckoutWithoutSubscription {
        session_id: String,
        mode: Option<String>,
    },

    /// Subscription changed; payload carries the current status
    SubscriptionUpdated {
        subscription_id: String,
        customer_id: String,
        status: String,
    },

    /// Subscription ended
    SubscriptionDeleted {
        subscription_id: String,
        customer_id: String,
    },

    /// Unhandled event type
    Other { event_type: String },
}

/// What processing an event did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// A user row now carries `status`
    Updated {
        customer_id: String,
        user_id: UserId,
        status: SubscriptionStatus,
    },

    /// No local user is linked to the customer; acknowledged anyway
    UnmatchedCustomer { customer_id: String },

    /// Nothing to do for this event
    Ignored { event_type: String },
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

/// A reference Stripe sends either as a bare ID or as the expanded object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ObjectRef {
    Id(String),
    Expanded { id: String },
}

impl ObjectRef {
    fn into_id(self) -> String {
        match self {
            ObjectRef::Id(id) | ObjectRef::Expanded { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    id: String,
    mode: Option<String>,
    customer: Option<ObjectRef>,
    subscription: Option<ObjectRef>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    customer: ObjectRef,
    status: String,
}

/// Webhook reconciler
#[derive(Clone)]
pub struct WebhookReconciler {
    provider: Arc<dyn BillingProvider>,
    users: Arc<dyn UserStore>,
    config: Arc<BillingConfig>,
}

impl WebhookReconciler {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        users: Arc<dyn UserStore>,
        config: Arc<BillingConfig>,
    ) -> Self {
        Self {
            provider,
            users,
            config,
        }
    }

    /// Verify, parse and apply one delivery.
    ///
    /// Signature failures return [`BillingError::WebhookSignature`] before
    /// anything is read or written. An event for a customer no local user is
    /// linked to is a success ([`WebhookOutcome::UnmatchedCustomer`]).
    pub async fn handle_webhook_event(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<WebhookOutcome> {
        let event = self.verify_event(raw_body, signature)?;
        self.handle(event).await
    }

    /// Verify webhook signature and parse event
    pub fn verify_event(&self, raw_body: &[u8], signature: &str) -> Result<WebhookEvent> {
        let secret = self.config.require_webhook_secret()?;

        WebhookVerifier::new(secret).verify(raw_body, signature).map_err(|e| {
            tracing::warn!(error = %e, "Webhook signature verification failed");
            e
        })?;

        let envelope: EventEnvelope = serde_json::from_slice(raw_body).map_err(|e| {
            tracing::warn!(error = %e, "Signed webhook body is not a Stripe event");
            BillingError::WebhookSignature("malformed event payload".into())
        })?;

        tracing::info!(
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            "Received Stripe event"
        );

        parse_webhook_event(envelope)
    }

    /// Process a webhook event
    pub async fn handle(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        match event {
            WebhookEvent::CheckoutCompleted {
                customer_id,
                subscription_id,
                ..
            } => {
                let subscription = self.provider.retrieve_subscription(&subscription_id).await?;
                let status = SubscriptionStatus::from_provider(&subscription.status);
                self.write_status(customer_id, status, "checkout").await
            }

            WebhookEvent::CheckoutWithoutSubscription { session_id, mode } => {
                if mode.as_deref() == Some("setup") {
                    tracing::info!(
                        session_id = %session_id,
                        "Setup intent session completed, no subscription status change"
                    );
                } else {
                    tracing::info!(
                        session_id = %session_id,
                        mode = ?mode,
                        "Checkout session completed, but not a subscription; no status update"
                    );
                }
                Ok(WebhookOutcome::Ignored {
                    event_type: "checkout.session.completed".into(),
                })
            }

            WebhookEvent::SubscriptionUpdated {
                customer_id, status, ..
            } => {
                let status = SubscriptionStatus::from_provider(&status);
                self.write_status(customer_id, status, "subscription update").await
            }

            WebhookEvent::SubscriptionDeleted { customer_id, .. } => {
                let status = SubscriptionStatus::Canceled;
                self.write_status(customer_id, status, "subscription deletion").await
            }

            WebhookEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled event type");
                Ok(WebhookOutcome::Ignored { event_type })
            }
        }
    }

    async fn write_status(
        &self,
        customer_id: String,
        status: SubscriptionStatus,
        reason: &str,
    ) -> Result<WebhookOutcome> {
        let Some(user) = self.users.find_by_customer_id(&customer_id).await? else {
            return Ok(unmatched(customer_id));
        };

        let updated = self
            .users
            .update(&user.id, UserUpdate::subscription_status(status))
            .await?;

        let Some(user) = updated else {
            return Ok(unmatched(customer_id));
        };

        tracing::info!(
            customer_id = %customer_id,
            user_id = %user.id,
            status = %status,
            reason,
            "Updated user subscription status"
        );

        Ok(WebhookOutcome::Updated {
            customer_id,
            user_id: user.id,
            status,
        })
    }
}

fn unmatched(customer_id: String) -> WebhookOutcome {
    tracing::warn!(
        customer_id = %customer_id,
        "Webhook handler: no user with this Stripe customer ID, acknowledging event"
    );
    WebhookOutcome::UnmatchedCustomer { customer_id }
}

/// Parse Stripe event into our event type
fn parse_webhook_event(envelope: EventEnvelope) -> Result<WebhookEvent> {
    let object = envelope.data.object;

    match envelope.event_type.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSessionObject =
                serde_json::from_value(object).map_err(|e| {
                    BillingError::WebhookPayload(format!("invalid checkout session data: {e}"))
                })?;

            match (session.mode.as_deref(), session.customer, session.subscription) {
                (Some("subscription"), Some(customer), Some(subscription)) => {
                    Ok(WebhookEvent::CheckoutCompleted {
                        session_id: session.id,
                        customer_id: customer.into_id(),
                        subscription_id: subscription.into_id(),
                    })
                }
                _ => Ok(WebhookEvent::CheckoutWithoutSubscription {
                    session_id: session.id,
                    mode: session.mode,
                }),
            }
        }

        "customer.subscription.updated" => {
            let sub = parse_subscription(object)?;
            Ok(WebhookEvent::SubscriptionUpdated {
                subscription_id: sub.id,
                customer_id: sub.customer.into_id(),
                status: sub.status,
            })
        }

        "customer.subscription.deleted" => {
            let sub = parse_subscription(object)?;
            Ok(WebhookEvent::SubscriptionDeleted {
                subscription_id: sub.id,
                customer_id: sub.customer.into_id(),
            })
        }

        _ => Ok(WebhookEvent::Other {
            event_type: envelope.event_type,
        }),
    }
}

fn parse_subscription(object: serde_json::Value) -> Result<SubscriptionObject> {
    serde_json::from_value(object)
        .map_err(|e| BillingError::WebhookPayload(format!("invalid subscription data: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProvider, ProviderCall};
    use crate::user::{MemoryUserStore, User};
    use chrono::Utc;
    use serde_json::json;

    const SECRET: &str = "whsec_test_secret";

    struct Harness {
        provider: Arc<FakeProvider>,
        users: Arc<MemoryUserStore>,
        reconciler: WebhookReconciler,
        user_id: UserId,
    }

    async fn harness(provider: FakeProvider) -> Harness {
        let provider = Arc::new(provider);
        let users = Arc::new(MemoryUserStore::new());
        let user = User::new(Some("a@b.com".into())).with_stripe_customer_id("cus_123");
        let user_id = user.id;
        users.insert(user).await.unwrap();

        let config = Arc::new(BillingConfig::default().with_webhook_secret(SECRET));
        let reconciler = WebhookReconciler::new(provider.clone(), users.clone(), config);

        Harness {
            provider,
            users,
            reconciler,
            user_id,
        }
    }

    impl Harness {
        async fn deliver(&self, payload: &serde_json::Value) -> Result<WebhookOutcome> {
            let body = serde_json::to_vec(payload).unwrap();
            let signature = WebhookVerifier::new(SECRET)
                .sign(&body, Utc::now().timestamp())
                .unwrap();
            self.reconciler.handle_webhook_event(&body, &signature).await
        }

        async fn status(&self) -> Option<SubscriptionStatus> {
            self.users.get(&self.user_id).await.unwrap().unwrap().subscription_status
        }
    }

    fn event(event_type: &str, object: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "evt_1",
            "object": "event",
            "type": event_type,
            "data": { "object": object },
        })
    }

    fn subscription_event(event_type: &str, customer: &str, status: &str) -> serde_json::Value {
        event(
            event_type,
            json!({
                "id": "sub_1",
                "object": "subscription",
                "customer": customer,
                "status": status,
            }),
        )
    }

    fn subscription_checkout(
        customer: serde_json::Value,
        subscription: serde_json::Value,
    ) -> serde_json::Value {
        event(
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "mode": "subscription",
                "customer": customer,
                "subscription": subscription,
            }),
        )
    }

    #[tokio::test]
    async fn test_subscription_updated_maps_status() {
        let h = harness(FakeProvider::new()).await;

        let outcome = h
            .deliver(&subscription_event("customer.subscription.updated", "cus_123", "past_due"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Updated {
                customer_id: "cus_123".into(),
                user_id: h.user_id,
                status: SubscriptionStatus::PastDue,
            }
        );
        assert_eq!(h.status().await, Some(SubscriptionStatus::PastDue));
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let h = harness(FakeProvider::new()).await;
        let payload = subscription_event("customer.subscription.updated", "cus_123", "past_due");

        let first = h.deliver(&payload).await.unwrap();
        let second = h.deliver(&payload).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.status().await, Some(SubscriptionStatus::PastDue));
    }

    #[tokio::test]
    async fn test_deleted_forces_canceled() {
        let h = harness(FakeProvider::new()).await;

        h.deliver(&subscription_event("customer.subscription.deleted", "cus_123", "active"))
            .await
            .unwrap();

        assert_eq!(h.status().await, Some(SubscriptionStatus::Canceled));
    }

    #[tokio::test]
    async fn test_checkout_completed_fetches_subscription() {
        let provider = FakeProvider::new().with_subscription("sub_9", "cus_123", "trialing");
        let h = harness(provider).await;

        let payload = subscription_checkout(json!("cus_123"), json!("sub_9"));
        h.deliver(&payload).await.unwrap();

        assert_eq!(
            h.provider.calls(),
            vec![ProviderCall::RetrieveSubscription("sub_9".into())]
        );
        assert_eq!(h.status().await, Some(SubscriptionStatus::Active));
    }

    #[tokio::test]
    async fn test_checkout_accepts_expanded_references() {
        let provider = FakeProvider::new().with_subscription("sub_9", "cus_123", "incomplete");
        let h = harness(provider).await;

        let payload = subscription_checkout(
            json!({ "id": "cus_123", "object": "customer" }),
            json!({ "id": "sub_9", "object": "subscription" }),
        );
        h.deliver(&payload).await.unwrap();

        assert_eq!(h.status().await, Some(SubscriptionStatus::Incomplete));
    }

    #[tokio::test]
    async fn test_setup_and_payment_checkouts_are_ignored() {
        let h = harness(FakeProvider::new()).await;

        for mode in ["setup", "payment"] {
            let payload = event(
                "checkout.session.completed",
                json!({ "id": "cs_1", "mode": mode, "customer": "cus_123", "subscription": null }),
            );
            let outcome = h.deliver(&payload).await.unwrap();
            assert!(matches!(outcome, WebhookOutcome::Ignored { .. }), "{mode}");
        }

        assert!(h.provider.calls().is_empty());
        assert_eq!(h.status().await, None);
    }

    #[tokio::test]
    async fn test_subscription_checkout_without_references_is_ignored() {
        let provider = FakeProvider::new().with_subscription("sub_9", "cus_123", "active");
        let h = harness(provider).await;

        let payloads = [
            subscription_checkout(json!(null), json!("sub_9")),
            subscription_checkout(json!("cus_123"), json!(null)),
            event(
                "checkout.session.completed",
                json!({ "id": "cs_1", "mode": "subscription" }),
            ),
        ];
        for payload in &payloads {
            let outcome = h.deliver(payload).await.unwrap();
            assert_eq!(
                outcome,
                WebhookOutcome::Ignored {
                    event_type: "checkout.session.completed".into()
                }
            );
        }

        assert!(h.provider.calls().is_empty());
        assert_eq!(h.status().await, None);
    }

    #[tokio::test]
    async fn test_unknown_customer_is_acknowledged() {
        let h = harness(FakeProvider::new()).await;

        let outcome = h
            .deliver(&subscription_event("customer.subscription.updated", "cus_nobody", "active"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::UnmatchedCustomer {
                customer_id: "cus_nobody".into()
            }
        );
        assert_eq!(h.status().await, None);
    }

    #[tokio::test]
    async fn test_unhandled_event_type() {
        let h = harness(FakeProvider::new()).await;

        let outcome = h.deliver(&event("invoice.paid", json!({ "id": "in_1" }))).await.unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                event_type: "invoice.paid".into()
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_signature_writes_nothing() {
        let provider = FakeProvider::new().with_subscription("sub_9", "cus_123", "active");
        let h = harness(provider).await;
        let payload = subscription_event("customer.subscription.updated", "cus_123", "active");
        let body = serde_json::to_vec(&payload).unwrap();
        let signature = WebhookVerifier::new("whsec_wrong")
            .sign(&body, Utc::now().timestamp())
            .unwrap();

        let err = h.reconciler.handle_webhook_event(&body, &signature).await.unwrap_err();

        assert!(matches!(err, BillingError::WebhookSignature(_)));
        assert_eq!(err.status_code(), 400);
        assert_eq!(h.status().await, None);
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_secret_is_config_fault() {
        let users = Arc::new(MemoryUserStore::new());
        let reconciler = WebhookReconciler::new(
            Arc::new(FakeProvider::new()),
            users,
            Arc::new(BillingConfig::default()),
        );

        let err = reconciler.handle_webhook_event(b"{}", "t=1,v1=00").await.unwrap_err();
        assert!(matches!(err, BillingError::Config(_)));
    }

    #[tokio::test]
    async fn test_subscription_fetch_failure_requests_redelivery() {
        let h = harness(FakeProvider::new().offline()).await;

        let payload = subscription_checkout(json!("cus_123"), json!("sub_9"));
        let err = h.deliver(&payload).await.unwrap_err();

        assert_eq!(err.status_code(), 500);
        assert_eq!(h.status().await, None);
    }

    #[tokio::test]
    async fn test_malformed_subscription_object_is_server_fault() {
        let h = harness(FakeProvider::new()).await;

        let err = h
            .deliver(&event("customer.subscription.updated", json!({ "id": "sub_1" })))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::WebhookPayload(_)));
        assert_eq!(err.status_code(), 500);
    }
}
