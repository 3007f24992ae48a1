//! User Records
//!
//! The bridge reads users and writes exactly two fields on them:
//! `stripe_customer_id` and `subscription_status`. Everything else about a
//! user belongs to the application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{BillingError, Result};
use crate::status::SubscriptionStatus;

/// Opaque, immutable user identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(uuid::Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user row
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,

    /// Used only to look up an existing Stripe customer
    pub email: Option<String>,

    /// Link to the Stripe customer, lazily populated
    pub stripe_customer_id: Option<String>,

    /// Set by webhooks only
    pub subscription_status: Option<SubscriptionStatus>,

    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: Option<String>) -> Self {
        Self {
            id: UserId::new(),
            email,
            stripe_customer_id: None,
            subscription_status: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_stripe_customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.stripe_customer_id = Some(customer_id.into());
        self
    }
}

/// Partial update applied to a single user row.
///
/// `None` leaves a field alone; `stripe_customer_id: Some(None)` clears it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserUpdate {
    pub stripe_customer_id: Option<Option<String>>,
    pub subscription_status: Option<SubscriptionStatus>,
}

impl UserUpdate {
    pub fn link_customer(customer_id: impl Into<String>) -> Self {
        Self {
            stripe_customer_id: Some(Some(customer_id.into())),
            ..Default::default()
        }
    }

    pub fn clear_customer() -> Self {
        Self {
            stripe_customer_id: Some(None),
            ..Default::default()
        }
    }

    pub fn subscription_status(status: SubscriptionStatus) -> Self {
        Self {
            subscription_status: Some(status),
            ..Default::default()
        }
    }
}

/// User storage trait
///
/// Implementations must apply `update` atomically to one row and keep
/// `stripe_customer_id` unique across users.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert or replace a user
    async fn insert(&self, user: User) -> Result<()>;

    /// Get user by ID
    async fn get(&self, id: &UserId) -> Result<Option<User>>;

    /// Get user by linked Stripe customer ID
    async fn find_by_customer_id(&self, customer_id: &str) -> Result<Option<User>>;

    /// Apply a partial update; `Ok(None)` when no row has this ID
    async fn update(&self, id: &UserId, update: UserUpdate) -> Result<Option<User>>;
}

/// In-memory user store (for development and tests)
pub struct MemoryUserStore {
    users: RwLock<HashMap<UserId, User>>,
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }
}

fn ensure_customer_unique(
    users: &HashMap<UserId, User>,
    owner: &UserId,
    customer_id: &str,
) -> Result<()> {
    let taken = users
        .values()
        .any(|u| u.id != *owner && u.stripe_customer_id.as_deref() == Some(customer_id));

    if taken {
        return Err(BillingError::Conflict(format!(
            "Stripe customer {customer_id} is already linked to another user"
        )));
    }
    Ok(())
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: User) -> Result<()> {
        let mut users = self.users.write().await;

        if let Some(customer_id) = &user.stripe_customer_id {
            ensure_customer_unique(&users, &user.id, customer_id)?;
        }
        users.insert(user.id, user);

        Ok(())
    }

    async fn get(&self, id: &UserId) -> Result<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_by_customer_id(&self, customer_id: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn update(&self, id: &UserId, update: UserUpdate) -> Result<Option<User>> {
        let mut users = self.users.write().await;

        if let Some(Some(customer_id)) = &update.stripe_customer_id {
            ensure_customer_unique(&users, id, customer_id)?;
        }

        let Some(user) = users.get_mut(id) else {
            return Ok(None);
        };

        if let Some(customer_id) = update.stripe_customer_id {
            user.stripe_customer_id = customer_id;
        }
        if let Some(status) = update.subscription_status {
            user.subscription_status = Some(status);
        }
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }
}
