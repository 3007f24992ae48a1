//! Caller Identity
//!
//! Authentication proper lives outside this service. What arrives here is a
//! bearer token that an [`Authenticator`] turns into a user ID; the
//! [`Caller`] extractor hands handlers a [`RequestContext`].

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use std::collections::HashMap;

use billing_bridge::{BillingError, RequestContext, Result, UserId};

use crate::state::AppState;

/// Token → user resolution
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Option<UserId>>;
}

/// Fixed token table (for development)
#[derive(Default)]
pub struct TokenAuthenticator {
    tokens: HashMap<String, UserId>,
}

impl TokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, token: impl Into<String>, user_id: UserId) {
        self.tokens.insert(token.into(), user_id);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Option<UserId>> {
        Ok(self.tokens.get(token).copied())
    }
}

/// Request context for the current caller; anonymous if no valid token
pub struct Caller(pub RequestContext);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = BillingError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(Self(RequestContext::anonymous()));
        };

        let Some(user_id) = state.auth.authenticate(token).await? else {
            tracing::debug!("Unknown bearer token");
            return Ok(Self(RequestContext::anonymous()));
        };

        let user = state.users.get(&user_id).await?;
        Ok(Self(RequestContext { user }))
    }
}
