//! HTTP Handlers

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use billing_bridge::{
    BillingError, ErrorResponse, SessionRedirect, SubscriptionStatus, WebhookOutcome,
};

use crate::auth::Caller;
use crate::state::{AppState, Billing};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
    pub price_configured: bool,
    pub webhook_configured: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub subscription_status: Option<SubscriptionStatus>,
    pub has_billing_customer: bool,
}

fn payments_disabled() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "Payments not configured".into(),
            code: "PAYMENTS_DISABLED".into(),
        }),
    )
        .into_response()
}

fn billing(state: &AppState) -> Result<&Billing, Response> {
    state.billing.as_ref().ok_or_else(payments_disabled)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.billing.is_some(),
        price_configured: state.config.price_id.is_some(),
        webhook_configured: state.config.webhook_secret.is_some(),
    })
}

/// Create Stripe checkout session
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> Result<Json<SessionRedirect>, Response> {
    let billing = billing(&state)?;

    let redirect = billing
        .actions
        .create_checkout_session(&ctx)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(redirect))
}

/// Create Stripe customer portal session
pub async fn create_customer_portal_session(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> Result<Json<SessionRedirect>, Response> {
    let billing = billing(&state)?;

    let redirect = billing
        .actions
        .create_customer_portal_session(&ctx)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(redirect))
}

/// Current caller's subscription status, polled after checkout
pub async fn subscription_status(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> Result<Json<SubscriptionResponse>, BillingError> {
    let caller = ctx.require_user()?;
    let user = state
        .users
        .get(&caller.id)
        .await?
        .ok_or(BillingError::Unauthenticated)?;

    Ok(Json(SubscriptionResponse {
        subscription_status: user.subscription_status,
        has_billing_customer: user.stripe_customer_id.is_some(),
    }))
}

/// Stripe webhook handler
///
/// Takes the raw body; signature verification needs the exact bytes Stripe
/// signed. A missing signing secret is a configuration fault whether or not
/// the request carries a signature.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let billing = match billing(&state) {
        Ok(billing) => billing,
        Err(response) => return response,
    };

    if let Err(e) = state.config.require_webhook_secret() {
        return e.into_response();
    }

    let Some(signature) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        return BillingError::WebhookSignature("Missing Stripe signature".into()).into_response();
    };

    match billing.reconciler.handle_webhook_event(&body, signature).await {
        Ok(WebhookOutcome::UnmatchedCustomer { .. }) => {
            (StatusCode::OK, "User not found, but acknowledging event.").into_response()
        }
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Error processing webhook event");
            e.into_response()
        }
    }
}
