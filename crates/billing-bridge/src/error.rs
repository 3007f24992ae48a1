//! Billing Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, BillingError>;

/// Billing-related errors
#[derive(Error, Debug)]
pub enum BillingError {
    /// Caller is not logged in
    #[error("User not authenticated")]
    Unauthenticated,

    /// Portal requested by a user that never went through checkout
    #[error("User does not have a Stripe customer ID")]
    NoBillingCustomer,

    /// Server misconfiguration (missing price ID, webhook secret, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Stripe answered without a redirect URL
    #[error("{0} session URL is unexpectedly null")]
    MissingSessionUrl(&'static str),

    /// Finding or creating the remote customer failed
    #[error("Customer resolution failed: {0}")]
    CustomerResolution(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Verified webhook carried an object we could not interpret
    #[error("Webhook payload error: {0}")]
    WebhookPayload(String),

    /// Unique constraint violated in the user store
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl BillingError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::Unauthenticated => "UNAUTHENTICATED",
            BillingError::NoBillingCustomer => "NO_BILLING_CUSTOMER",
            BillingError::Config(_) => "CONFIG_ERROR",
            BillingError::Stripe(_) | BillingError::MissingSessionUrl(_) => "STRIPE_ERROR",
            BillingError::CustomerResolution(_) => "CUSTOMER_RESOLUTION_FAILED",
            BillingError::WebhookSignature(_) => "INVALID_SIGNATURE",
            BillingError::WebhookPayload(_) => "WEBHOOK_ERROR",
            BillingError::Conflict(_) | BillingError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// HTTP status code this error should surface as
    pub fn status_code(&self) -> u16 {
        match self {
            BillingError::Unauthenticated => 401,
            BillingError::NoBillingCustomer => 403,
            BillingError::WebhookSignature(_) => 400,
            _ => 500,
        }
    }

    /// Get user-friendly message
    ///
    /// Never includes upstream provider text; that stays in the server logs.
    pub fn user_message(&self) -> &str {
        match self {
            BillingError::Unauthenticated => "User not authenticated.",
            BillingError::NoBillingCustomer => {
                "No billing account found. Please subscribe before managing your subscription."
            }
            BillingError::Config(_) => "Service configuration error.",
            BillingError::Stripe(_)
            | BillingError::MissingSessionUrl(_)
            | BillingError::CustomerResolution(_) => "Payment processing failed. Please try again.",
            BillingError::WebhookSignature(_) => "Invalid signature.",
            _ => "An error occurred processing your request.",
        }
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::Stripe(err.to_string())
    }
}

/// Error body returned by the HTTP surface
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<&BillingError> for ErrorResponse {
    fn from(err: &BillingError) -> Self {
        Self {
            error: err.user_message().into(),
            code: err.code().into(),
        }
    }
}

#[cfg(feature = "axum-handlers")]
impl axum::response::IntoResponse for BillingError {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::from_u16(self.status_code())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        match &self {
            BillingError::Config(msg) => tracing::error!(error = %msg, "Billing misconfiguration"),
            BillingError::Unauthenticated
            | BillingError::NoBillingCustomer
            | BillingError::WebhookSignature(_) => {
                tracing::warn!(error = %self, "Billing request rejected");
            }
            _ => tracing::error!(error = %self, "Billing request failed"),
        }

        (status, axum::Json(ErrorResponse::from(&self))).into_response()
    }
}
