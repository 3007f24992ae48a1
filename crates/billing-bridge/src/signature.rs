//! Stripe Webhook Signatures
//!
//! Stripe signs `"{timestamp}.{raw body}"` with HMAC-SHA256 and sends
//! `Stripe-Signature: t=<unix seconds>,v1=<hex>[,v1=<hex>...]`. More than one
//! `v1` shows up while a signing secret is being rolled.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{BillingError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Stripe's default tolerance for the signed timestamp
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verifies `Stripe-Signature` headers against a signing secret
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify against the current time
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<()> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verify as of `now` (unix seconds).
    ///
    /// Only signatures older than the tolerance are rejected; a timestamp
    /// ahead of `now` is clock skew and passes on to the HMAC check. Every
    /// failure carries a generic message; which check failed is only logged
    /// at debug level.
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<()> {
        let parsed = parse_header(header).ok_or_else(|| {
            tracing::debug!("Malformed Stripe-Signature header");
            rejected()
        })?;

        let age = now.checked_sub(parsed.timestamp);
        if age.is_none_or(|age| age > DEFAULT_TOLERANCE_SECS) {
            tracing::debug!(
                timestamp = parsed.timestamp,
                now,
                "Stripe-Signature timestamp outside tolerance"
            );
            return Err(rejected());
        }

        let expected = self.mac(parsed.timestamp, payload)?;
        let matched = parsed.signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| expected.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });

        if !matched {
            tracing::debug!("No Stripe-Signature v1 entry matched");
            return Err(rejected());
        }

        Ok(())
    }

    /// Build a header for `payload` at `timestamp`
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String> {
        let signature = hex::encode(self.mac(timestamp, payload)?.finalize().into_bytes());
        Ok(format!("t={timestamp},v1={signature}"))
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| BillingError::Config("HMAC error".into()))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

fn rejected() -> BillingError {
    BillingError::WebhookSignature(
        "No signatures found matching the expected signature for payload".into(),
    )
}

struct SignatureHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Option<SignatureHeader<'_>> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part.split_once('=')?;
        match key.trim() {
            "t" => timestamp = value.trim().parse().ok(),
            "v1" => signatures.push(value.trim()),
            _ => {} // v0 and future schemes
        }
    }

    if signatures.is_empty() {
        return None;
    }

    Some(SignatureHeader {
        timestamp: timestamp?,
        signatures,
    })
}
