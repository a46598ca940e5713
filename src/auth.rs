//! Shared-secret bearer authentication
//!
//! Every gateway call must carry `Authorization: Bearer <secret>`. When no
//! secret is configured the gateway refuses all traffic with a server error
//! instead of running open.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use subtle::ConstantTimeEq;
use tracing::{error, warn};

use crate::error::GatewayError;

const BEARER_PREFIX: &str = "Bearer ";

/// Constant-time string comparison. Length mismatch is folded into the same
/// comparison so neither the length nor the first differing byte leaks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let len = a.len().max(b.len());
    let mut left = vec![0u8; len];
    let mut right = vec![0xFFu8; len];
    left[..a.len()].copy_from_slice(a.as_bytes());
    right[..b.len()].copy_from_slice(b.as_bytes());

    (a.len().ct_eq(&b.len()) & left.ct_eq(&right)).into()
}

/// Check the caller's bearer token against the configured secret.
pub fn authorize(headers: &HeaderMap, secret: Option<&str>) -> Result<(), GatewayError> {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        error!("ADMIN_API_SECRET is not configured; rejecting request");
        return Err(GatewayError::SecretNotConfigured);
    };

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .ok_or_else(|| {
            warn!("request without bearer credentials");
            GatewayError::MissingCredentials
        })?;

    if !constant_time_eq(token, secret) {
        warn!("request with invalid API secret");
        return Err(GatewayError::InvalidSecret);
    }
    Ok(())
}
