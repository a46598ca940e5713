//! The admin gateway endpoint
//!
//! Method gating happens in the router; everything after it (auth, body,
//! validation, dispatch) runs in [`process`] and converges on one exit point
//! in [`handle`].

use std::any::Any;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::auth;
use crate::envelope::Envelope;
use crate::error::GatewayError;
use crate::gateway::{self, GatewayOutcome};
use crate::request::GatewayRequest;
use crate::state::AppState;

/// POST /
pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    match process(&state, &headers, body).await {
        Ok(outcome) => (
            StatusCode::OK,
            Envelope::success(outcome.data, outcome.count),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn process(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<GatewayOutcome, GatewayError> {
    auth::authorize(headers, state.admin_secret.as_deref())?;

    let body = body.map_err(|rejection| {
        GatewayError::invalid_request(format!(
            "Unreadable request body: {}",
            rejection.body_text()
        ))
    })?;

    let request = GatewayRequest::parse(&body)?;
    gateway::dispatch(state.store.as_ref(), request).await
}

/// OPTIONS / outside a CORS preflight. Real preflights are answered by the
/// CORS layer before reaching here.
pub async fn preflight() -> &'static str {
    "ok"
}

/// Any method other than POST or OPTIONS on `/`.
pub async fn method_not_allowed() -> GatewayError {
    GatewayError::MethodNotAllowed
}

pub async fn not_found(uri: Uri) -> GatewayError {
    GatewayError::UnknownPath(uri.path().to_string())
}

/// Converts a panic caught by the router's `CatchPanicLayer` into the
/// `SERVER_ERROR` envelope. String payloads become the message.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "An unexpected error occurred".to_string()
    };
    error!(panic = %message, "request handler panicked");
    GatewayError::Unexpected(message).into_response()
}
