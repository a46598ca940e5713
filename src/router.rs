//! Router construction for the admin gateway.

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    routing::post,
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::admin;
use crate::state::AppState;

/// Headers browsers may send on cross-origin gateway calls.
const CLIENT_INFO: HeaderName = HeaderName::from_static("x-client-info");
const APIKEY: HeaderName = HeaderName::from_static("apikey");

/// Single endpoint at `/`. Wrong methods, unknown paths, and panics below the
/// handler still answer with the failure envelope.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CLIENT_INFO, APIKEY, CONTENT_TYPE]);

    Router::new()
        .route(
            "/",
            post(admin::handle)
                .options(admin::preflight)
                .fallback(admin::method_not_allowed),
        )
        .fallback(admin::not_found)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CatchPanicLayer::custom(admin::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
