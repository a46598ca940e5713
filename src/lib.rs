//! Book Maker admin gateway
//!
//! A permission-gated JSON CRUD proxy in front of the pipeline's Postgres
//! tables. Callers POST `{action, table, data?, filters?, options?}` with a
//! shared bearer secret; the gateway checks the request against a static
//! table permission matrix, runs one store operation, and answers with a
//! uniform `{success, data, count?, error}` envelope.

pub mod auth;
pub mod config;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod handlers;
pub mod permissions;
pub mod request;
pub mod router;
pub mod state;
pub mod store;

pub use error::{ErrorCode, GatewayError};
pub use router::build_router;
pub use state::AppState;
