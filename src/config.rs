//! Runtime configuration
//!
//! Flags fall back to environment variables, and `main` loads a `.env` file
//! first, so deployments can configure the gateway purely through the
//! environment.

use std::net::SocketAddr;

use clap::Parser;

use crate::filter::is_identifier;

pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Parser)]
#[command(name = "admin_api")]
#[command(about = "Permission-gated admin data gateway for the Book Maker pipeline")]
pub struct GatewayConfig {
    /// Shared bearer secret. When unset every request is rejected with a server error.
    #[arg(long, env = "ADMIN_API_SECRET", hide_env_values = true)]
    pub admin_secret: Option<String>,

    /// Privileged Postgres connection string
    #[arg(
        long,
        env = "DATABASE_URL",
        hide_env_values = true,
        required_unless_present = "in_memory"
    )]
    pub database_url: Option<String>,

    /// Schema holding the pipeline tables
    #[arg(long, env = "ADMIN_API_DB_SCHEMA", default_value = "public", value_parser = parse_schema)]
    pub db_schema: String,

    #[arg(long, env = "ADMIN_API_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,

    #[arg(long, env = "ADMIN_API_BIND_ADDR", default_value = "0.0.0.0:8787")]
    pub bind_addr: SocketAddr,

    /// Largest accepted request body
    #[arg(long, env = "ADMIN_API_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Serve from an in-process store instead of Postgres (local runs only)
    #[arg(long, env = "ADMIN_API_IN_MEMORY")]
    pub in_memory: bool,
}

fn parse_schema(value: &str) -> Result<String, String> {
    if is_identifier(value) {
        Ok(value.to_string())
    } else {
        Err(format!("'{value}' is not a valid schema name"))
    }
}
