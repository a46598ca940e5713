//! Gateway error taxonomy
//!
//! Every failure the gateway can produce maps to exactly one machine-readable
//! [`ErrorCode`] and one HTTP status. Nothing escapes the handler as a raw
//! error; [`GatewayError`] renders itself as the failure envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::Envelope;
use crate::store::StoreError;

/// Machine-readable error code carried in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    ServerError,
    InvalidRequest,
    InvalidTable,
    InvalidAction,
    DatabaseError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::InvalidTable => "INVALID_TABLE",
            ErrorCode::InvalidAction => "INVALID_ACTION",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Server configuration error")]
    SecretNotConfigured,

    #[error("Missing or invalid Authorization header")]
    MissingCredentials,

    #[error("Invalid API secret")]
    InvalidSecret,

    #[error("Only POST method is allowed")]
    MethodNotAllowed,

    #[error("Unknown path: {0}")]
    UnknownPath(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Table '{0}' is not allowed")]
    InvalidTable(String),

    #[error("Action '{action}' is not allowed on table '{table}'")]
    InvalidAction { action: String, table: String },

    #[error("{0}")]
    Database(String),

    /// A panic caught below the handler.
    #[error("{0}")]
    Unexpected(String),
}

impl GatewayError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        GatewayError::InvalidRequest(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::SecretNotConfigured | GatewayError::Unexpected(_) => {
                ErrorCode::ServerError
            }
            GatewayError::MissingCredentials | GatewayError::InvalidSecret => {
                ErrorCode::Unauthorized
            }
            GatewayError::MethodNotAllowed
            | GatewayError::UnknownPath(_)
            | GatewayError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            GatewayError::InvalidTable(_) => ErrorCode::InvalidTable,
            GatewayError::InvalidAction { .. } => ErrorCode::InvalidAction,
            GatewayError::Database(_) => ErrorCode::DatabaseError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::SecretNotConfigured | GatewayError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::MissingCredentials | GatewayError::InvalidSecret => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::UnknownPath(_) => StatusCode::NOT_FOUND,
            GatewayError::InvalidRequest(_)
            | GatewayError::InvalidTable(_)
            | GatewayError::InvalidAction { .. }
            | GatewayError::Database(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        GatewayError::Database(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Envelope::failure(self.code(), self.to_string());
        (status, body).into_response()
    }
}
