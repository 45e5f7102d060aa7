//! Token Service Error Types
//!
//! Error hierarchy for token issuance, validation and refresh.

use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

/// Root error type for token services.
#[derive(Error, Debug)]
pub enum TokenServiceError {
    #[error("Invalid token: {0}")]
    Token(#[from] TokenError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("Invalid grant: {0}")]
    Grant(#[from] GrantError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl TokenServiceError {
    /// OAuth2 error code, as returned to clients by an endpoint layer.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Token(_) => "invalid_token",
            Self::Client(_) => "invalid_client",
            Self::Scope(_) => "invalid_scope",
            Self::Grant(_) => "invalid_grant",
            Self::Storage(_) => "temporarily_unavailable",
            Self::Configuration(_) => "server_error",
        }
    }

    /// Check if error is retryable.
    ///
    /// Only transient store failures are. Everything else is a definitive answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_retryable())
    }

    /// Check if this is an invalid-token failure.
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, Self::Token(_))
    }

    /// Human-readable reason for invalid-token failures.
    pub fn invalid_token_reason(&self) -> Option<&'static str> {
        match self {
            Self::Token(e) => Some(e.reason()),
            _ => None,
        }
    }
}

/// Invalid token error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("access token not found")]
    NotFound,

    #[error("access token expired")]
    Expired,

    #[error("refresh token not found")]
    RefreshNotFound,

    #[error("refresh token (expired)")]
    RefreshExpired,

    #[error("client not valid: {client_id}")]
    ClientNotValid { client_id: String },
}

impl TokenError {
    /// Short reason carried with the failure.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound | Self::RefreshNotFound => "not found",
            Self::Expired => "expired",
            Self::RefreshExpired => "refresh token (expired)",
            Self::ClientNotValid { .. } => "client not valid",
        }
    }
}

/// Client policy lookup error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Unknown client: {client_id}")]
    UnknownClient { client_id: String },
}

/// Scope negotiation error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("Unable to narrow the scope of the authentication to {requested:?}")]
    ScopeExceeded {
        requested: BTreeSet<String>,
        granted: BTreeSet<String>,
    },
}

/// Grant error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrantError {
    #[error("Wrong client for this refresh token: expected {expected}, received {received}")]
    WrongClient { expected: String, received: String },

    #[error("Refresh grant not supported for client: {client_id}")]
    RefreshNotSupported { client_id: String },
}

/// Token store error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Store operation {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Store operation {operation} kept losing to concurrent writers")]
    Conflict { operation: &'static str },
}

impl StorageError {
    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        true
    }
}

/// Configuration error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

/// Result type for token service operations.
pub type TokenResult<T> = Result<T, TokenServiceError>;
