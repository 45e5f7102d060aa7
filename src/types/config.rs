//! Configuration Types
//!
//! Token service configuration.

use serde::{Deserialize, Serialize};

use super::token::BEARER_TOKEN_TYPE;

/// Default configuration values.
pub const DEFAULT_ACCESS_TOKEN_VALIDITY_SECS: i64 = 60 * 60 * 12;
pub const DEFAULT_REFRESH_TOKEN_VALIDITY_SECS: i64 = 60 * 60 * 24 * 30;

/// Token service configuration.
///
/// Validity values are the service-wide defaults used when a client policy
/// leaves them unset; a negative default never expires.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenServicesConfig {
    /// Default access token validity in seconds.
    pub access_token_validity_seconds: i64,
    /// Default refresh token validity in seconds.
    pub refresh_token_validity_seconds: i64,
    /// Keep the same refresh token across refreshes (no rotation).
    pub reuse_refresh_tokens: bool,
    /// Token type reported on issued access tokens.
    pub token_type: String,
}

impl Default for TokenServicesConfig {
    fn default() -> Self {
        Self {
            access_token_validity_seconds: DEFAULT_ACCESS_TOKEN_VALIDITY_SECS,
            refresh_token_validity_seconds: DEFAULT_REFRESH_TOKEN_VALIDITY_SECS,
            reuse_refresh_tokens: true,
            token_type: BEARER_TOKEN_TYPE.to_string(),
        }
    }
}
