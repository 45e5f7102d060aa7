//! Configuration Builder
//!
//! Fluent builder for token service configuration.

use crate::error::{ConfigurationError, TokenServiceError};
use crate::types::TokenServicesConfig;

/// Token service configuration builder.
#[derive(Default)]
pub struct TokenServicesConfigBuilder {
    access_token_validity_seconds: Option<i64>,
    refresh_token_validity_seconds: Option<i64>,
    reuse_refresh_tokens: Option<bool>,
    token_type: Option<String>,
}

impl TokenServicesConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set default access token validity. Negative never expires.
    pub fn access_token_validity_seconds(mut self, seconds: i64) -> Self {
        self.access_token_validity_seconds = Some(seconds);
        self
    }

    /// Set default refresh token validity. Negative never expires.
    pub fn refresh_token_validity_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_validity_seconds = Some(seconds);
        self
    }

    /// Reuse refresh tokens across refreshes (`true`) or rotate them (`false`).
    pub fn reuse_refresh_tokens(mut self, reuse: bool) -> Self {
        self.reuse_refresh_tokens = Some(reuse);
        self
    }

    /// Set the token type reported on access tokens.
    pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<TokenServicesConfig, TokenServiceError> {
        let defaults = TokenServicesConfig::default();

        let access = self
            .access_token_validity_seconds
            .unwrap_or(defaults.access_token_validity_seconds);
        let refresh = self
            .refresh_token_validity_seconds
            .unwrap_or(defaults.refresh_token_validity_seconds);

        // Zero means "use the default" on client policies.
        if access == 0 {
            return Err(ConfigurationError::InvalidConfig {
                message: "access_token_validity_seconds must not be zero".to_string(),
            }
            .into());
        }
        if refresh == 0 {
            return Err(ConfigurationError::InvalidConfig {
                message: "refresh_token_validity_seconds must not be zero".to_string(),
            }
            .into());
        }

        let token_type = self.token_type.unwrap_or(defaults.token_type);
        if token_type.trim().is_empty() {
            return Err(ConfigurationError::MissingField {
                field: "token_type".to_string(),
            }
            .into());
        }

        Ok(TokenServicesConfig {
            access_token_validity_seconds: access,
            refresh_token_validity_seconds: refresh,
            reuse_refresh_tokens: self
                .reuse_refresh_tokens
                .unwrap_or(defaults.reuse_refresh_tokens),
            token_type,
        })
    }
}

/// Create a new token service configuration builder.
pub fn token_services_config() -> TokenServicesConfigBuilder {
    TokenServicesConfigBuilder::new()
}
