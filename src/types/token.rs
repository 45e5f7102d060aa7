//! Token Types
//!
//! Access and refresh token definitions.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeMap, BTreeSet};

/// Default token type.
pub const BEARER_TOKEN_TYPE: &str = "bearer";

/// Refresh token. `expires_at` of `None` never expires.
#[derive(Clone)]
pub struct RefreshToken {
    value: SecretString,
    /// Expiration time.
    pub expires_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    /// Create new refresh token.
    pub fn new(value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: SecretString::new(value.into()),
            expires_at,
        }
    }

    /// Token value.
    pub fn value(&self) -> &str {
        self.value.expose_secret()
    }

    /// Check if token is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }
}

impl PartialEq for RefreshToken {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value() && self.expires_at == other.expires_at
    }
}

impl Eq for RefreshToken {}

impl std::fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Access token.
///
/// Persisted tokens are never edited in place; expiry is evaluated against a
/// clock at read time.
#[derive(Clone)]
pub struct AccessToken {
    value: SecretString,
    /// Token type.
    pub token_type: String,
    /// Expiration time. `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes.
    pub scope: BTreeSet<String>,
    /// Linked refresh token.
    pub refresh_token: Option<RefreshToken>,
    /// Additional information added by token enhancers.
    pub additional_information: BTreeMap<String, serde_json::Value>,
}

impl AccessToken {
    /// Create new bearer access token.
    pub fn new(
        value: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
        scope: BTreeSet<String>,
    ) -> Self {
        Self {
            value: SecretString::new(value.into()),
            token_type: BEARER_TOKEN_TYPE.to_string(),
            expires_at,
            scope,
            refresh_token: None,
            additional_information: BTreeMap::new(),
        }
    }

    /// Set token type.
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    /// Attach a refresh token.
    pub fn with_refresh_token(mut self, refresh_token: Option<RefreshToken>) -> Self {
        self.refresh_token = refresh_token;
        self
    }

    /// Token value.
    pub fn value(&self) -> &str {
        self.value.expose_secret()
    }

    /// Linked refresh token value.
    pub fn refresh_token_value(&self) -> Option<&str> {
        self.refresh_token.as_ref().map(RefreshToken::value)
    }

    /// Check if token is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }

    /// Seconds until expiration, zero once expired.
    pub fn expires_in(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at
            .map(|exp| if exp > now { (exp - now).num_seconds() } else { 0 })
    }

    /// Format as Authorization header value.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.value.expose_secret())
    }
}

impl PartialEq for AccessToken {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
            && self.token_type == other.token_type
            && self.expires_at == other.expires_at
            && self.scope == other.scope
            && self.refresh_token == other.refresh_token
            && self.additional_information == other.additional_information
    }
}

impl Eq for AccessToken {}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("refresh_token", &self.refresh_token)
            .finish()
    }
}
