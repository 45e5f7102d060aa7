//! Client Policy Types
//!
//! Per-client token validity and grant permissions.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Grant type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantType {
    #[serde(rename = "authorization_code")]
    AuthorizationCode,
    #[serde(rename = "client_credentials")]
    ClientCredentials,
    #[serde(rename = "refresh_token")]
    RefreshToken,
    #[serde(rename = "password")]
    Password,
    #[serde(rename = "implicit")]
    Implicit,
    #[serde(rename = "urn:ietf:params:oauth:grant-type:device_code")]
    DeviceCode,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
            Self::Password => "password",
            Self::Implicit => "implicit",
            Self::DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
        }
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(Self::AuthorizationCode),
            "client_credentials" => Ok(Self::ClientCredentials),
            "refresh_token" => Ok(Self::RefreshToken),
            "password" => Ok(Self::Password),
            "implicit" => Ok(Self::Implicit),
            "urn:ietf:params:oauth:grant-type:device_code" => Ok(Self::DeviceCode),
            other => Err(format!("unknown grant type: {}", other)),
        }
    }
}

/// Token policy of a registered client.
///
/// Validity of `None` or `0` falls back to the service default; a negative
/// validity never expires.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPolicy {
    /// Client identifier.
    pub client_id: String,
    /// Access token validity in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_validity_seconds: Option<i64>,
    /// Refresh token validity in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_validity_seconds: Option<i64>,
    /// Grant types the client may use.
    #[serde(default)]
    pub authorized_grant_types: Vec<GrantType>,
}

impl ClientPolicy {
    /// Create a policy with service-default validity.
    pub fn new(client_id: impl Into<String>, grant_types: Vec<GrantType>) -> Self {
        Self {
            client_id: client_id.into(),
            access_token_validity_seconds: None,
            refresh_token_validity_seconds: None,
            authorized_grant_types: grant_types,
        }
    }

    /// Set access token validity.
    pub fn with_access_token_validity(mut self, seconds: i64) -> Self {
        self.access_token_validity_seconds = Some(seconds);
        self
    }

    /// Set refresh token validity.
    pub fn with_refresh_token_validity(mut self, seconds: i64) -> Self {
        self.refresh_token_validity_seconds = Some(seconds);
        self
    }

    /// Check if a grant type is authorized.
    pub fn is_grant_authorized(&self, grant_type: GrantType) -> bool {
        self.authorized_grant_types.contains(&grant_type)
    }

    /// Whether refresh tokens may be issued to this client.
    pub fn supports_refresh_token(&self) -> bool {
        self.is_grant_authorized(GrantType::RefreshToken)
    }

    /// Effective access token validity given the service default.
    pub fn access_validity_or(&self, default_seconds: i64) -> i64 {
        effective_validity(self.access_token_validity_seconds, default_seconds)
    }

    /// Effective refresh token validity given the service default.
    pub fn refresh_validity_or(&self, default_seconds: i64) -> i64 {
        effective_validity(self.refresh_token_validity_seconds, default_seconds)
    }
}

fn effective_validity(configured: Option<i64>, default_seconds: i64) -> i64 {
    match configured {
        Some(0) | None => default_seconds,
        Some(seconds) => seconds,
    }
}
