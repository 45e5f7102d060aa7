//! Authentication Types
//!
//! The authenticated context a token is issued for, and the key used to
//! deduplicate tokens issued for equal contexts.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Authenticated user on whose behalf a client requested a token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal name (username, subject).
    pub name: String,
    /// Granted authorities.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub authorities: BTreeSet<String>,
}

impl Principal {
    /// Create a principal with no authorities.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authorities: BTreeSet::new(),
        }
    }

    /// Add an authority.
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authorities.insert(authority.into());
        self
    }
}

/// Authorization request that produced an authentication.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Requesting client.
    pub client_id: String,
    /// Requested scopes.
    #[serde(default)]
    pub scope: BTreeSet<String>,
    /// Extra request parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl AuthorizationRequest {
    /// Create a request for a client and a set of scopes.
    pub fn new<I, S>(client_id: impl Into<String>, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            client_id: client_id.into(),
            scope: scope.into_iter().map(Into::into).collect(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add an extra parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Resolved identity plus the authorization request it was made with.
///
/// Immutable once constructed; narrowing the scope on refresh produces a new
/// context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationContext {
    principal: Option<Principal>,
    request: AuthorizationRequest,
}

impl AuthenticationContext {
    /// Authentication of a user through a client.
    pub fn new(principal: Principal, request: AuthorizationRequest) -> Self {
        Self {
            principal: Some(principal),
            request,
        }
    }

    /// Authentication of a client acting on its own behalf.
    pub fn client_only(request: AuthorizationRequest) -> Self {
        Self {
            principal: None,
            request,
        }
    }

    /// The authenticated user, if any.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// The authorization request.
    pub fn request(&self) -> &AuthorizationRequest {
        &self.request
    }

    /// Client the authentication belongs to.
    pub fn client_id(&self) -> &str {
        &self.request.client_id
    }

    /// Requested scopes.
    pub fn scope(&self) -> &BTreeSet<String> {
        &self.request.scope
    }

    /// Whether no user is involved.
    pub fn is_client_only(&self) -> bool {
        self.principal.is_none()
    }

    /// Principal name, if a user is involved.
    pub fn principal_name(&self) -> Option<&str> {
        self.principal.as_ref().map(|p| p.name.as_str())
    }

    /// Copy of this context with a different scope.
    pub fn with_scope(&self, scope: BTreeSet<String>) -> Self {
        let mut request = self.request.clone();
        request.scope = scope;
        Self {
            principal: self.principal.clone(),
            request,
        }
    }
}

/// Refresh grant parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    /// Client presenting the refresh token.
    pub client_id: String,
    /// Scopes to request (subset of original). Empty keeps the original scope.
    #[serde(default)]
    pub scope: BTreeSet<String>,
}

impl RefreshRequest {
    /// Refresh keeping the original scope.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            scope: BTreeSet::new(),
        }
    }

    /// Refresh narrowing to the given scopes.
    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = scope.into_iter().map(Into::into).collect();
        self
    }
}

impl From<&AuthorizationRequest> for RefreshRequest {
    fn from(request: &AuthorizationRequest) -> Self {
        Self {
            client_id: request.client_id.clone(),
            scope: request.scope.clone(),
        }
    }
}

/// Deduplication fingerprint of an authentication.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthenticationKey(String);

impl AuthenticationKey {
    /// Wrap a precomputed digest.
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Digest string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthenticationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_accessors() {
        let context = AuthenticationContext::new(
            Principal::new("marissa").with_authority("ROLE_USER"),
            AuthorizationRequest::new("app", ["read", "write"]),
        );

        assert_eq!(context.client_id(), "app");
        assert_eq!(context.principal_name(), Some("marissa"));
        assert!(!context.is_client_only());
        assert!(context.scope().contains("read"));
    }

    #[test]
    fn test_with_scope_leaves_original_untouched() {
        let context =
            AuthenticationContext::client_only(AuthorizationRequest::new("app", ["read", "write"]));
        let narrowed = context.with_scope(["read".to_string()].into_iter().collect());

        assert_eq!(narrowed.scope().len(), 1);
        assert_eq!(context.scope().len(), 2);
        assert!(narrowed.is_client_only());
    }

    #[test]
    fn test_context_deserialization() {
        let json = r#"{
            "principal": {"name": "marissa"},
            "request": {"client_id": "app", "scope": ["read"]}
        }"#;

        let context: AuthenticationContext = serde_json::from_str(json).unwrap();
        assert_eq!(context.principal_name(), Some("marissa"));
        assert!(context.request().parameters.is_empty());
    }

    #[test]
    fn test_refresh_request_from_authorization_request() {
        let request = AuthorizationRequest::new("app", ["read"]).with_parameter("state", "xyz");
        let refresh = RefreshRequest::from(&request);

        assert_eq!(refresh.client_id, "app");
        assert_eq!(refresh.scope.len(), 1);
    }
}
