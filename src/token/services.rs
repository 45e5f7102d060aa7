//! Token Services
//!
//! Token lifecycle engine: creates, validates and refreshes access tokens
//! against a [`TokenStore`] and a [`ClientPolicySource`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::{
    AuthenticationKeyGenerator, Clock, DefaultAuthenticationKeyGenerator, RandomTokenGenerator,
    SystemClock, TokenValueGenerator,
};
use crate::error::{
    ClientError, GrantError, ScopeError, StorageError, TokenError, TokenResult, TokenServiceError,
};
use crate::policy::ClientPolicySource;
use crate::telemetry::{NoOpMetrics, TokenMetrics};
use crate::token::{TokenEnhancer, TokenStore};
use crate::types::{
    AccessToken, AuthenticationContext, AuthenticationKey, ClientPolicy, RefreshRequest,
    RefreshToken, TokenServicesConfig,
};

/// Attempts at storing a refreshed token before giving up on a contended key.
const MAX_REFRESH_STORE_ATTEMPTS: u32 = 3;

/// Token services interface.
#[async_trait]
pub trait TokenServices: Send + Sync {
    /// Issue an access token for an authentication, or return the live one
    /// already issued for an equal authentication.
    async fn create_access_token(&self, context: &AuthenticationContext)
        -> TokenResult<AccessToken>;

    /// Resolve an access token value back to the authentication it was issued for.
    async fn load_authentication(&self, access_token_value: &str)
        -> TokenResult<AuthenticationContext>;

    /// Exchange a refresh token for a new access token.
    ///
    /// The returned token is always linked to the presented refresh token, or
    /// to its replacement when refresh tokens rotate. With rotation only one
    /// exchange of a given value succeeds; concurrent ones fail as not found.
    async fn refresh_access_token(
        &self,
        refresh_token_value: &str,
        request: &RefreshRequest,
    ) -> TokenResult<AccessToken>;

    /// Read an access token as stored, without expiry checks.
    async fn read_access_token(&self, access_token_value: &str)
        -> TokenResult<Option<AccessToken>>;

    /// The live access token issued for an authentication, if any.
    async fn get_access_token(&self, context: &AuthenticationContext)
        -> TokenResult<Option<AccessToken>>;
}

/// Default token services implementation.
///
/// Holds no state of its own between calls; everything lives in the store.
pub struct DefaultTokenServices<S: TokenStore, P: ClientPolicySource> {
    config: TokenServicesConfig,
    store: Arc<S>,
    policies: Arc<P>,
    clock: Arc<dyn Clock>,
    token_generator: Arc<dyn TokenValueGenerator>,
    key_generator: Arc<dyn AuthenticationKeyGenerator>,
    enhancer: Option<Arc<dyn TokenEnhancer>>,
    metrics: Arc<dyn TokenMetrics>,
}

impl<S: TokenStore, P: ClientPolicySource> DefaultTokenServices<S, P> {
    /// Create token services with the system clock and random token values.
    pub fn new(config: TokenServicesConfig, store: Arc<S>, policies: Arc<P>) -> Self {
        Self {
            config,
            store,
            policies,
            clock: Arc::new(SystemClock),
            token_generator: Arc::new(RandomTokenGenerator::new()),
            key_generator: Arc::new(DefaultAuthenticationKeyGenerator::new()),
            enhancer: None,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Use a different clock for expiry decisions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a different token value generator.
    pub fn with_token_generator(mut self, generator: Arc<dyn TokenValueGenerator>) -> Self {
        self.token_generator = generator;
        self
    }

    /// Use a different authentication key generator.
    pub fn with_key_generator(mut self, generator: Arc<dyn AuthenticationKeyGenerator>) -> Self {
        self.key_generator = generator;
        self
    }

    /// Decorate minted access tokens before they are stored.
    pub fn with_enhancer(mut self, enhancer: Arc<dyn TokenEnhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    /// Record metrics.
    pub fn with_metrics(mut self, metrics: Arc<dyn TokenMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Service configuration.
    pub fn config(&self) -> &TokenServicesConfig {
        &self.config
    }

    /// Backing token store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn metrics(&self) -> &dyn TokenMetrics {
        self.metrics.as_ref()
    }

    pub(crate) fn observe<T>(
        &self,
        operation: &'static str,
        result: TokenResult<T>,
    ) -> TokenResult<T> {
        if let Err(error) = &result {
            self.metrics.record_error(error.error_code(), operation);
            if error.is_retryable() {
                warn!(operation, error = %error, "Token store unavailable");
            } else {
                debug!(operation, error = %error, "Token operation rejected");
            }
        }
        result
    }

    fn mint_refresh_token(
        &self,
        policy: &ClientPolicy,
        now: DateTime<Utc>,
    ) -> Option<RefreshToken> {
        if !policy.supports_refresh_token() {
            return None;
        }
        let validity = policy.refresh_validity_or(self.config.refresh_token_validity_seconds);
        Some(RefreshToken::new(
            self.token_generator.generate(),
            expiry(now, validity),
        ))
    }

    fn mint_access_token(
        &self,
        context: &AuthenticationContext,
        policy: &ClientPolicy,
        refresh_token: Option<RefreshToken>,
        now: DateTime<Utc>,
    ) -> AccessToken {
        let validity = policy.access_validity_or(self.config.access_token_validity_seconds);
        let token = AccessToken::new(
            self.token_generator.generate(),
            expiry(now, validity),
            context.scope().clone(),
        )
        .with_token_type(self.config.token_type.clone())
        .with_refresh_token(refresh_token);

        match &self.enhancer {
            Some(enhancer) => enhancer.enhance(token, context),
            None => token,
        }
    }

    /// Refresh token for a new access token: the one left behind by an expired
    /// predecessor while it is still stored and live, else a new one if the
    /// client may refresh. The flag is true when the token was just minted.
    async fn select_refresh_token(
        &self,
        previous: Option<RefreshToken>,
        policy: &ClientPolicy,
        now: DateTime<Utc>,
    ) -> TokenResult<(Option<RefreshToken>, bool)> {
        if let Some(previous) = previous {
            match self.store.get_refresh_token(previous.value()).await? {
                Some(stored) if !stored.is_expired_at(now) => return Ok((Some(stored), false)),
                Some(stored) => {
                    self.store.remove_refresh_token(stored.value()).await?;
                    self.metrics.record_lazy_eviction("refresh_token");
                }
                None => {}
            }
        }

        let minted = self.mint_refresh_token(policy, now);
        let is_new = minted.is_some();
        Ok((minted, is_new))
    }

    async fn create(&self, context: &AuthenticationContext) -> TokenResult<AccessToken> {
        let key = self.key_generator.extract_key(context);
        let now = self.now();
        let client_id = context.client_id();

        let mut previous_refresh = None;
        if let Some(existing) = self.store.get_access_token_for_key(&key).await? {
            if !existing.is_expired_at(now) {
                debug!(client_id, "Reusing live access token");
                self.metrics.record_token_reused(client_id);
                return Ok(existing);
            }
            self.store.remove_access_token(existing.value()).await?;
            self.metrics.record_lazy_eviction("access_token");
            previous_refresh = existing.refresh_token;
        }

        let policy = self.policies.resolve_policy(client_id).await?;
        let (refresh_token, refresh_is_new) = self
            .select_refresh_token(previous_refresh, &policy, now)
            .await?;

        if refresh_is_new {
            if let Some(refresh) = &refresh_token {
                self.store
                    .put_refresh_token(refresh.clone(), context.clone())
                    .await?;
            }
        }

        let token = self.mint_access_token(context, &policy, refresh_token, now);
        if let Some(winner) = self
            .store
            .put_access_token(key, token.clone(), context.clone())
            .await?
        {
            debug!(client_id, "Another writer issued a token for this authentication first");
            if refresh_is_new {
                if let Some(refresh) = &token.refresh_token {
                    self.store.remove_refresh_token(refresh.value()).await?;
                }
            }
            self.metrics.record_token_reused(client_id);
            return Ok(winner);
        }

        info!(
            client_id,
            refresh_token = token.refresh_token.is_some(),
            "Issued access token"
        );
        self.metrics
            .record_token_issued(client_id, token.refresh_token.is_some());
        Ok(token)
    }

    async fn load(&self, access_token_value: &str) -> TokenResult<AuthenticationContext> {
        let token = self
            .store
            .get_access_token(access_token_value)
            .await?
            .ok_or(TokenError::NotFound)?;

        if token.is_expired_at(self.now()) {
            self.store.remove_access_token(access_token_value).await?;
            self.metrics.record_lazy_eviction("access_token");
            return Err(TokenError::Expired.into());
        }

        let context = self
            .store
            .read_authentication(access_token_value)
            .await?
            .ok_or(TokenError::NotFound)?;

        match self.policies.resolve_policy(context.client_id()).await {
            Ok(_) => Ok(context),
            Err(TokenServiceError::Client(ClientError::UnknownClient { client_id })) => {
                Err(TokenError::ClientNotValid { client_id }.into())
            }
            Err(error) => Err(error),
        }
    }

    async fn refresh(
        &self,
        refresh_token_value: &str,
        request: &RefreshRequest,
    ) -> TokenResult<AccessToken> {
        let refresh_token = self
            .store
            .get_refresh_token(refresh_token_value)
            .await?
            .ok_or(TokenError::RefreshNotFound)?;

        let now = self.now();
        if refresh_token.is_expired_at(now) {
            self.store
                .remove_access_token_using_refresh_token(refresh_token_value)
                .await?;
            self.store.remove_refresh_token(refresh_token_value).await?;
            self.metrics.record_lazy_eviction("refresh_token");
            return Err(TokenError::RefreshExpired.into());
        }

        let original = self
            .store
            .read_authentication_for_refresh_token(refresh_token_value)
            .await?
            .ok_or(TokenError::RefreshNotFound)?;

        if original.client_id() != request.client_id {
            return Err(GrantError::WrongClient {
                expected: original.client_id().to_string(),
                received: request.client_id.clone(),
            }
            .into());
        }

        let policy = self.policies.resolve_policy(original.client_id()).await?;
        if !policy.supports_refresh_token() {
            return Err(GrantError::RefreshNotSupported {
                client_id: policy.client_id.clone(),
            }
            .into());
        }

        let context = narrow_scope(&original, &request.scope)?;
        let key = self.key_generator.extract_key(&context);

        self.store
            .remove_access_token_using_refresh_token(refresh_token_value)
            .await?;

        let rotated = if self.config.reuse_refresh_tokens {
            None
        } else {
            // Only one caller can consume the presented value.
            if !self.store.remove_refresh_token(refresh_token_value).await? {
                return Err(TokenError::RefreshNotFound.into());
            }
            let validity = policy.refresh_validity_or(self.config.refresh_token_validity_seconds);
            let replacement =
                RefreshToken::new(self.token_generator.generate(), expiry(now, validity));
            self.store
                .put_refresh_token(replacement.clone(), context.clone())
                .await?;
            Some(replacement)
        };

        if let Some(existing) = self.store.get_access_token_for_key(&key).await? {
            self.store.remove_access_token(existing.value()).await?;
        }

        let issued_refresh = rotated.clone().unwrap_or(refresh_token);
        let token = self.mint_access_token(&context, &policy, Some(issued_refresh.clone()), now);

        match self.store_refreshed(&key, &token, &context, &issued_refresh).await {
            Ok(stored) => {
                info!(
                    client_id = context.client_id(),
                    rotated = rotated.is_some(),
                    "Refreshed access token"
                );
                Ok(stored)
            }
            Err(error) => {
                if let Some(replacement) = &rotated {
                    self.store.remove_refresh_token(replacement.value()).await?;
                }
                Err(error)
            }
        }
    }

    /// Store a refreshed access token under `key`.
    ///
    /// A token that another refresh of the same refresh token stored first is
    /// returned as is. Any other occupant was issued after this refresh cleared
    /// the key and is replaced.
    async fn store_refreshed(
        &self,
        key: &AuthenticationKey,
        token: &AccessToken,
        context: &AuthenticationContext,
        refresh_token: &RefreshToken,
    ) -> TokenResult<AccessToken> {
        for attempt in 1..=MAX_REFRESH_STORE_ATTEMPTS {
            let Some(winner) = self
                .store
                .put_access_token(key.clone(), token.clone(), context.clone())
                .await?
            else {
                return Ok(token.clone());
            };

            if winner.refresh_token_value() == Some(refresh_token.value()) {
                debug!(
                    client_id = context.client_id(),
                    "Concurrent refresh stored a token first"
                );
                return Ok(winner);
            }
            if attempt == MAX_REFRESH_STORE_ATTEMPTS {
                break;
            }
            debug!(
                client_id = context.client_id(),
                attempt, "Replacing token issued during refresh"
            );
            self.store.remove_access_token(winner.value()).await?;
        }

        Err(StorageError::Conflict {
            operation: "refresh_access_token",
        }
        .into())
    }
}

/// Absolute expiry for a validity window. Non-positive windows never expire.
///
/// Windows too large to represent also never expire.
fn expiry(now: DateTime<Utc>, validity_seconds: i64) -> Option<DateTime<Utc>> {
    if validity_seconds <= 0 {
        return None;
    }
    Duration::try_seconds(validity_seconds).and_then(|window| now.checked_add_signed(window))
}

/// Apply a refresh request's scope to the original authentication.
///
/// Empty keeps the original scope; otherwise the request must be a subset of it.
fn narrow_scope(
    original: &AuthenticationContext,
    requested: &BTreeSet<String>,
) -> TokenResult<AuthenticationContext> {
    if requested.is_empty() {
        return Ok(original.clone());
    }
    if !requested.is_subset(original.scope()) {
        return Err(ScopeError::ScopeExceeded {
            requested: requested.clone(),
            granted: original.scope().clone(),
        }
        .into());
    }
    Ok(original.with_scope(requested.clone()))
}

#[async_trait]
impl<S: TokenStore, P: ClientPolicySource> TokenServices for DefaultTokenServices<S, P> {
    async fn create_access_token(
        &self,
        context: &AuthenticationContext,
    ) -> TokenResult<AccessToken> {
        let result = self.create(context).await;
        self.observe("create_access_token", result)
    }

    async fn load_authentication(
        &self,
        access_token_value: &str,
    ) -> TokenResult<AuthenticationContext> {
        let result = self.load(access_token_value).await;
        self.metrics.record_validation(result.is_ok());
        self.observe("load_authentication", result)
    }

    async fn refresh_access_token(
        &self,
        refresh_token_value: &str,
        request: &RefreshRequest,
    ) -> TokenResult<AccessToken> {
        let result = self.refresh(refresh_token_value, request).await;
        self.metrics
            .record_token_refresh(&request.client_id, result.is_ok());
        self.observe("refresh_access_token", result)
    }

    async fn read_access_token(
        &self,
        access_token_value: &str,
    ) -> TokenResult<Option<AccessToken>> {
        let result = self.store.get_access_token(access_token_value).await;
        self.observe("read_access_token", result)
    }

    async fn get_access_token(
        &self,
        context: &AuthenticationContext,
    ) -> TokenResult<Option<AccessToken>> {
        let key = self.key_generator.extract_key(context);
        let now = self.now();
        let result = self
            .store
            .get_access_token_for_key(&key)
            .await
            .map(|token| token.filter(|token| !token.is_expired_at(now)));
        self.observe("get_access_token", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MockClock, MockTokenGenerator};
    use crate::policy::MockClientPolicySource;
    use crate::telemetry::InMemoryMetrics;
    use crate::token::{InMemoryTokenStore, MockTokenStore};
    use crate::types::{AuthorizationRequest, GrantType, Principal};

    fn create_test_context() -> AuthenticationContext {
        AuthenticationContext::new(
            Principal::new("test2"),
            AuthorizationRequest::new("id", ["read"]),
        )
    }

    fn refresh_policy() -> ClientPolicy {
        ClientPolicy::new(
            "id",
            vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
        )
    }

    fn policies_returning(policy: ClientPolicy) -> MockClientPolicySource {
        let mut policies = MockClientPolicySource::new();
        policies
            .expect_resolve_policy()
            .returning(move |_| Ok(policy.clone()));
        policies
    }

    #[test]
    fn test_expiry_conventions() {
        let now = Utc::now();
        assert_eq!(expiry(now, 10), Some(now + Duration::seconds(10)));
        assert_eq!(expiry(now, -1), None);
        assert_eq!(expiry(now, 0), None);
    }

    #[test]
    fn test_expiry_beyond_calendar_never_expires() {
        let now = Utc::now();
        assert_eq!(expiry(now, i64::MAX / 2000), None);
        assert_eq!(expiry(now, i64::MAX), None);
    }

    #[tokio::test]
    async fn test_huge_policy_validity_does_not_panic() {
        let policy = refresh_policy()
            .with_access_token_validity(i64::MAX / 2000)
            .with_refresh_token_validity(i64::MAX);
        let services = DefaultTokenServices::new(
            TokenServicesConfig::default(),
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(policies_returning(policy)),
        );

        let token = services.create_access_token(&create_test_context()).await.unwrap();
        assert_eq!(token.expires_at, None);
        assert_eq!(token.refresh_token.as_ref().unwrap().expires_at, None);

        let refreshed = services
            .refresh_access_token(
                token.refresh_token_value().unwrap(),
                &RefreshRequest::new("id"),
            )
            .await
            .unwrap();
        assert_eq!(refreshed.expires_at, None);
    }

    #[test]
    fn test_narrow_scope() {
        let original = AuthenticationContext::client_only(AuthorizationRequest::new(
            "id",
            ["read", "write"],
        ));

        let same = narrow_scope(&original, &BTreeSet::new()).unwrap();
        assert_eq!(same, original);

        let read: BTreeSet<String> = ["read".to_string()].into_iter().collect();
        let narrowed = narrow_scope(&original, &read).unwrap();
        assert_eq!(narrowed.scope().len(), 1);

        let wider: BTreeSet<String> = ["read", "write", "admin"]
            .into_iter()
            .map(String::from)
            .collect();
        assert!(matches!(
            narrow_scope(&original, &wider),
            Err(TokenServiceError::Scope(ScopeError::ScopeExceeded { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unknown_client_fails_creation() {
        let mut policies = MockClientPolicySource::new();
        policies
            .expect_resolve_policy()
            .times(1)
            .returning(|client_id| {
                Err(ClientError::UnknownClient {
                    client_id: client_id.to_string(),
                }
                .into())
            });

        let services = DefaultTokenServices::new(
            TokenServicesConfig::default(),
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(policies),
        );

        let result = services.create_access_token(&create_test_context()).await;
        assert!(matches!(
            result,
            Err(TokenServiceError::Client(ClientError::UnknownClient { .. }))
        ));
        assert_eq!(services.store().access_token_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reuse_skips_policy_lookup() {
        let mut policies = MockClientPolicySource::new();
        policies
            .expect_resolve_policy()
            .times(1)
            .returning(|_| Ok(refresh_policy()));

        let services = DefaultTokenServices::new(
            TokenServicesConfig::default(),
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(policies),
        );

        let first = services.create_access_token(&create_test_context()).await.unwrap();
        let second = services.create_access_token(&create_test_context()).await.unwrap();
        assert_eq!(first.value(), second.value());
    }

    #[tokio::test]
    async fn test_minted_values_come_from_generator() {
        let generator = Arc::new(MockTokenGenerator::new());
        generator.push_value("refresh-1").push_value("access-1");

        let services = DefaultTokenServices::new(
            TokenServicesConfig::default(),
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(policies_returning(refresh_policy())),
        )
        .with_token_generator(generator.clone());

        let token = services.create_access_token(&create_test_context()).await.unwrap();
        assert_eq!(token.value(), "access-1");
        assert_eq!(token.refresh_token_value(), Some("refresh-1"));
        assert_eq!(token.token_type, "bearer");
        assert_eq!(generator.get_generate_history().len(), 2);
    }

    #[tokio::test]
    async fn test_validity_from_policy_and_defaults() {
        let clock = Arc::new(MockClock::new());
        let config = TokenServicesConfig {
            access_token_validity_seconds: 100,
            refresh_token_validity_seconds: -1,
            ..TokenServicesConfig::default()
        };
        let policy = refresh_policy().with_access_token_validity(0);

        let services = DefaultTokenServices::new(
            config,
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(policies_returning(policy)),
        )
        .with_clock(clock.clone());

        let token = services.create_access_token(&create_test_context()).await.unwrap();
        assert_eq!(token.expires_at, Some(clock.now() + Duration::seconds(100)));
        assert_eq!(token.refresh_token.as_ref().unwrap().expires_at, None);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = Arc::new(MockTokenStore::new());
        store.set_should_fail(true);
        let metrics = Arc::new(InMemoryMetrics::new());

        let services = DefaultTokenServices::new(
            TokenServicesConfig::default(),
            store.clone(),
            Arc::new(policies_returning(refresh_policy())),
        )
        .with_metrics(metrics.clone());

        let error = services
            .load_authentication("whatever")
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            TokenServiceError::Storage(StorageError::Unavailable { .. })
        ));
        assert!(error.is_retryable());
        assert_eq!(store.call_count("get_access_token"), 1);

        let errors = metrics.get_entries_by_name("oauth2_errors_total");
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].labels.get("error_code"),
            Some(&"temporarily_unavailable".to_string())
        );
    }

    #[tokio::test]
    async fn test_load_rejects_tokens_of_removed_clients() {
        let mut policies = MockClientPolicySource::new();
        let mut calls = 0;
        policies.expect_resolve_policy().returning(move |client_id| {
            calls += 1;
            if calls == 1 {
                Ok(refresh_policy())
            } else {
                Err(ClientError::UnknownClient {
                    client_id: client_id.to_string(),
                }
                .into())
            }
        });

        let services = DefaultTokenServices::new(
            TokenServicesConfig::default(),
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(policies),
        );

        let token = services.create_access_token(&create_test_context()).await.unwrap();
        let error = services.load_authentication(token.value()).await.unwrap_err();
        assert_eq!(error.invalid_token_reason(), Some("client not valid"));
    }

    #[tokio::test]
    async fn test_get_access_token_hides_expired_tokens() {
        let clock = Arc::new(MockClock::new());
        let services = DefaultTokenServices::new(
            TokenServicesConfig::default(),
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(policies_returning(refresh_policy().with_access_token_validity(5))),
        )
        .with_clock(clock.clone());

        let context = create_test_context();
        let token = services.create_access_token(&context).await.unwrap();
        assert_eq!(
            services.get_access_token(&context).await.unwrap(),
            Some(token.clone())
        );

        clock.advance_secs(6);
        assert!(services.get_access_token(&context).await.unwrap().is_none());
        // The raw read still sees it until something evicts it.
        assert!(services.read_access_token(token.value()).await.unwrap().is_some());
    }
}
