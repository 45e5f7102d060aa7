//! Token Revocation
//!
//! Revocation and administrative lookup of issued tokens.

use async_trait::async_trait;
use tracing::info;

use crate::error::{TokenError, TokenResult};
use crate::policy::ClientPolicySource;
use crate::token::{DefaultTokenServices, TokenStore};
use crate::types::AccessToken;

/// Token revocation interface.
#[async_trait]
pub trait TokenRevocation: Send + Sync {
    /// Revoke an access token together with its refresh token.
    ///
    /// Returns false when no such access token exists.
    async fn revoke_token(&self, access_token_value: &str) -> TokenResult<bool>;

    /// Revoke a refresh token and the access token issued from it.
    async fn revoke_refresh_token(&self, refresh_token_value: &str) -> TokenResult<bool>;

    /// Live access tokens issued to a client.
    async fn find_tokens_by_client_id(&self, client_id: &str) -> TokenResult<Vec<AccessToken>>;

    /// Live access tokens issued to a client on behalf of a user.
    async fn find_tokens_by_principal(
        &self,
        client_id: &str,
        principal_name: &str,
    ) -> TokenResult<Vec<AccessToken>>;

    /// Client an access token was issued to.
    async fn get_client_id(&self, access_token_value: &str) -> TokenResult<String>;
}

impl<S: TokenStore, P: ClientPolicySource> DefaultTokenServices<S, P> {
    async fn revoke(&self, access_token_value: &str) -> TokenResult<bool> {
        let store = self.store();
        let Some(token) = store.get_access_token(access_token_value).await? else {
            return Ok(false);
        };

        if let Some(refresh) = &token.refresh_token {
            store.remove_refresh_token(refresh.value()).await?;
        }
        store.remove_access_token(access_token_value).await?;

        info!(
            refresh_token = token.refresh_token.is_some(),
            "Revoked access token"
        );
        Ok(true)
    }

    async fn revoke_refresh(&self, refresh_token_value: &str) -> TokenResult<bool> {
        let store = self.store();
        store
            .remove_access_token_using_refresh_token(refresh_token_value)
            .await?;
        let removed = store.remove_refresh_token(refresh_token_value).await?;
        if removed {
            info!("Revoked refresh token");
        }
        Ok(removed)
    }

    fn live(&self, tokens: Vec<AccessToken>) -> Vec<AccessToken> {
        let now = self.now();
        tokens
            .into_iter()
            .filter(|token| !token.is_expired_at(now))
            .collect()
    }
}

#[async_trait]
impl<S: TokenStore, P: ClientPolicySource> TokenRevocation for DefaultTokenServices<S, P> {
    async fn revoke_token(&self, access_token_value: &str) -> TokenResult<bool> {
        let result = self.revoke(access_token_value).await;
        self.metrics()
            .record_token_revocation(matches!(result, Ok(true)));
        self.observe("revoke_token", result)
    }

    async fn revoke_refresh_token(&self, refresh_token_value: &str) -> TokenResult<bool> {
        let result = self.revoke_refresh(refresh_token_value).await;
        self.metrics()
            .record_token_revocation(matches!(result, Ok(true)));
        self.observe("revoke_refresh_token", result)
    }

    async fn find_tokens_by_client_id(&self, client_id: &str) -> TokenResult<Vec<AccessToken>> {
        let result = self
            .store()
            .find_tokens_by_client_id(client_id)
            .await
            .map(|tokens| self.live(tokens));
        self.observe("find_tokens_by_client_id", result)
    }

    async fn find_tokens_by_principal(
        &self,
        client_id: &str,
        principal_name: &str,
    ) -> TokenResult<Vec<AccessToken>> {
        let result = self
            .store()
            .find_tokens_by_principal(client_id, principal_name)
            .await
            .map(|tokens| self.live(tokens));
        self.observe("find_tokens_by_principal", result)
    }

    async fn get_client_id(&self, access_token_value: &str) -> TokenResult<String> {
        let result = self
            .store()
            .read_authentication(access_token_value)
            .await
            .and_then(|context| {
                context
                    .map(|context| context.client_id().to_string())
                    .ok_or_else(|| TokenError::NotFound.into())
            });
        self.observe("get_client_id", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MockClock;
    use crate::policy::InMemoryClientPolicySource;
    use crate::telemetry::InMemoryMetrics;
    use crate::token::{InMemoryTokenStore, TokenServices};
    use crate::types::{
        AuthenticationContext, AuthorizationRequest, ClientPolicy, GrantType, Principal,
        TokenServicesConfig,
    };
    use std::sync::Arc;

    type Services = DefaultTokenServices<InMemoryTokenStore, InMemoryClientPolicySource>;

    fn create_test_services(clock: Arc<MockClock>, metrics: Arc<InMemoryMetrics>) -> Services {
        let policies = InMemoryClientPolicySource::with_policies([
            ClientPolicy::new("app", vec![GrantType::Password, GrantType::RefreshToken])
                .with_access_token_validity(60),
        ]);
        DefaultTokenServices::new(
            TokenServicesConfig::default(),
            Arc::new(InMemoryTokenStore::with_clock(clock.clone())),
            Arc::new(policies),
        )
        .with_clock(clock)
        .with_metrics(metrics)
    }

    fn user_context(user: &str) -> AuthenticationContext {
        AuthenticationContext::new(Principal::new(user), AuthorizationRequest::new("app", ["read"]))
    }

    #[tokio::test]
    async fn test_revoke_removes_both_tokens() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let services = create_test_services(Arc::new(MockClock::new()), metrics.clone());

        let token = services.create_access_token(&user_context("marissa")).await.unwrap();
        assert!(services.revoke_token(token.value()).await.unwrap());

        assert_eq!(services.store().access_token_count().await.unwrap(), 0);
        assert_eq!(services.store().refresh_token_count().await.unwrap(), 0);
        assert!(!services.revoke_token(token.value()).await.unwrap());

        let revocations = metrics.get_entries_by_name("oauth2_token_revocations_total");
        assert_eq!(revocations.len(), 2);
        assert_eq!(revocations[0].labels.get("success"), Some(&"true".to_string()));
        assert_eq!(revocations[1].labels.get("success"), Some(&"false".to_string()));
    }

    #[tokio::test]
    async fn test_revoke_refresh_token_drops_access_token() {
        let services =
            create_test_services(Arc::new(MockClock::new()), Arc::new(InMemoryMetrics::new()));

        let token = services.create_access_token(&user_context("marissa")).await.unwrap();
        let refresh = token.refresh_token_value().unwrap().to_string();

        assert!(services.revoke_refresh_token(&refresh).await.unwrap());
        assert!(services.read_access_token(token.value()).await.unwrap().is_none());
        assert!(!services.revoke_refresh_token(&refresh).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_tokens_skips_expired() {
        let clock = Arc::new(MockClock::new());
        let services = create_test_services(clock.clone(), Arc::new(InMemoryMetrics::new()));

        services.create_access_token(&user_context("marissa")).await.unwrap();
        clock.advance_secs(30);
        services.create_access_token(&user_context("paul")).await.unwrap();

        assert_eq!(services.find_tokens_by_client_id("app").await.unwrap().len(), 2);
        assert_eq!(
            services
                .find_tokens_by_principal("app", "paul")
                .await
                .unwrap()
                .len(),
            1
        );

        clock.advance_secs(45);
        let live = services.find_tokens_by_client_id("app").await.unwrap();
        assert_eq!(live.len(), 1);
        assert!(services
            .find_tokens_by_principal("app", "marissa")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_get_client_id() {
        let services =
            create_test_services(Arc::new(MockClock::new()), Arc::new(InMemoryMetrics::new()));

        let token = services.create_access_token(&user_context("marissa")).await.unwrap();
        assert_eq!(services.get_client_id(token.value()).await.unwrap(), "app");

        let error = services.get_client_id("unknown").await.unwrap_err();
        assert_eq!(error.invalid_token_reason(), Some("not found"));
    }
}
